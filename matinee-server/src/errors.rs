use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use matinee_collab::{RepositoryError, RoomError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    Forbidden(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::NotFound(id) => Self::NotFound {
                resource: "room",
                identifier: id,
            },
            RoomError::Conflict(id) => Self::Conflict {
                resource: "room",
                field: "id",
                value: id,
            },
            e @ RoomError::NotAMember { .. } => Self::Forbidden(e.to_string()),
            e @ RoomError::Forbidden { .. } => Self::Forbidden(e.to_string()),
            RoomError::Repository(e) => e.into(),
        }
    }
}

impl From<RepositoryError> for ServerError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            RepositoryError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}
