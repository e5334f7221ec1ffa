use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use matinee_collab::UserProfile;
use matinee_core::{PlaybackState, VideoKind, VideoRef};

/// The identity a caller supplies with mutating requests. There is no
/// account system, possession of the room id and a self chosen user id
/// is the whole access model.
#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileSchema {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(nested)]
    pub user: ProfileSchema,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinRoomSchema {
    #[validate(nested)]
    pub user: ProfileSchema,
}

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum VideoKindSchema {
    File,
    PageEmbed,
    EpisodeEmbed { season: u32, episode: u32 },
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VideoSchema {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 256))]
    pub title: String,
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    #[validate(length(max = 2048))]
    pub thumbnail: Option<String>,
    pub kind: VideoKindSchema,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VideoUpdateSchema {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    /// Absent clears the room's video
    #[validate(nested)]
    pub video: Option<VideoSchema>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaybackUpdateSchema {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    pub is_playing: bool,
    /// Seconds from the start, taken as reported
    pub position: f64,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostTransferSchema {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(length(min = 1, max = 64))]
    pub target_user_id: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewMessageSchema {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(length(min = 1, max = 1024))]
    pub text: String,
}

#[derive(Debug, IntoParams, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    /// At most this many of the newest messages, default 50
    pub limit: Option<usize>,
}

impl From<ProfileSchema> for UserProfile {
    fn from(value: ProfileSchema) -> Self {
        Self {
            user_id: value.user_id,
            name: value.name,
        }
    }
}

impl From<VideoKindSchema> for VideoKind {
    fn from(value: VideoKindSchema) -> Self {
        match value {
            VideoKindSchema::File => Self::File,
            VideoKindSchema::PageEmbed => Self::PageEmbed,
            VideoKindSchema::EpisodeEmbed { season, episode } => {
                Self::EpisodeEmbed { season, episode }
            }
        }
    }
}

impl From<VideoKind> for VideoKindSchema {
    fn from(value: VideoKind) -> Self {
        match value {
            VideoKind::File => Self::File,
            VideoKind::PageEmbed => Self::PageEmbed,
            VideoKind::EpisodeEmbed { season, episode } => {
                Self::EpisodeEmbed { season, episode }
            }
        }
    }
}

impl From<VideoSchema> for VideoRef {
    fn from(value: VideoSchema) -> Self {
        Self {
            id: value.id,
            title: value.title,
            url: value.url,
            thumbnail: value.thumbnail,
            kind: value.kind.into(),
        }
    }
}

impl From<PlaybackUpdateSchema> for PlaybackState {
    fn from(value: PlaybackUpdateSchema) -> Self {
        Self {
            is_playing: value.is_playing,
            position: value.position,
        }
    }
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
