use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;
use utoipauto::utoipauto;

#[utoipauto(paths = "./matinee-server/src")]
#[derive(OpenApi)]
#[openapi(info(
    description = "matinee-server exposes endpoints to interact with this matinee instance"
))]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
