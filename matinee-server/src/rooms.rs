use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json,
};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{
        HostTransferSchema, JoinRoomSchema, MessagesQuery, NewMessageSchema, NewRoomSchema,
        PlaybackUpdateSchema, ValidatedJson, VideoUpdateSchema,
    },
    serialized::{Message, Room, Snapshot, ToSerialized},
    Router,
};

/// Messages returned when the query does not say otherwise
const DEFAULT_MESSAGE_LIMIT: usize = 50;

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
async fn list_rooms(State(context): State<ServerContext>) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.collab.rooms.list_rooms().await?;

    Ok(Json(rooms.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    responses(
        (status = 200, body = Snapshot),
        (status = 409, description = "The room id is taken by an occupied room")
    )
)]
async fn create_room(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Snapshot>> {
    let snapshot = context
        .collab
        .rooms
        .create_room(&body.id, &body.name, body.user.into())
        .await?;

    Ok(Json(snapshot.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    responses(
        (status = 200, body = Snapshot),
        (status = 404, description = "No such room")
    )
)]
async fn room(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<Snapshot>> {
    let snapshot = context.collab.rooms.snapshot(&room_id).await?;

    Ok(Json(snapshot.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/members",
    tag = "rooms",
    request_body = JoinRoomSchema,
    responses(
        (status = 200, body = Snapshot),
        (status = 404, description = "No such room")
    )
)]
async fn join_room(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<JoinRoomSchema>,
) -> ServerResult<Json<Snapshot>> {
    let snapshot = context
        .collab
        .rooms
        .join_room(&room_id, body.user.into())
        .await?;

    Ok(Json(snapshot.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}/members/{user_id}",
    tag = "rooms",
    responses(
        (status = 200, body = Option<Room>, description = "The room as left behind, null once empty")
    )
)]
async fn leave_room(
    State(context): State<ServerContext>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> ServerResult<Json<Option<Room>>> {
    let room = context.collab.rooms.leave_room(&room_id, &user_id).await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/rooms/{id}/video",
    tag = "rooms",
    request_body = VideoUpdateSchema,
    responses(
        (status = 200, body = Room),
        (status = 403, description = "The caller is not a member")
    )
)]
async fn update_video(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<VideoUpdateSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .update_video(&room_id, &body.user_id, body.video.map(Into::into))
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/rooms/{id}/playback",
    tag = "rooms",
    request_body = PlaybackUpdateSchema,
    responses(
        (status = 200, body = Room),
        (status = 403, description = "The caller is not the host")
    )
)]
async fn update_playback(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<PlaybackUpdateSchema>,
) -> ServerResult<Json<Room>> {
    let user_id = body.user_id.clone();
    let room = context
        .collab
        .rooms
        .update_playback(&room_id, &user_id, body.into())
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/promote",
    tag = "rooms",
    request_body = HostTransferSchema,
    responses(
        (status = 200, body = Room),
        (status = 403, description = "The caller may not promote the target")
    )
)]
async fn promote_member(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<HostTransferSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .promote_member(&room_id, &body.user_id, &body.target_user_id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/demote",
    tag = "rooms",
    request_body = HostTransferSchema,
    responses(
        (status = 200, body = Room),
        (status = 403, description = "The caller may not demote the target")
    )
)]
async fn demote_member(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<HostTransferSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .demote_member(&room_id, &body.user_id, &body.target_user_id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/messages",
    tag = "rooms",
    request_body = NewMessageSchema,
    responses(
        (status = 200, body = Message),
        (status = 403, description = "The caller is not a member")
    )
)]
async fn send_message(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<NewMessageSchema>,
) -> ServerResult<Json<Message>> {
    let message = context
        .collab
        .rooms
        .send_message(&room_id, &body.user_id, &body.text)
        .await?;

    Ok(Json(message.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/messages",
    tag = "rooms",
    params(MessagesQuery),
    responses(
        (status = 200, body = Vec<Message>, description = "Newest messages, oldest first")
    )
)]
async fn messages(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> ServerResult<Json<Vec<Message>>> {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let messages = context.collab.rooms.recent_messages(&room_id, limit).await?;

    Ok(Json(messages.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/:id", get(room))
        .route("/:id/members", post(join_room))
        .route("/:id/members/:user_id", delete(leave_room))
        .route("/:id/video", put(update_video))
        .route("/:id/playback", put(update_playback))
        .route("/:id/promote", post(promote_member))
        .route("/:id/demote", post(demote_member))
        .route("/:id/messages", get(messages).post(send_message))
}
