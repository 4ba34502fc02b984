//! Group endpoints.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use api_types::group::{GroupNew, GroupView, GroupsResponse};

use crate::{ServerError, server::ServerState, user};

fn view(group: engine::Group) -> GroupView {
    GroupView {
        id: group.id,
        name: group.name,
        total_expense_minor: group.total_expense_minor,
        average_expense_minor: group.average_expense_minor,
    }
}

pub async fn create(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<GroupNew>,
) -> Result<(StatusCode, Json<Uuid>), ServerError> {
    let id = state.engine.new_group(&payload.name, &user.username).await?;
    Ok((StatusCode::CREATED, Json(id)))
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
) -> Result<Json<GroupsResponse>, ServerError> {
    let groups = state
        .engine
        .groups_by_user(&user.username)
        .await?
        .into_iter()
        .map(view)
        .collect();

    Ok(Json(GroupsResponse { groups }))
}

pub async fn get(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupView>, ServerError> {
    let group = state.engine.group(group_id, &user.username).await?;
    Ok(Json(view(group)))
}

pub async fn remove(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_group(group_id, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}
