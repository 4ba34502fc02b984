//! Membership endpoints.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use api_types::member::{MemberAdd, MemberRole, MemberView, MembersResponse};

use crate::{ServerError, server::ServerState, user};

fn role_view(role: engine::MemberRole) -> MemberRole {
    match role {
        engine::MemberRole::Member => MemberRole::Member,
        engine::MemberRole::Manager => MemberRole::Manager,
    }
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<MembersResponse>, ServerError> {
    let members = state
        .engine
        .members_of_group(group_id, &user.username)
        .await?
        .into_iter()
        .map(|member| MemberView {
            username: member.user_id,
            role: role_view(member.role),
            total_expense_minor: member.total_expense_minor,
        })
        .collect();

    Ok(Json(MembersResponse { members }))
}

pub async fn add(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<MemberAdd>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .add_member(group_id, &payload.username, &user.username)
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path((group_id, username)): Path<(Uuid, String)>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .remove_member(group_id, &username, &user.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
