//! Expense endpoints.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use api_types::expense::{
    ExpenseCreated, ExpenseNew, ExpenseStatus, ExpenseUpdate, ExpenseView, ExpensesResponse,
};

use crate::{ServerError, server::ServerState, user};

fn status_view(status: engine::ExpenseStatus) -> ExpenseStatus {
    match status {
        engine::ExpenseStatus::Pending => ExpenseStatus::Pending,
        engine::ExpenseStatus::Approved => ExpenseStatus::Approved,
        engine::ExpenseStatus::Denied => ExpenseStatus::Denied,
    }
}

fn status_from_view(status: ExpenseStatus) -> engine::ExpenseStatus {
    match status {
        ExpenseStatus::Pending => engine::ExpenseStatus::Pending,
        ExpenseStatus::Approved => engine::ExpenseStatus::Approved,
        ExpenseStatus::Denied => engine::ExpenseStatus::Denied,
    }
}

fn view(expense: engine::Expense) -> ExpenseView {
    ExpenseView {
        id: expense.id,
        group_id: expense.group_id,
        member: expense.member_user_id,
        title: expense.title,
        note: expense.note,
        amount_minor: expense.amount_minor,
        status: status_view(expense.status),
        occurred_at: expense.occurred_at.fixed_offset(),
    }
}

pub async fn create(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<ExpenseNew>,
) -> Result<(StatusCode, Json<ExpenseCreated>), ServerError> {
    let member = payload.member.as_deref().unwrap_or(&user.username);
    let occurred_at = payload
        .occurred_at
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    // `payload.status` is deliberately ignored: the initial status comes
    // from the actor's role.
    let id = state
        .engine
        .create_expense(
            group_id,
            member,
            &payload.title,
            payload.note.as_deref(),
            payload.amount_minor,
            &user.username,
            occurred_at,
        )
        .await?;

    let expense = state.engine.expense(id, &user.username).await?;
    Ok((
        StatusCode::CREATED,
        Json(ExpenseCreated {
            id,
            status: status_view(expense.status),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    member: Option<String>,
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<Json<ExpensesResponse>, ServerError> {
    let expenses = match params.member {
        Some(member) => {
            state
                .engine
                .expenses_by_member(group_id, &member, &user.username)
                .await?
        }
        None => state.engine.expenses_by_group(group_id, &user.username).await?,
    };

    Ok(Json(ExpensesResponse {
        expenses: expenses.into_iter().map(view).collect(),
    }))
}

pub async fn get(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExpenseView>, ServerError> {
    let expense = state.engine.expense(id, &user.username).await?;
    Ok(Json(view(expense)))
}

pub async fn update(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExpenseUpdate>,
) -> Result<Json<ExpenseView>, ServerError> {
    let changes = engine::ExpenseUpdate {
        title: payload.title,
        note: payload.note,
        amount_minor: payload.amount_minor,
        status: payload.status.map(status_from_view),
        occurred_at: payload.occurred_at.map(|at| at.with_timezone(&Utc)),
    };

    let expense = state.engine.update_expense(id, changes, &user.username).await?;
    Ok(Json(view(expense)))
}

pub async fn remove(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_expense(id, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}
