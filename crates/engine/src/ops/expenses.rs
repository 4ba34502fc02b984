//! Expense operations: the approval workflow plus the aggregate triggers.
//!
//! Status is decided here from the actor's role, never taken from the
//! caller. Every mutation that can change which expenses count as approved
//! runs its row write and the aggregate refresh in one transaction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    EngineError, Expense, ExpenseStatus, ExpenseUpdate, ResultEngine, expenses,
};

use super::{Engine, normalize_optional_text, normalize_required_name, with_tx};

impl Engine {
    /// Logs an expense for `member_user_id` in the group.
    ///
    /// A `member` actor may only log their own spend and the expense starts
    /// `pending` no matter what the request carried. A `manager` actor's
    /// expense starts `approved`; when targeting someone else, that target
    /// must be a member of the group.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_expense(
        &self,
        group_id: Uuid,
        member_user_id: &str,
        title: &str,
        note: Option<&str>,
        amount_minor: i64,
        user_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<Uuid> {
        let title = normalize_required_name(title, "expense")?;
        let note = normalize_optional_text(note);
        let group_uuid = group_id;
        let group_id = group_id.to_string();

        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            let role = self.require_actor_role(&db_tx, &group_id, user_id).await?;

            let status = if role.can_approve() {
                if member_user_id != user_id
                    && !self.member_exists(&db_tx, &group_id, member_user_id).await?
                {
                    return Err(EngineError::KeyNotFound(
                        "not a member of the group".to_string(),
                    ));
                }
                ExpenseStatus::Approved
            } else {
                if member_user_id != user_id {
                    return Err(EngineError::Forbidden(
                        "a member cannot log an expense for someone else".to_string(),
                    ));
                }
                ExpenseStatus::Pending
            };

            let now = Utc::now();
            let expense = Expense::new(
                group_uuid,
                member_user_id.to_string(),
                title,
                note,
                amount_minor,
                status,
                occurred_at,
                now,
            )?;
            expenses::ActiveModel::from(&expense).insert(&db_tx).await?;

            // A pending create cannot change the approved set, but the
            // refresh is idempotent and cheaper than branching here.
            self.refresh_aggregates(&db_tx, &group_id, member_user_id)
                .await?;

            Ok(expense.id)
        })
    }

    /// Applies caller-supplied changes to an expense.
    ///
    /// Any group member may edit amount, title, note or occurred time; only
    /// a manager may move the status. Aggregates refresh when the amount
    /// changed or the status crossed the `approved` boundary.
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        changes: ExpenseUpdate,
        user_id: &str,
    ) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let model = expenses::Entity::find_by_id(expense_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;

            let group_id = model.group_id.clone();
            let role = self.require_actor_role(&db_tx, &group_id, user_id).await?;

            let old_status = ExpenseStatus::try_from(model.status.as_str())?;
            let new_status = changes.status.unwrap_or(old_status);
            if new_status != old_status && !role.can_approve() {
                return Err(EngineError::Forbidden(
                    "only a manager can change expense status".to_string(),
                ));
            }

            let amount_changed = changes
                .amount_minor
                .is_some_and(|amount| amount != model.amount_minor);
            let approved_crossed = old_status.is_approved() != new_status.is_approved();

            let mut active = expenses::ActiveModel {
                id: ActiveValue::Set(model.id.clone()),
                status: ActiveValue::Set(new_status.as_str().to_string()),
                updated_at: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            if let Some(amount) = changes.amount_minor {
                if amount < 0 {
                    return Err(EngineError::InvalidAmount(
                        "amount must be equal or greater than 0".to_string(),
                    ));
                }
                active.amount_minor = ActiveValue::Set(amount);
            }
            if let Some(title) = changes.title {
                active.title = ActiveValue::Set(normalize_required_name(&title, "expense")?);
            }
            if let Some(note) = changes.note {
                active.note = ActiveValue::Set(normalize_optional_text(note.as_deref()));
            }
            if let Some(occurred_at) = changes.occurred_at {
                active.occurred_at = ActiveValue::Set(occurred_at);
            }

            let updated = active.update(&db_tx).await?;

            if amount_changed || approved_crossed {
                self.refresh_aggregates(&db_tx, &group_id, &model.member_user_id)
                    .await?;
            }

            Expense::try_from(updated)
        })
    }

    /// Deletes an expense. The owning member or any manager may delete.
    ///
    /// Aggregates refresh only when the deleted expense was `approved`;
    /// removing a pending or denied row cannot change the approved set.
    pub async fn delete_expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let model = expenses::Entity::find_by_id(expense_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;

            let group_id = model.group_id.clone();
            let role = self.require_actor_role(&db_tx, &group_id, user_id).await?;
            if model.member_user_id != user_id && !role.can_approve() {
                return Err(EngineError::Forbidden(
                    "only a manager can delete another member's expense".to_string(),
                ));
            }

            let was_approved = ExpenseStatus::try_from(model.status.as_str())?.is_approved();

            expenses::Entity::delete_by_id(model.id.clone())
                .exec(&db_tx)
                .await?;

            if was_approved {
                self.refresh_aggregates(&db_tx, &group_id, &model.member_user_id)
                    .await?;
            }

            Ok(())
        })
    }

    /// Returns one expense. Members of its group only.
    pub async fn expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let model = expenses::Entity::find_by_id(expense_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;

            self.require_actor_role(&db_tx, &model.group_id, user_id)
                .await?;
            Expense::try_from(model)
        })
    }

    /// Lists a group's expenses, newest first. Members only.
    pub async fn expenses_by_group(
        &self,
        group_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<Vec<Expense>> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            self.require_actor_role(&db_tx, &group_id, user_id).await?;

            let rows = expenses::Entity::find()
                .filter(expenses::Column::GroupId.eq(group_id.clone()))
                .order_by_desc(expenses::Column::OccurredAt)
                .all(&db_tx)
                .await?;
            rows.into_iter().map(Expense::try_from).collect()
        })
    }

    /// Lists one member's expenses within a group. Members only.
    pub async fn expenses_by_member(
        &self,
        group_id: Uuid,
        member_user_id: &str,
        user_id: &str,
    ) -> ResultEngine<Vec<Expense>> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            self.require_actor_role(&db_tx, &group_id, user_id).await?;

            let rows = expenses::Entity::find()
                .filter(expenses::Column::GroupId.eq(group_id.clone()))
                .filter(expenses::Column::MemberUserId.eq(member_user_id.to_string()))
                .order_by_desc(expenses::Column::OccurredAt)
                .all(&db_tx)
                .await?;
            rows.into_iter().map(Expense::try_from).collect()
        })
    }
}
