//! Expense rows and their status vocabulary.
//!
//! Only `approved` expenses contribute to member/group aggregates; the
//! status is decided by the approval workflow in `ops::expenses`, never
//! taken verbatim from a caller.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Denied,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl TryFrom<&str> for ExpenseStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            other => Err(EngineError::InvalidStatus(format!(
                "invalid status, must be 'pending', 'approved' or 'denied', got '{other}'"
            ))),
        }
    }
}

/// An expense snapshot as seen by callers. Amounts are integer minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    /// The member whose spend this counts toward (their user id).
    pub member_user_id: String,
    pub title: String,
    pub note: Option<String>,
    pub amount_minor: i64,
    pub status: ExpenseStatus,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_id: Uuid,
        member_user_id: String,
        title: String,
        note: Option<String>,
        amount_minor: i64,
        status: ExpenseStatus,
        occurred_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if title.trim().is_empty() {
            return Err(EngineError::InvalidName(
                "title cannot be empty".to_string(),
            ));
        }
        if amount_minor < 0 {
            return Err(EngineError::InvalidAmount(
                "amount must be equal or greater than 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            group_id,
            member_user_id,
            title,
            note,
            amount_minor,
            status,
            occurred_at,
            created_at,
            updated_at: created_at,
        })
    }
}

/// Caller-supplied changes for an expense update. `None` leaves the field
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct ExpenseUpdate {
    pub title: Option<String>,
    pub note: Option<Option<String>>,
    pub amount_minor: Option<i64>,
    pub status: Option<ExpenseStatus>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub member_user_id: String,
    pub title: String,
    pub note: Option<String>,
    pub amount_minor: i64,
    pub status: String,
    pub occurred_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.to_string()),
            member_user_id: ActiveValue::Set(expense.member_user_id.clone()),
            title: ActiveValue::Set(expense.title.clone()),
            note: ActiveValue::Set(expense.note.clone()),
            amount_minor: ActiveValue::Set(expense.amount_minor),
            status: ActiveValue::Set(expense.status.as_str().to_string()),
            occurred_at: ActiveValue::Set(expense.occurred_at),
            created_at: ActiveValue::Set(expense.created_at),
            updated_at: ActiveValue::Set(expense.updated_at),
        }
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("expense not exists".to_string()))?,
            group_id: Uuid::parse_str(&model.group_id)
                .map_err(|_| EngineError::KeyNotFound("group not exists".to_string()))?,
            member_user_id: model.member_user_id,
            title: model.title,
            note: model.note,
            amount_minor: model.amount_minor,
            status: ExpenseStatus::try_from(model.status.as_str())?,
            occurred_at: model.occurred_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ExpenseStatus::Pending,
            ExpenseStatus::Approved,
            ExpenseStatus::Denied,
        ] {
            assert_eq!(ExpenseStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(ExpenseStatus::try_from("accepted").is_err());
    }

    #[test]
    fn new_rejects_negative_amount() {
        let err = Expense::new(
            Uuid::new_v4(),
            "alice".to_string(),
            "Lunch".to_string(),
            None,
            -1,
            ExpenseStatus::Pending,
            chrono::Utc::now(),
            chrono::Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidAmount("amount must be equal or greater than 0".to_string())
        );
    }

    #[test]
    fn new_rejects_empty_title() {
        let err = Expense::new(
            Uuid::new_v4(),
            "alice".to_string(),
            "  ".to_string(),
            None,
            100,
            ExpenseStatus::Pending,
            chrono::Utc::now(),
            chrono::Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidName("title cannot be empty".to_string())
        );
    }
}
