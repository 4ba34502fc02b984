//! Group memberships.
//!
//! A member is the (user, group) join row carrying the user's role in the
//! group and their cached total of approved spend. Exactly one row exists
//! per (user, group) pair; the group creator is inserted as `manager` in the
//! same transaction that creates the group.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Manager,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Manager => "manager",
        }
    }

    /// Managers decide expense status; members only log their own spend.
    pub fn can_approve(self) -> bool {
        matches!(self, Self::Manager)
    }
}

impl TryFrom<&str> for MemberRole {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "member" => Ok(Self::Member),
            "manager" => Ok(Self::Manager),
            other => Err(EngineError::InvalidRole(format!(
                "invalid member role: {other}"
            ))),
        }
    }
}

/// A membership snapshot as seen by callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub group_id: Uuid,
    pub role: MemberRole,
    pub total_expense_minor: i64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: String,
    pub role: String,
    pub total_expense_minor: i64,
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
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Username",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Member> for ActiveModel {
    fn from(member: &Member) -> Self {
        Self {
            user_id: ActiveValue::Set(member.user_id.clone()),
            group_id: ActiveValue::Set(member.group_id.to_string()),
            role: ActiveValue::Set(member.role.as_str().to_string()),
            total_expense_minor: ActiveValue::Set(member.total_expense_minor),
        }
    }
}

impl TryFrom<Model> for Member {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: model.user_id,
            group_id: Uuid::parse_str(&model.group_id)
                .map_err(|_| EngineError::KeyNotFound("group not exists".to_string()))?,
            role: MemberRole::try_from(model.role.as_str())?,
            total_expense_minor: model.total_expense_minor,
        })
    }
}
