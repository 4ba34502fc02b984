//! Membership and role lookups shared by the expense and group operations.
//!
//! All helpers run against an open transaction so the role a decision is
//! based on and the rows it writes live in the same isolation scope.

use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*};

use crate::{EngineError, MemberRole, ResultEngine, groups, members, users};

use super::Engine;

impl Engine {
    pub(super) async fn find_group(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<Option<groups::Model>> {
        groups::Entity::find_by_id(group_id.to_string())
            .one(db)
            .await
            .map_err(Into::into)
    }

    pub(super) async fn require_group(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<groups::Model> {
        self.find_group(db, group_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("group not exists".to_string()))
    }

    /// Role of `user_id` in the group, `None` when they are not a member.
    pub(super) async fn member_role(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<Option<MemberRole>> {
        let row = members::Entity::find_by_id((user_id.to_string(), group_id.to_string()))
            .one(db)
            .await?;
        row.as_ref()
            .map(|m| MemberRole::try_from(m.role.as_str()))
            .transpose()
    }

    /// The actor's role, or `Forbidden` when they are not in the group.
    pub(super) async fn require_actor_role(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<MemberRole> {
        self.member_role(db, group_id, user_id)
            .await?
            .ok_or_else(|| EngineError::Forbidden("not a member of this group".to_string()))
    }

    pub(super) async fn member_exists(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<bool> {
        members::Entity::find_by_id((user_id.to_string(), group_id.to_string()))
            .one(db)
            .await
            .map(|model| model.is_some())
            .map_err(Into::into)
    }

    pub(super) async fn require_user_exists(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<()> {
        let exists = users::Entity::find_by_id(username.to_string())
            .one(db)
            .await?
            .is_some();
        if !exists {
            return Err(EngineError::KeyNotFound("user not exists".to_string()));
        }
        Ok(())
    }

    /// Number of managers in the group. A group must never drop to zero.
    pub(super) async fn manager_count(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
    ) -> ResultEngine<u64> {
        members::Entity::find()
            .filter(members::Column::GroupId.eq(group_id.to_string()))
            .filter(members::Column::Role.eq(MemberRole::Manager.as_str()))
            .count(db)
            .await
            .map_err(Into::into)
    }
}
