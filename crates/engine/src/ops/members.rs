use uuid::Uuid;

use sea_orm::{QueryFilter, TransactionTrait, prelude::*};

use crate::{EngineError, Member, MemberRole, ResultEngine, expenses, members};

use super::{Engine, with_tx};

impl Engine {
    /// Adds a user to a group with the default `member` role. The actor must
    /// already belong to the group.
    pub async fn add_member(
        &self,
        group_id: Uuid,
        username: &str,
        user_id: &str,
    ) -> ResultEngine<()> {
        let group_uuid = group_id;
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            self.require_actor_role(&db_tx, &group_id, user_id).await?;
            self.require_user_exists(&db_tx, username).await?;

            if self.member_exists(&db_tx, &group_id, username).await? {
                return Err(EngineError::ExistingKey(username.to_string()));
            }

            let member = Member {
                user_id: username.to_string(),
                group_id: group_uuid,
                role: MemberRole::Member,
                total_expense_minor: 0,
            };
            members::ActiveModel::from(&member).insert(&db_tx).await?;
            Ok(())
        })
    }

    /// Removes a member from a group, along with their expenses in it.
    ///
    /// Managers may remove anyone; a member may only remove themselves.
    /// Removing the last manager is rejected so the group never ends up
    /// unmanaged. Every expense must reference a current member, so the
    /// removed member's expense rows go with them and the group aggregates
    /// are recomputed in the same transaction.
    pub async fn remove_member(
        &self,
        group_id: Uuid,
        username: &str,
        user_id: &str,
    ) -> ResultEngine<()> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            let actor_role = self.require_actor_role(&db_tx, &group_id, user_id).await?;
            if username != user_id && !actor_role.can_approve() {
                return Err(EngineError::Forbidden(
                    "only a manager can remove other members".to_string(),
                ));
            }

            let target_role = self
                .member_role(&db_tx, &group_id, username)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("member not exists".to_string()))?;

            if target_role == MemberRole::Manager && self.manager_count(&db_tx, &group_id).await? <= 1
            {
                return Err(EngineError::Forbidden(
                    "cannot remove the last manager of the group".to_string(),
                ));
            }

            let removed = expenses::Entity::delete_many()
                .filter(expenses::Column::GroupId.eq(group_id.clone()))
                .filter(expenses::Column::MemberUserId.eq(username.to_string()))
                .exec(&db_tx)
                .await?;

            members::Entity::delete_by_id((username.to_string(), group_id.clone()))
                .exec(&db_tx)
                .await?;

            if removed.rows_affected > 0 {
                self.refresh_aggregates(&db_tx, &group_id, username).await?;
            }
            Ok(())
        })
    }

    /// Lists the members of a group, with roles and cached totals. Members
    /// only.
    pub async fn members_of_group(&self, group_id: Uuid, user_id: &str) -> ResultEngine<Vec<Member>> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            self.require_actor_role(&db_tx, &group_id, user_id).await?;

            let rows = members::Entity::find()
                .filter(members::Column::GroupId.eq(group_id.clone()))
                .all(&db_tx)
                .await?;
            rows.into_iter().map(Member::try_from).collect()
        })
    }

    /// Returns one membership row (role and cached total). Members only.
    pub async fn member(
        &self,
        group_id: Uuid,
        username: &str,
        user_id: &str,
    ) -> ResultEngine<Member> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            self.require_actor_role(&db_tx, &group_id, user_id).await?;

            let model = members::Entity::find_by_id((username.to_string(), group_id.clone()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("member not exists".to_string()))?;
            Member::try_from(model)
        })
    }
}
