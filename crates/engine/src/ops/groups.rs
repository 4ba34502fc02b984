use chrono::Utc;
use uuid::Uuid;

use sea_orm::{JoinType, QueryFilter, QuerySelect, TransactionTrait, prelude::*};

use crate::{EngineError, Group, Member, MemberRole, ResultEngine, groups, members};

use super::{Engine, normalize_required_name, with_tx};

impl Engine {
    /// Creates a group and enrolls the creator as its manager, atomically.
    pub async fn new_group(&self, name: &str, creator_id: &str) -> ResultEngine<Uuid> {
        let name = normalize_required_name(name, "group")?;
        with_tx!(self, |db_tx| {
            self.require_user_exists(&db_tx, creator_id).await?;

            let group = Group::new(name, Utc::now());
            groups::ActiveModel::from(&group).insert(&db_tx).await?;

            let creator = Member {
                user_id: creator_id.to_string(),
                group_id: group.id,
                role: MemberRole::Manager,
                total_expense_minor: 0,
            };
            members::ActiveModel::from(&creator).insert(&db_tx).await?;

            Ok(group.id)
        })
    }

    /// Returns a group snapshot with its aggregates. Members only.
    pub async fn group(&self, group_id: Uuid, user_id: &str) -> ResultEngine<Group> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            let model = self.require_group(&db_tx, &group_id).await?;
            self.require_actor_role(&db_tx, &group_id, user_id).await?;
            Group::try_from(model)
        })
    }

    /// Lists the groups the user belongs to.
    pub async fn groups_by_user(&self, user_id: &str) -> ResultEngine<Vec<Group>> {
        let models: Vec<groups::Model> = groups::Entity::find()
            .join(JoinType::InnerJoin, groups::Relation::Members.def())
            .filter(members::Column::UserId.eq(user_id.to_string()))
            .all(&self.database)
            .await?;

        models.into_iter().map(Group::try_from).collect()
    }

    /// Deletes a group and, via cascade, its members and expenses. Manager
    /// only.
    pub async fn delete_group(&self, group_id: Uuid, user_id: &str) -> ResultEngine<()> {
        let group_id = group_id.to_string();
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, &group_id).await?;
            let role = self.require_actor_role(&db_tx, &group_id, user_id).await?;
            if !role.can_approve() {
                return Err(EngineError::Forbidden(
                    "only a manager can delete the group".to_string(),
                ));
            }

            groups::Entity::delete_by_id(group_id.clone())
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }
}
