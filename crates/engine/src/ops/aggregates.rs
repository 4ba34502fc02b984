//! Aggregate maintenance for member and group totals.
//!
//! Every expense mutation that can change the approved set calls
//! [`Engine::refresh_aggregates`] inside its own open transaction. The
//! refresh always derives the totals from a server-side `SUM`/`COUNT` over
//! the current `approved` rows, so it is idempotent and independent of the
//! order in which concurrent transactions commit.

use sea_orm::{ConnectionTrait, DatabaseTransaction, Statement, Value};

use crate::ResultEngine;

use super::Engine;

impl Engine {
    /// Recomputes the affected member total and the group total/average from
    /// the approved expenses, inside the caller's transaction.
    pub(super) async fn refresh_aggregates(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        member_user_id: &str,
    ) -> ResultEngine<()> {
        let backend = db.get_database_backend();

        let member_stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE members SET total_expense_minor = (\
                 SELECT COALESCE(SUM(amount_minor), 0) FROM expenses \
                 WHERE member_user_id = ? AND group_id = ? AND status = 'approved'\
             ) WHERE user_id = ? AND group_id = ?",
            vec![
                Value::from(member_user_id),
                Value::from(group_id),
                Value::from(member_user_id),
                Value::from(group_id),
            ],
        );
        db.execute(member_stmt).await?;

        let group_total_stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE groups SET total_expense_minor = (\
                 SELECT COALESCE(SUM(amount_minor), 0) FROM expenses \
                 WHERE group_id = ? AND status = 'approved'\
             ) WHERE id = ?",
            vec![Value::from(group_id), Value::from(group_id)],
        );
        db.execute(group_total_stmt).await?;

        // Integer division; COALESCE covers the empty approved set where
        // SUM/COUNT yields NULL.
        let group_average_stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE groups SET average_expense_minor = COALESCE((\
                 SELECT SUM(amount_minor) / COUNT(*) FROM expenses \
                 WHERE group_id = ? AND status = 'approved'\
             ), 0) WHERE id = ?",
            vec![Value::from(group_id), Value::from(group_id)],
        );
        db.execute(group_average_stmt).await?;

        Ok(())
    }
}
