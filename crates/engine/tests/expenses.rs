use chrono::Utc;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use engine::{Engine, EngineError, ExpenseStatus, ExpenseUpdate};
use migration::MigratorTrait;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let backend = db.get_database_backend();
    for username in ["alice", "bob", "carol"] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username, password) VALUES (?, ?)",
            vec![username.into(), "password".into()],
        ))
        .await
        .unwrap();
    }
    let engine = Engine::builder().database(db.clone()).build();
    (engine, db)
}

/// Group with alice as manager and bob as plain member.
async fn group_with_members(engine: &Engine) -> Uuid {
    let group_id = engine.new_group("Trip", "alice").await.unwrap();
    engine.add_member(group_id, "bob", "alice").await.unwrap();
    group_id
}

async fn group_totals(engine: &Engine, group_id: Uuid, user: &str) -> (i64, i64) {
    let group = engine.group(group_id, user).await.unwrap();
    (group.total_expense_minor, group.average_expense_minor)
}

async fn member_total(engine: &Engine, group_id: Uuid, username: &str) -> i64 {
    engine
        .member(group_id, username, "alice")
        .await
        .unwrap()
        .total_expense_minor
}

#[tokio::test]
async fn manager_expense_is_approved_and_counted() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let id = engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();

    let expense = engine.expense(id, "alice").await.unwrap();
    assert_eq!(expense.status, ExpenseStatus::Approved);

    assert_eq!(group_totals(&engine, group_id, "alice").await, (10_000, 10_000));
    assert_eq!(member_total(&engine, group_id, "alice").await, 10_000);
}

#[tokio::test]
async fn member_expense_is_pending_and_not_counted() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();
    let id = engine
        .create_expense(group_id, "bob", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap();

    let expense = engine.expense(id, "bob").await.unwrap();
    assert_eq!(expense.status, ExpenseStatus::Pending);

    // Pending spend must not move any aggregate.
    assert_eq!(group_totals(&engine, group_id, "alice").await, (10_000, 10_000));
    assert_eq!(member_total(&engine, group_id, "bob").await, 0);
}

#[tokio::test]
async fn approval_recomputes_group_and_member_totals() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();
    let pending = engine
        .create_expense(group_id, "bob", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap();

    let changes = ExpenseUpdate {
        status: Some(ExpenseStatus::Approved),
        ..Default::default()
    };
    engine.update_expense(pending, changes, "alice").await.unwrap();

    assert_eq!(group_totals(&engine, group_id, "alice").await, (15_000, 7_500));
    assert_eq!(member_total(&engine, group_id, "alice").await, 10_000);
    assert_eq!(member_total(&engine, group_id, "bob").await, 5_000);
}

#[tokio::test]
async fn member_cannot_change_status() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let pending = engine
        .create_expense(group_id, "bob", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap();

    let changes = ExpenseUpdate {
        status: Some(ExpenseStatus::Approved),
        ..Default::default()
    };
    let err = engine.update_expense(pending, changes, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    assert_eq!(group_totals(&engine, group_id, "alice").await, (0, 0));
}

#[tokio::test]
async fn member_cannot_log_for_someone_else() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let err = engine
        .create_expense(group_id, "alice", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn manager_cannot_log_for_a_non_member() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let err = engine
        .create_expense(group_id, "carol", "Dinner", None, 5_000, "alice", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    // The rejected write must leave no row and no aggregate movement.
    let expenses = engine.expenses_by_group(group_id, "alice").await.unwrap();
    assert!(expenses.is_empty());
    assert_eq!(group_totals(&engine, group_id, "alice").await, (0, 0));
}

#[tokio::test]
async fn non_member_cannot_touch_the_group() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let err = engine
        .create_expense(group_id, "carol", "Dinner", None, 5_000, "carol", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine.expenses_by_group(group_id, "carol").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn deleting_an_approved_expense_recomputes_aggregates() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    engine
        .create_expense(group_id, "alice", "Hotel", None, 12_000, "alice", Utc::now())
        .await
        .unwrap();
    let doomed = engine
        .create_expense(group_id, "alice", "Taxi", None, 3_000, "alice", Utc::now())
        .await
        .unwrap();
    assert_eq!(group_totals(&engine, group_id, "alice").await, (15_000, 7_500));

    engine.delete_expense(doomed, "alice").await.unwrap();

    assert_eq!(group_totals(&engine, group_id, "alice").await, (12_000, 12_000));
    assert_eq!(member_total(&engine, group_id, "alice").await, 12_000);
}

#[tokio::test]
async fn deleting_a_pending_expense_leaves_aggregates_alone() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();
    let pending = engine
        .create_expense(group_id, "bob", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap();

    engine.delete_expense(pending, "bob").await.unwrap();

    assert_eq!(group_totals(&engine, group_id, "alice").await, (10_000, 10_000));
}

#[tokio::test]
async fn amount_change_on_an_approved_expense_recomputes() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let id = engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();

    let changes = ExpenseUpdate {
        amount_minor: Some(8_000),
        ..Default::default()
    };
    engine.update_expense(id, changes, "alice").await.unwrap();

    assert_eq!(group_totals(&engine, group_id, "alice").await, (8_000, 8_000));
    assert_eq!(member_total(&engine, group_id, "alice").await, 8_000);
}

#[tokio::test]
async fn denying_an_approved_expense_uncounts_it() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let id = engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();

    let changes = ExpenseUpdate {
        status: Some(ExpenseStatus::Denied),
        ..Default::default()
    };
    engine.update_expense(id, changes, "alice").await.unwrap();

    assert_eq!(group_totals(&engine, group_id, "alice").await, (0, 0));
    assert_eq!(member_total(&engine, group_id, "alice").await, 0);
}

#[tokio::test]
async fn average_uses_integer_division() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    for amount in [1_000, 1_000, 1_001] {
        engine
            .create_expense(group_id, "alice", "Snack", None, amount, "alice", Utc::now())
            .await
            .unwrap();
    }

    // 3001 / 3 truncates.
    assert_eq!(group_totals(&engine, group_id, "alice").await, (3_001, 1_000));
}

#[tokio::test]
async fn member_can_delete_only_their_own_expense() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let alices = engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();

    let err = engine.delete_expense(alices, "bob").await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // A manager may delete anyone's.
    let bobs = engine
        .create_expense(group_id, "bob", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap();
    engine.delete_expense(bobs, "alice").await.unwrap();
}

#[tokio::test]
async fn negative_amount_is_rejected_before_any_write() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    let err = engine
        .create_expense(group_id, "alice", "Hotel", None, -1, "alice", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    assert!(engine.expenses_by_group(group_id, "alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn expense_lists_filter_by_member() {
    let (engine, _db) = engine_with_db().await;
    let group_id = group_with_members(&engine).await;

    engine
        .create_expense(group_id, "alice", "Hotel", None, 10_000, "alice", Utc::now())
        .await
        .unwrap();
    engine
        .create_expense(group_id, "bob", "Dinner", None, 5_000, "bob", Utc::now())
        .await
        .unwrap();

    let all = engine.expenses_by_group(group_id, "bob").await.unwrap();
    assert_eq!(all.len(), 2);

    let bobs = engine.expenses_by_member(group_id, "bob", "alice").await.unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].member_user_id, "bob");
}
