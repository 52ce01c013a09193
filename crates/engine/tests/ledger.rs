use std::collections::HashSet;

use chrono::Utc;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use engine::{
    Engine, EngineError, ExpenseCmd, GroupBalances, MoneyCents, PaymentCmd, ShareInput,
    SplitMethod, UpdateExpenseCmd, UpdatePaymentCmd,
};
use migration::MigratorTrait;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

async fn engine_with_file_db() -> (Engine, DatabaseConnection, String, std::path::PathBuf) {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!("ledger_{}.db", Uuid::new_v4()));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();

    (engine, db, url, path)
}

/// Register `members` and open a group containing all of them.
async fn group_of(engine: &Engine, name: &str, members: &[&str]) -> String {
    for user in members {
        engine.register_user(user).await.unwrap();
    }
    engine.new_group(name, members).await.unwrap().id
}

fn net_amounts(balances: &GroupBalances) -> Vec<(&str, i64)> {
    balances
        .net_by_user
        .iter()
        .map(|row| (row.user_id.as_str(), row.amount.cents()))
        .collect()
}

fn pairwise_amounts(balances: &GroupBalances) -> Vec<(&str, &str, i64)> {
    balances
        .pairwise
        .iter()
        .map(|row| {
            (
                row.from_user_id.as_str(),
                row.to_user_id.as_str(),
                row.amount.cents(),
            )
        })
        .collect()
}

/// Check the ledger invariants on a group's cached balances and return the
/// snapshot: nets sum to zero, every net matches its signed pairwise rows,
/// pairwise rows are positive and unique per user pair.
async fn assert_group_invariants(engine: &Engine, group_id: &str) -> GroupBalances {
    let balances = engine.get_group_balances(group_id).await.unwrap();

    let sum: i64 = balances
        .net_by_user
        .iter()
        .map(|row| row.amount.cents())
        .sum();
    assert_eq!(sum, 0, "net balances of group {group_id} must sum to zero");

    let mut pairs = HashSet::new();
    for row in &balances.pairwise {
        assert!(row.amount.is_positive(), "pairwise rows must be positive");
        let key = if row.from_user_id < row.to_user_id {
            (row.from_user_id.clone(), row.to_user_id.clone())
        } else {
            (row.to_user_id.clone(), row.from_user_id.clone())
        };
        assert!(pairs.insert(key), "at most one row per user pair");
    }

    for net in &balances.net_by_user {
        let mut signed = 0i64;
        for pair in &balances.pairwise {
            if pair.to_user_id == net.user_id {
                signed += pair.amount.cents();
            }
            if pair.from_user_id == net.user_id {
                signed -= pair.amount.cents();
            }
        }
        assert_eq!(
            net.amount.cents(),
            signed,
            "net balance of {} must equal its signed pairwise rows",
            net.user_id
        );
    }

    balances
}

#[tokio::test]
async fn equal_split_expense_produces_expected_balances() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob", "carol"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(3000),
            SplitMethod::Equal,
            vec![
                ShareInput::even("alice"),
                ShareInput::even("bob"),
                ShareInput::even("carol"),
            ],
        ))
        .await
        .unwrap();

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(
        net_amounts(&balances),
        vec![("alice", 2000), ("bob", -1000), ("carol", -1000)]
    );
    assert_eq!(
        pairwise_amounts(&balances),
        vec![("bob", "alice", 1000), ("carol", "alice", 1000)]
    );
}

#[tokio::test]
async fn payment_settles_one_pair_and_drops_its_row() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob", "carol"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(3000),
            SplitMethod::Equal,
            vec![
                ShareInput::even("alice"),
                ShareInput::even("bob"),
                ShareInput::even("carol"),
            ],
        ))
        .await
        .unwrap();
    engine
        .record_payment(PaymentCmd::new(
            &group,
            "bob",
            "alice",
            MoneyCents::new(1000),
        ))
        .await
        .unwrap();

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(
        net_amounts(&balances),
        vec![("alice", 1000), ("bob", 0), ("carol", -1000)]
    );
    assert_eq!(pairwise_amounts(&balances), vec![("carol", "alice", 1000)]);
}

#[tokio::test]
async fn unequal_split_keeps_explicit_amounts() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Dinner", &["alice", "bob"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(10_000),
            SplitMethod::Unequal,
            vec![
                ShareInput::fixed("alice", MoneyCents::new(7000)),
                ShareInput::fixed("bob", MoneyCents::new(3000)),
            ],
        ))
        .await
        .unwrap();

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(net_amounts(&balances), vec![("alice", 3000), ("bob", -3000)]);
    assert_eq!(pairwise_amounts(&balances), vec![("bob", "alice", 3000)]);
}

#[tokio::test]
async fn percentage_split_reconciles_the_leftover_cent() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Taxi", &["alice", "bob", "carol"]).await;

    let expense = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(1000),
            SplitMethod::Percentage,
            vec![
                ShareInput::percent_bps("alice", 3333),
                ShareInput::percent_bps("bob", 3333),
                ShareInput::percent_bps("carol", 3333),
            ],
        ))
        .await
        .unwrap();

    let shares: Vec<(&str, i64)> = expense
        .shares
        .iter()
        .map(|s| (s.user_id.as_str(), s.amount.cents()))
        .collect();
    assert_eq!(
        shares,
        vec![("alice", 334), ("bob", 333), ("carol", 333)]
    );
    let sum: i64 = expense.shares.iter().map(|s| s.amount.cents()).sum();
    assert_eq!(sum, expense.total_amount.cents());

    assert_group_invariants(&engine, &group).await;
}

#[tokio::test]
async fn remove_member_with_debt_fails_until_settled() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob", "carol"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(3000),
            SplitMethod::Equal,
            vec![
                ShareInput::even("alice"),
                ShareInput::even("bob"),
                ShareInput::even("carol"),
            ],
        ))
        .await
        .unwrap();

    assert!(!engine.can_remove_member(&group, "carol").await.unwrap());
    let err = engine.remove_member(&group, "carol").await.unwrap_err();
    assert_eq!(err, EngineError::OutstandingBalance(MoneyCents::new(1000)));

    // Settling the debt unblocks the removal.
    engine
        .record_payment(PaymentCmd::new(
            &group,
            "carol",
            "alice",
            MoneyCents::new(1000),
        ))
        .await
        .unwrap();
    assert!(engine.can_remove_member(&group, "carol").await.unwrap());
    engine.remove_member(&group, "carol").await.unwrap();

    let members = engine.list_members(&group).await.unwrap();
    let carol = members.iter().find(|m| m.user_id == "carol").unwrap();
    assert_eq!(carol.status, engine::MemberStatus::Archived);

    // The archived member keeps a zero net row.
    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(
        net_amounts(&balances),
        vec![("alice", 1000), ("bob", -1000), ("carol", 0)]
    );
}

#[tokio::test]
async fn every_mutation_preserves_the_invariants() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Flat", &["alice", "bob", "carol"]).await;
    assert_group_invariants(&engine, &group).await;

    let rent = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(90_000),
            SplitMethod::Equal,
            vec![
                ShareInput::even("alice"),
                ShareInput::even("bob"),
                ShareInput::even("carol"),
            ],
        ))
        .await
        .unwrap();
    assert_group_invariants(&engine, &group).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "bob",
            MoneyCents::new(4500),
            SplitMethod::Unequal,
            vec![
                ShareInput::fixed("bob", MoneyCents::new(1500)),
                ShareInput::fixed("carol", MoneyCents::new(3000)),
            ],
        ))
        .await
        .unwrap();
    assert_group_invariants(&engine, &group).await;

    let settle = engine
        .record_payment(PaymentCmd::new(
            &group,
            "carol",
            "alice",
            MoneyCents::new(20_000),
        ))
        .await
        .unwrap();
    assert_group_invariants(&engine, &group).await;

    engine
        .update_expense(UpdateExpenseCmd::new(rent.id).total_amount(MoneyCents::new(60_000)))
        .await
        .unwrap();
    assert_group_invariants(&engine, &group).await;

    engine
        .update_payment(UpdatePaymentCmd::new(settle.id).amount(MoneyCents::new(10_000)))
        .await
        .unwrap();
    assert_group_invariants(&engine, &group).await;

    engine.delete_expense(rent.id).await.unwrap();
    assert_group_invariants(&engine, &group).await;

    engine.delete_payment(settle.id).await.unwrap();
    assert_group_invariants(&engine, &group).await;
}

#[tokio::test]
async fn recompute_on_unchanged_facts_is_idempotent() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob", "carol"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(1000),
            SplitMethod::Percentage,
            vec![
                ShareInput::percent_bps("alice", 3333),
                ShareInput::percent_bps("bob", 3333),
                ShareInput::percent_bps("carol", 3333),
            ],
        ))
        .await
        .unwrap();
    engine
        .record_payment(PaymentCmd::new(&group, "bob", "alice", MoneyCents::new(100)))
        .await
        .unwrap();

    let before = engine.get_group_balances(&group).await.unwrap();
    engine.recompute_balances(&group).await.unwrap();
    let after = engine.get_group_balances(&group).await.unwrap();
    assert_eq!(before, after);

    engine.recompute_balances(&group).await.unwrap();
    assert_eq!(engine.get_group_balances(&group).await.unwrap(), after);
}

#[tokio::test]
async fn recompute_restores_a_tampered_cache() {
    let (engine, db) = engine_with_db().await;
    let backend = db.get_database_backend();
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();

    // Corrupt the derived rows directly in the DB.
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE net_balances SET amount_minor = ? WHERE group_id = ?;",
        vec![999i64.into(), group.clone().into()],
    ))
    .await
    .unwrap();
    db.execute(Statement::from_sql_and_values(
        backend,
        "DELETE FROM pairwise_balances WHERE group_id = ?;",
        vec![group.clone().into()],
    ))
    .await
    .unwrap();

    engine.recompute_balances(&group).await.unwrap();

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(net_amounts(&balances), vec![("alice", 1000), ("bob", -1000)]);
    assert_eq!(pairwise_amounts(&balances), vec![("bob", "alice", 1000)]);
}

#[tokio::test]
async fn corrupted_facts_refuse_recompute_and_leave_the_cache() {
    let (engine, db) = engine_with_db().await;
    let backend = db.get_database_backend();
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    let expense = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();
    let before = engine.get_group_balances(&group).await.unwrap();

    // Break one share so the expense no longer sums to its total.
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE expense_shares SET amount_minor = amount_minor + 100 \
         WHERE expense_id = ? AND user_id = ?;",
        vec![expense.id.to_string().into(), "bob".into()],
    ))
    .await
    .unwrap();

    let err = engine.recompute_balances(&group).await.unwrap_err();
    assert!(matches!(err, EngineError::LedgerCorruption(_)));

    // The failed recompute rolled back; the cache still holds the old rows.
    let after = engine.get_group_balances(&group).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn equal_expense_re_splits_when_only_the_total_changes() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob", "carol"]).await;

    let expense = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(3000),
            SplitMethod::Equal,
            vec![
                ShareInput::even("alice"),
                ShareInput::even("bob"),
                ShareInput::even("carol"),
            ],
        ))
        .await
        .unwrap();

    let updated = engine
        .update_expense(UpdateExpenseCmd::new(expense.id).total_amount(MoneyCents::new(1000)))
        .await
        .unwrap();

    let shares: Vec<i64> = updated.shares.iter().map(|s| s.amount.cents()).collect();
    assert_eq!(shares, vec![334, 333, 333]);

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(
        net_amounts(&balances),
        vec![("alice", 666), ("bob", -333), ("carol", -333)]
    );
}

#[tokio::test]
async fn unequal_expense_requires_fresh_inputs_when_the_total_changes() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Dinner", &["alice", "bob"]).await;

    let expense = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(10_000),
            SplitMethod::Unequal,
            vec![
                ShareInput::fixed("alice", MoneyCents::new(7000)),
                ShareInput::fixed("bob", MoneyCents::new(3000)),
            ],
        ))
        .await
        .unwrap();

    // The stored shares are never reverse-engineered into new inputs.
    let err = engine
        .update_expense(UpdateExpenseCmd::new(expense.id).total_amount(MoneyCents::new(12_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSplit(_)));

    let updated = engine
        .update_expense(
            UpdateExpenseCmd::new(expense.id)
                .total_amount(MoneyCents::new(12_000))
                .split(
                    SplitMethod::Unequal,
                    vec![
                        ShareInput::fixed("alice", MoneyCents::new(9000)),
                        ShareInput::fixed("bob", MoneyCents::new(3000)),
                    ],
                ),
        )
        .await
        .unwrap();
    assert_eq!(updated.total_amount, MoneyCents::new(12_000));

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(net_amounts(&balances), vec![("alice", 3000), ("bob", -3000)]);
}

#[tokio::test]
async fn voided_expenses_stop_counting_but_stay_listed() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    let kept = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();
    let voided = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "bob",
            MoneyCents::new(600),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();

    engine.delete_expense(voided.id).await.unwrap();

    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(net_amounts(&balances), vec![("alice", 1000), ("bob", -1000)]);

    let live = engine.list_expenses(&group, false).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, kept.id);

    let all = engine.list_expenses(&group, true).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|e| e.voided_at.is_some()));

    // A voided fact cannot be voided again or edited.
    let err = engine.delete_expense(voided.id).await.unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("expense not exists".to_string()));
    let err = engine
        .update_expense(UpdateExpenseCmd::new(voided.id).note("late edit"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("expense not exists".to_string()));
}

#[tokio::test]
async fn idempotency_keys_block_duplicates_until_voided() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    let cmd = || {
        ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        )
        .idempotency_key("receipt-42")
    };

    let first = engine.record_expense(cmd()).await.unwrap();
    let err = engine.record_expense(cmd()).await.unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("receipt-42".to_string()));

    // Voiding the fact frees its key.
    engine.delete_expense(first.id).await.unwrap();
    engine.record_expense(cmd()).await.unwrap();

    let pay = || {
        PaymentCmd::new(&group, "bob", "alice", MoneyCents::new(500))
            .idempotency_key("transfer-7")
    };
    engine.record_payment(pay()).await.unwrap();
    let err = engine.record_payment(pay()).await.unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("transfer-7".to_string()));
}

#[tokio::test]
async fn payments_reject_invalid_input_without_writing() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    let err = engine
        .record_payment(PaymentCmd::new(&group, "alice", "alice", MoneyCents::new(100)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidAmount("payer and payee must differ".to_string())
    );

    let err = engine
        .record_payment(PaymentCmd::new(&group, "alice", "bob", MoneyCents::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidAmount("amount must be > 0".to_string()));

    engine.register_user("mallory").await.unwrap();
    let err = engine
        .record_payment(PaymentCmd::new(&group, "mallory", "bob", MoneyCents::new(100)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidAmount("mallory is not an active member of the group".to_string())
    );

    assert!(engine.list_payments(&group, true).await.unwrap().is_empty());
    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(net_amounts(&balances), vec![("alice", 0), ("bob", 0)]);
}

#[tokio::test]
async fn expenses_reject_outsiders_without_writing() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;
    engine.register_user("mallory").await.unwrap();

    let err = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "mallory",
            MoneyCents::new(1000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidSplit("payer mallory is not an active member of the group".to_string())
    );

    let err = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(1000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("mallory")],
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidSplit(
            "participant mallory is not an active member of the group".to_string()
        )
    );

    let err = engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(1000),
            SplitMethod::Equal,
            vec![],
        ))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidSplit("participant set must not be empty".to_string())
    );

    assert!(engine.list_expenses(&group, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_group_requires_every_member_settled() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();

    let err = engine.delete_group(&group).await.unwrap_err();
    assert_eq!(err, EngineError::OutstandingBalance(MoneyCents::new(1000)));
    // The refused delete changed nothing.
    assert_group_invariants(&engine, &group).await;

    engine
        .record_payment(PaymentCmd::new(&group, "bob", "alice", MoneyCents::new(1000)))
        .await
        .unwrap();
    engine.delete_group(&group).await.unwrap();

    let err = engine.get_group_balances(&group).await.unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("group not exists".to_string()));
}

#[tokio::test]
async fn overall_balance_sums_the_users_groups() {
    let (engine, _db) = engine_with_db().await;
    for user in ["alice", "bob", "carol"] {
        engine.register_user(user).await.unwrap();
    }
    let trip = engine.new_group("Trip", &["alice", "bob"]).await.unwrap().id;
    let flat = engine
        .new_group("Flat", &["alice", "carol"])
        .await
        .unwrap()
        .id;

    // Trip: alice is owed 10.00; Flat: alice owes 2.50.
    engine
        .record_expense(ExpenseCmd::new(
            &trip,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();
    engine
        .record_expense(ExpenseCmd::new(
            &flat,
            "carol",
            MoneyCents::new(500),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("carol")],
        ))
        .await
        .unwrap();

    assert_eq!(
        engine.get_user_overall_balance("alice").await.unwrap(),
        MoneyCents::new(750)
    );
    assert_eq!(
        engine.get_user_overall_balance("bob").await.unwrap(),
        MoneyCents::new(-1000)
    );
    assert_eq!(
        engine.get_user_overall_balance("carol").await.unwrap(),
        MoneyCents::new(250)
    );

    // A registered user with no groups nets to zero.
    engine.register_user("dave").await.unwrap();
    assert_eq!(
        engine.get_user_overall_balance("dave").await.unwrap(),
        MoneyCents::ZERO
    );
}

#[tokio::test]
async fn add_member_reactivates_an_archived_row() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    engine.remove_member(&group, "bob").await.unwrap();
    let err = engine.remove_member(&group, "bob").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::KeyNotFound("membership not exists".to_string())
    );

    engine.add_member(&group, "bob").await.unwrap();
    let members = engine.list_members(&group).await.unwrap();
    assert!(
        members
            .iter()
            .all(|m| m.status == engine::MemberStatus::Active)
    );

    let err = engine.add_member(&group, "bob").await.unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("bob".to_string()));

    // A brand-new member starts with a zero net row.
    engine.register_user("carol").await.unwrap();
    engine.add_member(&group, "carol").await.unwrap();
    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(
        net_amounts(&balances),
        vec![("alice", 0), ("bob", 0), ("carol", 0)]
    );
}

#[tokio::test]
async fn new_group_rejects_unknown_and_duplicate_members() {
    let (engine, _db) = engine_with_db().await;
    engine.register_user("alice").await.unwrap();

    let err = engine.new_group("Trip", &["alice", "ghost"]).await.unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound("user not exists".to_string()));

    let err = engine
        .new_group("Trip", &["alice", "alice"])
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("alice".to_string()));

    let err = engine.register_user("alice").await.unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("alice".to_string()));
}

#[tokio::test]
async fn updated_payment_flips_the_pair_direction() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    let payment = engine
        .record_payment(PaymentCmd::new(&group, "alice", "bob", MoneyCents::new(500)))
        .await
        .unwrap();
    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(pairwise_amounts(&balances), vec![("bob", "alice", 500)]);

    // Swapping payer and payee mirrors the debt.
    engine
        .update_payment(
            UpdatePaymentCmd::new(payment.id)
                .payer_id("bob")
                .payee_id("alice"),
        )
        .await
        .unwrap();
    let balances = assert_group_invariants(&engine, &group).await;
    assert_eq!(pairwise_amounts(&balances), vec![("alice", "bob", 500)]);

    let err = engine
        .update_payment(UpdatePaymentCmd::new(payment.id).payee_id("bob"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidAmount("payer and payee must differ".to_string())
    );
}

#[tokio::test]
async fn balances_serialize_for_the_calling_layer() {
    let (engine, _db) = engine_with_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    engine
        .record_expense(ExpenseCmd::new(
            &group,
            "alice",
            MoneyCents::new(2000),
            SplitMethod::Equal,
            vec![ShareInput::even("alice"), ShareInput::even("bob")],
        ))
        .await
        .unwrap();

    let balances = engine.get_group_balances(&group).await.unwrap();
    let json = serde_json::to_value(&balances).unwrap();
    assert_eq!(json["net_by_user"][0]["user_id"], "alice");
    assert_eq!(json["net_by_user"][0]["amount"], 1000);
    assert_eq!(json["pairwise"][0]["from_user_id"], "bob");
    assert_eq!(json["pairwise"][0]["to_user_id"], "alice");
    assert_eq!(json["pairwise"][0]["amount"], 1000);
}

#[tokio::test]
async fn restart_engine_reads_same_state() {
    let (engine, db, url, path) = engine_with_file_db().await;
    let group = group_of(&engine, "Trip", &["alice", "bob"]).await;

    engine
        .record_expense(
            ExpenseCmd::new(
                &group,
                "alice",
                MoneyCents::new(2000),
                SplitMethod::Equal,
                vec![ShareInput::even("alice"), ShareInput::even("bob")],
            )
            .created_at(Utc::now()),
        )
        .await
        .unwrap();

    drop(engine);
    drop(db);

    let db2 = Database::connect(&url).await.unwrap();
    let engine2 = Engine::builder()
        .database(db2.clone())
        .build()
        .await
        .unwrap();

    let balances = assert_group_invariants(&engine2, &group).await;
    assert_eq!(net_amounts(&balances), vec![("alice", 1000), ("bob", -1000)]);

    drop(db2);
    let _ = std::fs::remove_file(path);
}
