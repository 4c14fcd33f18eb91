mod common;

use std::sync::Arc;

use common::{annual_input, at, date, money};
use maintenance_contracts::config::EngineSettings;
use maintenance_contracts::contracts::testing::{RecordingInvoiceIssuer, RecordingNotifier};
use maintenance_contracts::contracts::{
    ContractCommit, ContractService, ContractStatus, ContractStore, PaymentStatus,
    PgContractStore, RecordUsageInput, ServiceType, SweepControl,
};
use maintenance_contracts::ContractError;
use sqlx::PgPool;
use uuid::Uuid;

fn engine(pool: &PgPool) -> (ContractService, Arc<PgContractStore>) {
    let store = Arc::new(PgContractStore::new(pool.clone()));
    let engine = ContractService::new(
        store.clone(),
        Arc::new(RecordingInvoiceIssuer::new()),
        Arc::new(RecordingNotifier::new()),
        EngineSettings::default(),
    );
    (engine, store)
}

// key: contract-store-tests -> postgres persistence
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn contract_lifecycle_persists_through_postgres(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (engine, _) = engine(&pool);
    let organization_id = Uuid::new_v4();
    let client = Uuid::new_v4();

    let first = engine
        .create_contract(organization_id, annual_input(client), "ops", at(2025, 1, 1))
        .await
        .unwrap();
    let second = engine
        .create_contract(organization_id, annual_input(client), "ops", at(2025, 1, 2))
        .await
        .unwrap();
    assert_eq!(first.contract_number, "CTR-2025-0001");
    assert_eq!(second.contract_number, "CTR-2025-0002");

    engine
        .activate_contract(first.id, None, at(2025, 1, 1))
        .await
        .unwrap();
    let report = engine
        .process_pending_payments(at(2025, 1, 2), &SweepControl::unbounded())
        .await
        .unwrap();
    assert_eq!(report.succeeded, 1);

    let payments = engine.get_contract_payments(first.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert_eq!(payments[0].due_date, date(2026, 1, 1));
    assert_eq!(payments[1].status, PaymentStatus::Invoiced);
    assert_eq!(payments[1].amount, money(1200));

    let outcome = engine
        .record_service_usage(
            first.id,
            RecordUsageInput {
                service_id: Uuid::new_v4(),
                service_type: ServiceType::Tuning,
                notes: Some("spring tuning".into()),
                list_price: None,
            },
            at(2025, 4, 1),
        )
        .await
        .unwrap();
    assert!(outcome.covered_by_contract);

    let stored = engine.get_contract(first.id).await.unwrap();
    assert_eq!(stored.status, ContractStatus::Active);
    assert_eq!(stored.used_count(ServiceType::Tuning), 1);
    assert_eq!(stored.included_services, first.included_services);

    let status: String =
        sqlx::query_scalar("SELECT status FROM maintenance_contracts WHERE id = $1")
            .bind(second.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "draft");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn stale_commit_is_a_concurrency_conflict(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (engine, store) = engine(&pool);
    let contract = engine
        .create_contract(
            Uuid::new_v4(),
            annual_input(Uuid::new_v4()),
            "ops",
            at(2025, 1, 1),
        )
        .await
        .unwrap();

    let mut fresh = contract.clone();
    fresh.notes = Some("first writer".into());
    let stored = store.commit(ContractCommit::new(fresh)).await.unwrap();
    assert_eq!(stored.version, contract.version + 1);

    let mut stale = contract.clone();
    stale.notes = Some("second writer".into());
    let err = store.commit(ContractCommit::new(stale)).await.unwrap_err();
    assert!(matches!(err, ContractError::ConcurrencyConflict { .. }));

    let mut missing = contract;
    missing.id = Uuid::new_v4();
    let err = store.commit(ContractCommit::new(missing)).await.unwrap_err();
    assert!(matches!(err, ContractError::NotFound { .. }));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn renewal_sweep_expires_and_renews_in_postgres(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (engine, _) = engine(&pool);
    let organization_id = Uuid::new_v4();

    let mut lapsing = annual_input(Uuid::new_v4());
    lapsing.auto_renew = Some(false);
    let lapsing = engine
        .create_contract(organization_id, lapsing, "ops", at(2025, 1, 1))
        .await
        .unwrap();
    let renewing = engine
        .create_contract(
            organization_id,
            annual_input(Uuid::new_v4()),
            "ops",
            at(2025, 1, 1),
        )
        .await
        .unwrap();
    for id in [lapsing.id, renewing.id] {
        engine.activate_contract(id, None, at(2025, 1, 1)).await.unwrap();
    }

    let report = engine
        .process_renewals(at(2026, 1, 2), &SweepControl::unbounded())
        .await
        .unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.renewed, 1);
    assert_eq!(report.notices_sent, 2);

    assert_eq!(
        engine.get_contract(lapsing.id).await.unwrap().status,
        ContractStatus::Expired
    );
    let renewed = engine.get_contract(renewing.id).await.unwrap();
    assert_eq!(renewed.end_date, date(2027, 1, 1));
    assert!(!renewed.renewal_notification_sent);
    assert_eq!(engine.get_renewal_history(renewing.id).await.unwrap().len(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn contract_numbers_restart_for_each_organization(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (engine, _) = engine(&pool);

    let first = engine
        .create_contract(Uuid::new_v4(), annual_input(Uuid::new_v4()), "ops", at(2025, 1, 1))
        .await
        .unwrap();
    let other = engine
        .create_contract(Uuid::new_v4(), annual_input(Uuid::new_v4()), "ops", at(2025, 1, 1))
        .await
        .unwrap();
    assert_eq!(first.contract_number, "CTR-2025-0001");
    assert_eq!(other.contract_number, "CTR-2025-0001");
    assert_ne!(first.organization_id, other.organization_id);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn duplicate_pending_due_date_rolls_back_the_commit(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (engine, store) = engine(&pool);
    let contract = engine
        .create_contract(Uuid::new_v4(), annual_input(Uuid::new_v4()), "ops", at(2025, 1, 1))
        .await
        .unwrap();
    let active = engine
        .activate_contract(contract.id, None, at(2025, 1, 1))
        .await
        .unwrap();
    let payments = engine.get_contract_payments(active.id).await.unwrap();
    assert_eq!(payments.len(), 1);

    let mut duplicate = payments[0].clone();
    duplicate.id = Uuid::new_v4();
    let mut edited = active.clone();
    edited.notes = Some("should not persist".into());
    let err = store
        .commit(ContractCommit::new(edited).with_new_payment(duplicate))
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::Db(_)));

    let stored = engine.get_contract(active.id).await.unwrap();
    assert_eq!(stored.version, active.version);
    assert_eq!(stored.notes, active.notes);
    assert_eq!(engine.get_contract_payments(active.id).await.unwrap().len(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn cancelled_contract_payments_leave_the_billing_queue(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let (engine, store) = engine(&pool);
    let contract = engine
        .create_contract(Uuid::new_v4(), annual_input(Uuid::new_v4()), "ops", at(2025, 1, 1))
        .await
        .unwrap();
    engine
        .activate_contract(contract.id, None, at(2025, 1, 1))
        .await
        .unwrap();
    assert_eq!(store.due_payments(date(2025, 1, 2)).await.unwrap().len(), 1);

    engine
        .cancel_contract(contract.id, "moved away".into(), at(2025, 1, 1))
        .await
        .unwrap();
    assert!(store.due_payments(date(2025, 1, 2)).await.unwrap().is_empty());
}
