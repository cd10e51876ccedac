//! Unitwork Core Integration Tests

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use unitwork_core::{
    CancellationToken, Error, ErrorKind,
    application::{GateOutcome, RuleValidationService, ValidatableService, ValidationGate},
    domain::{ChangeOp, Entity, PendingChange, Specification, rule},
    infrastructure::MemoryEngine,
    storage::SqliteEngine,
    uow::{CommittedReader, StorageEngine, UnitOfWork, UnitOfWorkFactory, UnitOfWorkState},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("unitwork_core=debug")
        .try_init();
}

#[derive(Debug, Clone, Serialize)]
struct Customer {
    id: u32,
    name: String,
}

impl Customer {
    fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Entity for Customer {
    const KIND: &'static str = "customer";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

fn customer_rules() -> RuleValidationService<Customer> {
    RuleValidationService::new().with_rule(
        rule("name non-empty", |c: &Customer| !c.name.trim().is_empty())
            .and(rule("id positive", |c: &Customer| c.id > 0)),
    )
}

async fn sqlite() -> SqliteEngine {
    SqliteEngine::in_memory()
        .await
        .expect("Failed to create sqlite engine")
}

// ========== Scenarios shared by both engines ==========

async fn validated_entity_is_saved<S: StorageEngine + CommittedReader>(engine: S) {
    let engine = Arc::new(engine);
    let mut uow = UnitOfWork::new(engine.clone());
    let gate = ValidationGate::new(customer_rules());

    let invalid = Customer::new(1, "");
    let outcome = gate
        .stage(&mut uow, Some(&invalid), ChangeOp::Insert)
        .await
        .unwrap();
    assert_eq!(outcome, GateOutcome::Rejected);
    assert_eq!(uow.pending_count(), 0);

    let valid = Customer::new(2, "ok");
    let outcome = gate
        .stage(&mut uow, Some(&valid), ChangeOp::Insert)
        .await
        .unwrap();
    assert_eq!(outcome, GateOutcome::Staged);

    assert_eq!(uow.save_changes().await.unwrap(), 1);
    assert_eq!(uow.pending_count(), 0);
    assert_eq!(uow.state(), UnitOfWorkState::Idle);

    assert_eq!(
        engine.load("customer", "2").await.unwrap(),
        Some(json!({ "id": 2, "name": "ok" }))
    );
    assert_eq!(engine.load("customer", "1").await.unwrap(), None);
}

async fn failed_save_is_all_or_nothing<S: StorageEngine + CommittedReader>(engine: S) {
    let engine = Arc::new(engine);
    let mut uow = UnitOfWork::new(engine.clone());

    uow.register(PendingChange::insert(&Customer::new(1, "ada")).unwrap())
        .unwrap();
    uow.register(PendingChange::insert(&Customer::new(2, "bob")).unwrap())
        .unwrap();
    // Update of a row that does not exist fails the whole save
    uow.register(PendingChange::update(&Customer::new(99, "ghost")).unwrap())
        .unwrap();

    let err = uow.save_changes().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    match &err {
        Error::Persistence { pending, source } => {
            assert_eq!(*pending, 3);
            assert!(matches!(**source, Error::StaleChange { .. }));
        }
        other => panic!("expected persistence error, got {:?}", other),
    }

    assert_eq!(uow.pending_count(), 3);
    assert_eq!(uow.state(), UnitOfWorkState::Idle);
    assert_eq!(engine.count("customer").await.unwrap(), 0);

    // Reset recovers the same instance to a clean session
    let before = uow.session_id();
    uow.reset().await.unwrap();
    assert_ne!(uow.session_id(), before);
    assert_eq!(uow.pending_count(), 0);

    uow.register(PendingChange::upsert(&Customer::new(1, "ada")).unwrap())
        .unwrap();
    assert_eq!(uow.save_changes().await.unwrap(), 1);
    assert_eq!(engine.count("customer").await.unwrap(), 1);
}

async fn explicit_transaction_lifecycle<S: StorageEngine + CommittedReader>(engine: S) {
    let engine = Arc::new(engine);
    let mut uow = UnitOfWork::new(engine.clone());

    let info = uow.begin_transaction().await.unwrap();
    assert!(info.explicit);
    assert_eq!(uow.state(), UnitOfWorkState::TransactionOpen);

    let err = uow.begin_transaction().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(uow.transaction_info().map(|t| t.id), Some(info.id));

    uow.register(PendingChange::insert(&Customer::new(5, "eve")).unwrap())
        .unwrap();
    assert_eq!(uow.save_changes().await.unwrap(), 1);
    assert_eq!(uow.state(), UnitOfWorkState::Idle);
    assert_eq!(engine.count("customer").await.unwrap(), 1);

    // A rolled back transaction leaves nothing behind
    uow.begin_transaction().await.unwrap();
    uow.reset().await.unwrap();
    assert_eq!(uow.state(), UnitOfWorkState::Idle);

    uow.dispose().await.unwrap();
    uow.dispose().await.unwrap();
    assert_eq!(uow.state(), UnitOfWorkState::Disposed);
    assert_eq!(
        uow.save_changes().await.unwrap_err().kind(),
        ErrorKind::ObjectDisposed
    );
    assert_eq!(
        uow.begin_transaction().await.unwrap_err().kind(),
        ErrorKind::ObjectDisposed
    );
    assert_eq!(uow.reset().await.unwrap_err().kind(), ErrorKind::ObjectDisposed);
}

async fn cancelled_begin_leaves_no_transaction<S: StorageEngine>(engine: S) {
    let mut uow = UnitOfWork::new(Arc::new(engine));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = uow.begin_transaction_cancellable(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    assert_eq!(uow.state(), UnitOfWorkState::Idle);
    assert!(uow.transaction_info().is_none());

    uow.register(PendingChange::insert(&Customer::new(3, "kim")).unwrap())
        .unwrap();
    let err = uow.save_changes_cancellable(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    assert_eq!(uow.pending_count(), 1);

    // The instance is still usable afterwards
    uow.begin_transaction().await.unwrap();
    assert_eq!(uow.save_changes().await.unwrap(), 1);
}

#[tokio::test]
async fn test_memory_validated_entity_is_saved() {
    init_tracing();
    validated_entity_is_saved(MemoryEngine::new()).await;
}

#[tokio::test]
async fn test_sqlite_validated_entity_is_saved() {
    init_tracing();
    validated_entity_is_saved(sqlite().await).await;
}

#[tokio::test]
async fn test_memory_failed_save_is_all_or_nothing() {
    init_tracing();
    failed_save_is_all_or_nothing(MemoryEngine::new()).await;
}

#[tokio::test]
async fn test_sqlite_failed_save_is_all_or_nothing() {
    init_tracing();
    failed_save_is_all_or_nothing(sqlite().await).await;
}

#[tokio::test]
async fn test_memory_explicit_transaction_lifecycle() {
    init_tracing();
    explicit_transaction_lifecycle(MemoryEngine::new()).await;
}

#[tokio::test]
async fn test_sqlite_explicit_transaction_lifecycle() {
    init_tracing();
    explicit_transaction_lifecycle(sqlite().await).await;
}

#[tokio::test]
async fn test_memory_cancelled_begin() {
    init_tracing();
    cancelled_begin_leaves_no_transaction(MemoryEngine::new()).await;
}

#[tokio::test]
async fn test_sqlite_cancelled_begin() {
    init_tracing();
    cancelled_begin_leaves_no_transaction(sqlite().await).await;
}

// ========== Engine specific ==========

#[tokio::test]
async fn test_sqlite_duplicate_insert_rolls_back_batch() {
    init_tracing();
    let engine = Arc::new(sqlite().await);

    let mut seed = UnitOfWork::new(engine.clone());
    seed.register(PendingChange::insert(&Customer::new(1, "ada")).unwrap())
        .unwrap();
    seed.save_changes().await.unwrap();

    let mut uow = UnitOfWork::new(engine.clone());
    uow.register(PendingChange::insert(&Customer::new(2, "bob")).unwrap())
        .unwrap();
    uow.register(PendingChange::insert(&Customer::new(1, "ada again")).unwrap())
        .unwrap();

    let err = uow.save_changes().await.unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(uow.pending_count(), 2);

    assert_eq!(engine.count("customer").await.unwrap(), 1);
    assert_eq!(engine.load("customer", "2").await.unwrap(), None);
}

#[tokio::test]
async fn test_memory_rejected_commit_keeps_changes() {
    init_tracing();
    let engine = MemoryEngine::new();
    engine.fail_next_commit();
    let mut uow = UnitOfWork::new(Arc::new(engine.clone()));

    uow.register(PendingChange::insert(&Customer::new(1, "ada")).unwrap())
        .unwrap();
    let err = uow.save_changes().await.unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(uow.pending_count(), 1);
    assert_eq!(engine.count("customer").await.unwrap(), 0);

    assert_eq!(uow.save_changes().await.unwrap(), 1);
    assert_eq!(engine.commits(), 1);
    assert_eq!(engine.open_transactions(), 0);
}

#[tokio::test]
async fn test_factory_scope_disposes() {
    init_tracing();
    let factory = UnitOfWorkFactory::new(MemoryEngine::new());

    let saved = factory
        .scope(|uow| {
            Box::pin(async move {
                uow.register(PendingChange::insert(&Customer::new(4, "lee"))?)?;
                uow.register(PendingChange::insert(&Customer::new(6, "max"))?)?;
                uow.save_changes().await
            })
        })
        .await
        .unwrap();

    assert_eq!(saved, 2);
    assert_eq!(factory.engine().count("customer").await.unwrap(), 2);
    assert_eq!(factory.engine().open_transactions(), 0);
}

#[tokio::test]
async fn test_null_entity_is_invalid_argument() {
    let rules = customer_rules();
    let err = rules.validate(None).err().expect("expected an error");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let entity = Customer::new(1, "");
    let verdict = rules.validate(Some(&entity)).unwrap().await;
    assert!(verdict.is_success());
    assert!(!*verdict.value().unwrap());
    assert_eq!(verdict.error().unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn test_blocking_api_without_runtime() {
    let engine = Arc::new(MemoryEngine::new());
    let mut uow = UnitOfWork::new(engine);

    uow.begin_transaction_blocking().unwrap();
    uow.register(PendingChange::insert(&Customer::new(8, "sam")).unwrap())
        .unwrap();
    assert_eq!(uow.save_changes_blocking().unwrap(), 1);

    uow.reset_blocking().unwrap();
    uow.dispose_blocking().unwrap();
    uow.dispose_blocking().unwrap();
    assert!(uow.is_disposed());
}
