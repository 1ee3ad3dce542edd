use async_trait::async_trait;
use keyward_model::{
    Family, FamilySchema, FieldDescriptor, FieldMap, ManagedKeyBlock, ModelError,
    RemoteKeyRecord, Snapshot, TypeRegistry,
};
use keyward_sync::{
    CancellationToken, KeyResult, ManagedKeyError, MemoryKeyStore, Operation, Reconciler,
    ReconcilerConfig, RemoteStore, ServerVersionGate, StoreCall,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn make_reconciler() -> (Arc<MemoryKeyStore>, Reconciler) {
    let store = Arc::new(MemoryKeyStore::new(TypeRegistry::builtin()));
    let reconciler = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()));
    (store, reconciler)
}

fn aws(name: &str) -> ManagedKeyBlock {
    ManagedKeyBlock::new(Family::Aws, name)
        .with_field("access_key", "AKIAEXAMPLE")
        .with_field("secret_key", "s3cr3t")
        .with_field("kms_key", "alias/signing")
        .with_field("key_bits", "2048")
        .with_field("key_type", "RSA")
}

fn hsm(name: &str) -> ManagedKeyBlock {
    ManagedKeyBlock::new(Family::Pkcs, name)
        .with_field("library", "softhsm")
        .with_field("mechanism", "0x0001")
        .with_field("pin", "1234")
}

fn vault_key(name: &str) -> ManagedKeyBlock {
    ManagedKeyBlock::new(Family::Azure, name)
        .with_field("tenant_id", "tenant")
        .with_field("client_id", "client")
        .with_field("client_secret", "hunter2")
        .with_field("vault_name", "kv-prod")
        .with_field("key_name", "signing")
        .with_field("key_bits", "2048")
        .with_field("key_type", "RSA")
}

fn snapshot(blocks: Vec<ManagedKeyBlock>) -> Snapshot {
    Snapshot::from_blocks(blocks).unwrap()
}

fn call(operation: Operation, family: Family, name: Option<&str>) -> StoreCall {
    StoreCall {
        operation,
        family,
        name: name.map(str::to_string),
    }
}

// ── Basic passes ─────────────────────────────────────────────────

#[tokio::test]
async fn fresh_resource_lists_then_writes_in_name_order() {
    let (store, reconciler) = make_reconciler();
    let new = snapshot(vec![aws("b"), aws("a")]);
    let cancel = CancellationToken::new();

    let report = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &cancel)
        .await
        .unwrap();

    assert_eq!(report.written, vec!["a", "b"]);
    assert!(report.deleted.is_empty());
    assert_eq!(
        store.calls(),
        vec![
            call(Operation::List, Family::Aws, None),
            call(Operation::Put, Family::Aws, Some("a")),
            call(Operation::Put, Family::Aws, Some("b")),
        ]
    );
}

#[tokio::test]
async fn put_sends_redacted_fields() {
    let (store, reconciler) = make_reconciler();
    let new = snapshot(vec![aws("a")]);

    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &CancellationToken::new())
        .await
        .unwrap();

    let stored = store.stored_fields(Family::Aws, "a").unwrap();
    assert_eq!(stored.get("secret_key"), Some(&serde_json::json!("s3cr3t")));
    assert_eq!(stored.get("access_key"), Some(&serde_json::json!("AKIAEXAMPLE")));
}

#[tokio::test]
async fn changed_fields_are_upserted() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let old = snapshot(vec![aws("a")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap();

    let new = snapshot(vec![aws("a").with_field("region", "eu-west-1")]);
    let report = reconciler
        .reconcile(Family::Aws, &old, &new, false, &cancel)
        .await
        .unwrap();

    assert_eq!(report.written, vec!["a"]);
    assert_eq!(
        store.stored_fields(Family::Aws, "a").unwrap().get("region"),
        Some(&serde_json::json!("eu-west-1"))
    );
}

#[tokio::test]
async fn other_families_are_untouched() {
    let (store, reconciler) = make_reconciler();
    let new = snapshot(vec![aws("a"), hsm("h")]);

    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(store.contains(Family::Aws, "a"));
    assert!(!store.contains(Family::Pkcs, "h"));
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn second_identical_pass_repeats_only_first_pass_calls() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let seed = snapshot(vec![aws("a"), aws("b")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &seed, true, &cancel)
        .await
        .unwrap();

    let new = snapshot(vec![aws("a")]);

    store.clear_calls();
    let first = reconciler
        .reconcile(Family::Aws, &seed, &new, false, &cancel)
        .await
        .unwrap();
    let first_calls = store.calls();

    store.clear_calls();
    let second = reconciler
        .reconcile(Family::Aws, &seed, &new, false, &cancel)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(store.calls(), first_calls);
    assert_eq!(store.names(Family::Aws), vec!["a"]);
}

// ── Rename ───────────────────────────────────────────────────────

#[tokio::test]
async fn rename_writes_new_name_before_deleting_old() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let old = snapshot(vec![aws("a")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap();
    store.clear_calls();

    let new = snapshot(vec![aws("b")]);
    let report = reconciler
        .reconcile(Family::Aws, &old, &new, false, &cancel)
        .await
        .unwrap();

    assert_eq!(report.written, vec!["b"]);
    assert_eq!(report.deleted, vec!["a"]);
    assert_eq!(
        store.calls(),
        vec![
            call(Operation::Put, Family::Aws, Some("b")),
            call(Operation::Delete, Family::Aws, Some("a")),
        ]
    );

    assert!(store.get(Family::Aws, "b").await.is_ok());
    assert!(store.get(Family::Aws, "a").await.unwrap_err().is_not_found());
}

// ── Collision guard ──────────────────────────────────────────────

#[tokio::test]
async fn fresh_resource_collides_with_foreign_entries() {
    let (store, reconciler) = make_reconciler();
    store.seed(Family::Aws, "someone-elses", FieldMap::new());
    let new = snapshot(vec![aws("a")]);

    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ManagedKeyError::Collision { family, existing } => {
            assert_eq!(family, Family::Aws);
            assert_eq!(existing, vec!["someone-elses"]);
        }
        other => panic!("Expected Collision, got {other:?}"),
    }
    assert!(store.calls_of(Operation::Put).is_empty());
    assert!(store.calls_of(Operation::Delete).is_empty());
    assert!(!store.contains(Family::Aws, "a"));
}

#[tokio::test]
async fn collision_guard_ignores_other_families() {
    let (store, reconciler) = make_reconciler();
    store.seed(Family::Pkcs, "foreign-hsm", FieldMap::new());
    let new = snapshot(vec![aws("a")]);

    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &CancellationToken::new())
        .await
        .unwrap();
    assert!(store.contains(Family::Aws, "a"));
}

#[tokio::test]
async fn existing_resource_skips_collision_guard() {
    let (store, reconciler) = make_reconciler();
    store.seed(Family::Aws, "someone-elses", FieldMap::new());
    let old = snapshot(vec![hsm("h")]);
    let new = snapshot(vec![hsm("h"), aws("a")]);

    reconciler
        .reconcile(Family::Aws, &old, &new, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(store.calls_of(Operation::List).is_empty());
    assert!(store.contains(Family::Aws, "a"));
}

#[tokio::test]
async fn guard_new_families_checks_first_declaration() {
    let store = Arc::new(MemoryKeyStore::new(TypeRegistry::builtin()));
    let reconciler = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()))
        .with_config(ReconcilerConfig {
            guard_new_families: true,
        });
    store.seed(Family::Aws, "someone-elses", FieldMap::new());
    let old = snapshot(vec![hsm("h")]);
    let new = snapshot(vec![hsm("h"), aws("a")]);

    let err = reconciler
        .reconcile(Family::Aws, &old, &new, false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ManagedKeyError::Collision { .. }));
}

#[tokio::test]
async fn guard_new_families_allows_already_declared_family() {
    let store = Arc::new(MemoryKeyStore::new(TypeRegistry::builtin()));
    let reconciler = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()))
        .with_config(ReconcilerConfig {
            guard_new_families: true,
        });
    store.seed(Family::Aws, "a", FieldMap::new());
    let old = snapshot(vec![aws("a")]);
    let new = snapshot(vec![aws("a"), aws("b")]);

    reconciler
        .reconcile(Family::Aws, &old, &new, false, &CancellationToken::new())
        .await
        .unwrap();
    assert!(store.calls_of(Operation::List).is_empty());
}

// ── Partial failure ──────────────────────────────────────────────

#[tokio::test]
async fn failed_put_is_recovered_by_retry() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let new = snapshot(vec![aws("a"), aws("b")]);
    store.fail_next(Operation::Put, Family::Aws, Some("b"));

    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, false, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.family(), Some(Family::Aws));
    assert_eq!(err.operation(), Some(Operation::Put));
    assert!(store.contains(Family::Aws, "a"));
    assert!(!store.contains(Family::Aws, "b"));

    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, false, &cancel)
        .await
        .unwrap();
    assert_eq!(store.names(Family::Aws), vec!["a", "b"]);
    assert!(store.calls_of(Operation::Delete).is_empty());
}

#[tokio::test]
async fn failed_fresh_pass_is_recovered_by_retry() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let new = snapshot(vec![aws("a"), aws("b")]);
    store.fail_next(Operation::Put, Family::Aws, Some("b"));

    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.operation(), Some(Operation::Put));
    assert!(store.contains(Family::Aws, "a"));

    // Still fresh: "a" is our own write and must not collide.
    let report = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &cancel)
        .await
        .unwrap();
    assert_eq!(report.written, vec!["a", "b"]);
    assert_eq!(store.names(Family::Aws), vec!["a", "b"]);
    assert!(store.calls_of(Operation::Delete).is_empty());
}

#[tokio::test]
async fn fresh_retry_with_restored_ledger_succeeds() {
    let (store, first) = make_reconciler();
    let cancel = CancellationToken::new();
    let new = snapshot(vec![aws("a"), aws("b")]);
    store.fail_next(Operation::Put, Family::Aws, Some("b"));
    assert!(first
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &cancel)
        .await
        .is_err());

    let ledger = first.ledger().await;
    assert!(ledger.is_owned(Family::Aws, "a"));
    assert!(!ledger.is_owned(Family::Aws, "b"));

    let second = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()))
        .with_ledger(ledger);
    second
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &cancel)
        .await
        .unwrap();
    assert_eq!(store.names(Family::Aws), vec!["a", "b"]);
}

#[tokio::test]
async fn fresh_pass_collides_with_foreign_entry_of_a_declared_name() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    store.seed(Family::Aws, "a", FieldMap::new());
    let new = snapshot(vec![aws("a"), aws("b")]);

    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &cancel)
        .await
        .unwrap_err();
    match err {
        ManagedKeyError::Collision { existing, .. } => assert_eq!(existing, vec!["a"]),
        other => panic!("Expected Collision, got {other:?}"),
    }
    assert!(store.calls_of(Operation::Put).is_empty());
}

#[tokio::test]
async fn deleted_names_collide_again_when_recreated_remotely() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let old = snapshot(vec![aws("a")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap();
    reconciler
        .reconcile(Family::Aws, &old, &Snapshot::new(), false, &cancel)
        .await
        .unwrap();
    assert!(!reconciler.ledger().await.is_owned(Family::Aws, "a"));

    store.seed(Family::Aws, "a", FieldMap::new());
    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ManagedKeyError::Collision { .. }));
}

#[tokio::test]
async fn failed_put_skips_deletes() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let old = snapshot(vec![aws("a"), aws("c")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap();

    let new = snapshot(vec![aws("a"), aws("b")]);
    store.fail_next(Operation::Put, Family::Aws, Some("b"));
    assert!(reconciler
        .reconcile(Family::Aws, &old, &new, false, &cancel)
        .await
        .is_err());

    assert!(store.contains(Family::Aws, "c"));
    assert!(store.calls_of(Operation::Delete).is_empty());
}

#[tokio::test]
async fn failed_delete_stops_remaining_deletes() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let old = snapshot(vec![aws("a"), aws("b"), aws("c")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap();

    let new = snapshot(vec![aws("a")]);
    store.fail_next(Operation::Delete, Family::Aws, Some("b"));
    let err = reconciler
        .reconcile(Family::Aws, &old, &new, false, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.operation(), Some(Operation::Delete));
    assert!(store.contains(Family::Aws, "b"));
    assert!(store.contains(Family::Aws, "c"));
}

// ── Validation ───────────────────────────────────────────────────

#[tokio::test]
async fn invalid_block_issues_no_remote_calls() {
    let (store, reconciler) = make_reconciler();
    let mut broken = aws("a");
    broken.fields.remove("kms_key");
    let new = snapshot(vec![aws("b"), broken]);

    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &new, true, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ManagedKeyError::Model(ModelError::MissingField { ref field, .. }) if field == "kms_key"
    ));
    assert!(store.calls().is_empty());
}

// ── Unsupported families ─────────────────────────────────────────

#[tokio::test]
async fn unsupported_requested_family_is_surfaced() {
    let (store, reconciler) = make_reconciler();
    store.mark_unsupported(Family::Azure);
    let new = snapshot(vec![vault_key("z")]);

    let err = reconciler
        .reconcile(Family::Azure, &Snapshot::new(), &new, false, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_unsupported());
    assert_eq!(err.operation(), Some(Operation::Put));
}

#[tokio::test]
async fn unsupported_unrequested_family_is_swallowed() {
    let (store, reconciler) = make_reconciler();
    store.mark_unsupported(Family::Azure);
    let old = snapshot(vec![vault_key("z")]);

    let report = reconciler
        .reconcile(Family::Azure, &old, &Snapshot::new(), false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.skipped_unsupported);
    assert!(report.deleted.is_empty());
}

// ── Cancellation ─────────────────────────────────────────────────

/// Store that cancels the pass right after its first successful Put.
struct CancelAfterFirstPut {
    inner: MemoryKeyStore,
    cancel: CancellationToken,
}

#[async_trait]
impl RemoteStore for CancelAfterFirstPut {
    fn backend_name(&self) -> &'static str {
        "cancel-after-first-put"
    }

    async fn put(&self, family: Family, name: &str, fields: &FieldMap) -> KeyResult<()> {
        self.inner.put(family, name, fields).await?;
        self.cancel.cancel();
        Ok(())
    }

    async fn list(&self, family: Family) -> KeyResult<Vec<String>> {
        self.inner.list(family).await
    }

    async fn get(&self, family: Family, name: &str) -> KeyResult<RemoteKeyRecord> {
        self.inner.get(family, name).await
    }

    async fn delete(&self, family: Family, name: &str) -> KeyResult<()> {
        self.inner.delete(family, name).await
    }
}

#[tokio::test]
async fn cancelled_before_start_issues_nothing() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &snapshot(vec![aws("a")]), false, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ManagedKeyError::Cancelled {
            family: Family::Aws,
            operation: Operation::Put
        }
    ));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn cancellation_mid_loop_stops_further_calls() {
    let cancel = CancellationToken::new();
    let store = Arc::new(CancelAfterFirstPut {
        inner: MemoryKeyStore::new(TypeRegistry::builtin()),
        cancel: cancel.clone(),
    });
    let reconciler = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()));
    let old = snapshot(vec![aws("z")]);
    let new = snapshot(vec![aws("a"), aws("b"), aws("c")]);

    let err = reconciler
        .reconcile(Family::Aws, &old, &new, false, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ManagedKeyError::Cancelled { .. }));
    assert!(err.is_retryable());
    assert_eq!(store.inner.names(Family::Aws), vec!["a"]);
    assert_eq!(store.inner.calls().len(), 1);
}

// ── reconcile_all ────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_all_walks_families_in_registry_order() {
    let (store, reconciler) = make_reconciler();
    let new = snapshot(vec![vault_key("z"), aws("a"), hsm("h")]);

    let reports = reconciler
        .reconcile_all(&Snapshot::new(), &new, false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        reports.iter().map(|r| r.family).collect::<Vec<_>>(),
        vec![Family::Pkcs, Family::Aws, Family::Azure]
    );
    assert_eq!(
        store.calls_of(Operation::Put),
        vec![
            call(Operation::Put, Family::Pkcs, Some("h")),
            call(Operation::Put, Family::Aws, Some("a")),
            call(Operation::Put, Family::Azure, Some("z")),
        ]
    );
}

#[tokio::test]
async fn reconcile_all_deletes_families_dropped_from_declaration() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let old = snapshot(vec![aws("a"), hsm("h")]);
    reconciler
        .reconcile_all(&Snapshot::new(), &old, true, &cancel)
        .await
        .unwrap();

    let new = snapshot(vec![aws("a")]);
    let reports = reconciler.reconcile_all(&old, &new, false, &cancel).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].deleted, vec!["h"]);
    assert!(!store.contains(Family::Pkcs, "h"));
}

#[tokio::test]
async fn reconcile_all_skips_gated_families_without_declarations() {
    let store = Arc::new(MemoryKeyStore::new(TypeRegistry::builtin()));
    let reconciler = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()))
        .with_gate(Arc::new(ServerVersionGate::parse("1.10.4").unwrap()));
    let old = snapshot(vec![vault_key("z"), aws("a")]);
    let new = snapshot(vec![aws("a")]);

    let reports = reconciler
        .reconcile_all(&old, &new, false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].family, Family::Aws);
    assert!(store
        .calls()
        .iter()
        .all(|c| c.family != Family::Azure));
}

#[tokio::test]
async fn reconcile_all_still_attempts_declared_gated_family() {
    let store = Arc::new(MemoryKeyStore::new(TypeRegistry::builtin()));
    store.mark_unsupported(Family::Azure);
    let reconciler = Reconciler::new(store.clone(), Arc::new(TypeRegistry::builtin()))
        .with_gate(Arc::new(ServerVersionGate::parse("1.10.4").unwrap()));
    let new = snapshot(vec![vault_key("z")]);

    let err = reconciler
        .reconcile_all(&Snapshot::new(), &new, false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
}

#[tokio::test]
async fn reconcile_all_rejects_unregistered_family() {
    let registry = TypeRegistry::from_schemas(vec![FamilySchema::new(
        Family::Aws,
        "1.10.0",
        "name",
        vec![FieldDescriptor::required("kms_key")],
    )]);
    let store = Arc::new(MemoryKeyStore::new(registry.clone()));
    let reconciler = Reconciler::new(store.clone(), Arc::new(registry));
    let new = snapshot(vec![hsm("h")]);

    let err = reconciler
        .reconcile_all(&Snapshot::new(), &new, false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ManagedKeyError::Model(ModelError::UnregisteredFamily(Family::Pkcs))
    ));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn reconcile_all_fails_fast_across_families() {
    let (store, reconciler) = make_reconciler();
    store.fail_next(Operation::Put, Family::Pkcs, None);
    let new = snapshot(vec![hsm("h"), aws("a")]);

    assert!(reconciler
        .reconcile_all(&Snapshot::new(), &new, false, &CancellationToken::new())
        .await
        .is_err());
    assert!(!store.contains(Family::Aws, "a"));
}

// ── Drift does not interfere ─────────────────────────────────────

#[tokio::test]
async fn drift_is_reported_but_reconcile_still_upserts() {
    let (store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let declared = snapshot(vec![aws("a")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &declared, true, &cancel)
        .await
        .unwrap();

    let first = reconciler
        .read_all(&[Family::Aws], &declared, &cancel)
        .await
        .unwrap();
    assert!(first.drift.is_empty());

    let mut out_of_band = store.stored_fields(Family::Aws, "a").unwrap();
    out_of_band.insert("region".into(), serde_json::json!("us-east-2"));
    store.seed(Family::Aws, "a", out_of_band);

    let second = reconciler
        .read_all(&[Family::Aws], &declared, &cancel)
        .await
        .unwrap();
    assert_eq!(second.drift.len(), 1);
    assert_eq!(second.drift[0].name, "a");

    let report = reconciler
        .reconcile(Family::Aws, &declared, &declared, false, &cancel)
        .await
        .unwrap();
    assert_eq!(report.written, vec!["a"]);
}

#[tokio::test]
async fn own_writes_are_not_reported_as_drift() {
    let (_store, reconciler) = make_reconciler();
    let cancel = CancellationToken::new();
    let v1 = snapshot(vec![aws("a")]);
    reconciler
        .reconcile(Family::Aws, &Snapshot::new(), &v1, true, &cancel)
        .await
        .unwrap();
    reconciler.read_all(&[Family::Aws], &v1, &cancel).await.unwrap();

    let v2 = snapshot(vec![aws("a").with_field("region", "eu-west-1")]);
    reconciler
        .reconcile(Family::Aws, &v1, &v2, false, &cancel)
        .await
        .unwrap();

    let outcome = reconciler.read_all(&[Family::Aws], &v2, &cancel).await.unwrap();
    assert!(outcome.drift.is_empty());
}
