//! End-to-end scenarios for the sync engine: fresh installs, first logins,
//! diverged copies, conflict resolution in both directions, and the
//! background flush path.

use grid_model::{Cell, CellId, CellKind, GridPoint, GridSize, Task};
use grid_sync::{
    local_version_key, synced_version_key, CellStore, ConflictResolution, DocumentRemoteStore,
    MemoryDocumentApi, MemoryLocalStore, MetadataStore, RemoteStore, StaticAuthProvider,
    SyncConfig, SyncEngine, SyncState, VersionTag,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

type TestRemote = DocumentRemoteStore<MemoryDocumentApi>;
type TestEngine = SyncEngine<MemoryLocalStore, TestRemote>;

struct Fixture {
    local: Arc<MemoryLocalStore>,
    api: Arc<MemoryDocumentApi>,
    auth: Arc<StaticAuthProvider>,
    remote: Arc<TestRemote>,
    engine: Arc<TestEngine>,
}

fn make_fixture(signed_in: bool, config: SyncConfig) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    let local = Arc::new(MemoryLocalStore::new());
    let api = Arc::new(MemoryDocumentApi::new());
    let auth = Arc::new(if signed_in {
        StaticAuthProvider::signed_in("user-1")
    } else {
        StaticAuthProvider::signed_out()
    });
    let remote = Arc::new(DocumentRemoteStore::new(
        Arc::clone(&api),
        Arc::clone(&auth) as Arc<dyn grid_sync::AuthProvider>,
    ));
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&local),
        Arc::clone(&remote),
        config,
    ));
    Fixture {
        local,
        api,
        auth,
        remote,
        engine,
    }
}

fn quick_config() -> SyncConfig {
    SyncConfig::default().with_debounce_ms(20)
}

fn make_cells(count: u64) -> Vec<Cell> {
    (0..count)
        .map(|i| {
            let kind = if i % 2 == 0 {
                CellKind::headline()
            } else {
                CellKind::TaskList {
                    tasks: vec![Task::new(1, format!("task {i}"), 1.0)],
                    daily: false,
                    last_reset_date: None,
                }
            };
            Cell::new(
                CellId::new(i),
                GridPoint::new(i as i64 * 4, 0),
                GridSize::new(3, 1),
                format!("cell {i}"),
                kind,
            )
        })
        .collect()
}

/// Seed the remote namespace with cells and a version marker, the way a
/// previous session's push would have left it.
async fn seed_remote(remote: &TestRemote, cells: &[Cell]) -> VersionTag {
    let tag = VersionTag::generate();
    remote.save_cells(cells).await.unwrap();
    remote.set_version_tag(&tag).await.unwrap();
    tag
}

async fn wait_for_state(engine: &TestEngine, want: SyncState) {
    for _ in 0..400 {
        if engine.sync_status().await.unwrap().state == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("engine never reached {want:?}");
}

async fn local_scalar(local: &MemoryLocalStore, key: &str) -> Option<String> {
    local.get_scalar(key).await.unwrap()
}

// ========== Scenario A: fresh install, no login ==========

#[tokio::test]
async fn scenario_a_fresh_install_no_login() {
    let fixture = make_fixture(false, quick_config());
    let prompts = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&prompts);
    fixture.engine.set_conflict_prompt_handler(move |_, responder| {
        counted.fetch_add(1, Ordering::SeqCst);
        let _ = responder.send(ConflictResolution::KeepLocal);
    });

    fixture.engine.initialize().await.unwrap();
    fixture.engine.handle_first_load().await.unwrap();

    assert!(fixture.engine.load_cells().await.unwrap().is_empty());
    assert_eq!(prompts.load(Ordering::SeqCst), 0);
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Synced
    );
}

// ========== Scenario B: first login pulls remote data ==========

#[tokio::test]
async fn scenario_b_login_pulls_remote_collection() {
    let fixture = make_fixture(true, quick_config());
    let remote_cells = make_cells(5);
    let remote_tag = seed_remote(&fixture.remote, &remote_cells).await;

    fixture.engine.initialize().await.unwrap();
    fixture.engine.handle_first_load().await.unwrap();

    assert_eq!(fixture.engine.load_cells().await.unwrap(), remote_cells);
    assert_eq!(fixture.local.load_cells().await.unwrap(), remote_cells);
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Synced
    );

    // Both local markers adopted the remote tag.
    assert_eq!(
        local_scalar(&fixture.local, &local_version_key("grid_cells")).await,
        Some(remote_tag.as_str().to_string())
    );
    assert_eq!(
        local_scalar(&fixture.local, &synced_version_key("grid_cells")).await,
        Some(remote_tag.as_str().to_string())
    );
}

// ========== Scenarios C & D: genuine conflicts ==========

/// Local: 3 cells with unsynced edits. Remote: 7 cells under a tag the
/// local synced marker has never seen.
async fn make_conflict_fixture() -> (Fixture, Vec<Cell>, Vec<Cell>) {
    let fixture = make_fixture(true, quick_config());

    let local_cells = make_cells(3);
    fixture.local.save_cells(&local_cells).await.unwrap();
    fixture
        .local
        .set_scalar(&local_version_key("grid_cells"), "100-local001")
        .await
        .unwrap();
    fixture
        .local
        .set_scalar(&synced_version_key("grid_cells"), "90-previous0")
        .await
        .unwrap();

    let remote_cells = make_cells(7);
    seed_remote(&fixture.remote, &remote_cells).await;

    (fixture, local_cells, remote_cells)
}

#[tokio::test]
async fn scenario_c_conflict_resolved_keep_remote() {
    let (fixture, _local_cells, remote_cells) = make_conflict_fixture().await;

    let prompts = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&prompts);
    let (tx, mut rx) = mpsc::unbounded_channel::<(
        grid_sync::ConflictPrompt,
        oneshot::Sender<ConflictResolution>,
    )>();
    fixture
        .engine
        .set_conflict_prompt_handler(move |prompt, responder| {
            counted.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send((prompt, responder));
        });

    fixture.engine.initialize().await.unwrap();
    let first_load = {
        let engine = Arc::clone(&fixture.engine);
        tokio::spawn(async move { engine.handle_first_load().await })
    };

    let (prompt, responder) = rx.recv().await.unwrap();
    assert_eq!(prompt.local_cells, 3);
    assert_eq!(prompt.remote_cells, 7);

    // The engine is suspended in Conflict until the user answers.
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Conflict
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    assert!(!first_load.is_finished());

    responder.send(ConflictResolution::KeepRemote).unwrap();
    first_load.await.unwrap().unwrap();

    assert_eq!(fixture.engine.load_cells().await.unwrap(), remote_cells);
    assert_eq!(fixture.local.load_cells().await.unwrap(), remote_cells);

    let remote_tag = fixture.remote.get_version_tag().await.unwrap().unwrap();
    assert_eq!(
        local_scalar(&fixture.local, &local_version_key("grid_cells")).await,
        Some(remote_tag.as_str().to_string())
    );
    assert_eq!(
        local_scalar(&fixture.local, &synced_version_key("grid_cells")).await,
        Some(remote_tag.as_str().to_string())
    );
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Synced
    );
}

#[tokio::test]
async fn scenario_d_conflict_resolved_keep_local() {
    let (fixture, local_cells, _remote_cells) = make_conflict_fixture().await;

    fixture
        .engine
        .set_conflict_prompt_handler(move |_, responder| {
            let _ = responder.send(ConflictResolution::KeepLocal);
        });

    fixture.engine.initialize().await.unwrap();
    fixture.engine.handle_first_load().await.unwrap();

    // The remote collection became the 3 local cells.
    assert_eq!(fixture.remote.load_cells().await.unwrap(), local_cells);
    assert_eq!(fixture.api.document_count("user-1"), 4); // 3 cells + marker

    // All three markers converged on one tag.
    let remote_tag = fixture.remote.get_version_tag().await.unwrap().unwrap();
    assert_eq!(
        local_scalar(&fixture.local, &local_version_key("grid_cells")).await,
        Some(remote_tag.as_str().to_string())
    );
    assert_eq!(
        local_scalar(&fixture.local, &synced_version_key("grid_cells")).await,
        Some(remote_tag.as_str().to_string())
    );
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Synced
    );
}

// ========== Spurious-conflict elision ==========

#[tokio::test]
async fn empty_remote_elides_conflict_prompt() {
    let fixture = make_fixture(true, quick_config());

    // Local has unsynced edits and a synced marker the (empty) remote has
    // never seen: the markers diverge, but there is nothing to conflict
    // with.
    let local_cells = make_cells(2);
    fixture.local.save_cells(&local_cells).await.unwrap();
    fixture
        .local
        .set_scalar(&local_version_key("grid_cells"), "100-local001")
        .await
        .unwrap();
    let stale_tag = VersionTag::generate();
    fixture.remote.set_version_tag(&stale_tag).await.unwrap();

    let prompts = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&prompts);
    fixture.engine.set_conflict_prompt_handler(move |_, responder| {
        counted.fetch_add(1, Ordering::SeqCst);
        let _ = responder.send(ConflictResolution::KeepRemote);
    });

    fixture.engine.initialize().await.unwrap();
    fixture.engine.handle_first_load().await.unwrap();

    assert_eq!(prompts.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.remote.load_cells().await.unwrap(), local_cells);
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Synced
    );
}

// ========== Scenario E: background flush mid-debounce ==========

#[tokio::test]
async fn scenario_e_background_flush_persists_pending_write() {
    // A debounce window far longer than the test: without the forced
    // flush, nothing would reach the local store.
    let fixture = make_fixture(true, SyncConfig::default().with_debounce_ms(60_000));
    fixture.engine.initialize().await.unwrap();

    let cells = make_cells(4);
    fixture.engine.save_cells(cells.clone()).await.unwrap();
    assert!(fixture.local.load_cells().await.unwrap().is_empty());

    fixture.engine.flush_for_background().await.unwrap();
    assert_eq!(fixture.local.load_cells().await.unwrap(), cells);

    // Idempotent: a second flush does not rewrite.
    let writes_after_flush = fixture.local.cell_save_count();
    fixture.engine.flush_for_background().await.unwrap();
    assert_eq!(fixture.local.cell_save_count(), writes_after_flush);
}

// ========== Round-trip and push convergence ==========

#[tokio::test]
async fn save_then_load_roundtrips_full_collection() {
    let fixture = make_fixture(true, quick_config());
    fixture.engine.initialize().await.unwrap();

    let cells = make_cells(6);
    fixture.engine.save_cells(cells.clone()).await.unwrap();

    assert_eq!(fixture.engine.load_cells().await.unwrap(), cells);
    wait_for_state(&fixture.engine, SyncState::Synced).await;
    assert_eq!(fixture.local.load_cells().await.unwrap(), cells);
    assert_eq!(fixture.remote.load_cells().await.unwrap(), cells);
}

#[tokio::test]
async fn push_converges_local_synced_and_remote_tags() {
    let fixture = make_fixture(true, quick_config());
    fixture.engine.initialize().await.unwrap();

    fixture.engine.save_cells(make_cells(2)).await.unwrap();
    wait_for_state(&fixture.engine, SyncState::Synced).await;

    let remote_tag = fixture.remote.get_version_tag().await.unwrap().unwrap();
    let local_tag = local_scalar(&fixture.local, &local_version_key("grid_cells"))
        .await
        .unwrap();
    let synced_tag = local_scalar(&fixture.local, &synced_version_key("grid_cells"))
        .await
        .unwrap();

    assert_eq!(local_tag, synced_tag);
    assert_eq!(local_tag, remote_tag.as_str());
}

// ========== Push failure and periodic retry ==========

#[tokio::test]
async fn failed_push_recovers_via_retry_timer() {
    let fixture = make_fixture(
        true,
        SyncConfig::default()
            .with_debounce_ms(10)
            .with_retry_interval_secs(1),
    );
    fixture.engine.initialize().await.unwrap();

    fixture.api.set_failing(true);
    fixture.engine.save_cells(make_cells(2)).await.unwrap();

    // The opportunistic push fails; the save itself already succeeded and
    // the caller was never blocked on it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::LocalChanges
    );
    assert_eq!(fixture.api.document_count("user-1"), 0);

    // Remote comes back; the periodic retry converges without any further
    // caller involvement.
    fixture.api.set_failing(false);
    wait_for_state(&fixture.engine, SyncState::Synced).await;
    assert_eq!(fixture.remote.load_cells().await.unwrap().len(), 2);
}

// ========== Sign-out / sign-in lifecycle ==========

#[tokio::test]
async fn sign_out_keeps_local_edits_for_next_login() {
    let fixture = make_fixture(true, quick_config());
    fixture.engine.initialize().await.unwrap();
    fixture.engine.save_cells(make_cells(2)).await.unwrap();
    wait_for_state(&fixture.engine, SyncState::Synced).await;

    fixture.auth.sign_out();
    fixture.engine.save_cells(make_cells(3)).await.unwrap();
    fixture.engine.flush_for_background().await.unwrap();

    // Remote still holds the pre-sign-out copy.
    assert_eq!(fixture.api.document_count("user-1"), 3); // 2 cells + marker

    // On the next login the markers agree but local moved: push, no
    // prompt.
    fixture.auth.sign_in("user-1");
    fixture.engine.handle_first_load().await.unwrap();
    assert_eq!(fixture.remote.load_cells().await.unwrap().len(), 3);
    assert_eq!(
        fixture.engine.sync_status().await.unwrap().state,
        SyncState::Synced
    );
}
