use super::*;
use crate::error::ErrorKind;
use crate::resource::{
    NameValuePairList, ResourceData, ResourceGroupStatus, ResourceInfo, ResourceManager,
    ResourceState, DEFAULT_RESOURCE_GROUP_NAME,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const GENERAL: &str = DEFAULT_RESOURCE_GROUP_NAME;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct Uploads(AtomicUsize);

struct Asset {
    bytes: Vec<u8>,
}

impl ResourceData for Asset {
    type Context = Uploads;
    const RESOURCE_TYPE: &'static str = "Asset";
    const LOAD_ORDER: u32 = 10;

    fn create(_info: &ResourceInfo, _params: &NameValuePairList) -> Result<Self> {
        Ok(Asset { bytes: Vec::new() })
    }

    fn prepare_from_bytes(&mut self, _info: &ResourceInfo, bytes: Vec<u8>) -> Result<()> {
        self.bytes = bytes;
        Ok(())
    }

    fn load(&mut self, _info: &ResourceInfo, ctx: &Uploads) -> Result<()> {
        ctx.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unload(&mut self, _info: &ResourceInfo, _ctx: &Uploads) {
        self.bytes.clear();
    }

    fn calculate_size(&self) -> usize {
        self.bytes.len()
    }
}

type Completions = Arc<Mutex<Vec<(BackgroundProcessTicket, Option<ErrorKind>)>>>;

struct Recorder {
    completions: Completions,
}

impl ResourceBackgroundListener for Recorder {
    fn operation_completed(&mut self, ticket: BackgroundProcessTicket, result: &BackgroundProcessResult) {
        self.completions
            .lock()
            .unwrap()
            .push((ticket, result.error.as_ref().map(|e| e.kind())));
    }
}

struct Fixture {
    _dir: TempDir,
    groups: Arc<ResourceGroupManager>,
    assets: Arc<ResourceManager<Asset>>,
    completions: Completions,
}

impl Fixture {
    fn listener(&self) -> Option<Box<dyn ResourceBackgroundListener>> {
        Some(Box::new(Recorder { completions: self.completions.clone() }))
    }

    fn completed(&self) -> Vec<(BackgroundProcessTicket, Option<ErrorKind>)> {
        self.completions.lock().unwrap().clone()
    }

    fn state(&self, name: &str) -> ResourceState {
        self.assets.get_by_name(name, GENERAL).unwrap().state()
    }
}

/// `a.bin`, `b.bin`, `c.bin` created (unloaded) in `General`;
/// `missing.bin` created but absent from disk
fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    for name in ["a.bin", "b.bin", "c.bin"] {
        fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }
    let groups = Arc::new(ResourceGroupManager::new());
    groups
        .add_resource_location(dir.path().to_str().unwrap(), "FileSystem", GENERAL, false)
        .unwrap();
    let assets = Arc::new(ResourceManager::<Asset>::new(
        groups.registry().clone(),
        Arc::new(Uploads::default()),
    ));
    groups.register_resource_manager(assets.clone());
    for name in ["a.bin", "b.bin", "c.bin", "missing.bin"] {
        assets.create(name, GENERAL, false, None, None).unwrap();
    }
    Fixture {
        _dir: dir,
        groups,
        assets,
        completions: Arc::new(Mutex::new(Vec::new())),
    }
}

// ============================================================================
// Completion order
// ============================================================================

#[test]
fn test_inline_loads_complete_in_submission_order() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 0).unwrap();

    let tickets: Vec<_> = ["a.bin", "b.bin", "c.bin"]
        .iter()
        .map(|name| queue.load("Asset", name, GENERAL, f.listener()).unwrap())
        .collect();
    assert!(tickets.iter().all(|t| !queue.is_process_complete(*t)));
    assert_eq!(f.state("a.bin"), ResourceState::Unloaded);

    assert_eq!(queue.process_responses(), 3);

    let expected: Vec<_> = tickets.iter().map(|t| (*t, None)).collect();
    assert_eq!(f.completed(), expected);
    assert!(tickets.iter().all(|t| queue.is_process_complete(*t)));
    for name in ["a.bin", "b.bin", "c.bin"] {
        assert_eq!(f.state(name), ResourceState::Loaded);
    }
}

#[test]
fn test_worker_loads_complete_in_submission_order() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 1).unwrap();

    let tickets: Vec<_> = ["a.bin", "b.bin", "c.bin"]
        .iter()
        .map(|name| queue.load("Asset", name, GENERAL, f.listener()).unwrap())
        .collect();
    assert!(queue.wait_for_idle(Duration::from_secs(5)));

    let expected: Vec<_> = tickets.iter().map(|t| (*t, None)).collect();
    assert_eq!(f.completed(), expected);
    assert_eq!(f.assets.context().0.load(Ordering::SeqCst), 3);
    for name in ["a.bin", "b.bin", "c.bin"] {
        assert_eq!(f.state(name), ResourceState::Loaded);
    }
    queue.shutdown();
}

// ============================================================================
// Failures and abort
// ============================================================================

#[test]
fn test_failed_load_reports_error_and_stays_unloaded() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 1).unwrap();

    let ticket = queue.load("Asset", "missing.bin", GENERAL, f.listener()).unwrap();
    assert!(queue.wait_for_idle(Duration::from_secs(5)));

    assert_eq!(f.completed(), vec![(ticket, Some(ErrorKind::FileNotFound))]);
    assert_eq!(f.state("missing.bin"), ResourceState::Unloaded);
}

#[test]
fn test_unknown_resource_type_is_item_not_found() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 0).unwrap();
    let ticket = queue.load("Nope", "a.bin", GENERAL, f.listener()).unwrap();
    queue.process_responses();
    assert_eq!(f.completed(), vec![(ticket, Some(ErrorKind::ItemNotFound))]);
}

#[test]
fn test_abort_skips_work_but_notifies_success() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 0).unwrap();

    let aborted = queue.load("Asset", "a.bin", GENERAL, f.listener()).unwrap();
    let kept = queue.load("Asset", "b.bin", GENERAL, f.listener()).unwrap();
    queue.abort(aborted);
    queue.process_responses();

    assert_eq!(f.completed(), vec![(aborted, None), (kept, None)]);
    assert_eq!(f.state("a.bin"), ResourceState::Unloaded);
    assert_eq!(f.state("b.bin"), ResourceState::Loaded);
}

#[test]
fn test_shutdown_rejects_new_requests() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 1).unwrap();
    queue.shutdown();
    let err = queue.load("Asset", "a.bin", GENERAL, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

// ============================================================================
// Other operations
// ============================================================================

#[test]
fn test_prepare_does_not_load() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 1).unwrap();
    queue.prepare("Asset", "a.bin", GENERAL, None).unwrap();
    assert!(queue.wait_for_idle(Duration::from_secs(5)));

    assert_eq!(f.state("a.bin"), ResourceState::Prepared);
    assert_eq!(f.assets.context().0.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unload_after_load() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 0).unwrap();
    queue.load("Asset", "a.bin", GENERAL, None).unwrap();
    queue.unload("Asset", "a.bin", GENERAL, None).unwrap();
    queue.process_responses();
    assert_eq!(f.state("a.bin"), ResourceState::Unloaded);
}

#[test]
fn test_group_requests() {
    let f = setup();
    f.assets.remove_by_name("missing.bin", GENERAL).unwrap();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 1).unwrap();

    let load = queue.load_resource_group(GENERAL, f.listener()).unwrap();
    assert!(queue.wait_for_idle(Duration::from_secs(5)));
    assert_eq!(f.groups.resource_group_status(GENERAL), Some(ResourceGroupStatus::Loaded));
    assert_eq!(f.assets.memory_usage(), 15);

    let unload = queue.unload_resource_group(GENERAL, f.listener()).unwrap();
    assert!(queue.wait_for_idle(Duration::from_secs(5)));
    assert_eq!(f.assets.memory_usage(), 0);
    assert_eq!(f.completed(), vec![(load, None), (unload, None)]);
}

#[test]
fn test_listener_is_optional() {
    let f = setup();
    let mut queue = ResourceBackgroundQueue::new(f.groups.clone(), 0).unwrap();
    let ticket = queue.initialise_resource_group(GENERAL, None).unwrap();
    queue.process_responses();
    assert!(queue.is_process_complete(ticket));
    assert!(f.completed().is_empty());
}
