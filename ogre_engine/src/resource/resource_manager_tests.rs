use super::*;
use crate::error::ErrorKind;
use crate::resource::{ResourceGroupManager, DEFAULT_RESOURCE_GROUP_NAME};
use std::fs;
use std::sync::atomic::AtomicUsize;
use tempfile::TempDir;

const GENERAL: &str = DEFAULT_RESOURCE_GROUP_NAME;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct BlobContext {
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

/// Payload holding the raw file bytes; `extra` pads the reported size
struct Blob {
    bytes: Vec<u8>,
    extra: usize,
    loaded: bool,
}

impl ResourceData for Blob {
    type Context = BlobContext;
    const RESOURCE_TYPE: &'static str = "Blob";
    const LOAD_ORDER: u32 = 10;

    fn create(_info: &ResourceInfo, params: &NameValuePairList) -> Result<Self> {
        let extra = params.get("extra").and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok(Blob { bytes: Vec::new(), extra, loaded: false })
    }

    fn prepare_from_bytes(&mut self, _info: &ResourceInfo, bytes: Vec<u8>) -> Result<()> {
        self.bytes = bytes;
        Ok(())
    }

    fn load(&mut self, _info: &ResourceInfo, ctx: &BlobContext) -> Result<()> {
        ctx.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self, _info: &ResourceInfo, ctx: &BlobContext) {
        if self.loaded {
            ctx.unloads.fetch_add(1, Ordering::SeqCst);
        }
        self.loaded = false;
        self.bytes.clear();
    }

    fn calculate_size(&self) -> usize {
        self.bytes.len() + self.extra
    }
}

/// Builds the payload in code and counts calls
struct BlobBuilder {
    calls: AtomicUsize,
}

impl ManualResourceLoader<Blob> for BlobBuilder {
    fn load_resource(&self, _info: &ResourceInfo, data: &mut Blob, _ctx: &BlobContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        data.bytes = b"built".to_vec();
        Ok(())
    }
}

/// Upper-cases `.txt` files
struct UpperCaseLoader;

impl AssetLoader<Blob> for UpperCaseLoader {
    fn extensions(&self) -> &[&str] {
        &["txt"]
    }

    fn decode(&self, _info: &ResourceInfo, bytes: &[u8], data: &mut Blob) -> Result<()> {
        data.bytes = bytes.to_ascii_uppercase();
        Ok(())
    }
}

struct AlwaysReplace;

impl ResourceCollisionListener for AlwaysReplace {
    fn resource_collision(&self, _name: &str, _group: &str, _resource_type: &str) -> CollisionResolution {
        CollisionResolution::Replace
    }
}

/// Manager over a temp dir registered as a `General` location holding
/// `a.bin`, `b.bin`, `c.bin` (10 bytes each) and `note.txt`
fn setup() -> (TempDir, ResourceGroupManager, ResourceManager<Blob>) {
    let dir = TempDir::new().unwrap();
    for name in ["a.bin", "b.bin", "c.bin"] {
        fs::write(dir.path().join(name), [7u8; 10]).unwrap();
    }
    fs::write(dir.path().join("note.txt"), b"hello").unwrap();

    let groups = ResourceGroupManager::new();
    groups
        .add_resource_location(dir.path().to_str().unwrap(), "FileSystem", GENERAL, false)
        .unwrap();
    let manager = ResourceManager::new(groups.registry().clone(), Arc::new(BlobContext::default()));
    (dir, groups, manager)
}

// ============================================================================
// Creation and lookup
// ============================================================================

#[test]
fn test_create_then_get_by_name_returns_same_resource() {
    let (_dir, _groups, manager) = setup();
    let created = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let found = manager.get_by_name("a.bin", GENERAL).unwrap();

    assert_eq!(created, found);
    assert_eq!(found.name().as_deref(), Some("a.bin"));
    assert_eq!(found.state(), ResourceState::Unloaded);
    assert_eq!(manager.get_by_handle(created.handle()), Some(created));
}

#[test]
fn test_handles_are_unique() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let b = manager.create("b.bin", GENERAL, false, None, None).unwrap();
    assert_ne!(a.handle(), b.handle());
    assert_eq!(manager.resource_count(), 2);
}

#[test]
fn test_create_duplicate_is_rejected() {
    let (_dir, _groups, manager) = setup();
    let _a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let err = manager.create("a.bin", GENERAL, false, None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateItem);
    assert_eq!(manager.resource_count(), 1);
}

#[test]
fn test_same_name_in_other_group_is_allowed() {
    let (_dir, groups, manager) = setup();
    groups.create_resource_group("Level1", true).unwrap();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let b = manager.create("a.bin", "Level1", false, None, None).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_collision_listener_can_replace() {
    let (_dir, _groups, manager) = setup();
    manager.set_collision_listener(Some(Arc::new(AlwaysReplace)));
    let first = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let second = manager.create("a.bin", GENERAL, false, None, None).unwrap();

    assert!(!first.is_alive());
    assert!(second.is_alive());
    assert_eq!(manager.get_by_name("a.bin", GENERAL), Some(second));
}

#[test]
fn test_create_rejects_empty_name_and_autodetect_group() {
    let (_dir, _groups, manager) = setup();
    let err = manager.create("", GENERAL, false, None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    let err = manager
        .create("a.bin", AUTODETECT_RESOURCE_GROUP_NAME, false, None, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
}

#[test]
fn test_create_or_retrieve() {
    let (_dir, _groups, manager) = setup();
    let (first, created) = manager.create_or_retrieve("a.bin", GENERAL, false, None, None).unwrap();
    assert!(created);
    let (second, created) = manager.create_or_retrieve("a.bin", GENERAL, false, None, None).unwrap();
    assert!(!created);
    assert_eq!(first, second);
}

#[test]
fn test_autodetect_prefers_global_pool_groups() {
    let (_dir, groups, manager) = setup();
    groups.create_resource_group("Alpha", false).unwrap();
    let _local = manager.create("shared", "Alpha", false, None, None).unwrap();
    let global = manager.create("shared", GENERAL, false, None, None).unwrap();

    let found = manager.get_by_name("shared", AUTODETECT_RESOURCE_GROUP_NAME).unwrap();
    assert_eq!(found, global);
}

#[test]
fn test_names_in_group_in_creation_order() {
    let (_dir, _groups, manager) = setup();
    for name in ["c.bin", "a.bin", "b.bin"] {
        manager.create(name, GENERAL, false, None, None).unwrap();
    }
    assert_eq!(manager.names_in_group(GENERAL), vec!["c.bin", "a.bin", "b.bin"]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_load_reads_file_and_is_idempotent() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();

    manager.load(&a).unwrap();
    manager.load(&a).unwrap();

    let resource = a.upgrade().unwrap();
    assert_eq!(resource.state(), ResourceState::Loaded);
    assert_eq!(resource.size(), 10);
    assert_eq!(manager.context().loads.load(Ordering::SeqCst), 1);
    assert_eq!(manager.memory_usage(), 10);
}

#[test]
fn test_load_missing_file_fails_and_stays_unloaded() {
    let (_dir, _groups, manager) = setup();
    let missing = manager.create("missing.bin", GENERAL, false, None, None).unwrap();

    let err = manager.load(&missing).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert_eq!(missing.state(), ResourceState::Unloaded);
    assert_eq!(missing.upgrade().unwrap().size(), 0);
}

#[test]
fn test_prepare_then_load_uses_prepared_bytes() {
    let (dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();

    manager.prepare(&a).unwrap();
    assert_eq!(a.state(), ResourceState::Prepared);
    assert_eq!(manager.context().loads.load(Ordering::SeqCst), 0);

    fs::remove_file(dir.path().join("a.bin")).unwrap();
    manager.load(&a).unwrap();
    assert_eq!(a.state(), ResourceState::Loaded);
    assert_eq!(a.upgrade().unwrap().size(), 10);
}

#[test]
fn test_unload_keeps_resource_registered() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    manager.load(&a).unwrap();
    manager.unload(&a).unwrap();

    assert_eq!(a.state(), ResourceState::Unloaded);
    assert!(manager.resource_exists("a.bin", GENERAL));
    assert_eq!(manager.memory_usage(), 0);
    assert_eq!(manager.context().unloads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reload_only_when_loaded() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    manager.reload(&a).unwrap();
    assert_eq!(a.state(), ResourceState::Unloaded);

    manager.load(&a).unwrap();
    manager.reload(&a).unwrap();
    assert_eq!(a.state(), ResourceState::Loaded);
    assert_eq!(manager.context().loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_asset_loader_chosen_by_extension() {
    let (_dir, _groups, manager) = setup();
    manager.register_asset_loader(Arc::new(UpperCaseLoader));
    let note = manager.create("note.txt", GENERAL, false, None, None).unwrap();
    manager.load(&note).unwrap();

    let resource = note.upgrade().unwrap();
    assert_eq!(resource.data().unwrap().bytes, b"HELLO");
}

#[test]
fn test_creation_params_reach_payload() {
    let (_dir, _groups, manager) = setup();
    let params: NameValuePairList = [("extra".to_string(), "5".to_string())].into_iter().collect();
    let a = manager.create("a.bin", GENERAL, false, None, Some(&params)).unwrap();
    manager.load(&a).unwrap();
    let resource = a.upgrade().unwrap();
    assert_eq!(resource.size(), 15);
    assert_eq!(resource.params().get("extra").map(String::as_str), Some("5"));
}

#[test]
fn test_concurrent_loads_load_once() {
    let (_dir, _groups, manager) = setup();
    let manager = Arc::new(manager);
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.load_by_name("a.bin", GENERAL).unwrap())
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(a.state(), ResourceState::Loaded);
    assert_eq!(manager.context().loads.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Manual resources
// ============================================================================

#[test]
fn test_manual_loader_builds_payload_and_reloads() {
    let (_dir, _groups, manager) = setup();
    let builder = Arc::new(BlobBuilder { calls: AtomicUsize::new(0) });
    let procedural = manager
        .create("procedural", GENERAL, true, Some(builder.clone()), None)
        .unwrap();

    manager.load(&procedural).unwrap();
    let resource = procedural.upgrade().unwrap();
    assert!(resource.is_reloadable());
    assert_eq!(resource.size(), 5);

    manager.reload(&procedural).unwrap();
    assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(resource.data().unwrap().bytes, b"built");
}

#[test]
fn test_manual_without_loader_is_never_unloaded_by_bulk_calls() {
    let (_dir, _groups, manager) = setup();
    let manual = manager.create("manual", GENERAL, true, None, None).unwrap();
    manager.load(&manual).unwrap();
    assert!(!manual.upgrade().unwrap().is_reloadable());

    manager.unload_all(true);
    assert_eq!(manual.state(), ResourceState::Loaded);
    manager.unload_all(false);
    assert_eq!(manual.state(), ResourceState::Unloaded);
}

// ============================================================================
// References and removal
// ============================================================================

#[test]
fn test_reference_count_follows_refs() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let resource = a.upgrade().unwrap();
    assert_eq!(resource.reference_count(), 1);

    let copy = a.clone();
    assert_eq!(resource.reference_count(), 2);
    drop(copy);
    drop(a);
    assert_eq!(resource.reference_count(), 0);
}

#[test]
fn test_remove_invalidates_refs() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    manager.load(&a).unwrap();

    manager.remove(&a).unwrap();
    assert!(!a.is_alive());
    assert!(a.upgrade().is_none());
    assert_eq!(a.state(), ResourceState::Unloaded);
    assert!(!manager.resource_exists("a.bin", GENERAL));
    assert_eq!(manager.context().unloads.load(Ordering::SeqCst), 1);

    let err = manager.load(&a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
}

#[test]
fn test_remove_unknown_is_item_not_found() {
    let (_dir, _groups, manager) = setup();
    let err = manager.remove_by_name("nothing", GENERAL).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
}

#[test]
fn test_remove_all() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    manager.create("b.bin", GENERAL, false, None, None).unwrap();
    manager.remove_all();
    assert_eq!(manager.resource_count(), 0);
    assert!(!a.is_alive());
}

#[test]
fn test_unload_unreferenced_resources() {
    let (_dir, _groups, manager) = setup();
    let held = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    manager.create("b.bin", GENERAL, false, None, None).unwrap();
    manager.load_by_name("a.bin", GENERAL).unwrap();
    manager.load_by_name("b.bin", GENERAL).unwrap();

    manager.unload_unreferenced_resources(true);

    assert_eq!(held.state(), ResourceState::Loaded);
    assert_eq!(
        manager.get_by_name("b.bin", GENERAL).unwrap().state(),
        ResourceState::Unloaded
    );
}

// ============================================================================
// Budget
// ============================================================================

#[test]
fn test_budget_unloads_unreferenced_first() {
    let (_dir, _groups, manager) = setup();
    manager.set_memory_budget(25);
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    manager.create("b.bin", GENERAL, false, None, None).unwrap();
    let c = manager.create("c.bin", GENERAL, false, None, None).unwrap();

    manager.load(&a).unwrap();
    manager.load_by_name("b.bin", GENERAL).unwrap();
    manager.load(&c).unwrap();

    // b is the only resource without a live ref
    assert_eq!(manager.get_by_name("b.bin", GENERAL).unwrap().state(), ResourceState::Unloaded);
    assert_eq!(a.state(), ResourceState::Loaded);
    assert_eq!(c.state(), ResourceState::Loaded);
    assert!(manager.memory_usage() <= 25);
}

#[test]
fn test_budget_unloads_least_recently_used_first() {
    let (_dir, _groups, manager) = setup();
    let a = manager.create("a.bin", GENERAL, false, None, None).unwrap();
    let b = manager.create("b.bin", GENERAL, false, None, None).unwrap();
    let c = manager.create("c.bin", GENERAL, false, None, None).unwrap();
    manager.load(&a).unwrap();
    manager.load(&b).unwrap();
    manager.load(&c).unwrap();
    manager.touch(&a);

    manager.set_memory_budget(20);

    assert_eq!(b.state(), ResourceState::Unloaded);
    assert_eq!(a.state(), ResourceState::Loaded);
    assert_eq!(c.state(), ResourceState::Loaded);
}

#[test]
fn test_budget_never_unloads_non_reloadable() {
    let (_dir, _groups, manager) = setup();
    let params: NameValuePairList = [("extra".to_string(), "100".to_string())].into_iter().collect();
    let manual = manager.create("manual", GENERAL, true, None, Some(&params)).unwrap();
    manager.load(&manual).unwrap();

    manager.set_memory_budget(10);

    assert_eq!(manual.state(), ResourceState::Loaded);
    assert_eq!(manager.memory_usage(), 100);
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn test_load_group_reports_each_resource() {
    let (_dir, _groups, manager) = setup();
    for name in ["b.bin", "a.bin"] {
        manager.create(name, GENERAL, false, None, None).unwrap();
    }
    let mut loaded = Vec::new();
    manager.load_group(GENERAL, &mut |name: &str| loaded.push(name.to_string())).unwrap();
    assert_eq!(loaded, vec!["b.bin", "a.bin"]);

    manager.unload_group(GENERAL, false);
    assert_eq!(manager.memory_usage(), 0);

    manager.remove_group(GENERAL);
    assert_eq!(manager.resource_count(), 0);
}
