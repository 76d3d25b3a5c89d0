use super::*;
use crate::error::ErrorKind;
use crate::resource::{ResourceData, ResourceInfo, ResourceManager, ResourceState};
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// Shared record of loads, in order
#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Reads its file; loaded early
struct Early {
    bytes: Vec<u8>,
}

impl ResourceData for Early {
    type Context = Journal;
    const RESOURCE_TYPE: &'static str = "Early";
    const LOAD_ORDER: u32 = 10;

    fn create(_info: &ResourceInfo, _params: &NameValuePairList) -> Result<Self> {
        Ok(Early { bytes: Vec::new() })
    }

    fn prepare_from_bytes(&mut self, _info: &ResourceInfo, bytes: Vec<u8>) -> Result<()> {
        self.bytes = bytes;
        Ok(())
    }

    fn load(&mut self, info: &ResourceInfo, ctx: &Journal) -> Result<()> {
        ctx.0.lock().unwrap().push(format!("Early:{}", info.name));
        Ok(())
    }

    fn unload(&mut self, _info: &ResourceInfo, _ctx: &Journal) {
        self.bytes.clear();
    }

    fn calculate_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Built in code; loaded late
struct Late;

impl ResourceData for Late {
    type Context = Journal;
    const RESOURCE_TYPE: &'static str = "Late";
    const LOAD_ORDER: u32 = 20;

    fn create(_info: &ResourceInfo, _params: &NameValuePairList) -> Result<Self> {
        Ok(Late)
    }

    fn source_file(&self, _info: &ResourceInfo) -> Option<String> {
        None
    }

    fn load(&mut self, info: &ResourceInfo, ctx: &Journal) -> Result<()> {
        ctx.0.lock().unwrap().push(format!("Late:{}", info.name));
        Ok(())
    }

    fn unload(&mut self, _info: &ResourceInfo, _ctx: &Journal) {}

    fn calculate_size(&self) -> usize {
        1
    }
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl ResourceGroupListener for RecordingListener {
    fn resource_group_load_started(&self, group: &str, resource_count: usize) {
        self.events.lock().unwrap().push(format!("start {} {}", group, resource_count));
    }

    fn resource_loaded(&self, resource_type: &str, name: &str) {
        self.events.lock().unwrap().push(format!("loaded {} {}", resource_type, name));
    }

    fn resource_group_load_ended(&self, group: &str) {
        self.events.lock().unwrap().push(format!("end {}", group));
    }
}

struct Fixture {
    dir: TempDir,
    groups: ResourceGroupManager,
    journal: Arc<Journal>,
    early: Arc<ResourceManager<Early>>,
    late: Arc<ResourceManager<Late>>,
}

impl Fixture {
    fn location(&self) -> String {
        self.dir.path().to_str().unwrap().to_string()
    }
}

/// Media dir with `ogre.png`, `basic.vert` and `models/ninja.mesh`;
/// both managers registered, `Late` first
fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ogre.png"), b"png").unwrap();
    fs::write(dir.path().join("basic.vert"), b"void main() {}").unwrap();
    fs::create_dir(dir.path().join("models")).unwrap();
    fs::write(dir.path().join("models").join("ninja.mesh"), b"mesh").unwrap();

    let groups = ResourceGroupManager::new();
    let journal = Arc::new(Journal::default());
    let early = Arc::new(ResourceManager::<Early>::new(groups.registry().clone(), journal.clone()));
    let late = Arc::new(ResourceManager::<Late>::new(groups.registry().clone(), journal.clone()));
    groups.register_resource_manager(late.clone());
    groups.register_resource_manager(early.clone());
    Fixture { dir, groups, journal, early, late }
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn test_builtin_groups_exist() {
    let groups = ResourceGroupManager::new();
    for name in [DEFAULT_RESOURCE_GROUP_NAME, INTERNAL_RESOURCE_GROUP_NAME, AUTODETECT_RESOURCE_GROUP_NAME] {
        assert!(groups.resource_group_exists(name));
        assert!(groups.is_resource_group_in_global_pool(name));
        assert_eq!(groups.resource_group_status(name), Some(ResourceGroupStatus::Uninitialised));
    }
}

#[test]
fn test_create_group_twice_is_duplicate() {
    let groups = ResourceGroupManager::new();
    groups.create_resource_group("Level1", false).unwrap();
    assert!(!groups.is_resource_group_in_global_pool("Level1"));
    let err = groups.create_resource_group("Level1", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateItem);
}

#[test]
fn test_search_order_puts_global_pool_first() {
    let groups = ResourceGroupManager::new();
    groups.create_resource_group("Aardvark", false).unwrap();
    groups.create_resource_group("Zebra", true).unwrap();
    assert_eq!(
        groups.registry().search_order(),
        vec!["Autodetect", "General", "Internal", "Zebra", "Aardvark"]
    );
}

#[test]
fn test_destroy_group_removes_its_resources() {
    let f = setup();
    f.groups.create_resource_group("Level1", true).unwrap();
    f.early.create("ogre.png", "Level1", false, None, None).unwrap();

    f.groups.destroy_resource_group("Level1").unwrap();

    assert!(!f.groups.resource_group_exists("Level1"));
    assert_eq!(f.early.resource_count(), 0);
}

#[test]
fn test_manager_lookup_by_type_and_load_order() {
    let f = setup();
    let types: Vec<_> = f.groups.resource_managers().iter().map(|m| m.resource_type()).collect();
    assert_eq!(types, vec!["Early", "Late"]);
    assert!(f.groups.resource_manager("Late").is_some());

    f.groups.unregister_resource_manager("Late");
    assert!(f.groups.resource_manager("Late").is_none());
}

// ============================================================================
// Locations
// ============================================================================

#[test]
fn test_add_location_and_open_resource() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();

    assert_eq!(f.groups.open_resource("ogre.png", DEFAULT_RESOURCE_GROUP_NAME).unwrap(), b"png");
    assert!(f.groups.resource_exists("basic.vert", DEFAULT_RESOURCE_GROUP_NAME));
    assert!(!f.groups.resource_exists("ninja.mesh", DEFAULT_RESOURCE_GROUP_NAME));
    assert_eq!(
        f.groups.resource_locations(DEFAULT_RESOURCE_GROUP_NAME),
        vec![ResourceLocationInfo {
            location: f.location(),
            archive_type: "FileSystem".to_string(),
            recursive: false,
        }]
    );
}

#[test]
fn test_add_location_creates_group_and_ignores_duplicates() {
    let f = setup();
    f.groups.add_resource_location(&f.location(), "FileSystem", "Popular", false).unwrap();
    f.groups.add_resource_location(&f.location(), "FileSystem", "Popular", false).unwrap();

    assert!(f.groups.resource_group_exists("Popular"));
    assert_eq!(f.groups.resource_locations("Popular").len(), 1);
}

#[test]
fn test_add_location_errors() {
    let f = setup();
    let err = f
        .groups
        .add_resource_location(&f.location(), "Zip", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);

    let missing = f.dir.path().join("nowhere");
    let err = f
        .groups
        .add_resource_location(missing.to_str().unwrap(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
}

#[test]
fn test_recursive_location_finds_nested_files_by_name() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, true)
        .unwrap();
    assert_eq!(f.groups.open_resource("ninja.mesh", DEFAULT_RESOURCE_GROUP_NAME).unwrap(), b"mesh");
    assert_eq!(
        f.groups.open_resource("models/ninja.mesh", DEFAULT_RESOURCE_GROUP_NAME).unwrap(),
        b"mesh"
    );
}

#[test]
fn test_remove_location() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();
    f.groups.remove_resource_location(&f.location(), DEFAULT_RESOURCE_GROUP_NAME).unwrap();
    assert!(!f.groups.resource_exists("ogre.png", DEFAULT_RESOURCE_GROUP_NAME));

    let err = f
        .groups
        .remove_resource_location(&f.location(), DEFAULT_RESOURCE_GROUP_NAME)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
}

#[test]
fn test_open_resource_errors() {
    let f = setup();
    let err = f.groups.open_resource("ogre.png", "NoSuchGroup").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
    let err = f.groups.open_resource("ogre.png", DEFAULT_RESOURCE_GROUP_NAME).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
}

#[test]
fn test_global_pool_groups_see_each_other() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();
    f.groups.create_resource_group("Shared", true).unwrap();
    f.groups.create_resource_group("Private", false).unwrap();

    assert!(f.groups.resource_exists("ogre.png", "Shared"));
    assert!(!f.groups.resource_exists("ogre.png", "Private"));
    assert!(f.groups.resource_exists("ogre.png", AUTODETECT_RESOURCE_GROUP_NAME));
}

#[test]
fn test_find_resource_names_and_containing_group() {
    let f = setup();
    f.groups.add_resource_location(&f.location(), "FileSystem", "Level1", true).unwrap();

    assert_eq!(f.groups.find_resource_names("Level1", "*.mesh"), vec!["models/ninja.mesh"]);
    assert_eq!(
        f.groups.find_resource_names("Level1", "*"),
        vec!["basic.vert", "models/ninja.mesh", "ogre.png"]
    );
    assert_eq!(f.groups.find_group_containing_resource("ogre.png").as_deref(), Some("Level1"));
    assert_eq!(f.groups.find_group_containing_resource("nothing.png"), None);
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_locations_from_config_round_trip() {
    let f = setup();
    let text = format!(
        "FileSystem={loc}\n[Level1]\nFileSystem={loc}/models\n",
        loc = f.location()
    );
    let config = ConfigFile::parse(&text);
    f.groups.add_locations_from_config(&config).unwrap();

    assert!(f.groups.resource_exists("ogre.png", DEFAULT_RESOURCE_GROUP_NAME));
    assert!(f.groups.resource_exists("ninja.mesh", "Level1"));

    let saved = f.groups.locations_to_config();
    assert_eq!(saved.get(DEFAULT_RESOURCE_GROUP_NAME, "FileSystem"), Some(f.location().as_str()));
    assert_eq!(
        saved.get("Level1", "FileSystem").map(str::to_string),
        Some(format!("{}/models", f.location()))
    );
}

// ============================================================================
// Declarations and group lifecycle
// ============================================================================

#[test]
fn test_initialise_creates_declared_resources() {
    let f = setup();
    f.groups
        .declare_resource("ogre.png", "Early", DEFAULT_RESOURCE_GROUP_NAME, NameValuePairList::new())
        .unwrap();
    f.groups
        .declare_resource("procedural", "Late", DEFAULT_RESOURCE_GROUP_NAME, NameValuePairList::new())
        .unwrap();

    f.groups.initialise_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();

    assert!(f.early.resource_exists("ogre.png", DEFAULT_RESOURCE_GROUP_NAME));
    assert!(f.late.resource_exists("procedural", DEFAULT_RESOURCE_GROUP_NAME));
    assert_eq!(
        f.groups.resource_group_status(DEFAULT_RESOURCE_GROUP_NAME),
        Some(ResourceGroupStatus::Initialised)
    );
}

#[test]
fn test_declare_errors() {
    let f = setup();
    let err = f
        .groups
        .declare_resource("x", "Early", "NoSuchGroup", NameValuePairList::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);

    f.groups
        .declare_resource("x", "Unknown", DEFAULT_RESOURCE_GROUP_NAME, NameValuePairList::new())
        .unwrap();
    let err = f.groups.initialise_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
}

#[test]
fn test_undeclare_resource() {
    let f = setup();
    f.groups
        .declare_resource("ogre.png", "Early", DEFAULT_RESOURCE_GROUP_NAME, NameValuePairList::new())
        .unwrap();
    f.groups.undeclare_resource("ogre.png", DEFAULT_RESOURCE_GROUP_NAME).unwrap();
    assert!(f.groups.declarations(DEFAULT_RESOURCE_GROUP_NAME).is_empty());
}

#[test]
fn test_load_group_follows_load_order() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();
    f.late.create("procedural", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();
    f.early.create("ogre.png", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();
    f.early.create("basic.vert", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();

    f.groups.load_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();

    assert_eq!(
        f.journal.entries(),
        vec!["Early:ogre.png", "Early:basic.vert", "Late:procedural"]
    );
    assert_eq!(
        f.groups.resource_group_status(DEFAULT_RESOURCE_GROUP_NAME),
        Some(ResourceGroupStatus::Loaded)
    );
}

#[test]
fn test_load_group_notifies_listeners() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();
    f.early.create("ogre.png", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();
    f.late.create("procedural", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();
    let listener = Arc::new(RecordingListener::default());
    f.groups.add_listener(listener.clone());

    f.groups.load_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();

    assert_eq!(
        *listener.events.lock().unwrap(),
        vec![
            "start General 2".to_string(),
            "loaded Early ogre.png".to_string(),
            "loaded Late procedural".to_string(),
            "end General".to_string(),
        ]
    );

    let as_dyn: Arc<dyn ResourceGroupListener> = listener.clone();
    f.groups.remove_listener(&as_dyn);
    f.groups.unload_resource_group(DEFAULT_RESOURCE_GROUP_NAME, false).unwrap();
    f.groups.load_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();
    assert_eq!(listener.events.lock().unwrap().len(), 4);
}

#[test]
fn test_load_group_failure_propagates() {
    let f = setup();
    f.early.create("missing.png", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();
    let err = f.groups.load_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert_ne!(
        f.groups.resource_group_status(DEFAULT_RESOURCE_GROUP_NAME),
        Some(ResourceGroupStatus::Loaded)
    );
}

#[test]
fn test_prepare_group_does_not_load() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();
    let png = f.early.create("ogre.png", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();

    f.groups.prepare_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();

    assert_eq!(png.state(), ResourceState::Prepared);
    assert!(f.journal.entries().is_empty());
    assert_eq!(
        f.groups.resource_group_status(DEFAULT_RESOURCE_GROUP_NAME),
        Some(ResourceGroupStatus::Prepared)
    );
}

#[test]
fn test_unload_and_clear_group() {
    let f = setup();
    f.groups
        .add_resource_location(&f.location(), "FileSystem", DEFAULT_RESOURCE_GROUP_NAME, false)
        .unwrap();
    let png = f.early.create("ogre.png", DEFAULT_RESOURCE_GROUP_NAME, false, None, None).unwrap();
    f.groups.load_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();

    f.groups.unload_resource_group(DEFAULT_RESOURCE_GROUP_NAME, false).unwrap();
    assert_eq!(png.state(), ResourceState::Unloaded);
    assert!(png.is_alive());
    assert_eq!(
        f.groups.resource_group_status(DEFAULT_RESOURCE_GROUP_NAME),
        Some(ResourceGroupStatus::Initialised)
    );

    f.groups.clear_resource_group(DEFAULT_RESOURCE_GROUP_NAME).unwrap();
    assert!(!png.is_alive());
    assert_eq!(
        f.groups.resource_group_status(DEFAULT_RESOURCE_GROUP_NAME),
        Some(ResourceGroupStatus::Uninitialised)
    );
}
