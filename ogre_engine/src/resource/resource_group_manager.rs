//! Resource groups, locations and declarations
//!
//! A group is a set of archive locations plus declared resources. Groups
//! are initialised (declared resources created), prepared, loaded and
//! unloaded as a unit; typed managers take part in ascending load order.
//!
//! The group table itself lives in a [`ResourceGroupRegistry`] shared with
//! every typed manager, which reads files through it. The
//! [`ResourceGroupManager`] owns the registry and the list of managers.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;

use crate::config::{ConfigFile, UNNAMED_SECTION};
use crate::error::{Error, Result};
use crate::resource::{
    Archive, ArchiveFactory, FileSystemArchiveFactory, NameValuePairList, ResourceManagerBase,
};
use crate::{engine_bail, engine_info, engine_trivial, engine_warn};

const SOURCE: &str = "ogre::ResourceGroupManager";

/// Group resources go to unless told otherwise
pub const DEFAULT_RESOURCE_GROUP_NAME: &str = "General";
/// Group for resources the engine creates for itself
pub const INTERNAL_RESOURCE_GROUP_NAME: &str = "Internal";
/// Pseudo-group: search every group
pub const AUTODETECT_RESOURCE_GROUP_NAME: &str = "Autodetect";

/// Progress of a group through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceGroupStatus {
    Uninitialised,
    Initialised,
    Prepared,
    Loaded,
}

/// A resource announced ahead of group initialisation
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    pub name: String,
    pub resource_type: String,
    pub params: NameValuePairList,
}

/// Description of one resource location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocationInfo {
    pub location: String,
    pub archive_type: String,
    pub recursive: bool,
}

struct ResourceLocation {
    archive: Arc<dyn Archive>,
    recursive: bool,
}

impl ResourceLocation {
    /// Path of `name` inside the archive, searching subdirectories when
    /// the location is recursive
    fn resolve(&self, name: &str) -> Option<String> {
        if self.archive.exists(name) {
            return Some(name.to_string());
        }
        if self.recursive && !name.contains('/') {
            return self.archive.find(name, true, false).into_iter().next();
        }
        None
    }
}

struct ResourceGroup {
    in_global_pool: bool,
    status: ResourceGroupStatus,
    locations: Vec<ResourceLocation>,
    declarations: Vec<ResourceDeclaration>,
}

impl ResourceGroup {
    fn new(in_global_pool: bool) -> Self {
        Self {
            in_global_pool,
            status: ResourceGroupStatus::Uninitialised,
            locations: Vec::new(),
            declarations: Vec::new(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Group table shared by the group manager and every typed manager
pub struct ResourceGroupRegistry {
    groups: RwLock<BTreeMap<String, ResourceGroup>>,
}

impl ResourceGroupRegistry {
    /// Registry with the `General`, `Internal` and `Autodetect` groups
    pub fn new() -> Self {
        let mut groups = BTreeMap::new();
        for name in [
            DEFAULT_RESOURCE_GROUP_NAME,
            INTERNAL_RESOURCE_GROUP_NAME,
            AUTODETECT_RESOURCE_GROUP_NAME,
        ] {
            groups.insert(name.to_string(), ResourceGroup::new(true));
        }
        Self { groups: RwLock::new(groups) }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, ResourceGroup>>> {
        self.groups
            .read()
            .map_err(|_| Error::InternalError("resource group table poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, ResourceGroup>>> {
        self.groups
            .write()
            .map_err(|_| Error::InternalError("resource group table poisoned".to_string()))
    }

    pub fn group_exists(&self, group: &str) -> bool {
        self.read().map(|g| g.contains_key(group)).unwrap_or(false)
    }

    pub fn is_in_global_pool(&self, group: &str) -> bool {
        self.read()
            .ok()
            .and_then(|g| g.get(group).map(|g| g.in_global_pool))
            .unwrap_or(false)
    }

    /// Group names, global-pool groups first, each part in name order
    pub fn search_order(&self) -> Vec<String> {
        let Ok(groups) = self.read() else {
            return Vec::new();
        };
        let global = groups.iter().filter(|(_, g)| g.in_global_pool).map(|(n, _)| n.clone());
        let local = groups.iter().filter(|(_, g)| !g.in_global_pool).map(|(n, _)| n.clone());
        global.chain(local).collect()
    }

    /// Groups to search for `group`: the group itself, then other
    /// global-pool groups when it is in the global pool
    fn candidate_groups(&self, group: &str) -> Vec<String> {
        if group == AUTODETECT_RESOURCE_GROUP_NAME {
            return self.search_order();
        }
        let mut candidates = vec![group.to_string()];
        if self.is_in_global_pool(group) {
            candidates.extend(
                self.search_order()
                    .into_iter()
                    .filter(|g| g != group && self.is_in_global_pool(g)),
            );
        }
        candidates
    }

    /// Archive holding `name` in `group`, with the path inside it
    fn locate(&self, name: &str, group: &str) -> Result<Option<(Arc<dyn Archive>, String)>> {
        let candidates = self.candidate_groups(group);
        let groups = self.read()?;
        for candidate in candidates {
            let Some(entry) = groups.get(&candidate) else {
                continue;
            };
            for location in &entry.locations {
                if let Some(path) = location.resolve(name) {
                    return Ok(Some((location.archive.clone(), path)));
                }
            }
        }
        Ok(None)
    }

    /// Read a whole file from the group's locations
    pub fn open_resource(&self, name: &str, group: &str) -> Result<Vec<u8>> {
        if group != AUTODETECT_RESOURCE_GROUP_NAME && !self.group_exists(group) {
            engine_bail!(SOURCE, ItemNotFound, "Resource group '{}' does not exist", group);
        }
        match self.locate(name, group)? {
            Some((archive, path)) => archive.open(&path),
            None => {
                engine_bail!(SOURCE, FileNotFound,
                    "Cannot locate resource '{}' in resource group '{}'", name, group);
            }
        }
    }

    pub fn resource_exists(&self, name: &str, group: &str) -> bool {
        self.locate(name, group).ok().flatten().is_some()
    }

    /// First group (in search order) whose locations hold `name`
    pub fn find_group_containing_resource(&self, name: &str) -> Option<String> {
        let order = self.search_order();
        let groups = self.read().ok()?;
        order.into_iter().find(|group| {
            groups
                .get(group)
                .map(|g| g.locations.iter().any(|l| l.resolve(name).is_some()))
                .unwrap_or(false)
        })
    }

    /// Files in `group` matching a glob pattern, sorted and deduplicated
    pub fn find_resource_names(&self, group: &str, pattern: &str) -> Vec<String> {
        let Ok(groups) = self.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = groups
            .get(group)
            .map(|g| {
                g.locations
                    .iter()
                    .flat_map(|l| l.archive.find(pattern, l.recursive, false))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }
}

impl Default for ResourceGroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Progress callbacks of group operations
pub trait ResourceGroupListener: Send + Sync {
    fn resource_group_prepare_started(&self, _group: &str, _resource_count: usize) {}

    fn resource_prepared(&self, _resource_type: &str, _name: &str) {}

    fn resource_group_prepare_ended(&self, _group: &str) {}

    fn resource_group_load_started(&self, _group: &str, _resource_count: usize) {}

    fn resource_loaded(&self, _resource_type: &str, _name: &str) {}

    fn resource_group_load_ended(&self, _group: &str) {}
}

// ============================================================================
// Manager
// ============================================================================

pub struct ResourceGroupManager {
    registry: Arc<ResourceGroupRegistry>,
    managers: RwLock<Vec<Arc<dyn ResourceManagerBase>>>,
    archive_factories: RwLock<FxHashMap<String, Arc<dyn ArchiveFactory>>>,
    listeners: RwLock<Vec<Arc<dyn ResourceGroupListener>>>,
}

impl ResourceGroupManager {
    pub fn new() -> Self {
        let manager = Self {
            registry: Arc::new(ResourceGroupRegistry::new()),
            managers: RwLock::new(Vec::new()),
            archive_factories: RwLock::new(FxHashMap::default()),
            listeners: RwLock::new(Vec::new()),
        };
        manager.add_archive_factory(Arc::new(FileSystemArchiveFactory));
        manager
    }

    /// Group table handed to typed managers
    pub fn registry(&self) -> &Arc<ResourceGroupRegistry> {
        &self.registry
    }

    pub fn add_archive_factory(&self, factory: Arc<dyn ArchiveFactory>) {
        if let Ok(mut factories) = self.archive_factories.write() {
            factories.insert(factory.archive_type().to_string(), factory);
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ResourceGroupListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ResourceGroupListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ResourceGroupListener>> {
        self.listeners.read().map(|l| l.clone()).unwrap_or_default()
    }

    // ===== MANAGERS =====

    /// Add a typed manager; groups load managers in ascending load order
    pub fn register_resource_manager(&self, manager: Arc<dyn ResourceManagerBase>) {
        if let Ok(mut managers) = self.managers.write() {
            managers.retain(|m| m.resource_type() != manager.resource_type());
            engine_trivial!(SOURCE, "Registering ResourceManager for type {}", manager.resource_type());
            managers.push(manager);
            managers.sort_by_key(|m| m.load_order());
        }
    }

    pub fn unregister_resource_manager(&self, resource_type: &str) {
        if let Ok(mut managers) = self.managers.write() {
            managers.retain(|m| m.resource_type() != resource_type);
        }
    }

    pub fn resource_manager(&self, resource_type: &str) -> Option<Arc<dyn ResourceManagerBase>> {
        self.managers
            .read()
            .ok()?
            .iter()
            .find(|m| m.resource_type() == resource_type)
            .cloned()
    }

    /// Registered managers in load order
    pub fn resource_managers(&self) -> Vec<Arc<dyn ResourceManagerBase>> {
        self.managers.read().map(|m| m.clone()).unwrap_or_default()
    }

    fn manager_for(&self, resource_type: &str) -> Result<Arc<dyn ResourceManagerBase>> {
        match self.resource_manager(resource_type) {
            Some(manager) => Ok(manager),
            None => Err(crate::engine_err!(SOURCE, ItemNotFound,
                "No ResourceManager registered for type '{}'", resource_type)),
        }
    }

    // ===== GROUPS =====

    pub fn create_resource_group(&self, name: &str, in_global_pool: bool) -> Result<()> {
        let mut groups = self.registry.write()?;
        if groups.contains_key(name) {
            engine_bail!(SOURCE, DuplicateItem, "Resource group '{}' already exists", name);
        }
        groups.insert(name.to_string(), ResourceGroup::new(in_global_pool));
        drop(groups);
        engine_trivial!(SOURCE, "Created resource group '{}'", name);
        Ok(())
    }

    /// Clear a group's resources and forget the group
    pub fn destroy_resource_group(&self, name: &str) -> Result<()> {
        self.clear_resource_group(name)?;
        self.registry.write()?.remove(name);
        engine_trivial!(SOURCE, "Destroyed resource group '{}'", name);
        Ok(())
    }

    pub fn resource_group_exists(&self, name: &str) -> bool {
        self.registry.group_exists(name)
    }

    pub fn is_resource_group_in_global_pool(&self, name: &str) -> bool {
        self.registry.is_in_global_pool(name)
    }

    pub fn resource_groups(&self) -> Vec<String> {
        self.registry.read().map(|g| g.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn resource_group_status(&self, name: &str) -> Option<ResourceGroupStatus> {
        self.registry.read().ok()?.get(name).map(|g| g.status)
    }

    fn set_status(&self, name: &str, status: ResourceGroupStatus) -> Result<()> {
        if let Some(group) = self.registry.write()?.get_mut(name) {
            group.status = status;
        }
        Ok(())
    }

    fn require_group(&self, name: &str) -> Result<ResourceGroupStatus> {
        match self.resource_group_status(name) {
            Some(status) => Ok(status),
            None => Err(crate::engine_err!(SOURCE, ItemNotFound,
                "Resource group '{}' does not exist", name)),
        }
    }

    // ===== LOCATIONS =====

    /// Add an archive location to a group, creating the group if needed
    pub fn add_resource_location(
        &self,
        location: &str,
        archive_type: &str,
        group: &str,
        recursive: bool,
    ) -> Result<()> {
        let factory = self
            .archive_factories
            .read()
            .ok()
            .and_then(|f| f.get(archive_type).cloned());
        let Some(factory) = factory else {
            engine_bail!(SOURCE, ItemNotFound, "No archive factory for type '{}'", archive_type);
        };
        let archive: Arc<dyn Archive> = Arc::from(factory.create_archive(location)?);

        let mut groups = self.registry.write()?;
        let entry = groups
            .entry(group.to_string())
            .or_insert_with(|| ResourceGroup::new(true));
        if entry.locations.iter().any(|l| l.archive.name() == location) {
            engine_warn!(SOURCE, "Location '{}' already in resource group '{}'", location, group);
            return Ok(());
        }
        entry.locations.push(ResourceLocation { archive, recursive });
        drop(groups);
        engine_info!(SOURCE, "Added resource location '{}' of type '{}' to resource group '{}'{}",
            location, archive_type, group, if recursive { " with recursive option" } else { "" });
        Ok(())
    }

    pub fn remove_resource_location(&self, location: &str, group: &str) -> Result<()> {
        let mut groups = self.registry.write()?;
        let Some(entry) = groups.get_mut(group) else {
            engine_bail!(SOURCE, ItemNotFound, "Resource group '{}' does not exist", group);
        };
        let before = entry.locations.len();
        entry.locations.retain(|l| l.archive.name() != location);
        if entry.locations.len() == before {
            engine_bail!(SOURCE, ItemNotFound,
                "Location '{}' is not part of resource group '{}'", location, group);
        }
        Ok(())
    }

    pub fn resource_locations(&self, group: &str) -> Vec<ResourceLocationInfo> {
        self.registry
            .read()
            .ok()
            .and_then(|g| {
                g.get(group).map(|g| {
                    g.locations
                        .iter()
                        .map(|l| ResourceLocationInfo {
                            location: l.archive.name().to_string(),
                            archive_type: l.archive.archive_type().to_string(),
                            recursive: l.recursive,
                        })
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// Add every `type=location` entry; sections name groups
    pub fn add_locations_from_config(&self, config: &ConfigFile) -> Result<()> {
        for section in config.sections() {
            let group = if section == UNNAMED_SECTION {
                DEFAULT_RESOURCE_GROUP_NAME
            } else {
                section
            };
            for (archive_type, location) in config.section(section) {
                self.add_resource_location(location, archive_type, group, false)?;
            }
        }
        Ok(())
    }

    /// Every group with locations as a `resources.cfg` style file
    pub fn locations_to_config(&self) -> ConfigFile {
        let mut config = ConfigFile::new();
        for group in self.resource_groups() {
            for location in self.resource_locations(&group) {
                config.add(&group, &location.archive_type, &location.location);
            }
        }
        config
    }

    // ===== DECLARATIONS =====

    pub fn declare_resource(
        &self,
        name: &str,
        resource_type: &str,
        group: &str,
        params: NameValuePairList,
    ) -> Result<()> {
        let mut groups = self.registry.write()?;
        let Some(entry) = groups.get_mut(group) else {
            engine_bail!(SOURCE, ItemNotFound, "Resource group '{}' does not exist", group);
        };
        entry.declarations.push(ResourceDeclaration {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            params,
        });
        Ok(())
    }

    pub fn undeclare_resource(&self, name: &str, group: &str) -> Result<()> {
        let mut groups = self.registry.write()?;
        if let Some(entry) = groups.get_mut(group) {
            entry.declarations.retain(|d| d.name != name);
        }
        Ok(())
    }

    pub fn declarations(&self, group: &str) -> Vec<ResourceDeclaration> {
        self.registry
            .read()
            .ok()
            .and_then(|g| g.get(group).map(|g| g.declarations.clone()))
            .unwrap_or_default()
    }

    // ===== GROUP LIFECYCLE =====

    /// Create every declared resource (unloaded) in its manager
    pub fn initialise_resource_group(&self, group: &str) -> Result<()> {
        if self.require_group(group)? != ResourceGroupStatus::Uninitialised {
            return Ok(());
        }
        engine_info!(SOURCE, "Initialising resource group '{}'", group);
        for declaration in self.declarations(group) {
            let manager = self.manager_for(&declaration.resource_type)?;
            manager.create_declared(&declaration.name, group, &declaration.params)?;
        }
        self.set_status(group, ResourceGroupStatus::Initialised)
    }

    pub fn initialise_all_resource_groups(&self) -> Result<()> {
        for group in self.resource_groups() {
            if group != AUTODETECT_RESOURCE_GROUP_NAME {
                self.initialise_resource_group(&group)?;
            }
        }
        Ok(())
    }

    fn group_resource_count(&self, group: &str) -> usize {
        self.resource_managers()
            .iter()
            .map(|m| m.names_in_group(group).len())
            .sum()
    }

    /// Prepare every resource of the group, managers in load order
    pub fn prepare_resource_group(&self, group: &str) -> Result<()> {
        self.initialise_resource_group(group)?;
        let listeners = self.listeners();
        let count = self.group_resource_count(group);
        listeners.iter().for_each(|l| l.resource_group_prepare_started(group, count));

        for manager in self.resource_managers() {
            let resource_type = manager.resource_type();
            manager.prepare_group(group, &mut |name: &str| {
                listeners.iter().for_each(|l| l.resource_prepared(resource_type, name));
            })?;
        }

        listeners.iter().for_each(|l| l.resource_group_prepare_ended(group));
        if self.require_group(group)? == ResourceGroupStatus::Initialised {
            self.set_status(group, ResourceGroupStatus::Prepared)?;
        }
        Ok(())
    }

    /// Load every resource of the group, managers in load order
    pub fn load_resource_group(&self, group: &str) -> Result<()> {
        self.initialise_resource_group(group)?;
        let listeners = self.listeners();
        let count = self.group_resource_count(group);
        engine_info!(SOURCE, "Loading resource group '{}' ({} resources)", group, count);
        listeners.iter().for_each(|l| l.resource_group_load_started(group, count));

        for manager in self.resource_managers() {
            let resource_type = manager.resource_type();
            manager.load_group(group, &mut |name: &str| {
                listeners.iter().for_each(|l| l.resource_loaded(resource_type, name));
            })?;
        }

        listeners.iter().for_each(|l| l.resource_group_load_ended(group));
        self.set_status(group, ResourceGroupStatus::Loaded)
    }

    /// Unload the group's resources, managers in reverse load order
    pub fn unload_resource_group(&self, group: &str, reloadable_only: bool) -> Result<()> {
        self.require_group(group)?;
        for manager in self.resource_managers().iter().rev() {
            manager.unload_group(group, reloadable_only);
        }
        self.set_status(group, ResourceGroupStatus::Initialised)
    }

    /// Remove the group's resources; declarations and locations stay
    pub fn clear_resource_group(&self, group: &str) -> Result<()> {
        self.require_group(group)?;
        for manager in self.resource_managers().iter().rev() {
            manager.remove_group(group);
        }
        self.set_status(group, ResourceGroupStatus::Uninitialised)
    }

    // ===== FILE ACCESS =====

    pub fn open_resource(&self, name: &str, group: &str) -> Result<Vec<u8>> {
        self.registry.open_resource(name, group)
    }

    pub fn resource_exists(&self, name: &str, group: &str) -> bool {
        self.registry.resource_exists(name, group)
    }

    pub fn find_resource_names(&self, group: &str, pattern: &str) -> Vec<String> {
        self.registry.find_resource_names(group, pattern)
    }

    pub fn find_group_containing_resource(&self, name: &str) -> Option<String> {
        self.registry.find_group_containing_resource(name)
    }
}

impl Default for ResourceGroupManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "resource_group_manager_tests.rs"]
mod tests;
