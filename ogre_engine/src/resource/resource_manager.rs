//! Typed resource manager
//!
//! One manager per resource type. The manager is the only strong owner of
//! its resources; callers hold [`ResourceRef`]s. Every load is followed by
//! a budget check that unloads reloadable resources, unreferenced ones
//! first, least recently touched first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::resource::{
    AssetLoader, ManualResourceLoader, NameValuePairList, Resource, ResourceData,
    ResourceGroupRegistry, ResourceHandle, ResourceInfo, ResourceRef, ResourceState,
    AUTODETECT_RESOURCE_GROUP_NAME,
};
use crate::{engine_bail, engine_error, engine_info, engine_trivial, engine_warn};

const SOURCE: &str = "ogre::ResourceManager";

/// What to do when a created name already exists in its group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionResolution {
    /// Fail with `DuplicateItem`
    Reject,
    /// Remove the existing resource and create the new one
    Replace,
}

/// Consulted when `create` hits an existing (name, group)
pub trait ResourceCollisionListener: Send + Sync {
    fn resource_collision(&self, name: &str, group: &str, resource_type: &str) -> CollisionResolution;
}

struct ManagerTables<T: ResourceData> {
    by_handle: BTreeMap<ResourceHandle, Arc<Resource<T>>>,
    /// group -> name -> handle
    by_name: BTreeMap<String, FxHashMap<String, ResourceHandle>>,
}

impl<T: ResourceData> ManagerTables<T> {
    fn find(&self, name: &str, group: &str) -> Option<&Arc<Resource<T>>> {
        let handle = self.by_name.get(group)?.get(name)?;
        self.by_handle.get(handle)
    }

    fn remove(&mut self, handle: ResourceHandle) -> Option<Arc<Resource<T>>> {
        let resource = self.by_handle.remove(&handle)?;
        if let Some(names) = self.by_name.get_mut(resource.group()) {
            names.remove(resource.name());
            if names.is_empty() {
                self.by_name.remove(resource.group());
            }
        }
        Some(resource)
    }

    fn in_group(&self, group: &str) -> Vec<Arc<Resource<T>>> {
        let mut resources: Vec<_> = self
            .by_handle
            .values()
            .filter(|r| r.group() == group)
            .cloned()
            .collect();
        resources.sort_by_key(|r| r.handle());
        resources
    }
}

pub struct ResourceManager<T: ResourceData> {
    groups: Arc<ResourceGroupRegistry>,
    context: Arc<T::Context>,
    tables: Mutex<ManagerTables<T>>,
    next_handle: AtomicU64,
    access_counter: AtomicU64,
    memory_budget: AtomicUsize,
    asset_loaders: RwLock<Vec<Arc<dyn AssetLoader<T>>>>,
    collision_listener: RwLock<Option<Arc<dyn ResourceCollisionListener>>>,
}

impl<T: ResourceData> ResourceManager<T> {
    pub fn new(groups: Arc<ResourceGroupRegistry>, context: Arc<T::Context>) -> Self {
        Self {
            groups,
            context,
            tables: Mutex::new(ManagerTables {
                by_handle: BTreeMap::new(),
                by_name: BTreeMap::new(),
            }),
            next_handle: AtomicU64::new(1),
            access_counter: AtomicU64::new(1),
            memory_budget: AtomicUsize::new(usize::MAX),
            asset_loaders: RwLock::new(Vec::new()),
            collision_listener: RwLock::new(None),
        }
    }

    pub fn resource_type(&self) -> &'static str {
        T::RESOURCE_TYPE
    }

    pub fn context(&self) -> &Arc<T::Context> {
        &self.context
    }

    pub fn group_registry(&self) -> &Arc<ResourceGroupRegistry> {
        &self.groups
    }

    fn tables(&self) -> Result<MutexGuard<'_, ManagerTables<T>>> {
        self.tables
            .lock()
            .map_err(|_| Error::InternalError(format!("{} manager tables poisoned", T::RESOURCE_TYPE)))
    }

    fn next_access_stamp(&self) -> u64 {
        self.access_counter.fetch_add(1, Ordering::Relaxed)
    }

    // ===== REGISTRATION =====

    /// Register a file-format decoder, matched on file extension
    pub fn register_asset_loader(&self, loader: Arc<dyn AssetLoader<T>>) {
        if let Ok(mut loaders) = self.asset_loaders.write() {
            loaders.push(loader);
        }
    }

    pub fn set_collision_listener(&self, listener: Option<Arc<dyn ResourceCollisionListener>>) {
        if let Ok(mut slot) = self.collision_listener.write() {
            *slot = listener;
        }
    }

    fn asset_loader_for(&self, file: &str) -> Option<Arc<dyn AssetLoader<T>>> {
        let extension = file.rsplit_once('.')?.1.to_ascii_lowercase();
        let loaders = self.asset_loaders.read().ok()?;
        loaders
            .iter()
            .find(|l| l.extensions().iter().any(|e| *e == extension))
            .cloned()
    }

    // ===== CREATION / LOOKUP =====

    /// Create an unloaded resource
    pub fn create(
        &self,
        name: &str,
        group: &str,
        is_manual: bool,
        loader: Option<Arc<dyn ManualResourceLoader<T>>>,
        params: Option<&NameValuePairList>,
    ) -> Result<ResourceRef<T>> {
        if name.is_empty() {
            engine_bail!(SOURCE, InvalidParams, "{} name must not be empty", T::RESOURCE_TYPE);
        }
        if group == AUTODETECT_RESOURCE_GROUP_NAME {
            engine_bail!(SOURCE, InvalidParams,
                "{} '{}' cannot be created in the '{}' group", T::RESOURCE_TYPE, name, group);
        }

        let existing = self.tables()?.find(name, group).map(|r| r.handle());
        if let Some(handle) = existing {
            let listener = self.collision_listener.read().ok().and_then(|l| l.clone());
            let resolution = listener
                .map(|l| l.resource_collision(name, group, T::RESOURCE_TYPE))
                .unwrap_or(CollisionResolution::Reject);
            match resolution {
                CollisionResolution::Reject => {
                    engine_bail!(SOURCE, DuplicateItem,
                        "{} '{}' already exists in group '{}'", T::RESOURCE_TYPE, name, group);
                }
                CollisionResolution::Replace => {
                    engine_info!(SOURCE, "Replacing {} '{}' in group '{}'",
                        T::RESOURCE_TYPE, name, group);
                    self.remove_handle(handle)?;
                }
            }
        }

        let empty = NameValuePairList::new();
        let params = params.unwrap_or(&empty);
        let info = ResourceInfo {
            handle: ResourceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
            group: group.to_string(),
            is_manual,
        };
        let data = T::create(&info, params)?;
        let resource = Arc::new(Resource::new(
            info.clone(),
            loader,
            params.clone(),
            data,
            self.next_access_stamp(),
        ));

        let mut tables = self.tables()?;
        if tables.find(name, group).is_some() {
            engine_bail!(SOURCE, DuplicateItem,
                "{} '{}' already exists in group '{}'", T::RESOURCE_TYPE, name, group);
        }
        tables
            .by_name
            .entry(info.group.clone())
            .or_default()
            .insert(info.name.clone(), info.handle);
        tables.by_handle.insert(info.handle, resource.clone());
        drop(tables);

        engine_trivial!(SOURCE, "Created {} '{}' in group '{}'", T::RESOURCE_TYPE, name, group);
        Ok(ResourceRef::new(&resource))
    }

    /// Existing resource, or a new one; the flag tells which
    pub fn create_or_retrieve(
        &self,
        name: &str,
        group: &str,
        is_manual: bool,
        loader: Option<Arc<dyn ManualResourceLoader<T>>>,
        params: Option<&NameValuePairList>,
    ) -> Result<(ResourceRef<T>, bool)> {
        if let Some(existing) = self.get_by_name(name, group) {
            return Ok((existing, false));
        }
        Ok((self.create(name, group, is_manual, loader, params)?, true))
    }

    /// Look up by name; `AUTODETECT_RESOURCE_GROUP_NAME` searches every
    /// group, global-pool groups first, then the others in name order
    pub fn get_by_name(&self, name: &str, group: &str) -> Option<ResourceRef<T>> {
        let tables = self.tables().ok()?;
        if group != AUTODETECT_RESOURCE_GROUP_NAME {
            return tables.find(name, group).map(ResourceRef::new);
        }

        let mut candidates: Vec<&Arc<Resource<T>>> = tables
            .by_name
            .iter()
            .filter_map(|(_, names)| names.get(name))
            .filter_map(|handle| tables.by_handle.get(handle))
            .collect();
        candidates.sort_by_key(|r| (!self.groups.is_in_global_pool(r.group()), r.group().to_string()));
        candidates.first().map(|r| ResourceRef::new(r))
    }

    pub fn get_by_handle(&self, handle: ResourceHandle) -> Option<ResourceRef<T>> {
        self.tables().ok()?.by_handle.get(&handle).map(ResourceRef::new)
    }

    pub fn resource_exists(&self, name: &str, group: &str) -> bool {
        self.get_by_name(name, group).is_some()
    }

    pub fn resource_count(&self) -> usize {
        self.tables().map(|t| t.by_handle.len()).unwrap_or(0)
    }

    /// Every resource, in handle order
    pub fn resources(&self) -> Vec<ResourceRef<T>> {
        self.snapshot().iter().map(ResourceRef::new).collect()
    }

    /// Names of the resources in `group`, in creation order
    pub fn names_in_group(&self, group: &str) -> Vec<String> {
        self.tables()
            .map(|t| t.in_group(group).iter().map(|r| r.name().to_string()).collect())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Vec<Arc<Resource<T>>> {
        self.tables()
            .map(|t| t.by_handle.values().cloned().collect())
            .unwrap_or_default()
    }

    fn resolve(&self, resource: &ResourceRef<T>) -> Result<Arc<Resource<T>>> {
        match resource.upgrade() {
            Some(r) => Ok(r),
            None => Err(crate::engine_err!(SOURCE, ItemNotFound,
                "{} {:?} is no longer managed", T::RESOURCE_TYPE, resource.handle())),
        }
    }

    fn resolve_name(&self, name: &str, group: &str) -> Result<Arc<Resource<T>>> {
        let found = self.get_by_name(name, group).and_then(|r| r.upgrade());
        match found {
            Some(r) => Ok(r),
            None => Err(crate::engine_err!(SOURCE, ItemNotFound,
                "{} '{}' not found in group '{}'", T::RESOURCE_TYPE, name, group)),
        }
    }

    // ===== LIFECYCLE =====

    /// Mark as recently used
    pub fn touch(&self, resource: &ResourceRef<T>) {
        if let Some(r) = resource.upgrade() {
            r.set_access(self.next_access_stamp());
        }
    }

    /// Read and decode source data without touching the GPU
    pub fn prepare(&self, resource: &ResourceRef<T>) -> Result<()> {
        let resource = self.resolve(resource)?;
        self.prepare_resource(&resource)
    }

    /// Drive to `Loaded`; returns immediately when already loaded
    pub fn load(&self, resource: &ResourceRef<T>) -> Result<()> {
        let resource = self.resolve(resource)?;
        self.load_resource(&resource)
    }

    /// Release GPU objects; metadata stays registered
    pub fn unload(&self, resource: &ResourceRef<T>) -> Result<()> {
        let resource = self.resolve(resource)?;
        self.unload_resource(&resource)
    }

    /// Unload then load again (only when currently loaded)
    pub fn reload(&self, resource: &ResourceRef<T>) -> Result<()> {
        let resource = self.resolve(resource)?;
        self.reload_resource(&resource)
    }

    pub fn prepare_by_name(&self, name: &str, group: &str) -> Result<()> {
        let resource = self.resolve_name(name, group)?;
        self.prepare_resource(&resource)
    }

    pub fn load_by_name(&self, name: &str, group: &str) -> Result<()> {
        let resource = self.resolve_name(name, group)?;
        self.load_resource(&resource)
    }

    pub fn unload_by_name(&self, name: &str, group: &str) -> Result<()> {
        let resource = self.resolve_name(name, group)?;
        self.unload_resource(&resource)
    }

    pub(crate) fn prepare_resource(&self, resource: &Arc<Resource<T>>) -> Result<()> {
        if resource
            .begin_transition(&[ResourceState::Unloaded], ResourceState::Preparing)?
            .is_err()
        {
            return Ok(());
        }
        let result = self.run_prepare(resource);
        match &result {
            Ok(()) => resource.finish_transition(ResourceState::Prepared),
            Err(e) => {
                engine_error!(SOURCE, "Preparing {} '{}' failed: {}", T::RESOURCE_TYPE, resource.name(), e);
                if let Ok(mut data) = resource.data() {
                    data.unload(resource.info(), &self.context);
                }
                resource.finish_transition(ResourceState::Unloaded);
            }
        }
        result
    }

    pub(crate) fn load_resource(&self, resource: &Arc<Resource<T>>) -> Result<()> {
        // Waits out a concurrent unload, then loads
        let previous = match resource.begin_transition(
            &[ResourceState::Unloaded, ResourceState::Prepared],
            ResourceState::Loading,
        )? {
            Ok(previous) => previous,
            Err(_) => {
                resource.set_access(self.next_access_stamp());
                return Ok(());
            }
        };

        let result = (|| {
            if previous == ResourceState::Unloaded {
                self.run_prepare(resource)?;
            }
            self.run_load(resource)
        })();

        match result {
            Ok(size) => {
                resource.set_size(size);
                resource.set_access(self.next_access_stamp());
                resource.finish_transition(ResourceState::Loaded);
                engine_trivial!(SOURCE, "Loaded {} '{}' ({} bytes)", T::RESOURCE_TYPE, resource.name(), size);
                self.check_usage();
                Ok(())
            }
            Err(e) => {
                engine_error!(SOURCE, "Loading {} '{}' failed: {}", T::RESOURCE_TYPE, resource.name(), e);
                if let Ok(mut data) = resource.data() {
                    data.unload(resource.info(), &self.context);
                }
                resource.set_size(0);
                resource.finish_transition(ResourceState::Unloaded);
                Err(e)
            }
        }
    }

    pub(crate) fn unload_resource(&self, resource: &Arc<Resource<T>>) -> Result<()> {
        if resource
            .begin_transition(&[ResourceState::Prepared, ResourceState::Loaded], ResourceState::Unloading)?
            .is_err()
        {
            return Ok(());
        }
        match resource.data() {
            Ok(mut data) => data.unload(resource.info(), &self.context),
            Err(e) => {
                resource.finish_transition(ResourceState::Unloaded);
                return Err(e);
            }
        }
        resource.set_size(0);
        resource.finish_transition(ResourceState::Unloaded);
        engine_trivial!(SOURCE, "Unloaded {} '{}'", T::RESOURCE_TYPE, resource.name());
        Ok(())
    }

    fn reload_resource(&self, resource: &Arc<Resource<T>>) -> Result<()> {
        if !resource.is_loaded() {
            return Ok(());
        }
        if !resource.is_reloadable() {
            engine_warn!(SOURCE, "{} '{}' is manual without a loader and cannot be reloaded",
                T::RESOURCE_TYPE, resource.name());
            return Ok(());
        }
        self.unload_resource(resource)?;
        self.load_resource(resource)
    }

    fn run_prepare(&self, resource: &Arc<Resource<T>>) -> Result<()> {
        let info = resource.info();
        let mut data = resource.data()?;

        if let Some(loader) = resource.loader() {
            return loader.prepare_resource(info, &mut data);
        }
        if info.is_manual {
            return Ok(());
        }
        let Some(file) = data.source_file(info) else {
            return Ok(());
        };
        let bytes = self.groups.open_resource(&file, &info.group)?;
        match self.asset_loader_for(&file) {
            Some(loader) => loader.decode(info, &bytes, &mut data),
            None => data.prepare_from_bytes(info, bytes),
        }
    }

    fn run_load(&self, resource: &Arc<Resource<T>>) -> Result<usize> {
        let info = resource.info();
        let mut data = resource.data()?;
        if let Some(loader) = resource.loader() {
            loader.load_resource(info, &mut data, &self.context)?;
        }
        data.load(info, &self.context)?;
        Ok(data.calculate_size())
    }

    // ===== REMOVAL =====

    /// Unload and forget a resource; outstanding refs stop resolving
    pub fn remove(&self, resource: &ResourceRef<T>) -> Result<()> {
        self.remove_handle(resource.handle())
    }

    pub fn remove_by_name(&self, name: &str, group: &str) -> Result<()> {
        let resource = self.resolve_name(name, group)?;
        self.remove_handle(resource.handle())
    }

    fn remove_handle(&self, handle: ResourceHandle) -> Result<()> {
        let removed = self.tables()?.remove(handle);
        match removed {
            Some(resource) => {
                self.unload_resource(&resource)?;
                engine_trivial!(SOURCE, "Removed {} '{}'", T::RESOURCE_TYPE, resource.name());
                Ok(())
            }
            None => {
                engine_bail!(SOURCE, ItemNotFound, "{} {:?} not found", T::RESOURCE_TYPE, handle);
            }
        }
    }

    pub fn remove_all(&self) {
        let removed: Vec<_> = match self.tables() {
            Ok(mut tables) => {
                tables.by_name.clear();
                std::mem::take(&mut tables.by_handle).into_values().collect()
            }
            Err(_) => return,
        };
        for resource in removed {
            let _ = self.unload_resource(&resource);
        }
    }

    /// Unload everything (or only reloadable resources)
    pub fn unload_all(&self, reloadable_only: bool) {
        for resource in self.snapshot() {
            if !reloadable_only || resource.is_reloadable() {
                let _ = self.unload_resource(&resource);
            }
        }
    }

    /// Unload resources no [`ResourceRef`] points at
    pub fn unload_unreferenced_resources(&self, reloadable_only: bool) {
        for resource in self.snapshot() {
            if resource.reference_count() == 0 && (!reloadable_only || resource.is_reloadable()) {
                let _ = self.unload_resource(&resource);
            }
        }
    }

    /// Reload every loaded resource
    pub fn reload_all(&self, reloadable_only: bool) -> Result<()> {
        for resource in self.snapshot() {
            if reloadable_only && !resource.is_reloadable() {
                continue;
            }
            self.reload_resource(&resource)?;
        }
        Ok(())
    }

    // ===== GROUPS =====

    /// Prepare every resource of `group`, reporting each name
    pub fn prepare_group(&self, group: &str, on_prepared: &mut dyn FnMut(&str)) -> Result<()> {
        let resources = self.tables()?.in_group(group);
        for resource in resources {
            self.prepare_resource(&resource)?;
            on_prepared(resource.name());
        }
        Ok(())
    }

    /// Load every resource of `group`, reporting each name
    pub fn load_group(&self, group: &str, on_loaded: &mut dyn FnMut(&str)) -> Result<()> {
        let resources = self.tables()?.in_group(group);
        for resource in resources {
            self.load_resource(&resource)?;
            on_loaded(resource.name());
        }
        Ok(())
    }

    pub fn unload_group(&self, group: &str, reloadable_only: bool) {
        let Ok(resources) = self.tables().map(|t| t.in_group(group)) else {
            return;
        };
        for resource in resources {
            if !reloadable_only || resource.is_reloadable() {
                let _ = self.unload_resource(&resource);
            }
        }
    }

    pub fn remove_group(&self, group: &str) {
        let Ok(resources) = self.tables().map(|t| t.in_group(group)) else {
            return;
        };
        for resource in resources {
            let _ = self.remove_handle(resource.handle());
        }
    }

    // ===== BUDGET =====

    /// Bytes held by loaded resources
    pub fn memory_usage(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|r| r.is_loaded())
            .map(|r| r.size())
            .sum()
    }

    pub fn memory_budget(&self) -> usize {
        self.memory_budget.load(Ordering::Relaxed)
    }

    /// Change the budget and enforce it immediately
    pub fn set_memory_budget(&self, bytes: usize) {
        self.memory_budget.store(bytes, Ordering::Relaxed);
        self.check_usage();
    }

    /// Unload reloadable resources until usage fits the budget
    pub fn check_usage(&self) {
        let budget = self.memory_budget();
        let mut usage = self.memory_usage();
        if usage <= budget {
            return;
        }

        let mut candidates: Vec<Arc<Resource<T>>> = self
            .snapshot()
            .into_iter()
            .filter(|r| r.is_loaded() && r.is_reloadable())
            .collect();
        candidates.sort_by_key(|r| (r.reference_count() > 0, r.last_access()));

        for resource in candidates {
            if usage <= budget {
                break;
            }
            let size = resource.size();
            if self.unload_resource(&resource).is_ok() {
                usage = usage.saturating_sub(size);
                engine_trivial!(SOURCE, "Unloaded {} '{}' to fit budget", T::RESOURCE_TYPE, resource.name());
            }
        }

        if usage > budget {
            engine_warn!(SOURCE, "{} memory usage {} exceeds budget {} after unloading",
                T::RESOURCE_TYPE, usage, budget);
        }
    }
}

// ===== TYPE-ERASED VIEW =====

/// What the resource group manager needs from any typed manager
pub trait ResourceManagerBase: Send + Sync {
    fn resource_type(&self) -> &'static str;

    fn load_order(&self) -> u32;

    /// Create a declared (non-manual) resource unless it already exists
    fn create_declared(&self, name: &str, group: &str, params: &NameValuePairList) -> Result<()>;

    fn resource_exists(&self, name: &str, group: &str) -> bool;

    fn names_in_group(&self, group: &str) -> Vec<String>;

    fn prepare_group(&self, group: &str, on_prepared: &mut dyn FnMut(&str)) -> Result<()>;

    fn load_group(&self, group: &str, on_loaded: &mut dyn FnMut(&str)) -> Result<()>;

    fn unload_group(&self, group: &str, reloadable_only: bool);

    fn remove_group(&self, group: &str);

    fn prepare_by_name(&self, name: &str, group: &str) -> Result<()>;

    fn load_by_name(&self, name: &str, group: &str) -> Result<()>;

    fn unload_by_name(&self, name: &str, group: &str) -> Result<()>;

    fn memory_usage(&self) -> usize;
}

impl<T: ResourceData> ResourceManagerBase for ResourceManager<T> {
    fn resource_type(&self) -> &'static str {
        T::RESOURCE_TYPE
    }

    fn load_order(&self) -> u32 {
        T::LOAD_ORDER
    }

    fn create_declared(&self, name: &str, group: &str, params: &NameValuePairList) -> Result<()> {
        self.create_or_retrieve(name, group, false, None, Some(params)).map(|_| ())
    }

    fn resource_exists(&self, name: &str, group: &str) -> bool {
        ResourceManager::resource_exists(self, name, group)
    }

    fn names_in_group(&self, group: &str) -> Vec<String> {
        ResourceManager::names_in_group(self, group)
    }

    fn prepare_group(&self, group: &str, on_prepared: &mut dyn FnMut(&str)) -> Result<()> {
        ResourceManager::prepare_group(self, group, on_prepared)
    }

    fn load_group(&self, group: &str, on_loaded: &mut dyn FnMut(&str)) -> Result<()> {
        ResourceManager::load_group(self, group, on_loaded)
    }

    fn unload_group(&self, group: &str, reloadable_only: bool) {
        ResourceManager::unload_group(self, group, reloadable_only)
    }

    fn remove_group(&self, group: &str) {
        ResourceManager::remove_group(self, group)
    }

    fn prepare_by_name(&self, name: &str, group: &str) -> Result<()> {
        ResourceManager::prepare_by_name(self, name, group)
    }

    fn load_by_name(&self, name: &str, group: &str) -> Result<()> {
        ResourceManager::load_by_name(self, name, group)
    }

    fn unload_by_name(&self, name: &str, group: &str) -> Result<()> {
        ResourceManager::unload_by_name(self, name, group)
    }

    fn memory_usage(&self) -> usize {
        ResourceManager::memory_usage(self)
    }
}

#[cfg(test)]
#[path = "resource_manager_tests.rs"]
mod tests;
