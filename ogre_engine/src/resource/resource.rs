//! Resource: a named, manager-owned asset with a load lifecycle
//!
//! Resources move through
//! `Unloaded → Preparing → Prepared → Loading → Loaded → Unloading → Unloaded`.
//! Preparing reads and decodes source data (safe on a worker thread);
//! loading creates GPU objects. The owning
//! [`ResourceManager`](super::ResourceManager) holds the only strong
//! reference; everything else keeps a [`ResourceRef`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use crate::error::{Error, Result};

/// Stable id of a resource, unique within its manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceHandle(pub u64);

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Unloaded,
    Preparing,
    Prepared,
    Loading,
    Loaded,
    Unloading,
}

impl ResourceState {
    /// Another thread is moving the resource between states
    pub fn is_transient(self) -> bool {
        matches!(self, ResourceState::Preparing | ResourceState::Loading | ResourceState::Unloading)
    }
}

/// Creation parameters passed through from scripts and config files
pub type NameValuePairList = BTreeMap<String, String>;

/// Identity of a resource, handed to payload callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub handle: ResourceHandle,
    pub name: String,
    pub group: String,
    pub is_manual: bool,
}

/// Typed payload of a resource
///
/// One implementation per resource type. `Context` carries whatever the
/// type needs to reach the GPU (render system, sibling managers).
pub trait ResourceData: Send + Sized + 'static {
    type Context: Send + Sync;

    /// Type name used for registration and declarations
    const RESOURCE_TYPE: &'static str;

    /// Groups load managers in ascending order of this value
    const LOAD_ORDER: u32;

    /// Fresh unloaded payload
    fn create(info: &ResourceInfo, params: &NameValuePairList) -> Result<Self>;

    /// File read from the resource group's archives during prepare, or
    /// `None` when the payload is built in code
    fn source_file(&self, info: &ResourceInfo) -> Option<String> {
        Some(info.name.clone())
    }

    /// Decode source bytes read from an archive (CPU only)
    fn prepare_from_bytes(&mut self, info: &ResourceInfo, _bytes: Vec<u8>) -> Result<()> {
        Err(Error::InvalidAsset(format!(
            "No asset loader registered for {} '{}'",
            Self::RESOURCE_TYPE, info.name
        )))
    }

    /// Create GPU objects from prepared data
    fn load(&mut self, info: &ResourceInfo, ctx: &Self::Context) -> Result<()>;

    /// Release GPU objects and prepared data
    fn unload(&mut self, info: &ResourceInfo, ctx: &Self::Context);

    /// Current CPU + GPU footprint in bytes
    fn calculate_size(&self) -> usize;
}

/// Builds the contents of a manual resource
///
/// `load_resource` fills the payload; the payload's own `load` then runs
/// to create GPU objects.
pub trait ManualResourceLoader<T: ResourceData>: Send + Sync {
    fn prepare_resource(&self, _info: &ResourceInfo, _data: &mut T) -> Result<()> {
        Ok(())
    }

    fn load_resource(&self, info: &ResourceInfo, data: &mut T, ctx: &T::Context) -> Result<()>;
}

/// Decodes a file format into a payload
pub trait AssetLoader<T: ResourceData>: Send + Sync {
    /// File extensions handled, lowercase without dot
    fn extensions(&self) -> &[&str];

    fn decode(&self, info: &ResourceInfo, bytes: &[u8], data: &mut T) -> Result<()>;
}

/// Manager-owned resource
pub struct Resource<T: ResourceData> {
    info: ResourceInfo,
    loader: Option<Arc<dyn ManualResourceLoader<T>>>,
    params: NameValuePairList,
    state: Mutex<ResourceState>,
    state_changed: Condvar,
    size: AtomicUsize,
    last_access: AtomicU64,
    external_refs: AtomicUsize,
    data: Mutex<T>,
}

impl<T: ResourceData> Resource<T> {
    pub(crate) fn new(
        info: ResourceInfo,
        loader: Option<Arc<dyn ManualResourceLoader<T>>>,
        params: NameValuePairList,
        data: T,
        access_stamp: u64,
    ) -> Self {
        Self {
            info,
            loader,
            params,
            state: Mutex::new(ResourceState::Unloaded),
            state_changed: Condvar::new(),
            size: AtomicUsize::new(0),
            last_access: AtomicU64::new(access_stamp),
            external_refs: AtomicUsize::new(0),
            data: Mutex::new(data),
        }
    }

    pub fn handle(&self) -> ResourceHandle {
        self.info.handle
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn group(&self) -> &str {
        &self.info.group
    }

    pub fn info(&self) -> &ResourceInfo {
        &self.info
    }

    pub fn is_manual(&self) -> bool {
        self.info.is_manual
    }

    pub fn params(&self) -> &NameValuePairList {
        &self.params
    }

    pub(crate) fn loader(&self) -> Option<&Arc<dyn ManualResourceLoader<T>>> {
        self.loader.as_ref()
    }

    /// Can be unloaded and loaded again without losing content
    pub fn is_reloadable(&self) -> bool {
        !self.info.is_manual || self.loader.is_some()
    }

    pub fn state(&self) -> ResourceState {
        self.state.lock().map(|s| *s).unwrap_or(ResourceState::Unloaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ResourceState::Loaded
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.state(), ResourceState::Prepared | ResourceState::Loaded)
    }

    /// Footprint recorded at the last load (0 when unloaded)
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Access stamp of the last touch; larger is more recent
    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Number of live [`ResourceRef`]s
    pub fn reference_count(&self) -> usize {
        self.external_refs.load(Ordering::Acquire)
    }

    /// Lock the payload
    pub fn data(&self) -> Result<MutexGuard<'_, T>> {
        self.data
            .lock()
            .map_err(|_| Error::InternalError(format!("resource '{}' payload poisoned", self.info.name)))
    }

    pub(crate) fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Release);
    }

    pub(crate) fn set_access(&self, stamp: u64) {
        self.last_access.store(stamp, Ordering::Relaxed);
    }

    /// Move from one of `from` to `to`, waiting while another thread holds a
    /// transient state. `Ok(previous)` on transition, `Err(current)` when
    /// the current state is not in `from`.
    pub(crate) fn begin_transition(
        &self,
        from: &[ResourceState],
        to: ResourceState,
    ) -> Result<std::result::Result<ResourceState, ResourceState>> {
        let mut state = self.lock_state()?;
        while state.is_transient() {
            state = self
                .state_changed
                .wait(state)
                .map_err(|_| Error::InternalError("resource state poisoned".to_string()))?;
        }
        let previous = *state;
        if from.contains(&previous) {
            *state = to;
            Ok(Ok(previous))
        } else {
            Ok(Err(previous))
        }
    }

    pub(crate) fn finish_transition(&self, to: ResourceState) {
        if let Ok(mut state) = self.state.lock() {
            *state = to;
        }
        self.state_changed.notify_all();
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ResourceState>> {
        self.state
            .lock()
            .map_err(|_| Error::InternalError("resource state poisoned".to_string()))
    }
}

impl<T: ResourceData> std::fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("type", &T::RESOURCE_TYPE)
            .field("handle", &self.info.handle)
            .field("name", &self.info.name)
            .field("group", &self.info.group)
            .field("state", &self.state())
            .finish()
    }
}

// ===== WEAK HANDLE =====

/// External handle to a resource
///
/// Does not keep the resource alive; resolve it with [`ResourceRef::upgrade`].
/// Live handles are counted so the manager can tell referenced resources
/// from unreferenced ones.
pub struct ResourceRef<T: ResourceData> {
    handle: ResourceHandle,
    resource: Weak<Resource<T>>,
}

impl<T: ResourceData> ResourceRef<T> {
    pub(crate) fn new(resource: &Arc<Resource<T>>) -> Self {
        resource.external_refs.fetch_add(1, Ordering::AcqRel);
        Self {
            handle: resource.handle(),
            resource: Arc::downgrade(resource),
        }
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    /// The resource, unless it was removed from its manager
    pub fn upgrade(&self) -> Option<Arc<Resource<T>>> {
        self.resource.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.resource.strong_count() > 0
    }

    pub fn name(&self) -> Option<String> {
        self.upgrade().map(|r| r.name().to_string())
    }

    pub fn state(&self) -> ResourceState {
        self.upgrade().map(|r| r.state()).unwrap_or(ResourceState::Unloaded)
    }
}

impl<T: ResourceData> Clone for ResourceRef<T> {
    fn clone(&self) -> Self {
        if let Some(resource) = self.resource.upgrade() {
            resource.external_refs.fetch_add(1, Ordering::AcqRel);
        }
        Self {
            handle: self.handle,
            resource: self.resource.clone(),
        }
    }
}

impl<T: ResourceData> Drop for ResourceRef<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.upgrade() {
            let _ = resource
                .external_refs
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }
}

impl<T: ResourceData> PartialEq for ResourceRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && Weak::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: ResourceData> Eq for ResourceRef<T> {}

impl<T: ResourceData> std::fmt::Debug for ResourceRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRef")
            .field("type", &T::RESOURCE_TYPE)
            .field("handle", &self.handle)
            .field("alive", &self.is_alive())
            .finish()
    }
}
