//! Hardware buffer with lock/unlock and optional CPU shadow copy
//!
//! A `HardwareBuffer` wraps backend GPU memory. Access goes through
//! [`HardwareBuffer::lock`], which returns a [`BufferLock`] guard over a
//! staging copy of the requested range; written bytes are committed when the
//! guard is unlocked or dropped. At most one lock is outstanding per buffer:
//! relocking from the owning thread is an error, other threads block until
//! the lock is released.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use bitflags::bitflags;

use crate::engine_bail;
use crate::error::{Error, Result};
use crate::render_system::{GpuBuffer, HardwareBufferFactory};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareBufferKind {
    Vertex,
    Index,
    Pixel,
    Uniform,
}

bitflags! {
    /// Usage hints given at creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HardwareBufferUsage: u32 {
        /// Rarely modified
        const STATIC = 1 << 0;
        /// Frequently modified
        const DYNAMIC = 1 << 1;
        /// Never read back by the application
        const WRITE_ONLY = 1 << 2;
        /// Contents may be regenerated at any time, enables discard locks
        const DISCARDABLE = 1 << 3;
        /// Only the GPU accesses the contents, no CPU locking
        const GPU_ONLY = 1 << 4;
    }
}

impl HardwareBufferUsage {
    pub const STATIC_WRITE_ONLY: Self = Self::STATIC.union(Self::WRITE_ONLY);
    pub const DYNAMIC_WRITE_ONLY: Self = Self::DYNAMIC.union(Self::WRITE_ONLY);
    pub const DYNAMIC_WRITE_ONLY_DISCARDABLE: Self =
        Self::DYNAMIC.union(Self::WRITE_ONLY).union(Self::DISCARDABLE);
}

impl Default for HardwareBufferUsage {
    fn default() -> Self {
        Self::STATIC_WRITE_ONLY
    }
}

/// Locking intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockOptions {
    /// Read and write (may stall)
    Normal,
    /// Read only, nothing is written back
    ReadOnly,
    /// The whole locked region will be overwritten; prior contents undefined
    Discard,
    /// Caller only writes regions not in use by the GPU
    NoOverwrite,
}

struct Shadow {
    data: Vec<u8>,
    /// Byte range not yet flushed to the GPU
    dirty: Option<(usize, usize)>,
    suppress_hardware_update: bool,
}

impl Shadow {
    fn mark_dirty(&mut self, start: usize, end: usize) {
        self.dirty = Some(match self.dirty {
            Some((s, e)) => (s.min(start), e.max(end)),
            None => (start, end),
        });
    }
}

#[derive(Default)]
struct LockState {
    owner: Option<ThreadId>,
    options: Option<LockOptions>,
}

/// Typed linear GPU buffer
pub struct HardwareBuffer {
    id: u64,
    kind: HardwareBufferKind,
    usage: HardwareBufferUsage,
    element_size: usize,
    element_count: usize,
    gpu: Arc<dyn GpuBuffer>,
    shadow: Option<Mutex<Shadow>>,
    lock_state: Mutex<LockState>,
    lock_released: Condvar,
}

impl HardwareBuffer {
    /// Allocate a buffer of `element_count` elements through `factory`
    pub fn new(
        factory: &dyn HardwareBufferFactory,
        kind: HardwareBufferKind,
        element_size: usize,
        element_count: usize,
        usage: HardwareBufferUsage,
        use_shadow: bool,
    ) -> Result<Self> {
        if element_size == 0 {
            engine_bail!("ogre::HardwareBuffer", InvalidParams,
                "{:?} buffer created with a zero element size", kind);
        }
        let size = element_size * element_count;
        let gpu = factory.create_buffer(kind, size, usage)?;
        Self::from_gpu_buffer(gpu, kind, element_size, element_count, usage, use_shadow)
    }

    /// Wrap existing GPU memory (e.g. a texture surface)
    pub fn from_gpu_buffer(
        gpu: Arc<dyn GpuBuffer>,
        kind: HardwareBufferKind,
        element_size: usize,
        element_count: usize,
        usage: HardwareBufferUsage,
        use_shadow: bool,
    ) -> Result<Self> {
        let size = element_size * element_count;
        if gpu.size() < size {
            engine_bail!("ogre::HardwareBuffer", InvalidParams,
                "GPU buffer of {} bytes is smaller than {} x {} bytes",
                gpu.size(), element_count, element_size);
        }
        if use_shadow && usage.contains(HardwareBufferUsage::GPU_ONLY) {
            engine_bail!("ogre::HardwareBuffer", InvalidParams,
                "GPU_ONLY buffers cannot have a shadow copy");
        }

        let shadow = use_shadow.then(|| {
            Mutex::new(Shadow {
                data: vec![0; size],
                dirty: None,
                suppress_hardware_update: false,
            })
        });

        Ok(Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            usage,
            element_size,
            element_count,
            gpu,
            shadow,
            lock_state: Mutex::new(LockState::default()),
            lock_released: Condvar::new(),
        })
    }

    // ===== ACCESSORS =====

    /// Process-unique buffer id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> HardwareBufferKind {
        self.kind
    }

    pub fn usage(&self) -> HardwareBufferUsage {
        self.usage
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn size_in_bytes(&self) -> usize {
        self.element_size * self.element_count
    }

    pub fn is_shadowed(&self) -> bool {
        self.shadow.is_some()
    }

    pub fn gpu_buffer(&self) -> &Arc<dyn GpuBuffer> {
        &self.gpu
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state.lock().map(|s| s.owner.is_some()).unwrap_or(false)
    }

    /// Options of the outstanding lock, if any
    pub fn lock_options(&self) -> Option<LockOptions> {
        self.lock_state.lock().ok().and_then(|s| s.options)
    }

    /// Whether the shadow holds bytes not yet flushed to the GPU
    pub fn shadow_dirty(&self) -> bool {
        match &self.shadow {
            Some(shadow) => shadow.lock().map(|s| s.dirty.is_some()).unwrap_or(false),
            None => false,
        }
    }

    /// Keep shadow writes on the CPU until re-enabled; re-enabling flushes
    pub fn suppress_hardware_update(&self, suppress: bool) -> Result<()> {
        let Some(shadow) = &self.shadow else {
            return Ok(());
        };
        let mut shadow = lock_mutex(shadow)?;
        shadow.suppress_hardware_update = suppress;
        if !suppress {
            self.flush_shadow(&mut shadow)?;
        }
        Ok(())
    }

    // ===== LOCKING =====

    /// Lock `[offset, offset + length)`
    pub fn lock(&self, offset: usize, length: usize, options: LockOptions) -> Result<BufferLock<'_>> {
        self.validate_access(offset, length, options)?;
        self.acquire(options)?;

        match self.stage(offset, length, options) {
            Ok(data) => Ok(BufferLock {
                buffer: self,
                offset,
                options,
                data,
                finished: false,
            }),
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// Lock the whole buffer
    pub fn lock_all(&self, options: LockOptions) -> Result<BufferLock<'_>> {
        self.lock(0, self.size_in_bytes(), options)
    }

    /// Copy `dst.len()` bytes from `offset` into `dst`
    ///
    /// Served from the shadow copy when present.
    pub fn read_data(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.validate_access(offset, dst.len(), LockOptions::ReadOnly)?;
        self.with_lock(LockOptions::ReadOnly, || self.read_raw(offset, dst))
    }

    /// Copy `src` into the buffer at `offset`
    pub fn write_data(&self, offset: usize, src: &[u8], discard: bool) -> Result<()> {
        let options = if discard { LockOptions::Discard } else { LockOptions::Normal };
        self.validate_access(offset, src.len(), options)?;
        self.with_lock(options, || self.commit(offset, src, options))
    }

    /// Copy `length` bytes of `source` at `source_offset` to `dest_offset`
    pub fn copy_data(
        &self,
        source: &HardwareBuffer,
        source_offset: usize,
        dest_offset: usize,
        length: usize,
        discard: bool,
    ) -> Result<()> {
        // GPU-side copies may read write-only sources
        source.validate_range(source_offset, length)?;
        let mut staging = vec![0u8; length];
        source.with_lock(LockOptions::Normal, || source.read_raw(source_offset, &mut staging))?;
        self.write_data(dest_offset, &staging, discard)
    }

    /// Copy as much of `source` as fits, from offset 0
    pub fn copy_all_data(&self, source: &HardwareBuffer) -> Result<()> {
        let length = self.size_in_bytes().min(source.size_in_bytes());
        self.copy_data(source, 0, 0, length, true)
    }

    // ===== INTERNALS =====

    fn validate_range(&self, offset: usize, length: usize) -> Result<()> {
        if offset.checked_add(length).map_or(true, |end| end > self.size_in_bytes()) {
            engine_bail!("ogre::HardwareBuffer", InvalidParams,
                "Range [{}, +{}) exceeds buffer size {}", offset, length, self.size_in_bytes());
        }
        Ok(())
    }

    fn validate_access(&self, offset: usize, length: usize, options: LockOptions) -> Result<()> {
        self.validate_range(offset, length)?;
        if self.usage.contains(HardwareBufferUsage::GPU_ONLY) {
            engine_bail!("ogre::HardwareBuffer", InvalidState,
                "GPU_ONLY buffer {} cannot be accessed from the CPU", self.id);
        }
        if options == LockOptions::ReadOnly
            && self.usage.contains(HardwareBufferUsage::WRITE_ONLY)
            && self.shadow.is_none()
        {
            engine_bail!("ogre::HardwareBuffer", InvalidState,
                "Cannot read write-only buffer {} without a shadow copy", self.id);
        }
        Ok(())
    }

    fn acquire(&self, options: LockOptions) -> Result<()> {
        let me = thread::current().id();
        let mut state = lock_mutex(&self.lock_state)?;
        loop {
            match state.owner {
                None => break,
                Some(owner) if owner == me => {
                    engine_bail!("ogre::HardwareBuffer", InvalidState,
                        "Buffer {} is already locked by this thread", self.id);
                }
                Some(_) => {
                    state = self
                        .lock_released
                        .wait(state)
                        .map_err(|_| Error::InternalError("buffer lock poisoned".to_string()))?;
                }
            }
        }
        state.owner = Some(me);
        state.options = Some(options);
        Ok(())
    }

    fn release(&self) {
        if let Ok(mut state) = self.lock_state.lock() {
            state.owner = None;
            state.options = None;
        }
        self.lock_released.notify_all();
    }

    fn with_lock<R>(&self, options: LockOptions, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.acquire(options)?;
        let result = f();
        self.release();
        result
    }

    /// Staging copy handed to a lock guard
    fn stage(&self, offset: usize, length: usize, options: LockOptions) -> Result<Vec<u8>> {
        let mut data = vec![0u8; length];
        if options == LockOptions::Discard {
            return Ok(data);
        }
        // Write-only buffers still start from the current contents, since
        // unlock writes the whole range back
        self.read_raw(offset, &mut data)?;
        Ok(data)
    }

    pub(crate) fn read_raw(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        match &self.shadow {
            Some(shadow) => {
                let shadow = lock_mutex(shadow)?;
                dst.copy_from_slice(&shadow.data[offset..offset + dst.len()]);
                Ok(())
            }
            None => self.gpu.read(offset, dst),
        }
    }

    /// Write bytes back after a lock or a direct write
    fn commit(&self, offset: usize, src: &[u8], options: LockOptions) -> Result<()> {
        if options == LockOptions::ReadOnly {
            return Ok(());
        }
        match &self.shadow {
            Some(shadow) => {
                let mut shadow = lock_mutex(shadow)?;
                shadow.data[offset..offset + src.len()].copy_from_slice(src);
                shadow.mark_dirty(offset, offset + src.len());
                if !shadow.suppress_hardware_update {
                    self.flush_shadow(&mut shadow)?;
                }
                Ok(())
            }
            None => self.gpu.write(offset, src, options == LockOptions::Discard),
        }
    }

    fn flush_shadow(&self, shadow: &mut Shadow) -> Result<()> {
        if let Some((start, end)) = shadow.dirty.take() {
            self.gpu.write(start, &shadow.data[start..end], false)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HardwareBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareBuffer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("usage", &self.usage)
            .field("element_size", &self.element_size)
            .field("element_count", &self.element_count)
            .field("shadowed", &self.shadow.is_some())
            .finish()
    }
}

fn lock_mutex<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::InternalError("hardware buffer state poisoned".to_string()))
}

// ===== LOCK GUARD =====

/// Outstanding lock on a buffer range
///
/// Derefs to the locked bytes. Unlocking (explicitly or on drop) writes the
/// bytes back unless the lock is `ReadOnly`.
pub struct BufferLock<'a> {
    buffer: &'a HardwareBuffer,
    offset: usize,
    options: LockOptions,
    data: Vec<u8>,
    finished: bool,
}

impl<'a> BufferLock<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn options(&self) -> LockOptions {
        self.options
    }

    /// Release the lock, reporting commit errors
    pub fn unlock(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let result = self.buffer.commit(self.offset, &self.data, self.options);
        self.buffer.release();
        result
    }
}

impl std::fmt::Debug for BufferLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLock")
            .field("buffer", &self.buffer.id)
            .field("offset", &self.offset)
            .field("length", &self.data.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Deref for BufferLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for BufferLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            crate::engine_error!("ogre::HardwareBuffer", "Unlock of buffer {} failed: {}", self.buffer.id, err);
        }
    }
}

#[cfg(test)]
#[path = "hardware_buffer_tests.rs"]
mod tests;
