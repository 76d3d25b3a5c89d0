//! Hardware buffer manager
//!
//! Creates buffers through the render system's [`HardwareBufferFactory`]
//! and pools temporary copies of vertex buffers used for software
//! skinning and morphing. Copies are handed out under a licence:
//! `Manual` copies live until released, `AutomaticRelease` copies return
//! to the pool after [`EXPIRED_DELAY_FRAME_THRESHOLD`] frames without a
//! touch. Each frame the owner calls
//! [`HardwareBufferManager::release_buffer_copies`].

use std::sync::{Arc, Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::hardware::{
    HardwareBuffer, HardwareBufferKind, HardwareBufferUsage, HardwarePixelBuffer, IndexType,
    PixelFormat,
};
use crate::render_system::HardwareBufferFactory;
use crate::{engine_bail, engine_trivial};

/// Frames an automatic licence survives without a touch
pub const EXPIRED_DELAY_FRAME_THRESHOLD: u32 = 5;
/// Consecutive frames with idle copies before the pool is shrunk
pub const UNDER_USED_FRAME_THRESHOLD: u32 = 30_000;

/// How a temporary copy is returned to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferLicenceType {
    /// Returned by `release_vertex_buffer_copy`
    Manual,
    /// Returned after a few frames without a touch
    AutomaticRelease,
}

/// Holder of a temporary copy, told when its licence ends
pub trait HardwareBufferLicensee: Send + Sync {
    fn licence_expired(&self, buffer: &Arc<HardwareBuffer>);
}

struct Licence {
    source_id: u64,
    copy: Arc<HardwareBuffer>,
    licence_type: BufferLicenceType,
    expired_delay: u32,
    licensee: Option<Arc<dyn HardwareBufferLicensee>>,
}

#[derive(Default)]
struct TempPool {
    /// Idle copies by source buffer id
    free: FxHashMap<u64, Vec<Arc<HardwareBuffer>>>,
    /// Licensed copies by copy id
    licences: FxHashMap<u64, Licence>,
    under_used_frame_count: u32,
}

impl TempPool {
    fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    fn return_to_pool(&mut self, licence: &Licence) {
        self.free.entry(licence.source_id).or_default().push(licence.copy.clone());
    }

    fn free_unused(&mut self) -> usize {
        let mut freed = 0;
        for copies in self.free.values_mut() {
            let before = copies.len();
            copies.retain(|copy| Arc::strong_count(copy) > 1);
            freed += before - copies.len();
        }
        self.free.retain(|_, copies| !copies.is_empty());
        freed
    }
}

pub struct HardwareBufferManager {
    factory: Arc<dyn HardwareBufferFactory>,
    pool: Mutex<TempPool>,
}

impl HardwareBufferManager {
    pub fn new(factory: Arc<dyn HardwareBufferFactory>) -> Self {
        Self {
            factory,
            pool: Mutex::new(TempPool::default()),
        }
    }

    pub fn factory(&self) -> &Arc<dyn HardwareBufferFactory> {
        &self.factory
    }

    // ===== CREATION =====

    pub fn create_vertex_buffer(
        &self,
        vertex_size: usize,
        vertex_count: usize,
        usage: HardwareBufferUsage,
        use_shadow: bool,
    ) -> Result<Arc<HardwareBuffer>> {
        let buffer = HardwareBuffer::new(
            self.factory.as_ref(), HardwareBufferKind::Vertex, vertex_size, vertex_count, usage, use_shadow,
        )?;
        Ok(Arc::new(buffer))
    }

    pub fn create_index_buffer(
        &self,
        index_type: IndexType,
        index_count: usize,
        usage: HardwareBufferUsage,
        use_shadow: bool,
    ) -> Result<Arc<HardwareBuffer>> {
        let buffer = HardwareBuffer::new(
            self.factory.as_ref(), HardwareBufferKind::Index, index_type.size(), index_count, usage, use_shadow,
        )?;
        Ok(Arc::new(buffer))
    }

    pub fn create_pixel_buffer(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        format: PixelFormat,
        usage: HardwareBufferUsage,
    ) -> Result<Arc<HardwarePixelBuffer>> {
        let buffer = HardwarePixelBuffer::new(self.factory.as_ref(), width, height, depth, format, usage)?;
        Ok(Arc::new(buffer))
    }

    pub fn create_uniform_buffer(&self, size: usize, usage: HardwareBufferUsage) -> Result<Arc<HardwareBuffer>> {
        if size == 0 {
            engine_bail!("ogre::HardwareBufferManager", InvalidParams, "Uniform buffer of zero size");
        }
        let buffer = HardwareBuffer::new(self.factory.as_ref(), HardwareBufferKind::Uniform, 1, size, usage, false)?;
        Ok(Arc::new(buffer))
    }

    // ===== TEMPORARY COPIES =====

    /// Borrow a copy of `source` from the pool, creating one if none is idle
    pub fn allocate_vertex_buffer_copy(
        &self,
        source: &Arc<HardwareBuffer>,
        licence_type: BufferLicenceType,
        licensee: Option<Arc<dyn HardwareBufferLicensee>>,
        copy_data: bool,
    ) -> Result<Arc<HardwareBuffer>> {
        let pooled = {
            let mut pool = self.lock_pool()?;
            pool.free.get_mut(&source.id()).and_then(Vec::pop)
        };

        let copy = match pooled {
            Some(copy) => copy,
            None => {
                engine_trivial!("ogre::HardwareBufferManager",
                    "Creating temporary copy of vertex buffer {}", source.id());
                self.create_vertex_buffer(
                    source.element_size(), source.element_count(), source.usage(), source.is_shadowed(),
                )?
            }
        };

        if copy_data {
            copy.copy_all_data(source)?;
        }

        let expired_delay = match licence_type {
            BufferLicenceType::AutomaticRelease => EXPIRED_DELAY_FRAME_THRESHOLD,
            BufferLicenceType::Manual => 0,
        };
        self.lock_pool()?.licences.insert(copy.id(), Licence {
            source_id: source.id(),
            copy: copy.clone(),
            licence_type,
            expired_delay,
            licensee,
        });
        Ok(copy)
    }

    /// Return a copy to the pool before its licence expires
    pub fn release_vertex_buffer_copy(&self, copy: &Arc<HardwareBuffer>) -> Result<()> {
        let licence = {
            let mut pool = self.lock_pool()?;
            let Some(licence) = pool.licences.remove(&copy.id()) else {
                engine_bail!("ogre::HardwareBufferManager", ItemNotFound,
                    "Buffer {} is not a licensed temporary copy", copy.id());
            };
            pool.return_to_pool(&licence);
            licence
        };
        if let Some(licensee) = &licence.licensee {
            licensee.licence_expired(&licence.copy);
        }
        Ok(())
    }

    /// Keep an automatic licence alive for another expiry period
    pub fn touch_vertex_buffer_copy(&self, copy: &Arc<HardwareBuffer>) -> Result<()> {
        let mut pool = self.lock_pool()?;
        if let Some(licence) = pool.licences.get_mut(&copy.id()) {
            if licence.licence_type == BufferLicenceType::AutomaticRelease {
                licence.expired_delay = EXPIRED_DELAY_FRAME_THRESHOLD;
            }
        }
        Ok(())
    }

    /// Per-frame sweep over automatic licences and idle copies
    pub fn release_buffer_copies(&self, force_free_unused: bool) -> Result<()> {
        let (expired, free_unused) = {
            let mut pool = self.lock_pool()?;
            let num_unused = pool.free_count();

            let expired_ids: Vec<u64> = pool
                .licences
                .iter_mut()
                .filter(|(_, l)| l.licence_type == BufferLicenceType::AutomaticRelease)
                .filter_map(|(id, l)| {
                    l.expired_delay = l.expired_delay.saturating_sub(1);
                    (force_free_unused || l.expired_delay == 0).then_some(*id)
                })
                .collect();

            let mut expired = Vec::with_capacity(expired_ids.len());
            for id in expired_ids {
                if let Some(licence) = pool.licences.remove(&id) {
                    pool.return_to_pool(&licence);
                    expired.push(licence);
                }
            }

            let free_unused = if force_free_unused {
                true
            } else if num_unused > 0 {
                pool.under_used_frame_count += 1;
                pool.under_used_frame_count >= UNDER_USED_FRAME_THRESHOLD
            } else {
                pool.under_used_frame_count = 0;
                false
            };
            (expired, free_unused)
        };

        // Callbacks run without the pool lock so licensees may re-allocate
        for licence in &expired {
            if let Some(licensee) = &licence.licensee {
                licensee.licence_expired(&licence.copy);
            }
        }
        drop(expired);

        if free_unused {
            let mut pool = self.lock_pool()?;
            let freed = pool.free_unused();
            pool.under_used_frame_count = 0;
            if !force_free_unused {
                engine_trivial!("ogre::HardwareBufferManager",
                    "Freed {} under-used temporary buffer copies", freed);
            }
        }
        Ok(())
    }

    /// Drop idle copies nobody else references; returns how many
    pub fn free_unused_buffer_copies(&self) -> Result<usize> {
        Ok(self.lock_pool()?.free_unused())
    }

    pub fn free_copy_count(&self) -> usize {
        self.pool.lock().map(|p| p.free_count()).unwrap_or(0)
    }

    pub fn licensed_copy_count(&self) -> usize {
        self.pool.lock().map(|p| p.licences.len()).unwrap_or(0)
    }

    pub fn under_used_frame_count(&self) -> u32 {
        self.pool.lock().map(|p| p.under_used_frame_count).unwrap_or(0)
    }

    fn lock_pool(&self) -> Result<MutexGuard<'_, TempPool>> {
        self.pool
            .lock()
            .map_err(|_| Error::InternalError("temporary buffer pool poisoned".to_string()))
    }
}

#[cfg(test)]
#[path = "hardware_buffer_manager_tests.rs"]
mod tests;
