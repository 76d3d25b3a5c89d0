/// Render queue.
///
/// Renderables are grouped by queue group id (background, main, overlay,
/// ...) and by priority inside a group. Each priority group keeps three
/// collections:
///
/// - solids, one entry per pass, ordered by pass hash, then material, then
///   insertion order (radix sort on a packed 96-bit key)
/// - transparents that ignore depth sorting, in insertion order
/// - transparents sorted back to front by camera distance (stable)
///
/// Technique resolution happens when a renderable is added, so the
/// queue only holds drawable work. Identical inputs give identical order.

use std::collections::BTreeMap;
use std::sync::Arc;

use rdst::{RadixKey, RadixSort};

use crate::camera::Camera;
use crate::engine_trivial;
use crate::material::{MaterialManager, Technique, DEFAULT_SCHEME_INDEX};
use super::renderable::Renderable;

const SOURCE: &str = "ogre::RenderQueue";

pub const RENDER_QUEUE_BACKGROUND: u8 = 0;
pub const RENDER_QUEUE_SKIES_EARLY: u8 = 5;
pub const RENDER_QUEUE_WORLD_GEOMETRY_1: u8 = 25;
pub const RENDER_QUEUE_MAIN: u8 = 50;
pub const RENDER_QUEUE_WORLD_GEOMETRY_2: u8 = 75;
pub const RENDER_QUEUE_SKIES_LATE: u8 = 95;
pub const RENDER_QUEUE_OVERLAY: u8 = 100;
pub const RENDER_QUEUE_MAX: u8 = 105;

pub const DEFAULT_RENDERABLE_PRIORITY: u16 = 100;

/// A renderable with the technique it will draw with
pub struct QueuedRenderable {
    pub renderable: Renderable,
    pub technique: Arc<Technique>,
}

// ============================================================================
// Sort entries
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct SolidEntry {
    /// pass hash (bits 64..96) | material handle (32..64) | sequence (0..32)
    key: u128,
    renderable: u32,
    pass: u16,
}

impl RadixKey for SolidEntry {
    const LEVELS: usize = 12;

    #[inline]
    fn get_level(&self, level: usize) -> u8 {
        (self.key >> (level * 8)) as u8
    }
}

#[derive(Debug, Clone, Copy)]
struct TransparentEntry {
    renderable: u32,
    distance: f32,
}

// ============================================================================
// Groups
// ============================================================================

/// Renderables of one (group, priority)
#[derive(Default)]
pub struct RenderPriorityGroup {
    renderables: Vec<QueuedRenderable>,
    solids: Vec<SolidEntry>,
    unsorted_transparents: Vec<u32>,
    transparents: Vec<TransparentEntry>,
}

impl RenderPriorityGroup {
    fn add(&mut self, renderable: Renderable, technique: Arc<Technique>) {
        let index = self.renderables.len() as u32;
        if technique.is_transparent() {
            if technique.passes().iter().any(|p| p.is_transparent_sorted()) {
                self.transparents.push(TransparentEntry { renderable: index, distance: 0.0 });
            } else {
                self.unsorted_transparents.push(index);
            }
        } else {
            let material = renderable.material.handle().0 as u32 as u128;
            for (pass_index, pass) in technique.passes().iter().enumerate() {
                let sequence = self.solids.len() as u32 as u128;
                self.solids.push(SolidEntry {
                    key: ((pass.hash() as u128) << 64) | (material << 32) | sequence,
                    renderable: index,
                    pass: pass_index as u16,
                });
            }
        }
        self.renderables.push(QueuedRenderable { renderable, technique });
    }

    fn sort(&mut self, camera: &Camera) {
        self.solids.radix_sort_unstable();
        for entry in &mut self.transparents {
            let renderable = &self.renderables[entry.renderable as usize].renderable;
            entry.distance = renderable.sort_distance(|p| camera.sort_distance(p));
        }
        // Back to front; equal distances keep insertion order
        self.transparents.sort_by(|a, b| b.distance.total_cmp(&a.distance));
    }

    fn render(&self, visitor: &mut dyn RenderQueueVisitor) {
        for entry in &self.solids {
            visitor.visit(&self.renderables[entry.renderable as usize], entry.pass as usize);
        }
        for &index in &self.unsorted_transparents {
            self.visit_all_passes(index, visitor);
        }
        for entry in &self.transparents {
            self.visit_all_passes(entry.renderable, visitor);
        }
    }

    fn visit_all_passes(&self, index: u32, visitor: &mut dyn RenderQueueVisitor) {
        let queued = &self.renderables[index as usize];
        for pass in 0..queued.technique.num_passes() {
            visitor.visit(queued, pass);
        }
    }

    pub fn len(&self) -> usize {
        self.renderables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderables.is_empty()
    }

    /// Number of solid (renderable, pass) entries
    pub fn solid_pass_count(&self) -> usize {
        self.solids.len()
    }

    /// Number of transparent renderables, sorted or not
    pub fn transparent_count(&self) -> usize {
        self.transparents.len() + self.unsorted_transparents.len()
    }
}

/// All priorities of one queue group id
#[derive(Default)]
pub struct RenderQueueGroup {
    priorities: BTreeMap<u16, RenderPriorityGroup>,
}

impl RenderQueueGroup {
    pub fn priority_group(&self, priority: u16) -> Option<&RenderPriorityGroup> {
        self.priorities.get(&priority)
    }

    pub fn len(&self) -> usize {
        self.priorities.values().map(RenderPriorityGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receives the queue contents in draw order
pub trait RenderQueueVisitor {
    /// Called before a group draws; `false` skips the group
    fn group_started(&mut self, _group_id: u8) -> bool {
        true
    }

    fn group_ended(&mut self, _group_id: u8) {}

    /// Draw pass `pass_index` of the queued technique for this renderable
    fn visit(&mut self, queued: &QueuedRenderable, pass_index: usize);
}

// ============================================================================
// Queue
// ============================================================================

pub struct RenderQueue {
    groups: BTreeMap<u8, RenderQueueGroup>,
    materials: Arc<MaterialManager>,
    scheme_index: u16,
}

impl RenderQueue {
    pub fn new(materials: Arc<MaterialManager>) -> Self {
        Self {
            groups: BTreeMap::new(),
            materials,
            scheme_index: DEFAULT_SCHEME_INDEX,
        }
    }

    /// Material scheme used to resolve techniques of added renderables
    pub fn scheme_index(&self) -> u16 {
        self.scheme_index
    }

    pub fn set_scheme_index(&mut self, scheme_index: u16) {
        self.scheme_index = scheme_index;
    }

    pub fn materials(&self) -> &Arc<MaterialManager> {
        &self.materials
    }

    /// Queue a renderable
    ///
    /// Returns `false` when nothing was queued: the renderable draws
    /// nothing, or its material has no supported technique.
    pub fn add_renderable(&mut self, renderable: Renderable, group_id: u8, priority: u16) -> bool {
        if renderable.is_empty() {
            engine_trivial!(SOURCE, "Skipping empty renderable (material {:?})", renderable.material.name());
            return false;
        }
        let Some(technique) = self.materials.best_technique(
            &renderable.material,
            self.scheme_index,
            renderable.lod_index,
        ) else {
            return false;
        };
        self.groups
            .entry(group_id)
            .or_default()
            .priorities
            .entry(priority)
            .or_default()
            .add(renderable, technique);
        true
    }

    pub fn group(&self, group_id: u8) -> Option<&RenderQueueGroup> {
        self.groups.get(&group_id)
    }

    /// Ids of the non-empty groups, ascending
    pub fn group_ids(&self) -> Vec<u8> {
        self.groups.iter().filter(|(_, g)| !g.is_empty()).map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(RenderQueueGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Order every group for `camera`
    pub fn sort(&mut self, camera: &Camera) {
        for group in self.groups.values_mut() {
            for priority in group.priorities.values_mut() {
                priority.sort(camera);
            }
        }
    }

    /// Visit every group in ascending id
    pub fn render(&self, visitor: &mut dyn RenderQueueVisitor) {
        self.render_range(0, u8::MAX, visitor);
    }

    /// Visit the groups whose id lies in `first..=last`
    pub fn render_range(&self, first: u8, last: u8, visitor: &mut dyn RenderQueueVisitor) {
        if first > last {
            return;
        }
        for (&id, group) in self.groups.range(first..=last) {
            if group.is_empty() || !visitor.group_started(id) {
                continue;
            }
            for priority in group.priorities.values() {
                priority.render(visitor);
            }
            visitor.group_ended(id);
        }
    }

    /// Drop every queued renderable, keeping the group structure
    pub fn clear(&mut self) {
        for group in self.groups.values_mut() {
            for priority in group.priorities.values_mut() {
                priority.renderables.clear();
                priority.solids.clear();
                priority.unsorted_transparents.clear();
                priority.transparents.clear();
            }
        }
    }
}

#[cfg(test)]
#[path = "render_queue_tests.rs"]
mod tests;
