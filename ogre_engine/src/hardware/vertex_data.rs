/// Vertex buffer bindings, vertex data and index data

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine_bail;
use crate::error::Result;
use crate::hardware::{HardwareBuffer, VertexDeclaration};

// ===== VERTEX BUFFER BINDING =====

/// Maps stream indices to vertex buffers
#[derive(Debug, Clone, Default)]
pub struct VertexBufferBinding {
    bindings: BTreeMap<u16, Arc<HardwareBuffer>>,
}

impl VertexBufferBinding {
    pub fn new() -> Self {
        Self { bindings: BTreeMap::new() }
    }

    /// Bind `buffer` to stream `index`, replacing any previous binding
    pub fn set_binding(&mut self, index: u16, buffer: Arc<HardwareBuffer>) {
        self.bindings.insert(index, buffer);
    }

    pub fn unset_binding(&mut self, index: u16) -> Option<Arc<HardwareBuffer>> {
        self.bindings.remove(&index)
    }

    pub fn unset_all(&mut self) {
        self.bindings.clear();
    }

    pub fn buffer(&self, index: u16) -> Option<&Arc<HardwareBuffer>> {
        self.bindings.get(&index)
    }

    pub fn is_bound(&self, index: u16) -> bool {
        self.bindings.contains_key(&index)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (u16, &Arc<HardwareBuffer>)> {
        self.bindings.iter().map(|(i, b)| (*i, b))
    }

    pub fn buffer_count(&self) -> usize {
        self.bindings.len()
    }

    /// First unused stream index above every bound index
    pub fn next_index(&self) -> u16 {
        self.bindings.keys().next_back().map(|i| i + 1).unwrap_or(0)
    }

    /// Check every stream used by `declaration` is bound with a large
    /// enough stride
    pub fn validate(&self, declaration: &VertexDeclaration) -> Result<()> {
        for source in declaration.sources() {
            let Some(buffer) = self.bindings.get(&source) else {
                engine_bail!("ogre::VertexBufferBinding", InvalidState,
                    "Stream {} is used by the declaration but not bound", source);
            };
            let required = declaration.vertex_size(source);
            if buffer.element_size() < required {
                engine_bail!("ogre::VertexBufferBinding", InvalidParams,
                    "Stream {} stride {} is smaller than the declared vertex size {}",
                    source, buffer.element_size(), required);
            }
        }
        Ok(())
    }
}

// ===== VERTEX DATA =====

/// Vertices of one draw: declaration, bound buffers and range
#[derive(Debug, Clone, Default)]
pub struct VertexData {
    pub declaration: VertexDeclaration,
    pub binding: VertexBufferBinding,
    pub vertex_start: usize,
    pub vertex_count: usize,
}

impl VertexData {
    pub fn new(declaration: VertexDeclaration, binding: VertexBufferBinding, vertex_count: usize) -> Self {
        Self {
            declaration,
            binding,
            vertex_start: 0,
            vertex_count,
        }
    }

    /// Vertex data drawing nothing
    pub fn empty() -> Self {
        Self::default()
    }
}

// ===== INDEX DATA =====

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }

    pub fn from_size(size: usize) -> Option<Self> {
        match size {
            2 => Some(IndexType::U16),
            4 => Some(IndexType::U32),
            _ => None,
        }
    }
}

/// Indices of one draw
#[derive(Debug, Clone)]
pub struct IndexData {
    pub buffer: Arc<HardwareBuffer>,
    pub index_start: usize,
    pub index_count: usize,
}

impl IndexData {
    pub fn new(buffer: Arc<HardwareBuffer>, index_start: usize, index_count: usize) -> Self {
        Self { buffer, index_start, index_count }
    }

    pub fn index_type(&self) -> IndexType {
        IndexType::from_size(self.buffer.element_size()).unwrap_or(IndexType::U16)
    }

    /// Read the referenced indices (needs a readable or shadowed buffer)
    pub fn read_indices(&self) -> Result<Vec<u32>> {
        let index_size = self.index_type().size();
        let mut bytes = vec![0u8; self.index_count * index_size];
        self.buffer.read_data(self.index_start * index_size, &mut bytes)?;

        Ok(match self.index_type() {
            IndexType::U16 => bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            IndexType::U32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        })
    }

    /// Check every index references one of `vertex_count` vertices
    pub fn validate(&self, vertex_count: usize) -> Result<()> {
        if let Some(bad) = self.read_indices()?.into_iter().find(|&i| i as usize >= vertex_count) {
            engine_bail!("ogre::IndexData", InvalidParams,
                "Index {} references a vertex beyond the {} available", bad, vertex_count);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "vertex_data_tests.rs"]
mod tests;
