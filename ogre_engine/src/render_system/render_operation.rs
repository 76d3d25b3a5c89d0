/// Geometry submitted by one draw call

use std::sync::Arc;
use crate::hardware::{IndexData, VertexData};

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationType {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl OperationType {
    /// Number of primitives drawn from `count` vertices or indices
    pub fn primitive_count(self, count: usize) -> usize {
        match self {
            OperationType::PointList => count,
            OperationType::LineList => count / 2,
            OperationType::LineStrip => count.saturating_sub(1),
            OperationType::TriangleList => count / 3,
            OperationType::TriangleStrip | OperationType::TriangleFan => count.saturating_sub(2),
        }
    }
}

/// Vertex data, optional index data and topology of one draw
#[derive(Clone)]
pub struct RenderOperation {
    pub vertex_data: Arc<VertexData>,
    pub index_data: Option<Arc<IndexData>>,
    pub operation_type: OperationType,
    pub use_indexes: bool,
}

impl RenderOperation {
    /// Non-indexed draw
    pub fn new(vertex_data: Arc<VertexData>, operation_type: OperationType) -> Self {
        Self {
            vertex_data,
            index_data: None,
            operation_type,
            use_indexes: false,
        }
    }

    /// Indexed draw
    pub fn indexed(
        vertex_data: Arc<VertexData>,
        index_data: Arc<IndexData>,
        operation_type: OperationType,
    ) -> Self {
        Self {
            vertex_data,
            index_data: Some(index_data),
            operation_type,
            use_indexes: true,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_data.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_data.as_ref().map(|i| i.index_count).unwrap_or(0)
    }

    /// Number of elements the draw consumes (indices when indexed)
    pub fn element_count(&self) -> usize {
        if self.use_indexes {
            self.index_count()
        } else {
            self.vertex_count()
        }
    }

    /// Nothing would be drawn (no indices, or no vertices)
    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }
}

impl std::fmt::Debug for RenderOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOperation")
            .field("operation_type", &self.operation_type)
            .field("use_indexes", &self.use_indexes)
            .field("vertex_count", &self.vertex_count())
            .field("index_count", &self.index_count())
            .finish()
    }
}
