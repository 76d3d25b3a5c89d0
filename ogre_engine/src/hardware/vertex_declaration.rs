/// Vertex declaration: layout of vertex elements across streams

use crate::engine_bail;
use crate::error::Result;

/// Data type of one vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementType {
    Float1,
    Float2,
    Float3,
    Float4,
    /// Packed 8-bit RGBA colour
    Colour,
    Short2,
    Short4,
    UByte4,
    UByte4Norm,
    Int1,
}

impl VertexElementType {
    /// Size in bytes
    pub fn size(self) -> usize {
        match self {
            VertexElementType::Float1 => 4,
            VertexElementType::Float2 => 8,
            VertexElementType::Float3 => 12,
            VertexElementType::Float4 => 16,
            VertexElementType::Colour => 4,
            VertexElementType::Short2 => 4,
            VertexElementType::Short4 => 8,
            VertexElementType::UByte4 => 4,
            VertexElementType::UByte4Norm => 4,
            VertexElementType::Int1 => 4,
        }
    }

    pub fn component_count(self) -> usize {
        match self {
            VertexElementType::Float1 | VertexElementType::Int1 | VertexElementType::Colour => 1,
            VertexElementType::Float2 | VertexElementType::Short2 => 2,
            VertexElementType::Float3 => 3,
            VertexElementType::Float4
            | VertexElementType::Short4
            | VertexElementType::UByte4
            | VertexElementType::UByte4Norm => 4,
        }
    }
}

/// Meaning of a vertex element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementSemantic {
    Position,
    BlendWeights,
    BlendIndices,
    Normal,
    Diffuse,
    Specular,
    TexCoords,
    Binormal,
    Tangent,
}

/// One element of a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Stream (buffer binding index)
    pub source: u16,
    /// Byte offset inside the stream's vertex
    pub offset: usize,
    pub element_type: VertexElementType,
    pub semantic: VertexElementSemantic,
    /// Distinguishes repeated semantics (texture coordinate sets)
    pub index: u16,
}

impl VertexElement {
    pub fn size(&self) -> usize {
        self.element_type.size()
    }

    /// One past the last byte used by this element
    pub fn end(&self) -> usize {
        self.offset + self.size()
    }

    fn overlaps(&self, other: &VertexElement) -> bool {
        self.source == other.source && self.offset < other.end() && other.offset < self.end()
    }
}

/// Ordered list of vertex elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexDeclaration {
    elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    pub fn new() -> Self {
        Self { elements: Vec::new() }
    }

    /// Append an element
    ///
    /// Fails when the element overlaps another element of the same stream
    /// or repeats a (semantic, index) pair.
    pub fn add_element(
        &mut self,
        source: u16,
        offset: usize,
        element_type: VertexElementType,
        semantic: VertexElementSemantic,
        index: u16,
    ) -> Result<&VertexElement> {
        let element = VertexElement { source, offset, element_type, semantic, index };

        if let Some(existing) = self.elements.iter().find(|e| e.overlaps(&element)) {
            engine_bail!("ogre::VertexDeclaration", InvalidParams,
                "{:?} at offset {} overlaps {:?} at offset {} in stream {}",
                semantic, offset, existing.semantic, existing.offset, source);
        }
        if self.find_element_by_semantic(semantic, index).is_some() {
            engine_bail!("ogre::VertexDeclaration", DuplicateItem,
                "Element {:?}[{}] declared twice", semantic, index);
        }

        self.elements.push(element);
        let last = self.elements.len() - 1;
        Ok(&self.elements[last])
    }

    /// Remove the element at `index` in declaration order
    pub fn remove_element(&mut self, index: usize) -> Option<VertexElement> {
        (index < self.elements.len()).then(|| self.elements.remove(index))
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn find_element_by_semantic(
        &self,
        semantic: VertexElementSemantic,
        index: u16,
    ) -> Option<&VertexElement> {
        self.elements
            .iter()
            .find(|e| e.semantic == semantic && e.index == index)
    }

    pub fn elements_for_source(&self, source: u16) -> Vec<&VertexElement> {
        self.elements.iter().filter(|e| e.source == source).collect()
    }

    /// Bytes per vertex in `source`: the furthest element end
    pub fn vertex_size(&self, source: u16) -> usize {
        self.elements
            .iter()
            .filter(|e| e.source == source)
            .map(|e| e.end())
            .max()
            .unwrap_or(0)
    }

    /// Stream indices referenced, ascending, without duplicates
    pub fn sources(&self) -> Vec<u16> {
        let mut sources: Vec<u16> = self.elements.iter().map(|e| e.source).collect();
        sources.sort_unstable();
        sources.dedup();
        sources
    }
}

#[cfg(test)]
#[path = "vertex_declaration_tests.rs"]
mod tests;
