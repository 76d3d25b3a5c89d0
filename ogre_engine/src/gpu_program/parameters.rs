/// GPU program parameters: a float register file with named and
/// automatically bound constants.
///
/// The layout (named constant -> physical index) is fixed when the program
/// loads. Auto-constants are re-resolved from an
/// [`AutoParamDataSource`] before each draw, partitioned by how often they
/// change so that only the relevant slice is refreshed.

use std::collections::BTreeMap;
use bitflags::bitflags;
use glam::{Mat4, Vec4};

use crate::engine_bail;
use crate::error::Result;
use super::auto_param_data_source::AutoParamDataSource;

const SOURCE: &str = "ogre::GpuProgramParameters";

bitflags! {
    /// How often a constant changes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GpuParamVariability: u16 {
        /// Once per frame (view, projection, time)
        const PER_FRAME = 1 << 0;
        /// Once per pass
        const PER_PASS = 1 << 1;
        /// Once per renderable (world matrices, custom params)
        const PER_OBJECT = 1 << 2;
        /// Whenever the light list changes
        const PER_LIGHT = 1 << 3;
    }
}

/// Engine-known value bound to a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoConstantType {
    WorldMatrix,
    InverseWorldMatrix,
    /// Bone palette, three rows per matrix
    WorldMatrixArray3x4,
    ViewMatrix,
    ProjectionMatrix,
    ViewProjMatrix,
    WorldViewMatrix,
    WorldViewProjMatrix,
    CameraPosition,
    LightPosition(usize),
    LightDiffuseColour(usize),
    LightCount,
    AmbientLightColour,
    /// Seconds since the root started
    Time,
    /// (width, height, 1/width, 1/height)
    ViewportSize,
    /// Rasterisation offsets of the backend (h, v, h/width, v/height)
    TexelOffsets,
    PassNumber,
    /// Custom parameter `i` of the current renderable
    Custom(usize),
}

impl AutoConstantType {
    pub fn variability(self) -> GpuParamVariability {
        use AutoConstantType::*;
        match self {
            WorldMatrix | InverseWorldMatrix | WorldMatrixArray3x4 | WorldViewMatrix
            | WorldViewProjMatrix | Custom(_) => GpuParamVariability::PER_OBJECT,
            ViewMatrix | ProjectionMatrix | ViewProjMatrix | CameraPosition
            | AmbientLightColour | Time | ViewportSize | TexelOffsets => GpuParamVariability::PER_FRAME,
            LightPosition(_) | LightDiffuseColour(_) | LightCount => GpuParamVariability::PER_LIGHT,
            PassNumber => GpuParamVariability::PER_PASS,
        }
    }

    /// Floats written for this constant (bone palettes use the declared size)
    pub fn natural_size(self) -> usize {
        use AutoConstantType::*;
        match self {
            WorldMatrix | InverseWorldMatrix | ViewMatrix | ProjectionMatrix | ViewProjMatrix
            | WorldViewMatrix | WorldViewProjMatrix => 16,
            WorldMatrixArray3x4 => 12,
            CameraPosition | LightPosition(_) | LightDiffuseColour(_) | AmbientLightColour
            | ViewportSize | TexelOffsets | Custom(_) => 4,
            LightCount | Time | PassNumber => 1,
        }
    }
}

/// Placement of a named constant in the register file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuConstantDefinition {
    pub physical_index: usize,
    /// Floats
    pub element_count: usize,
    pub variability: GpuParamVariability,
}

/// An auto-constant bound to a range of the register file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoConstantEntry {
    pub constant: AutoConstantType,
    pub physical_index: usize,
    pub element_count: usize,
    pub variability: GpuParamVariability,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuProgramParameters {
    float_constants: Vec<f32>,
    named: BTreeMap<String, GpuConstantDefinition>,
    auto_constants: Vec<AutoConstantEntry>,
}

impl GpuProgramParameters {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== LAYOUT =====

    /// Append a named constant of `element_count` floats
    pub fn add_constant_definition(
        &mut self,
        name: &str,
        element_count: usize,
        variability: GpuParamVariability,
    ) -> Result<GpuConstantDefinition> {
        if element_count == 0 {
            engine_bail!(SOURCE, InvalidParams, "Constant '{}' has no elements", name);
        }
        if self.named.contains_key(name) {
            engine_bail!(SOURCE, DuplicateItem, "Constant '{}' already defined", name);
        }
        let definition = GpuConstantDefinition {
            physical_index: self.float_constants.len(),
            element_count,
            variability,
        };
        self.float_constants.resize(self.float_constants.len() + element_count, 0.0);
        self.named.insert(name.to_string(), definition);
        Ok(definition)
    }

    pub fn named_constant(&self, name: &str) -> Option<&GpuConstantDefinition> {
        self.named.get(name)
    }

    /// Named constants in name order
    pub fn named_constants(&self) -> impl Iterator<Item = (&str, &GpuConstantDefinition)> {
        self.named.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn float_constants(&self) -> &[f32] {
        &self.float_constants
    }

    pub fn float_constant_count(&self) -> usize {
        self.float_constants.len()
    }

    // ===== VALUES =====

    /// Write `values` at a physical register index
    pub fn set_constant(&mut self, physical_index: usize, values: &[f32]) -> Result<()> {
        let end = physical_index + values.len();
        if end > self.float_constants.len() {
            engine_bail!(SOURCE, InvalidParams,
                "Writing {} floats at {} exceeds the {} registers",
                values.len(), physical_index, self.float_constants.len());
        }
        self.float_constants[physical_index..end].copy_from_slice(values);
        Ok(())
    }

    pub fn set_named_constant(&mut self, name: &str, values: &[f32]) -> Result<()> {
        let Some(def) = self.named.get(name).copied() else {
            engine_bail!(SOURCE, ItemNotFound, "Constant '{}' not defined", name);
        };
        if values.len() > def.element_count {
            engine_bail!(SOURCE, InvalidParams,
                "Constant '{}' holds {} floats, got {}", name, def.element_count, values.len());
        }
        self.set_constant(def.physical_index, values)
    }

    pub fn set_named_vec4(&mut self, name: &str, value: Vec4) -> Result<()> {
        self.set_named_constant(name, &value.to_array())
    }

    pub fn set_named_matrix(&mut self, name: &str, value: &Mat4) -> Result<()> {
        self.set_named_constant(name, &value.to_cols_array())
    }

    /// Values of a named constant
    pub fn named_values(&self, name: &str) -> Option<&[f32]> {
        let def = self.named.get(name)?;
        self.float_constants.get(def.physical_index..def.physical_index + def.element_count)
    }

    /// Copy every constant whose name and size match in `other`
    pub fn copy_matching_named_constants(&mut self, other: &GpuProgramParameters) {
        for (name, def) in &self.named {
            if let (Some(other_def), Some(values)) = (other.named.get(name), other.named_values(name)) {
                if other_def.element_count == def.element_count {
                    self.float_constants[def.physical_index..def.physical_index + def.element_count]
                        .copy_from_slice(values);
                }
            }
        }
    }

    // ===== AUTO-CONSTANTS =====

    /// Bind a named constant to an engine-known value
    pub fn set_named_auto_constant(&mut self, name: &str, constant: AutoConstantType) -> Result<()> {
        let Some(def) = self.named.get(name).copied() else {
            engine_bail!(SOURCE, ItemNotFound, "Constant '{}' not defined", name);
        };
        if def.element_count < constant.natural_size() {
            engine_bail!(SOURCE, InvalidParams, "Constant '{}' too small for {:?}", name, constant);
        }
        let entry = AutoConstantEntry {
            constant,
            physical_index: def.physical_index,
            element_count: def.element_count,
            variability: constant.variability(),
        };
        self.auto_constants.retain(|e| e.physical_index != def.physical_index);
        self.auto_constants.push(entry);
        if let Some(named) = self.named.get_mut(name) {
            named.variability = entry.variability;
        }
        Ok(())
    }

    pub fn clear_auto_constants(&mut self) {
        self.auto_constants.clear();
    }

    pub fn auto_constants(&self) -> &[AutoConstantEntry] {
        &self.auto_constants
    }

    pub fn has_auto_constants(&self) -> bool {
        !self.auto_constants.is_empty()
    }

    /// Union of the variabilities of every auto-constant
    pub fn auto_variability(&self) -> GpuParamVariability {
        self.auto_constants
            .iter()
            .fold(GpuParamVariability::empty(), |acc, e| acc | e.variability)
    }

    /// Re-resolve the auto-constants whose variability intersects `mask`
    pub fn update_auto_params(&mut self, source: &AutoParamDataSource, mask: GpuParamVariability) {
        for entry in &self.auto_constants {
            if !entry.variability.intersects(mask) {
                continue;
            }
            let Some(values) = Self::resolve(entry, source) else {
                continue;
            };
            let count = values.len().min(entry.element_count);
            let start = entry.physical_index;
            self.float_constants[start..start + count].copy_from_slice(&values[..count]);
        }
    }

    fn resolve(entry: &AutoConstantEntry, source: &AutoParamDataSource) -> Option<Vec<f32>> {
        use AutoConstantType::*;
        let values = match entry.constant {
            WorldMatrix => source.world_matrix().to_cols_array().to_vec(),
            InverseWorldMatrix => source.inverse_world_matrix().to_cols_array().to_vec(),
            WorldMatrixArray3x4 => {
                let bones = (entry.element_count / 12).max(1);
                source
                    .world_matrix_array()
                    .iter()
                    .take(bones)
                    .flat_map(|m| {
                        let (r0, r1, r2) = (m.row(0), m.row(1), m.row(2));
                        r0.to_array().into_iter().chain(r1.to_array()).chain(r2.to_array())
                    })
                    .collect()
            }
            ViewMatrix => source.view_matrix().to_cols_array().to_vec(),
            ProjectionMatrix => source.projection_matrix().to_cols_array().to_vec(),
            ViewProjMatrix => source.view_proj_matrix().to_cols_array().to_vec(),
            WorldViewMatrix => source.world_view_matrix().to_cols_array().to_vec(),
            WorldViewProjMatrix => source.world_view_proj_matrix().to_cols_array().to_vec(),
            CameraPosition => source.camera_position().extend(1.0).to_array().to_vec(),
            LightPosition(i) => source.light(i).position.to_array().to_vec(),
            LightDiffuseColour(i) => source.light(i).diffuse.to_array().to_vec(),
            LightCount => vec![source.light_count() as f32],
            AmbientLightColour => source.ambient_light().to_array().to_vec(),
            Time => vec![source.time()],
            ViewportSize => {
                let size = source.viewport_size();
                let (w, h) = (size.x.max(1.0), size.y.max(1.0));
                vec![size.x, size.y, 1.0 / w, 1.0 / h]
            }
            TexelOffsets => {
                let offsets = source.texel_offsets();
                let size = source.viewport_size();
                let (w, h) = (size.x.max(1.0), size.y.max(1.0));
                vec![offsets.x, offsets.y, offsets.x / w, offsets.y / h]
            }
            PassNumber => vec![source.pass_number() as f32],
            Custom(i) => source.custom_param(i)?.to_array().to_vec(),
        };
        Some(values)
    }
}

#[cfg(test)]
#[path = "parameters_tests.rs"]
mod tests;
