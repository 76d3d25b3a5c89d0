/// Technique: an ordered list of passes for one (scheme, LOD) slot.

use std::fmt;

use crate::gpu_program::GpuProgram;
use crate::render_system::RenderSystemCapabilities;
use crate::resource::ResourceManager;
use crate::resource::texture::TextureManager;
use super::pass::Pass;

pub const DEFAULT_SCHEME_NAME: &str = "Default";

/// Why a pass cannot run on the active backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileFailure {
    ProgramNotFound { pass: usize, program: String },
    ProgramLoadFailed { pass: usize, program: String, error: String },
    TooManyTextureUnits { pass: usize, requested: usize, limit: usize },
    BlendingNotRepresentable { pass: usize },
    TextureNotFound { pass: usize, texture: String },
    TextureLoadFailed { pass: usize, texture: String, error: String },
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileFailure::ProgramNotFound { pass, program } =>
                write!(f, "pass {}: program '{}' not found", pass, program),
            CompileFailure::ProgramLoadFailed { pass, program, error } =>
                write!(f, "pass {}: program '{}' failed to load: {}", pass, program, error),
            CompileFailure::TooManyTextureUnits { pass, requested, limit } =>
                write!(f, "pass {}: {} texture units requested, {} available", pass, requested, limit),
            CompileFailure::BlendingNotRepresentable { pass } =>
                write!(f, "pass {}: separate alpha blending is not supported", pass),
            CompileFailure::TextureNotFound { pass, texture } =>
                write!(f, "pass {}: texture '{}' not found", pass, texture),
            CompileFailure::TextureLoadFailed { pass, texture, error } =>
                write!(f, "pass {}: texture '{}' failed to load: {}", pass, texture, error),
        }
    }
}

/// Outcome of [`Technique::compile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileResult {
    pub supported: bool,
    pub failures: Vec<CompileFailure>,
}

#[derive(Clone)]
pub struct Technique {
    name: String,
    scheme: String,
    lod_index: u16,
    passes: Vec<Pass>,
    supported: bool,
    failures: Vec<CompileFailure>,
}

impl Technique {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            scheme: DEFAULT_SCHEME_NAME.to_string(),
            lod_index: 0,
            passes: Vec::new(),
            supported: false,
            failures: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn set_scheme(&mut self, scheme: &str) {
        self.scheme = scheme.to_string();
    }

    pub fn lod_index(&self) -> u16 {
        self.lod_index
    }

    pub fn set_lod_index(&mut self, lod_index: u16) {
        self.lod_index = lod_index;
    }

    // ===== PASSES =====

    pub fn create_pass(&mut self) -> &mut Pass {
        let index = self.passes.len();
        self.passes.push(Pass::new(index));
        &mut self.passes[index]
    }

    pub fn remove_pass(&mut self, index: usize) -> bool {
        if index >= self.passes.len() {
            return false;
        }
        self.passes.remove(index);
        for (i, pass) in self.passes.iter_mut().enumerate().skip(index) {
            pass.set_index(i);
        }
        true
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass(&self, index: usize) -> Option<&Pass> {
        self.passes.get(index)
    }

    pub fn pass_mut(&mut self, index: usize) -> Option<&mut Pass> {
        self.passes.get_mut(index)
    }

    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    /// Any pass blends with the frame buffer
    pub fn is_transparent(&self) -> bool {
        self.passes.iter().any(Pass::is_transparent)
    }

    // ===== SUPPORT =====

    /// Result of the last compile
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn compile_failures(&self) -> &[CompileFailure] {
        &self.failures
    }

    /// Compile every pass against the backend
    ///
    /// A technique without passes is unsupported.
    pub fn compile(
        &mut self,
        caps: &RenderSystemCapabilities,
        programs: &ResourceManager<GpuProgram>,
        textures: &TextureManager,
    ) -> CompileResult {
        let mut failures = Vec::new();
        for pass in &mut self.passes {
            failures.extend(pass.compile(caps, programs, textures));
        }
        self.supported = !self.passes.is_empty() && failures.is_empty();
        self.failures = failures.clone();
        CompileResult { supported: self.supported, failures }
    }

    pub(crate) fn release(&mut self) {
        for pass in &mut self.passes {
            pass.release();
        }
        self.supported = false;
    }
}

impl Default for Technique {
    fn default() -> Self {
        Self::new()
    }
}
