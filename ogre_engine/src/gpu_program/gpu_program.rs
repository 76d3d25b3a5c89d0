/// GPU program resource
///
/// A program holds its source (inline or read from a resource archive),
/// compiles it through the render system at load time, and owns the
/// default parameter layout handed out to passes. Compiled microcode is
/// looked up in, and added to, the manager's microcode cache keyed by
/// [`GpuProgram::fingerprint`].

use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use rustc_hash::FxHasher;

use crate::engine_bail;
use crate::error::{Error, Result};
use crate::render_system::{
    lock_render_system, Capabilities, GpuProgramDesc, GpuProgramObject, SharedRenderSystem,
};
use crate::resource::{NameValuePairList, ResourceData, ResourceInfo};
use super::microcode_cache::MicrocodeCache;
use super::parameters::{AutoConstantType, GpuParamVariability, GpuProgramParameters};

const SOURCE: &str = "ogre::GpuProgram";

/// Pipeline stage of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuProgramType {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl GpuProgramType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vertex_program" => Some(Self::Vertex),
            "fragment" | "fragment_program" | "pixel" => Some(Self::Fragment),
            "geometry" | "geometry_program" => Some(Self::Geometry),
            "compute" | "compute_program" => Some(Self::Compute),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        }
    }

    /// Backend capability needed to run programs of this type
    pub fn required_capability(self) -> Capabilities {
        match self {
            Self::Vertex => Capabilities::VERTEX_PROGRAM,
            Self::Fragment => Capabilities::FRAGMENT_PROGRAM,
            Self::Geometry => Capabilities::GEOMETRY_PROGRAM,
            Self::Compute => Capabilities::COMPUTE_PROGRAM,
        }
    }
}

// ============================================================================
// Load context
// ============================================================================

/// State shared by every program of a manager
pub struct GpuProgramContext {
    render_system: SharedRenderSystem,
    cache: Mutex<MicrocodeCache>,
    save_microcodes: AtomicBool,
}

impl GpuProgramContext {
    pub fn new(render_system: SharedRenderSystem) -> Self {
        Self {
            render_system,
            cache: Mutex::new(MicrocodeCache::new()),
            save_microcodes: AtomicBool::new(false),
        }
    }

    pub fn render_system(&self) -> &SharedRenderSystem {
        &self.render_system
    }

    pub fn cache(&self) -> Result<MutexGuard<'_, MicrocodeCache>> {
        self.cache
            .lock()
            .map_err(|_| Error::InternalError("microcode cache poisoned".to_string()))
    }

    pub fn save_microcodes(&self) -> bool {
        self.save_microcodes.load(Ordering::Acquire)
    }

    pub(crate) fn set_save_microcodes(&self, enabled: bool) {
        self.save_microcodes.store(enabled, Ordering::Release);
    }
}

// ============================================================================
// Program
// ============================================================================

pub struct GpuProgram {
    program_type: GpuProgramType,
    language: String,
    syntax: String,
    entry_point: String,
    defines: Vec<String>,
    source: String,
    /// Archive file the source is read from; `None` for inline source
    source_file: Option<String>,
    constants: Vec<(String, usize)>,
    auto_constants: Vec<(String, AutoConstantType)>,
    default_params: Option<GpuProgramParameters>,
    gpu_object: Option<Arc<dyn GpuProgramObject>>,
    compile_error: bool,
    loaded_from_cache: bool,
}

impl GpuProgram {
    pub fn program_type(&self) -> GpuProgramType {
        self.program_type
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    pub fn set_syntax(&mut self, syntax: &str) {
        self.syntax = syntax.to_string();
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    /// `NAME` or `NAME=VALUE`; takes effect at the next load
    pub fn set_defines(&mut self, defines: Vec<String>) {
        self.defines = defines;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Use inline source instead of an archive file
    pub fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
        self.source_file = None;
    }

    pub fn set_source_file(&mut self, file: &str) {
        self.source_file = Some(file.to_string());
        self.source.clear();
    }

    /// Declare a named constant of `element_count` floats
    ///
    /// Declarations fix the parameter layout built at load time.
    pub fn declare_constant(&mut self, name: &str, element_count: usize) {
        match self.constants.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = element_count,
            None => self.constants.push((name.to_string(), element_count)),
        }
    }

    /// Bind a declared constant to an engine value in the default parameters
    pub fn declare_auto_constant(&mut self, name: &str, constant: AutoConstantType) {
        if !self.constants.iter().any(|(n, _)| n == name) {
            self.constants.push((name.to_string(), constant.natural_size()));
        }
        self.auto_constants.retain(|(n, _)| n != name);
        self.auto_constants.push((name.to_string(), constant));
    }

    pub fn is_loaded(&self) -> bool {
        self.gpu_object.is_some()
    }

    /// Compiled backend object while loaded
    pub fn gpu_object(&self) -> Option<&Arc<dyn GpuProgramObject>> {
        self.gpu_object.as_ref()
    }

    /// Last load failed to compile or was rejected by the backend
    pub fn has_compile_error(&self) -> bool {
        self.compile_error
    }

    /// Last load created the program from cached microcode
    pub fn was_loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }

    /// Default parameters, laid out at load time
    pub fn default_parameters(&self) -> Option<&GpuProgramParameters> {
        self.default_params.as_ref()
    }

    /// Fresh copy of the default parameters for a pass
    pub fn create_parameters(&self) -> Result<GpuProgramParameters> {
        match &self.default_params {
            Some(params) => Ok(params.clone()),
            None => {
                engine_bail!(SOURCE, InvalidState,
                    "Program parameters requested before the program is loaded");
            }
        }
    }

    /// Stable id of (type, syntax, defines, entry point, source)
    ///
    /// Identical inputs give the same id in every run; it keys the
    /// microcode cache.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = FxHasher::default();
        hasher.write(self.program_type.name().as_bytes());
        hasher.write_u8(0);
        hasher.write(self.syntax.as_bytes());
        hasher.write_u8(0);
        for define in &self.defines {
            hasher.write(define.as_bytes());
            hasher.write_u8(b';');
        }
        hasher.write_u8(0);
        hasher.write(self.entry_point.as_bytes());
        hasher.write_u8(0);
        hasher.write(self.source.as_bytes());
        let hash = hasher.finish();
        (hash ^ (hash >> 32)) as u32
    }

    fn desc(&self, name: &str) -> GpuProgramDesc {
        GpuProgramDesc {
            name: name.to_string(),
            program_type: self.program_type,
            language: self.language.clone(),
            syntax: self.syntax.clone(),
            source: self.source.clone(),
            defines: self.defines.clone(),
            entry_point: self.entry_point.clone(),
        }
    }

    fn build_default_parameters(&self) -> Result<GpuProgramParameters> {
        let mut params = GpuProgramParameters::new();
        for (name, count) in &self.constants {
            params.add_constant_definition(name, *count, GpuParamVariability::PER_OBJECT)?;
        }
        for (name, constant) in &self.auto_constants {
            params.set_named_auto_constant(name, *constant)?;
        }
        Ok(params)
    }

    /// Compile from source, or create from cached microcode
    fn create_gpu_object(&mut self, info: &ResourceInfo, ctx: &GpuProgramContext) -> Result<Arc<dyn GpuProgramObject>> {
        let mut rs = lock_render_system(&ctx.render_system)?;
        let caps = rs.capabilities().clone();
        if !caps.has(self.program_type.required_capability()) {
            engine_bail!(SOURCE, RenderingApiError,
                "Program '{}': {} programs are not supported by '{}'",
                info.name, self.program_type.name(), rs.name());
        }
        if !caps.is_syntax_supported(&self.syntax) {
            engine_bail!(SOURCE, RenderingApiError,
                "Program '{}': syntax '{}' is not supported by '{}'", info.name, self.syntax, rs.name());
        }

        let id = self.fingerprint();
        let cached = ctx.cache()?.get(id).map(<[u8]>::to_vec);
        if let Some(microcode) = cached {
            match rs.create_gpu_program_from_microcode(self.program_type, &microcode) {
                Ok(object) => {
                    self.loaded_from_cache = true;
                    return Ok(object);
                }
                Err(e) => {
                    crate::engine_warn!(SOURCE,
                        "Cached microcode of '{}' rejected ({}), compiling from source", info.name, e);
                    ctx.cache()?.remove(id);
                }
            }
        }

        let object = rs.create_gpu_program(&self.desc(&info.name))?;
        if ctx.save_microcodes() && caps.has(Capabilities::CAN_GET_COMPILED_SHADER_BUFFER) {
            if let Some(microcode) = object.microcode() {
                ctx.cache()?.add(id, microcode);
            }
        }
        Ok(object)
    }
}

fn parse_defines(value: &str) -> Vec<String> {
    value
        .split([';', ','])
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

impl ResourceData for GpuProgram {
    type Context = GpuProgramContext;
    const RESOURCE_TYPE: &'static str = "GpuProgram";
    const LOAD_ORDER: u32 = 50;

    /// Recognised parameters: `type`, `language` (default `glsl`),
    /// `syntax` (default: the language), `entry_point` (default `main`),
    /// `defines` (`;` or `,` separated) and `source_file`
    fn create(info: &ResourceInfo, params: &NameValuePairList) -> Result<Self> {
        let program_type = match params.get("type") {
            None => GpuProgramType::Vertex,
            Some(value) => match GpuProgramType::from_name(value) {
                Some(program_type) => program_type,
                None => {
                    engine_bail!(SOURCE, InvalidParams,
                        "Program '{}': unknown program type '{}'", info.name, value);
                }
            },
        };
        let language = params.get("language").cloned().unwrap_or_else(|| "glsl".to_string());
        let syntax = params.get("syntax").cloned().unwrap_or_else(|| language.clone());
        Ok(Self {
            program_type,
            language,
            syntax,
            entry_point: params.get("entry_point").cloned().unwrap_or_else(|| "main".to_string()),
            defines: params.get("defines").map(|d| parse_defines(d)).unwrap_or_default(),
            source: String::new(),
            source_file: Some(params.get("source_file").cloned().unwrap_or_else(|| info.name.clone())),
            constants: Vec::new(),
            auto_constants: Vec::new(),
            default_params: None,
            gpu_object: None,
            compile_error: false,
            loaded_from_cache: false,
        })
    }

    fn source_file(&self, _info: &ResourceInfo) -> Option<String> {
        self.source_file.clone()
    }

    fn prepare_from_bytes(&mut self, info: &ResourceInfo, bytes: Vec<u8>) -> Result<()> {
        match String::from_utf8(bytes) {
            Ok(source) => {
                self.source = source;
                Ok(())
            }
            Err(_) => {
                engine_bail!(SOURCE, InvalidAsset, "Program '{}': source is not UTF-8", info.name);
            }
        }
    }

    fn load(&mut self, info: &ResourceInfo, ctx: &GpuProgramContext) -> Result<()> {
        self.compile_error = false;
        self.loaded_from_cache = false;
        let object = match self.create_gpu_object(info, ctx) {
            Ok(object) => object,
            Err(e) => {
                self.compile_error = true;
                return Err(e);
            }
        };
        self.default_params = Some(self.build_default_parameters()?);
        self.gpu_object = Some(object);
        Ok(())
    }

    fn unload(&mut self, _info: &ResourceInfo, _ctx: &GpuProgramContext) {
        self.gpu_object = None;
        self.default_params = None;
        if self.source_file.is_some() {
            self.source.clear();
        }
    }

    fn calculate_size(&self) -> usize {
        let microcode = self
            .gpu_object
            .as_ref()
            .and_then(|o| o.microcode())
            .map(|m| m.len())
            .unwrap_or(0);
        self.source.len() + microcode + self.default_params.as_ref().map_or(0, |p| p.float_constant_count() * 4)
    }
}
