use std::io::Cursor;
use std::sync::Mutex;
use tempfile::TempDir;
use super::*;
use crate::error::ErrorKind;
use crate::gpu_program::{AutoConstantType, GpuParamVariability};
use crate::render_system::mock::{MockRecorder, MockRenderSystem};
use crate::render_system::{Capabilities, SharedRenderSystem};
use crate::resource::{ResourceGroupManager, ResourceState, DEFAULT_RESOURCE_GROUP_NAME};

const GENERAL: &str = DEFAULT_RESOURCE_GROUP_NAME;
const VERTEX_SOURCE: &str = "void main() { gl_Position = worldViewProj * position; }";

// ============================================================================
// Helpers
// ============================================================================

fn setup_with(mock: MockRenderSystem) -> (ResourceGroupManager, GpuProgramManager, MockRecorder) {
    let recorder = mock.recorder();
    let rs: SharedRenderSystem = Arc::new(Mutex::new(mock));
    let groups = ResourceGroupManager::new();
    let manager = GpuProgramManager::new(groups.registry().clone(), rs);
    (groups, manager, recorder)
}

fn setup() -> (ResourceGroupManager, GpuProgramManager, MockRecorder) {
    setup_with(MockRenderSystem::new())
}

fn fingerprint(program: &ResourceRef<GpuProgram>) -> u32 {
    program.upgrade().unwrap().data().unwrap().fingerprint()
}

// ============================================================================
// Creation and loading
// ============================================================================

#[test]
fn test_create_and_load_inline_program() {
    let (_groups, manager, recorder) = setup();
    let program = manager
        .create_program("basic_vs", GENERAL, GpuProgramType::Vertex, "glsl330", VERTEX_SOURCE)
        .unwrap();
    manager.programs().load(&program).unwrap();

    assert_eq!(program.state(), ResourceState::Loaded);
    let resource = program.upgrade().unwrap();
    let data = resource.data().unwrap();
    assert!(data.is_loaded());
    assert_eq!(data.program_type(), GpuProgramType::Vertex);
    assert_eq!(data.gpu_object().unwrap().program_type(), GpuProgramType::Vertex);
    assert!(!data.was_loaded_from_cache());
    assert_eq!(recorder.source_compile_count(), 1);
}

#[test]
fn test_unsupported_syntax_is_rendering_api_error() {
    let (_groups, manager, recorder) = setup();
    let program = manager
        .create_program("hlsl_vs", GENERAL, GpuProgramType::Vertex, "vs_5_0", VERTEX_SOURCE)
        .unwrap();
    let err = manager.programs().load(&program).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderingApiError);
    assert_eq!(program.state(), ResourceState::Unloaded);
    assert!(program.upgrade().unwrap().data().unwrap().has_compile_error());
    assert_eq!(recorder.source_compile_count(), 0);
}

#[test]
fn test_compile_failure_keeps_program_unloaded() {
    let (_groups, manager, _recorder) = setup();
    let program = manager
        .create_program("broken_fs", GENERAL, GpuProgramType::Fragment, "glsl", "#error nope")
        .unwrap();
    assert_eq!(manager.programs().load(&program).unwrap_err().kind(), ErrorKind::RenderingApiError);
    assert!(program.upgrade().unwrap().data().unwrap().has_compile_error());
}

#[test]
fn test_missing_stage_capability() {
    let (_groups, manager, _recorder) = setup();
    let program = manager
        .create_program("cull_cs", GENERAL, GpuProgramType::Compute, "glsl", "void main() {}")
        .unwrap();
    assert_eq!(manager.programs().load(&program).unwrap_err().kind(), ErrorKind::RenderingApiError);
}

#[test]
fn test_source_from_archive() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("basic.vert"), VERTEX_SOURCE).unwrap();
    let (groups, manager, recorder) = setup();
    groups
        .add_resource_location(dir.path().to_str().unwrap(), "FileSystem", GENERAL, false)
        .unwrap();

    let program = manager
        .create_program_from_file("basic_vs", GENERAL, "basic.vert", GpuProgramType::Vertex, "glsl")
        .unwrap();
    manager.programs().load(&program).unwrap();
    assert_eq!(program.upgrade().unwrap().data().unwrap().source(), VERTEX_SOURCE);
    assert_eq!(recorder.source_compile_count(), 1);

    // File source is dropped on unload and read again on load
    manager.programs().unload(&program).unwrap();
    assert!(program.upgrade().unwrap().data().unwrap().source().is_empty());
    manager.programs().load(&program).unwrap();
    assert_eq!(program.upgrade().unwrap().data().unwrap().source(), VERTEX_SOURCE);
}

#[test]
fn test_missing_source_file() {
    let (_groups, manager, _recorder) = setup();
    let program = manager
        .create_program_from_file("ghost", GENERAL, "ghost.vert", GpuProgramType::Vertex, "glsl")
        .unwrap();
    assert_eq!(manager.programs().load(&program).unwrap_err().kind(), ErrorKind::FileNotFound);
}

#[test]
fn test_default_parameters_layout() {
    let (_groups, manager, _recorder) = setup();
    let program = manager
        .create_program("skinned_vs", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE)
        .unwrap();
    {
        let resource = program.upgrade().unwrap();
        let mut data = resource.data().unwrap();
        data.declare_auto_constant("worldViewProj", AutoConstantType::WorldViewProjMatrix);
        data.declare_constant("tint", 4);
        assert_eq!(data.create_parameters().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    let params = manager.create_parameters(&program).unwrap();
    assert_eq!(params.float_constant_count(), 20);
    assert_eq!(params.auto_constants().len(), 1);
    assert_eq!(params.auto_variability(), GpuParamVariability::PER_OBJECT);
    assert_eq!(params.named_constant("tint").unwrap().physical_index, 16);
}

#[test]
fn test_syntax_queries() {
    let (_groups, manager, _recorder) = setup();
    assert!(manager.is_syntax_supported("glsl330"));
    assert!(!manager.is_syntax_supported("hlsl"));
    assert_eq!(manager.supported_syntaxes(), vec!["glsl", "glsl330", "spirv"]);
}

// ============================================================================
// Fingerprint
// ============================================================================

#[test]
fn test_fingerprint_is_stable_and_input_sensitive() {
    let (_groups, manager, _recorder) = setup();
    let a = manager.create_program("a", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    let b = manager.create_program("b", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    let c = manager.create_program("c", GENERAL, GpuProgramType::Fragment, "glsl", VERTEX_SOURCE).unwrap();
    // Same inputs, different names
    assert_eq!(fingerprint(&a), fingerprint(&b));
    assert_ne!(fingerprint(&a), fingerprint(&c));

    let before = fingerprint(&b);
    b.upgrade().unwrap().data().unwrap().set_defines(vec!["SKINNED".to_string()]);
    assert_ne!(fingerprint(&b), before);
}

// ============================================================================
// Microcode cache
// ============================================================================

#[test]
fn test_compilation_fills_cache_when_enabled() {
    let (_groups, mut manager, _recorder) = setup();
    let program = manager.create_program("p", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    manager.programs().load(&program).unwrap();
    assert!(!manager.is_microcode_available_in_cache(fingerprint(&program)));
    assert!(!manager.is_cache_dirty());

    manager.set_save_microcodes_to_cache(true);
    manager.programs().reload(&program).unwrap();
    let id = fingerprint(&program);
    assert!(manager.is_microcode_available_in_cache(id));
    assert!(manager.is_cache_dirty());
    assert!(manager.microcode_from_cache(id).unwrap().starts_with(b"MOCKBIN:"));
}

#[test]
fn test_cached_microcode_skips_compilation() {
    let (_groups, manager, recorder) = setup();
    let program = manager.create_program("p", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    let id = fingerprint(&program);
    manager.add_microcode_to_cache(id, b"MOCKBIN:precompiled".to_vec()).unwrap();

    manager.programs().load(&program).unwrap();
    assert_eq!(recorder.source_compile_count(), 0);
    assert_eq!(recorder.microcode_load_count(), 1);
    assert!(program.upgrade().unwrap().data().unwrap().was_loaded_from_cache());
}

#[test]
fn test_rejected_microcode_falls_back_to_source() {
    let (_groups, manager, recorder) = setup();
    let program = manager.create_program("p", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    let id = fingerprint(&program);
    manager.add_microcode_to_cache(id, b"garbage".to_vec()).unwrap();

    manager.programs().load(&program).unwrap();
    assert_eq!(recorder.source_compile_count(), 1);
    assert!(!manager.is_microcode_available_in_cache(id));
}

#[test]
fn test_save_requires_backend_capability() {
    let mut mock = MockRenderSystem::new();
    mock.capabilities_mut().capabilities.remove(Capabilities::CAN_GET_COMPILED_SHADER_BUFFER);
    let (_groups, mut manager, _recorder) = setup_with(mock);
    manager.set_save_microcodes_to_cache(true);

    let program = manager.create_program("p", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    manager.programs().load(&program).unwrap();
    assert!(!manager.can_get_compiled_shader_buffer());
    assert_eq!(manager.cache_entry_count(), 0);

    let mut bytes = Vec::new();
    assert!(!manager.save_microcode_cache(&mut bytes).unwrap());
    assert!(bytes.is_empty());
}

#[test]
fn test_cache_hit_across_runs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("microcode.cache");

    // First run compiles and persists
    let fingerprint_first = {
        let (_groups, mut manager, recorder) = setup();
        manager.set_save_microcodes_to_cache(true);
        let program = manager.create_program("P", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
        manager.programs().load(&program).unwrap();
        assert_eq!(recorder.source_compile_count(), 1);
        assert!(manager.save_microcode_cache_to_file(&path).unwrap());
        assert!(!manager.is_cache_dirty());
        fingerprint(&program)
    };

    // Second run loads from the cache only
    let (_groups, manager, recorder) = setup();
    assert_eq!(manager.load_microcode_cache_from_file(&path).unwrap(), 1);
    let program = manager.create_program("P", GENERAL, GpuProgramType::Vertex, "glsl", VERTEX_SOURCE).unwrap();
    assert_eq!(fingerprint(&program), fingerprint_first);
    assert!(manager.is_microcode_available_in_cache(fingerprint_first));

    manager.programs().load(&program).unwrap();
    assert_eq!(recorder.source_compile_count(), 0);
    assert_eq!(recorder.microcode_load_count(), 1);
}

#[test]
fn test_cache_stream_round_trip_and_remove() {
    let (_groups, manager, _recorder) = setup();
    manager.add_microcode_to_cache(1, b"MOCKBIN:one".to_vec()).unwrap();
    let mut bytes = Vec::new();
    assert!(manager.save_microcode_cache(&mut bytes).unwrap());

    let (_groups, other, _recorder) = setup();
    assert_eq!(other.load_microcode_cache(&mut Cursor::new(bytes)).unwrap(), 1);
    assert_eq!(other.microcode_from_cache(1).unwrap(), b"MOCKBIN:one".to_vec());
    assert!(other.remove_microcode_from_cache(1).unwrap());
    assert!(other.is_cache_dirty());
}
