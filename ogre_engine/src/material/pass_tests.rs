use std::sync::Mutex;
use super::*;
use crate::error::ErrorKind;
use crate::gpu_program::GpuProgramManager;
use crate::hardware::PixelFormat;
use crate::render_system::mock::MockRenderSystem;
use crate::render_system::{RenderSystem, SharedRenderSystem, TextureDesc};
use crate::resource::texture::TextureContext;
use crate::resource::{ResourceGroupManager, DEFAULT_RESOURCE_GROUP_NAME};

const GENERAL: &str = DEFAULT_RESOURCE_GROUP_NAME;

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    _groups: ResourceGroupManager,
    programs: GpuProgramManager,
    textures: TextureManager,
    caps: RenderSystemCapabilities,
}

fn setup() -> Fixture {
    let mock = MockRenderSystem::new();
    let caps = mock.capabilities().clone();
    let rs: SharedRenderSystem = Arc::new(Mutex::new(mock));
    let groups = ResourceGroupManager::new();
    let programs = GpuProgramManager::new(groups.registry().clone(), rs.clone());
    let textures = TextureManager::new(groups.registry().clone(), Arc::new(TextureContext::new(rs)));
    Fixture { _groups: groups, programs, textures, caps }
}

fn add_texture(fixture: &Fixture, name: &str) {
    let desc = TextureDesc::new_2d(name, 4, 4, PixelFormat::R8G8B8A8_UNORM);
    fixture.textures.create_manual(GENERAL, desc, None).unwrap();
}

fn compile(fixture: &Fixture, pass: &mut Pass) -> Vec<CompileFailure> {
    pass.compile(&fixture.caps, fixture.programs.programs(), &fixture.textures)
}

// ============================================================================
// Hash
// ============================================================================

#[test]
fn test_hash_index_in_top_bits() {
    let first = Pass::new(0);
    let second = Pass::new(1);
    assert_eq!(first.hash() >> 28, 0);
    assert_eq!(second.hash() >> 28, 1);
    assert!(first.hash() < second.hash());
}

#[test]
fn test_hash_index_clamped_to_four_bits() {
    assert_eq!(Pass::new(40).hash() >> 28, 15);
}

#[test]
fn test_hash_stable_and_content_sensitive() {
    let mut a = Pass::new(0);
    a.set_vertex_program("vs");
    a.create_texture_unit_state("stone.png");
    let mut b = Pass::new(0);
    b.set_vertex_program("vs");
    b.create_texture_unit_state("stone.png");
    assert_eq!(a.hash(), b.hash());

    b.texture_unit_state_mut(0).unwrap().set_texture_name("wood.png");
    b.recalculate_hash();
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn test_hash_ignores_third_texture() {
    let mut a = Pass::new(0);
    let mut b = Pass::new(0);
    for pass in [&mut a, &mut b] {
        pass.create_texture_unit_state("t0");
        pass.create_texture_unit_state("t1");
    }
    a.create_texture_unit_state("t2");
    b.create_texture_unit_state("other");
    assert_eq!(a.hash(), b.hash());
}

// ============================================================================
// Transparency
// ============================================================================

#[test]
fn test_default_pass_is_opaque() {
    let pass = Pass::new(0);
    assert!(!pass.is_transparent());
    assert!(!pass.is_programmable());
}

#[test]
fn test_alpha_blend_is_transparent() {
    let mut pass = Pass::new(0);
    pass.set_scene_blending(SceneBlendType::TransparentAlpha);
    assert!(pass.is_transparent());
    assert!(pass.is_transparent_sorted());
    pass.transparent_sorting = false;
    assert!(!pass.is_transparent_sorted());
}

#[test]
fn test_separate_alpha_blend_counts_as_transparent() {
    let mut pass = Pass::new(0);
    pass.scene_blend_alpha = Some(SceneBlend::from_type(SceneBlendType::Add));
    assert!(pass.is_transparent());
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn test_fixed_function_pass_compiles() {
    let fixture = setup();
    let mut pass = Pass::new(0);
    assert!(compile(&fixture, &mut pass).is_empty());
}

#[test]
fn test_too_many_texture_units() {
    let fixture = setup();
    add_texture(&fixture, "t");
    let mut pass = Pass::new(0);
    for _ in 0..17 {
        pass.create_texture_unit_state("t");
    }
    let failures = compile(&fixture, &mut pass);
    assert_eq!(
        failures,
        vec![CompileFailure::TooManyTextureUnits { pass: 0, requested: 17, limit: 16 }]
    );
}

#[test]
fn test_separate_alpha_blend_needs_capability() {
    let fixture = setup();
    let mut pass = Pass::new(2);
    pass.scene_blend_alpha = Some(SceneBlend::REPLACE);
    assert_eq!(
        compile(&fixture, &mut pass),
        vec![CompileFailure::BlendingNotRepresentable { pass: 2 }]
    );
}

#[test]
fn test_missing_program_and_texture_reported() {
    let fixture = setup();
    let mut pass = Pass::new(0);
    pass.set_fragment_program("nowhere_fs");
    pass.create_texture_unit_state("missing.png");
    let failures = compile(&fixture, &mut pass);
    assert_eq!(failures.len(), 2);
    assert!(matches!(&failures[0], CompileFailure::ProgramNotFound { program, .. } if program == "nowhere_fs"));
    assert!(matches!(&failures[1], CompileFailure::TextureNotFound { texture, .. } if texture == "missing.png"));
}

#[test]
fn test_program_type_mismatch() {
    let fixture = setup();
    fixture
        .programs
        .create_program("vs", GENERAL, GpuProgramType::Vertex, "glsl", "void main() {}")
        .unwrap();
    let mut pass = Pass::new(0);
    pass.set_fragment_program("vs");
    let failures = compile(&fixture, &mut pass);
    assert!(matches!(&failures[0], CompileFailure::ProgramLoadFailed { program, .. } if program == "vs"));
}

#[test]
fn test_compile_resolves_programs_and_textures() {
    let fixture = setup();
    let program = fixture
        .programs
        .create_program("tint_fs", GENERAL, GpuProgramType::Fragment, "glsl", "uniform vec4 tint;")
        .unwrap();
    program
        .upgrade()
        .unwrap()
        .data()
        .unwrap()
        .declare_constant("tint", 4);
    add_texture(&fixture, "diffuse.png");

    let mut pass = Pass::new(0);
    pass.set_fragment_program("tint_fs");
    pass.program_mut(GpuProgramType::Fragment)
        .unwrap()
        .set_named_constant("tint", &[1.0, 0.5, 0.25, 1.0])
        .unwrap();
    pass.create_texture_unit_state("diffuse.png");

    assert!(compile(&fixture, &mut pass).is_empty());
    let usage = pass.program(GpuProgramType::Fragment).unwrap();
    assert!(usage.gpu_object().is_some());
    assert_eq!(
        usage.parameters().unwrap().named_values("tint"),
        Some(&[1.0, 0.5, 0.25, 1.0][..])
    );
    assert!(pass.texture_unit_states()[0].gpu_texture().is_some());

    pass.release();
    assert!(pass.program(GpuProgramType::Fragment).unwrap().gpu_object().is_none());
    assert!(pass.texture_unit_states()[0].gpu_texture().is_none());
}

#[test]
fn test_constant_errors_reported_after_compile() {
    let fixture = setup();
    let program = fixture
        .programs
        .create_program("tint_fs", GENERAL, GpuProgramType::Fragment, "glsl", "uniform vec4 tint;")
        .unwrap();
    program.upgrade().unwrap().data().unwrap().declare_constant("tint", 4);

    let mut pass = Pass::new(0);
    pass.set_fragment_program("tint_fs");
    // Not compiled yet: stored for later
    pass.program_mut(GpuProgramType::Fragment)
        .unwrap()
        .set_named_constant("tint", &[1.0; 4])
        .unwrap();
    assert!(compile(&fixture, &mut pass).is_empty());

    let usage = pass.program_mut(GpuProgramType::Fragment).unwrap();
    let err = usage.set_named_constant("missing", &[1.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
    let err = usage.set_named_constant("tint", &[2.0; 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    let err = usage.set_named_auto_constant("missing", AutoConstantType::Time).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
    assert_eq!(usage.parameters().unwrap().named_values("tint"), Some(&[1.0; 4][..]));

    // Rejected values are not replayed by a recompile
    pass.release();
    assert!(compile(&fixture, &mut pass).is_empty());
    let usage = pass.program(GpuProgramType::Fragment).unwrap();
    assert_eq!(usage.parameters().unwrap().named_values("tint"), Some(&[1.0; 4][..]));
}

#[test]
fn test_compositor_input_skips_texture_lookup() {
    let fixture = setup();
    let mut pass = Pass::new(0);
    pass.add_texture_unit_state(TextureUnitState::compositor_input("bloom", "rt0", 0));
    assert!(compile(&fixture, &mut pass).is_empty());
}
