use super::*;
use crate::error::ErrorKind;
use crate::render_system::mock::{MockRenderSystem, RecordedCommand};

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_viewport_rejects_rect_outside_target() {
    for (l, t, w, h) in [(-0.1, 0.0, 1.0, 1.0), (0.0, 0.0, 1.5, 1.0), (0.6, 0.0, 0.5, 1.0), (0.0, 0.7, 1.0, 0.4)] {
        let err = Viewport::new("scene", "cam", l, t, w, h).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }
}

#[test]
fn test_viewport_defaults() {
    let viewport = Viewport::full("scene", "cam");
    assert_eq!(viewport.scene_manager(), "scene");
    assert_eq!(viewport.camera(), "cam");
    assert!(viewport.clear_every_frame);
    assert_eq!(viewport.clear_buffers, FrameBufferType::COLOUR | FrameBufferType::DEPTH);
    assert_eq!(viewport.visibility_mask, ALL_VISIBILITY_FLAGS);
    assert!(viewport.material_scheme.is_none());
}

// ============================================================================
// Dimensions
// ============================================================================

#[test]
fn test_update_dimensions_truncates_to_pixels() {
    let mut viewport = Viewport::new("scene", "cam", 0.25, 0.5, 0.5, 0.5).unwrap();
    viewport.update_dimensions(801, 601);
    assert_eq!(viewport.actual_rect(), Rect2D::new(200, 300, 400, 300));
}

#[test]
fn test_render_options_carry_scheme_and_mask() {
    let mut viewport = Viewport::full("scene", "cam");
    viewport.update_dimensions(640, 480);
    viewport.material_scheme = Some("Thermal".to_string());
    viewport.visibility_mask = 0x2;

    let options = viewport.render_options();
    assert_eq!(options.viewport, Rect2D::new(0, 0, 640, 480));
    assert_eq!(options.material_scheme.as_deref(), Some("Thermal"));
    assert_eq!(options.visibility_mask, 0x2);
}

// ============================================================================
// Clear
// ============================================================================

#[test]
fn test_clear_uses_viewport_settings() {
    let mut rs = MockRenderSystem::new();
    let recorder = rs.recorder();
    let mut viewport = Viewport::full("scene", "cam");
    viewport.update_dimensions(100, 50);
    viewport.background_colour = Vec4::new(0.2, 0.3, 0.4, 1.0);
    viewport.clear_buffers = FrameBufferType::COLOUR;

    viewport.clear(&mut rs);

    assert_eq!(recorder.commands(), vec![
        RecordedCommand::SetViewport(Rect2D::new(0, 0, 100, 50)),
        RecordedCommand::Clear {
            buffers: FrameBufferType::COLOUR,
            colour: Vec4::new(0.2, 0.3, 0.4, 1.0),
            depth: 1.0,
            stencil: 0,
        },
    ]);
}
