use glam::{Mat4, Quat, Vec3, Vec4Swizzles};
use crate::error::ErrorKind;
use crate::scene::AABB;
use super::*;
use crate::camera::FrustumTest;

fn approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < 1e-4
}

// ============================================================================
// Placement
// ============================================================================

#[test]
fn test_default_camera_looks_down_negative_z() {
    let camera = Camera::new("main");
    assert_eq!(camera.name(), "main");
    assert!(approx(camera.direction(), Vec3::NEG_Z));
    assert!(approx(camera.up(), Vec3::Y));
    assert_eq!(camera.view_matrix(), Mat4::IDENTITY);
}

#[test]
fn test_look_at_points_direction() {
    let mut camera = Camera::new("main");
    camera.set_position(Vec3::new(0.0, 0.0, 10.0));
    camera.look_at(Vec3::new(10.0, 0.0, 10.0));
    assert!(approx(camera.direction(), Vec3::X));
    assert!(approx(camera.up(), Vec3::Y));
}

#[test]
fn test_look_at_straight_down() {
    let mut camera = Camera::new("main");
    camera.set_position(Vec3::new(0.0, 10.0, 0.0));
    camera.look_at(Vec3::ZERO);
    assert!(approx(camera.direction(), Vec3::NEG_Y));
}

#[test]
fn test_move_relative_uses_orientation() {
    let mut camera = Camera::new("main");
    camera.yaw(std::f32::consts::FRAC_PI_2);
    camera.move_relative(Vec3::new(0.0, 0.0, -1.0));
    assert!(approx(camera.position(), Vec3::new(-1.0, 0.0, 0.0)));
}

#[test]
fn test_view_matrix_maps_position_to_origin() {
    let mut camera = Camera::new("main");
    camera.set_position(Vec3::new(3.0, 4.0, 5.0));
    camera.set_orientation(Quat::from_rotation_y(0.7));
    let eye = camera.view_matrix() * camera.position().extend(1.0);
    assert!(approx(eye.xyz(), Vec3::ZERO));
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn test_clip_distance_validation() {
    let mut camera = Camera::new("main");
    assert_eq!(camera.set_near_clip_distance(0.0).unwrap_err().kind(), ErrorKind::InvalidParams);
    assert_eq!(camera.set_far_clip_distance(0.05).unwrap_err().kind(), ErrorKind::InvalidParams);
    camera.set_near_clip_distance(1.0).unwrap();
    camera.set_far_clip_distance(50.0).unwrap();
    assert_eq!(camera.near_clip_distance(), 1.0);
    assert_eq!(camera.far_clip_distance(), 50.0);
}

#[test]
fn test_frustum_follows_camera() {
    let mut camera = Camera::new("main");
    camera.set_position(Vec3::new(0.0, 0.0, 10.0));
    let ahead = AABB::from_center_half_size(Vec3::ZERO, Vec3::ONE);
    let behind = AABB::from_center_half_size(Vec3::new(0.0, 0.0, 20.0), Vec3::ONE);

    assert_eq!(camera.frustum().classify_aabb(&ahead), FrustumTest::Inside);
    assert_eq!(camera.frustum().classify_aabb(&behind), FrustumTest::Outside);

    camera.yaw(std::f32::consts::PI);
    assert_eq!(camera.frustum().classify_aabb(&ahead), FrustumTest::Outside);
    assert_eq!(camera.frustum().classify_aabb(&behind), FrustumTest::Inside);
}

#[test]
fn test_orthographic_frustum_has_parallel_sides() {
    let mut camera = Camera::new("ortho");
    camera.set_projection_type(ProjectionType::Orthographic);
    camera.set_aspect_ratio(1.0);
    camera.set_ortho_window_height(10.0);
    let frustum = camera.frustum();
    let inside = AABB::from_center_half_size(Vec3::new(4.0, 0.0, -500.0), Vec3::splat(0.5));
    let outside = AABB::from_center_half_size(Vec3::new(6.0, 0.0, -500.0), Vec3::splat(0.5));
    assert_eq!(frustum.classify_aabb(&inside), FrustumTest::Inside);
    assert_eq!(frustum.classify_aabb(&outside), FrustumTest::Outside);
}

#[test]
fn test_projected_pixel_count_shrinks_with_distance() {
    let camera = Camera::new("main");
    let near = camera.projected_pixel_count(Vec3::new(0.0, 0.0, -10.0), 1.0, 600.0);
    let far = camera.projected_pixel_count(Vec3::new(0.0, 0.0, -20.0), 1.0, 600.0);
    assert!(near > far);
    assert!((near / far - 4.0).abs() < 1e-3);
}

// ============================================================================
// Sorting / LOD settings
// ============================================================================

#[test]
fn test_sort_distance_modes() {
    let mut camera = Camera::new("main");
    let point = Vec3::new(3.0, 0.0, -4.0);
    assert_eq!(camera.sort_distance(point), 25.0);
    camera.set_sort_mode(SortMode::ViewDepth);
    assert_eq!(camera.sort_distance(point), 4.0);
}

#[test]
fn test_lod_bias_must_be_positive() {
    let mut camera = Camera::new("main");
    assert_eq!(camera.set_lod_bias(0.0).unwrap_err().kind(), ErrorKind::InvalidParams);
    camera.set_lod_bias(2.0).unwrap();
    assert_eq!(camera.lod_bias_inverse(), 0.5);
}

#[test]
fn test_lod_camera() {
    let mut camera = Camera::new("main");
    assert_eq!(camera.lod_camera(), None);
    camera.set_lod_camera(Some("lod"));
    assert_eq!(camera.lod_camera(), Some("lod"));
}
