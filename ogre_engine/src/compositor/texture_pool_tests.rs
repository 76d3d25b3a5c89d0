/// Tests for TexturePool

use super::*;
use crate::render_system::mock::MockRenderSystem;

// ============================================================================
// Helpers
// ============================================================================

fn desc(name: &str, width: u32, height: u32) -> TextureDesc {
    TextureDesc::new_2d(name, width, height, PixelFormat::R8G8B8A8_UNORM)
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_matching_request_reuses_texture() {
    let mut rs = MockRenderSystem::new();
    let mut pool = TexturePool::new();
    let none = FxHashSet::default();

    let a = pool.acquire(&desc("a", 256, 256), &none, &mut rs).unwrap();
    let b = pool.acquire(&desc("b", 256, 256), &none, &mut rs).unwrap();
    assert_eq!(a.id(), b.id());
    assert_eq!(pool.len(), 1);
    assert!(a.desc().usage.contains(TextureUsage::RENDER_TARGET));
}

#[test]
fn test_different_properties_get_different_textures() {
    let mut rs = MockRenderSystem::new();
    let mut pool = TexturePool::new();
    let none = FxHashSet::default();

    let base = pool.acquire(&desc("a", 256, 256), &none, &mut rs).unwrap();
    let smaller = pool.acquire(&desc("b", 128, 128), &none, &mut rs).unwrap();
    let mut gamma = desc("c", 256, 256);
    gamma.hw_gamma = true;
    let gamma = pool.acquire(&gamma, &none, &mut rs).unwrap();
    let mut fsaa = desc("d", 256, 256);
    fsaa.fsaa = 4;
    let fsaa = pool.acquire(&fsaa, &none, &mut rs).unwrap();

    let ids: FxHashSet<u64> = [&base, &smaller, &gamma, &fsaa].iter().map(|t| t.id()).collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(pool.len(), 4);
}

#[test]
fn test_excluded_texture_is_not_handed_out() {
    let mut rs = MockRenderSystem::new();
    let mut pool = TexturePool::new();

    let first = pool.acquire(&desc("a", 64, 64), &FxHashSet::default(), &mut rs).unwrap();
    let exclude: FxHashSet<u64> = [first.id()].into_iter().collect();
    let second = pool.acquire(&desc("b", 64, 64), &exclude, &mut rs).unwrap();
    assert_ne!(first.id(), second.id());

    // Either texture can serve a request excluding only one of them
    let third = pool.acquire(&desc("c", 64, 64), &exclude, &mut rs).unwrap();
    assert_eq!(third.id(), second.id());
}

#[test]
fn test_free_unused_releases_only_unreferenced() {
    let mut rs = MockRenderSystem::new();
    let recorder = rs.recorder();
    let mut pool = TexturePool::new();
    let none = FxHashSet::default();

    let kept = pool.acquire(&desc("kept", 32, 32), &none, &mut rs).unwrap();
    pool.acquire(&desc("dropped", 16, 16), &none, &mut rs).unwrap();
    assert_eq!(recorder.live_textures().len(), 2);

    assert_eq!(pool.free_unused(), 1);
    assert_eq!(pool.len(), 1);
    let live = recorder.live_textures();
    assert_eq!(live, vec![("kept".to_string(), 32, 32)]);

    drop(kept);
    pool.clear();
    assert!(pool.is_empty());
    assert!(recorder.live_textures().is_empty());
}
