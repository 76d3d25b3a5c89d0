use super::*;
use crate::error::ErrorKind;
use crate::render_system::mock::{MockRecorder, MockRenderSystem};
use crate::resource::{AssetLoader, ResourceGroupManager, ResourceState, DEFAULT_RESOURCE_GROUP_NAME};
use glam::Vec4;
use std::sync::Mutex;
use tempfile::TempDir;

const GENERAL: &str = DEFAULT_RESOURCE_GROUP_NAME;

// ============================================================================
// Helpers
// ============================================================================

fn setup() -> (ResourceGroupManager, TextureManager, MockRecorder) {
    let mock = MockRenderSystem::new();
    let recorder = mock.recorder();
    let rs: SharedRenderSystem = Arc::new(Mutex::new(mock));
    let groups = ResourceGroupManager::new();
    let manager = TextureManager::new(groups.registry().clone(), Arc::new(TextureContext::new(rs)));
    (groups, manager, recorder)
}

fn solid(width: u32, height: u32, colour: Vec4) -> PixelBox {
    let mut image = PixelBox::new(width, height, 1, PixelFormat::R8G8B8A8_UNORM);
    for y in 0..height {
        for x in 0..width {
            image.set_colour_at(colour, x, y, 0).unwrap();
        }
    }
    image
}

/// Decodes `.raw` files: 4-byte LE width, 4-byte LE height, RGBA8 texels
struct RawImageLoader;

impl AssetLoader<Texture> for RawImageLoader {
    fn extensions(&self) -> &[&str] {
        &["raw"]
    }

    fn decode(&self, _info: &ResourceInfo, bytes: &[u8], data: &mut Texture) -> Result<()> {
        let width = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let height = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let image = PixelBox::from_data(width, height, 1, PixelFormat::R8G8B8A8_UNORM, bytes[8..].to_vec())?;
        data.set_image(image)
    }
}

// ============================================================================
// Creation parameters
// ============================================================================

#[test]
fn test_params_fill_descriptor() {
    let (_groups, manager, _recorder) = setup();
    let params: NameValuePairList = [
        ("width", "256"),
        ("height", "128"),
        ("format", "RGBA8"),
        ("num_mipmaps", "3"),
        ("type", "cubic"),
        ("gamma", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let texture = manager.create("sky", GENERAL, true, None, Some(&params)).unwrap();
    let resource = texture.upgrade().unwrap();
    let data = resource.data().unwrap();

    assert_eq!(data.width(), 256);
    assert_eq!(data.height(), 128);
    assert_eq!(data.format(), PixelFormat::R8G8B8A8_UNORM);
    assert_eq!(data.num_mipmaps(), 3);
    assert_eq!(data.face_count(), 6);
    assert!(data.desc().hw_gamma);
}

#[test]
fn test_bad_params_are_invalid() {
    let (_groups, manager, _recorder) = setup();
    for (key, value) in [("width", "wide"), ("format", "RGB565"), ("type", "4d")] {
        let params: NameValuePairList = [(key.to_string(), value.to_string())].into_iter().collect();
        let err = manager.create("bad", GENERAL, true, None, Some(&params)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams, "{}={}", key, value);
    }
}

// ============================================================================
// Manual textures
// ============================================================================

#[test]
fn test_create_manual_loads_immediately() {
    let (_groups, manager, recorder) = setup();
    let desc = TextureDesc::new_2d("rtt", 64, 32, PixelFormat::R8G8B8A8_UNORM);
    let texture = manager.create_manual(GENERAL, desc, None).unwrap();

    assert_eq!(texture.state(), ResourceState::Loaded);
    assert_eq!(recorder.live_textures(), vec![("rtt".to_string(), 64, 32)]);
    assert_eq!(texture.upgrade().unwrap().size(), 64 * 32 * 4);
}

#[test]
fn test_unload_releases_gpu_texture() {
    let (_groups, manager, recorder) = setup();
    let desc = TextureDesc::new_2d("rtt", 16, 16, PixelFormat::R8G8B8A8_UNORM);
    let texture = manager.create_manual(GENERAL, desc, None).unwrap();

    manager.unload(&texture).unwrap();

    assert!(recorder.live_textures().is_empty());
    assert!(texture.upgrade().unwrap().data().unwrap().gpu_texture().is_none());
}

#[test]
fn test_zero_extent_fails_to_load() {
    let (_groups, manager, _recorder) = setup();
    let desc = TextureDesc::new_2d("empty", 0, 16, PixelFormat::R8G8B8A8_UNORM);
    let err = manager.create_manual(GENERAL, desc, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    assert_eq!(
        manager.get_by_name("empty", GENERAL).unwrap().state(),
        ResourceState::Unloaded
    );
}

#[test]
fn test_image_upload_and_read_back() {
    let (_groups, manager, _recorder) = setup();
    let texture = manager.create("checker", GENERAL, true, None, None).unwrap();
    let resource = texture.upgrade().unwrap();
    let colour = Vec4::new(1.0, 0.0, 0.0, 1.0);
    resource.data().unwrap().set_image(solid(4, 4, colour)).unwrap();

    manager.load(&texture).unwrap();

    let data = resource.data().unwrap();
    assert_eq!(data.width(), 4);
    assert_eq!(data.format(), PixelFormat::R8G8B8A8_UNORM);
    let back = data.read_image(0, 0).unwrap();
    assert_eq!(back.colour_at(3, 3, 0).unwrap(), colour);
}

#[test]
fn test_write_image_converts_format() {
    let (_groups, manager, _recorder) = setup();
    let desc = TextureDesc::new_2d("float", 2, 2, PixelFormat::R32G32B32A32_SFLOAT);
    let texture = manager.create_manual(GENERAL, desc, None).unwrap();
    let resource = texture.upgrade().unwrap();
    let data = resource.data().unwrap();

    data.write_image(0, 0, &solid(2, 2, Vec4::ONE)).unwrap();
    let back = data.read_image(0, 0).unwrap();

    assert_eq!(back.format, PixelFormat::R32G32B32A32_SFLOAT);
    assert_eq!(back.colour_at(1, 1, 0).unwrap(), Vec4::ONE);
}

#[test]
fn test_software_mipmaps_average_texels() {
    let (_groups, manager, _recorder) = setup();
    let texture = manager.create("mipped", GENERAL, true, None, None).unwrap();
    let resource = texture.upgrade().unwrap();
    {
        let mut data = resource.data().unwrap();
        let mut desc = data.desc().clone();
        desc.num_mipmaps = 1;
        data.set_desc(desc);
        let mut image = solid(2, 2, Vec4::new(0.0, 0.0, 0.0, 1.0));
        image.set_colour_at(Vec4::ONE, 0, 0, 0).unwrap();
        image.set_colour_at(Vec4::ONE, 1, 1, 0).unwrap();
        data.set_image(image).unwrap();
    }

    manager.load(&texture).unwrap();

    let mip = resource.data().unwrap().read_image(0, 1).unwrap();
    assert_eq!(mip.extent(), (1, 1, 1));
    let texel = mip.colour_at(0, 0, 0).unwrap();
    assert!((texel.x - 0.5).abs() < 1.0 / 255.0 + f32::EPSILON);
    assert_eq!(texel.w, 1.0);
}

#[test]
fn test_buffer_out_of_range() {
    let (_groups, manager, _recorder) = setup();
    let desc = TextureDesc::new_2d("small", 4, 4, PixelFormat::R8G8B8A8_UNORM);
    let texture = manager.create_manual(GENERAL, desc, None).unwrap();
    let resource = texture.upgrade().unwrap();
    let err = resource.data().unwrap().read_image(1, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
}

#[test]
fn test_wrong_face_count_rejected() {
    let (_groups, manager, _recorder) = setup();
    let params: NameValuePairList = [("type".to_string(), "cubic".to_string())].into_iter().collect();
    let texture = manager.create("sky", GENERAL, true, None, Some(&params)).unwrap();
    let resource = texture.upgrade().unwrap();
    let err = resource.data().unwrap().set_image(solid(2, 2, Vec4::ONE)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
}

// ============================================================================
// File textures
// ============================================================================

#[test]
fn test_file_texture_through_asset_loader() {
    let dir = TempDir::new().unwrap();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&[255, 0, 0, 255, 0, 255, 0, 255]);
    std::fs::write(dir.path().join("pair.raw"), &bytes).unwrap();

    let (groups, manager, recorder) = setup();
    groups
        .add_resource_location(dir.path().to_str().unwrap(), "FileSystem", GENERAL, false)
        .unwrap();
    manager.register_asset_loader(Arc::new(RawImageLoader));

    let texture = manager.create("pair.raw", GENERAL, false, None, None).unwrap();
    manager.load(&texture).unwrap();

    assert_eq!(recorder.live_textures(), vec![("pair.raw".to_string(), 2, 1)]);
    let resource = texture.upgrade().unwrap();
    let back = resource.data().unwrap().read_image(0, 0).unwrap();
    assert_eq!(back.colour_at(1, 0, 0).unwrap(), Vec4::new(0.0, 1.0, 0.0, 1.0));
}

#[test]
fn test_file_texture_without_decoder_is_invalid_asset() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ogre.png"), b"png").unwrap();
    let (groups, manager, _recorder) = setup();
    groups
        .add_resource_location(dir.path().to_str().unwrap(), "FileSystem", GENERAL, false)
        .unwrap();

    let texture = manager.create("ogre.png", GENERAL, false, None, None).unwrap();
    let err = manager.load(&texture).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAsset);
}
