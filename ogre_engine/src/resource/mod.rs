//! Resource management module
//!
//! Named assets with a prepare/load lifecycle, typed managers that own
//! them, resource groups that locate their files in archives, and a
//! background queue for asynchronous preparation.

mod archive;
mod resource;
mod resource_manager;
mod resource_group_manager;
mod background_queue;
pub mod texture;
pub mod mesh;

pub use archive::{
    glob_match, Archive, ArchiveFactory, FileSystemArchive, FileSystemArchiveFactory,
    FILE_SYSTEM_ARCHIVE_TYPE,
};
pub use resource::{
    AssetLoader, ManualResourceLoader, NameValuePairList, Resource, ResourceData,
    ResourceHandle, ResourceInfo, ResourceRef, ResourceState,
};
pub use resource_manager::{
    CollisionResolution, ResourceCollisionListener, ResourceManager, ResourceManagerBase,
};
pub use resource_group_manager::{
    ResourceDeclaration, ResourceGroupListener, ResourceGroupManager, ResourceGroupRegistry,
    ResourceGroupStatus, ResourceLocationInfo, AUTODETECT_RESOURCE_GROUP_NAME,
    DEFAULT_RESOURCE_GROUP_NAME, INTERNAL_RESOURCE_GROUP_NAME,
};
pub use background_queue::{
    BackgroundProcessResult, BackgroundProcessTicket, ResourceBackgroundListener,
    ResourceBackgroundQueue,
};
pub use texture::{Texture, TextureContext, TextureManager};
pub use mesh::{
    GeometrySource, Mesh, MeshContext, MeshLodUsage, MeshManager, MeshSource, SubMesh,
    SubMeshSource,
};
