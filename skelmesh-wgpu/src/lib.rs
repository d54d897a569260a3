//! wgpu upload and drawing for `skelmesh` render data.
//!
//! Skinning stays on the CPU: write the component's skinned vertices into dynamic buffers each
//! frame (`MeshBufferCache::update_dynamic`), or upload rigid meshes once
//! (`MeshBufferCache::upload_static`), then draw one indexed range per material subset.

#![forbid(unsafe_code)]

mod buffers;
mod renderer;
mod textures;

pub use buffers::*;
pub use renderer::*;
pub use textures::*;
