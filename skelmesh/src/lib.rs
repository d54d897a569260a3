//! Skeletal mesh import and CPU skinning.
//!
//! Scenes (node hierarchy, meshes, skin clusters, bind poses, materials, animation curves) are
//! normalized to the engine axis system, then turned into a bone table and deduplicated
//! vertex/index buffers with up to four weighted influences per vertex. The runtime poses the
//! skeleton and skins the mesh on the CPU into a per-instance buffer.
//!
//! This crate is renderer-agnostic. GPU upload lives in `skelmesh-wgpu`.

#![forbid(unsafe_code)]

mod asset;
mod axis;
mod error;
mod import;
mod math;
mod model;
mod runtime;
mod scene;
mod version;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "binary")]
pub mod binary;

pub use asset::*;
pub use axis::*;
pub use error::*;
pub use import::*;
pub use math::*;
pub use model::*;
pub use runtime::*;
pub use scene::*;
pub use version::*;



#[cfg(test)]
mod scene_tests;


#[cfg(all(test, feature = "json"))]
mod import_tests;


#[cfg(all(test, feature = "json"))]
mod asset_tests;
