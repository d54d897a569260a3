//! On-disk format versions.

/// Version of the scene JSON document accepted by [`crate::json`].
pub const SCENE_FORMAT_VERSION: u32 = 1;

/// Version written into cooked `.skmc` render data.
pub const COOKED_FORMAT_VERSION: u32 = 2;
