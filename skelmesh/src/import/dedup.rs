use crate::{Error, SkeletalMeshVertex};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Source indices of every attribute of one polygon corner.
///
/// Corners with equal keys become one output vertex.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VertexKey {
    pub position: usize,
    pub normal: Option<usize>,
    pub tangent: Option<usize>,
    pub uv: Option<usize>,
    pub color: Option<usize>,
}

/// Lookup from [`VertexKey`] to output vertex index, for the assembly of one mesh.
#[derive(Debug, Default)]
pub struct VertexDedup {
    lookup: HashMap<VertexKey, u32>,
}

impl VertexDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lookup: HashMap::with_capacity(capacity),
        }
    }

    /// Output index for `key`; on first sight `build()` is appended to `vertices`.
    pub fn index_for(
        &mut self,
        key: VertexKey,
        vertices: &mut Vec<SkeletalMeshVertex>,
        build: impl FnOnce() -> SkeletalMeshVertex,
    ) -> Result<u32, Error> {
        match self.lookup.entry(key) {
            Entry::Occupied(e) => Ok(*e.get()),
            Entry::Vacant(e) => {
                let index = u32::try_from(vertices.len()).map_err(|_| Error::InvalidValue {
                    message: "vertex count exceeds u32 index range".to_string(),
                })?;
                vertices.push(build());
                e.insert(index);
                Ok(index)
            }
        }
    }

    /// Unique vertices emitted so far.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}
