//! Cooked `.skmc` render data.
//!
//! Little-endian; strings are a `u32` byte length followed by UTF-8. The layout is
//! header, vertices, indices, bones, materials, subsets, bounds, animations. The header
//! records the [`CookOptions`] the data was imported with, so a cache built under other
//! options is never mistaken for a fresh import.

use crate::{
    Aabb, AnimationClip, Bone, BoneTrack, COOKED_FORMAT_VERSION, Error, ImportOptions, Keyframe,
    MaterialInfo, MaterialSubset, MeshPolicy, RenderData, SkeletalMeshVertex, Skeleton,
    TextureInfo, TextureSlot, Transform,
};
use byteorder::{ByteOrder, LittleEndian};
use glam::{Mat4, Quat, Vec3};
use std::path::{Path, PathBuf};

pub const COOKED_MAGIC: [u8; 4] = *b"SKMC";

const NO_PARENT: i32 = -1;

const FLAG_MERGE_MESHES: u32 = 1 << 0;
const FLAG_FLIP_UV_V: u32 = 1 << 1;
const FLAG_ANIMATIONS: u32 = 1 << 2;
const FLAG_UNIT_SCALE: u32 = 1 << 3;

/// Import options that change the produced render data.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CookOptions {
    pub mesh_policy: MeshPolicy,
    pub target_unit_scale: Option<f64>,
    pub flip_uv_v: bool,
    pub import_animations: bool,
}

impl Default for CookOptions {
    fn default() -> Self {
        Self::from(&ImportOptions::default())
    }
}

impl From<&ImportOptions> for CookOptions {
    fn from(options: &ImportOptions) -> Self {
        Self {
            mesh_policy: options.mesh_policy,
            target_unit_scale: options.target_unit_scale,
            flip_uv_v: options.flip_uv_v,
            import_animations: options.import_animations,
        }
    }
}

impl CookOptions {
    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.mesh_policy == MeshPolicy::Merge {
            flags |= FLAG_MERGE_MESHES;
        }
        if self.flip_uv_v {
            flags |= FLAG_FLIP_UV_V;
        }
        if self.import_animations {
            flags |= FLAG_ANIMATIONS;
        }
        if self.target_unit_scale.is_some() {
            flags |= FLAG_UNIT_SCALE;
        }
        flags
    }

    fn from_flags(flags: u32, unit_scale: f64) -> Self {
        Self {
            mesh_policy: if flags & FLAG_MERGE_MESHES != 0 {
                MeshPolicy::Merge
            } else {
                MeshPolicy::FirstOnly
            },
            target_unit_scale: (flags & FLAG_UNIT_SCALE != 0).then_some(unit_scale),
            flip_uv_v: flags & FLAG_FLIP_UV_V != 0,
            import_animations: flags & FLAG_ANIMATIONS != 0,
        }
    }
}

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < n {
            return Err(Error::BinaryParse {
                message: format!(
                    "unexpected EOF reading {n} bytes at offset {} (len={})",
                    self.cursor,
                    self.bytes.len()
                ),
            });
        }
        let out = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N], Error> {
        let mut out = [0.0; N];
        for v in &mut out {
            *v = self.read_f32()?;
        }
        Ok(out)
    }

    fn read_u32s<const N: usize>(&mut self) -> Result<[u32; N], Error> {
        let mut out = [0; N];
        for v in &mut out {
            *v = self.read_u32()?;
        }
        Ok(out)
    }

    /// Element count, checked against the bytes left so corrupt counts fail fast.
    fn read_count(&mut self, min_element_size: usize) -> Result<usize, Error> {
        let offset = self.cursor;
        let count = self.read_u32()? as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(Error::BinaryParse {
                message: format!(
                    "count {count} at offset {offset} exceeds remaining {} bytes",
                    self.remaining()
                ),
            });
        }
        Ok(count)
    }

    fn read_string(&mut self) -> Result<String, Error> {
        let offset = self.cursor;
        let len = self.read_count(1)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| Error::BinaryParse {
                message: format!("invalid utf-8 in string at offset {offset}: {e}"),
            })
    }
}

#[derive(Clone, Debug, Default)]
struct BinaryOutput {
    bytes: Vec<u8>,
}

impl BinaryOutput {
    fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        let mut buf = [0; 4];
        LittleEndian::write_u32(&mut buf, v);
        self.bytes.extend_from_slice(&buf);
    }

    fn write_i32(&mut self, v: i32) {
        let mut buf = [0; 4];
        LittleEndian::write_i32(&mut buf, v);
        self.bytes.extend_from_slice(&buf);
    }

    fn write_f32(&mut self, v: f32) {
        let mut buf = [0; 4];
        LittleEndian::write_f32(&mut buf, v);
        self.bytes.extend_from_slice(&buf);
    }

    fn write_f64(&mut self, v: f64) {
        let mut buf = [0; 8];
        LittleEndian::write_f64(&mut buf, v);
        self.bytes.extend_from_slice(&buf);
    }

    fn write_f32s(&mut self, values: &[f32]) {
        for &v in values {
            self.write_f32(v);
        }
    }

    fn write_count(&mut self, n: usize) -> Result<(), Error> {
        let n = u32::try_from(n).map_err(|_| Error::InvalidValue {
            message: format!("count {n} does not fit the cooked format"),
        })?;
        self.write_u32(n);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<(), Error> {
        self.write_count(s.len())?;
        self.bytes.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

fn write_vertex(out: &mut BinaryOutput, v: &SkeletalMeshVertex) {
    out.write_f32s(&v.position);
    out.write_f32s(&v.color);
    out.write_f32s(&v.normal);
    out.write_f32s(&v.tangent);
    out.write_f32s(&v.uv);
    for &b in &v.bone_indices {
        out.write_u32(b);
    }
    out.write_f32s(&v.bone_weights);
}

fn read_vertex(input: &mut BinaryInput<'_>) -> Result<SkeletalMeshVertex, Error> {
    Ok(SkeletalMeshVertex {
        position: input.read_f32s()?,
        color: input.read_f32s()?,
        normal: input.read_f32s()?,
        tangent: input.read_f32s()?,
        uv: input.read_f32s()?,
        bone_indices: input.read_u32s()?,
        bone_weights: input.read_f32s()?,
    })
}

// position + color + normal + tangent + uv + indices + weights
const VERTEX_SIZE: usize = 4 * (3 + 4 + 3 + 4 + 2 + 4 + 4);

fn write_transform(out: &mut BinaryOutput, t: &Transform) {
    out.write_f32s(&t.translation.to_array());
    out.write_f32s(&t.rotation.to_array());
    out.write_f32s(&t.scale.to_array());
}

fn read_transform(input: &mut BinaryInput<'_>) -> Result<Transform, Error> {
    Ok(Transform {
        translation: Vec3::from_array(input.read_f32s()?),
        rotation: Quat::from_array(input.read_f32s()?),
        scale: Vec3::from_array(input.read_f32s()?),
    })
}

fn write_material(out: &mut BinaryOutput, m: &MaterialInfo) -> Result<(), Error> {
    out.write_string(&m.name)?;
    out.write_f32s(&m.diffuse_color);
    out.write_f32s(&m.specular_color);
    out.write_f32s(&m.emissive_color);
    out.write_f32s(&m.ambient_color);
    out.write_f32(m.shininess);
    out.write_f32(m.opacity);
    out.write_u32(m.texture_flags);
    out.write_count(m.textures.len())?;
    for t in &m.textures {
        out.write_u8(t.slot as u8);
        out.write_u8(u8::from(t.srgb));
        out.write_string(&t.path.to_string_lossy())?;
    }
    Ok(())
}

fn read_material(input: &mut BinaryInput<'_>) -> Result<MaterialInfo, Error> {
    let mut m = MaterialInfo::new(input.read_string()?);
    m.diffuse_color = input.read_f32s()?;
    m.specular_color = input.read_f32s()?;
    m.emissive_color = input.read_f32s()?;
    m.ambient_color = input.read_f32s()?;
    m.shininess = input.read_f32()?;
    m.opacity = input.read_f32()?;
    m.texture_flags = input.read_u32()?;
    let count = input.read_count(6)?;
    for _ in 0..count {
        let raw = input.read_u8()?;
        let slot = TextureSlot::from_u8(raw).ok_or_else(|| Error::BinaryParse {
            message: format!("invalid texture slot {raw} in material '{}'", m.name),
        })?;
        let srgb = input.read_u8()? != 0;
        let path = PathBuf::from(input.read_string()?);
        m.textures.push(TextureInfo { slot, path, srgb });
    }
    Ok(m)
}

fn write_keys<T>(
    out: &mut BinaryOutput,
    keys: &[Keyframe<T>],
    value: impl Fn(&T) -> Vec<f32>,
) -> Result<(), Error> {
    out.write_count(keys.len())?;
    for k in keys {
        out.write_f32(k.time);
        out.write_f32s(&value(&k.value));
    }
    Ok(())
}

fn read_keys<T, const N: usize>(
    input: &mut BinaryInput<'_>,
    value: impl Fn([f32; N]) -> T,
) -> Result<Vec<Keyframe<T>>, Error> {
    let count = input.read_count(4 * (N + 1))?;
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let time = input.read_f32()?;
        keys.push(Keyframe {
            time,
            value: value(input.read_f32s()?),
        });
    }
    Ok(keys)
}

/// Serializes `data`, imported under `options`, into the cooked format.
pub fn write_cooked(data: &RenderData, options: &CookOptions) -> Result<Vec<u8>, Error> {
    let mut out = BinaryOutput::default();
    out.bytes.extend_from_slice(&COOKED_MAGIC);
    out.write_u32(COOKED_FORMAT_VERSION);
    out.write_u32(options.flags());
    out.write_f64(options.target_unit_scale.unwrap_or(0.0));
    out.write_string(&data.object_name)?;
    out.write_string(&data.display_name)?;

    out.write_count(data.vertices.len())?;
    for v in &data.vertices {
        write_vertex(&mut out, v);
    }
    out.write_count(data.indices.len())?;
    for &i in &data.indices {
        out.write_u32(i);
    }

    let bones = data.skeleton.bones();
    out.write_count(bones.len())?;
    for bone in bones {
        out.write_string(&bone.name)?;
        let parent = match bone.parent {
            Some(p) => i32::try_from(p).map_err(|_| Error::InvalidValue {
                message: format!("parent index {p} of bone '{}' too large", bone.name),
            })?,
            None => NO_PARENT,
        };
        out.write_i32(parent);
        write_transform(&mut out, &bone.local);
        out.write_f32s(&bone.bind_pose().to_cols_array());
        out.write_f32s(&bone.inverse_bind_pose().to_cols_array());
    }

    out.write_count(data.materials.len())?;
    for m in &data.materials {
        write_material(&mut out, m)?;
    }

    out.write_count(data.subsets.len())?;
    for s in &data.subsets {
        out.write_u32(s.material_index);
        out.write_u32(s.index_start);
        out.write_u32(s.index_count);
        out.write_string(&s.material_name)?;
    }

    out.write_f32s(&data.bounds.min.to_array());
    out.write_f32s(&data.bounds.max.to_array());

    out.write_count(data.animations.len())?;
    for clip in &data.animations {
        out.write_string(&clip.name)?;
        out.write_count(clip.tracks.len())?;
        for track in &clip.tracks {
            out.write_count(track.bone)?;
            write_keys(&mut out, &track.translation, |v| v.to_array().to_vec())?;
            write_keys(&mut out, &track.rotation, |q| q.to_array().to_vec())?;
            write_keys(&mut out, &track.scale, |v| v.to_array().to_vec())?;
        }
    }
    Ok(out.bytes)
}

fn read_header(input: &mut BinaryInput<'_>) -> Result<CookOptions, Error> {
    let magic = input.take(4)?;
    if magic != COOKED_MAGIC {
        return Err(Error::BinaryParse {
            message: format!("bad magic {magic:02x?}"),
        });
    }
    let version = input.read_u32()?;
    if version != COOKED_FORMAT_VERSION {
        return Err(Error::BinaryVersion {
            found: version,
            expected: COOKED_FORMAT_VERSION,
        });
    }
    let flags = input.read_u32()?;
    let unit_scale = input.read_f64()?;
    Ok(CookOptions::from_flags(flags, unit_scale))
}

/// Import options recorded in the header of cooked bytes.
pub fn read_cooked_options(bytes: &[u8]) -> Result<CookOptions, Error> {
    read_header(&mut BinaryInput::new(bytes))
}

/// Every index names a vertex; subsets are ordered, disjoint and inside the index buffer.
fn validate_topology(
    vertex_count: usize,
    indices: &[u32],
    subsets: &[MaterialSubset],
) -> Result<(), Error> {
    if indices.len() % 3 != 0 {
        return Err(Error::BinaryParse {
            message: format!("index count {} is not a multiple of 3", indices.len()),
        });
    }
    if let Some((at, &index)) = indices
        .iter()
        .enumerate()
        .find(|&(_, &i)| i as usize >= vertex_count)
    {
        return Err(Error::BinaryParse {
            message: format!("index {index} at {at} out of range for {vertex_count} vertices"),
        });
    }
    let mut covered = 0_usize;
    for (i, subset) in subsets.iter().enumerate() {
        let start = subset.index_start as usize;
        let end = start.checked_add(subset.index_count as usize);
        match end {
            Some(end) if start >= covered && end <= indices.len() => covered = end,
            _ => {
                return Err(Error::BinaryParse {
                    message: format!(
                        "subset {i} ('{}') range {start}+{} overlaps or exceeds {} indices",
                        subset.material_name,
                        subset.index_count,
                        indices.len()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Parses cooked bytes back into render data. Bone order and index topology are validated
/// again.
pub fn read_cooked(bytes: &[u8]) -> Result<RenderData, Error> {
    let mut input = BinaryInput::new(bytes);
    read_header(&mut input)?;

    let object_name = input.read_string()?;
    let display_name = input.read_string()?;

    let vertex_count = input.read_count(VERTEX_SIZE)?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(read_vertex(&mut input)?);
    }
    let index_count = input.read_count(4)?;
    let mut indices = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        indices.push(input.read_u32()?);
    }

    let bone_count = input.read_count(4 + 4 + 40 + 128)?;
    let mut bones = Vec::with_capacity(bone_count);
    for index in 0..bone_count {
        let name = input.read_string()?;
        let parent = match input.read_i32()? {
            NO_PARENT => None,
            p => Some(usize::try_from(p).map_err(|_| Error::BinaryParse {
                message: format!("invalid parent {p} for bone '{name}'"),
            })?),
        };
        let local = read_transform(&mut input)?;
        let bind = Mat4::from_cols_array(&input.read_f32s()?);
        let inverse_bind = Mat4::from_cols_array(&input.read_f32s()?);
        bones.push(Bone::with_inverse(name, index, parent, local, bind, inverse_bind));
    }
    let skeleton = Skeleton::new(bones)?;

    let material_count = input.read_count(4 + 12 * 4 + 12)?;
    let mut materials = Vec::with_capacity(material_count);
    for _ in 0..material_count {
        materials.push(read_material(&mut input)?);
    }

    let subset_count = input.read_count(16)?;
    let mut subsets = Vec::with_capacity(subset_count);
    for _ in 0..subset_count {
        subsets.push(MaterialSubset {
            material_index: input.read_u32()?,
            index_start: input.read_u32()?,
            index_count: input.read_u32()?,
            material_name: input.read_string()?,
        });
    }

    validate_topology(vertices.len(), &indices, &subsets)?;

    let bounds = Aabb {
        min: Vec3::from_array(input.read_f32s()?),
        max: Vec3::from_array(input.read_f32s()?),
    };

    let clip_count = input.read_count(8)?;
    let mut animations = Vec::with_capacity(clip_count);
    for _ in 0..clip_count {
        let name = input.read_string()?;
        let track_count = input.read_count(16)?;
        let mut tracks = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            tracks.push(BoneTrack {
                bone: input.read_u32()? as usize,
                translation: read_keys(&mut input, Vec3::from_array)?,
                rotation: read_keys(&mut input, Quat::from_array)?,
                scale: read_keys(&mut input, Vec3::from_array)?,
            });
        }
        animations.push(AnimationClip::new(name, tracks));
    }

    if input.remaining() != 0 {
        log::debug!(
            "cooked mesh '{object_name}': {} trailing bytes ignored",
            input.remaining()
        );
    }

    Ok(RenderData {
        object_name,
        display_name,
        vertices,
        indices,
        skeleton,
        materials,
        subsets,
        bounds,
        animations,
    })
}

pub fn write_cooked_file(
    path: &Path,
    data: &RenderData,
    options: &CookOptions,
) -> Result<(), Error> {
    let bytes = write_cooked(data, options)?;
    std::fs::write(path, bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_cooked_file(path: &Path) -> Result<RenderData, Error> {
    read_cooked(&read_bytes(path)?)
}

/// Reads a cooked file only when its header matches `expected`; `Ok(None)` otherwise.
pub fn read_cooked_file_if(
    path: &Path,
    expected: &CookOptions,
) -> Result<Option<RenderData>, Error> {
    let bytes = read_bytes(path)?;
    let found = read_cooked_options(&bytes)?;
    if found != *expected {
        log::debug!(
            "cooked mesh '{}' was built with {found:?}, wanted {expected:?}",
            path.display()
        );
        return Ok(None);
    }
    read_cooked(&bytes).map(Some)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
