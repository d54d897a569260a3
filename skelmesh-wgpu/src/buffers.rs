use skelmesh::{RenderData, SkeletalMeshVertex};
use std::collections::HashMap;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl From<&SkeletalMeshVertex> for GpuVertex {
    fn from(v: &SkeletalMeshVertex) -> Self {
        Self {
            position: v.position,
            normal: v.normal,
            uv: v.uv,
            color: v.color,
        }
    }
}

pub const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32x4
];

pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<GpuVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

/// Smallest power-of-two multiple of `current` that holds `needed` elements.
pub(crate) fn grown_capacity(current: usize, needed: usize) -> usize {
    let mut capacity = current.max(1);
    while capacity < needed {
        capacity *= 2;
    }
    capacity
}

const INITIAL_VERTEX_CAPACITY: usize = 1024;
const INITIAL_INDEX_CAPACITY: usize = 4096;

/// GPU vertex and index buffers of one mesh.
pub struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    vertex_capacity: usize,
    index_capacity: usize,
    vertex_count: usize,
    index_count: usize,
    dynamic: bool,
}

impl MeshBuffers {
    fn new_static(device: &wgpu::Device, label: &str, data: &RenderData) -> Self {
        let vertices = data.vertices.iter().map(GpuVertex::from).collect::<Vec<_>>();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            vertex_capacity: vertices.len(),
            index_capacity: data.indices.len(),
            vertex_count: vertices.len(),
            index_count: data.indices.len(),
            dynamic: false,
        }
    }

    fn new_dynamic(device: &wgpu::Device, label: &str) -> Self {
        Self {
            vertex_buffer: create_vertex_buffer(device, label, INITIAL_VERTEX_CAPACITY),
            index_buffer: create_index_buffer(device, label, INITIAL_INDEX_CAPACITY),
            vertex_capacity: INITIAL_VERTEX_CAPACITY,
            index_capacity: INITIAL_INDEX_CAPACITY,
            vertex_count: 0,
            index_count: 0,
            dynamic: true,
        }
    }

    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    fn write(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        vertices: &[SkeletalMeshVertex],
        indices: &[u32],
    ) {
        let vertices = vertices.iter().map(GpuVertex::from).collect::<Vec<_>>();
        if vertices.len() > self.vertex_capacity {
            self.vertex_capacity = grown_capacity(self.vertex_capacity, vertices.len());
            self.vertex_buffer = create_vertex_buffer(device, label, self.vertex_capacity);
        }
        if indices.len() > self.index_capacity {
            self.index_capacity = grown_capacity(self.index_capacity, indices.len());
            self.index_buffer = create_index_buffer(device, label, self.index_capacity);
        }
        queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        queue.write_buffer(&self.index_buffer, 0, bytemuck::cast_slice(indices));
        self.vertex_count = vertices.len();
        self.index_count = indices.len();
    }
}

fn create_vertex_buffer(device: &wgpu::Device, label: &str, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (capacity * std::mem::size_of::<GpuVertex>()) as u64,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_index_buffer(device: &wgpu::Device, label: &str, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: (capacity * std::mem::size_of::<u32>()) as u64,
        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Mesh buffers keyed by a caller-chosen name, usually the render data's object name
/// for shared static meshes and a per-instance key for skinned output.
#[derive(Default)]
pub struct MeshBufferCache {
    meshes: HashMap<String, MeshBuffers>,
}

impl MeshBufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable buffers holding `data` as imported. Created once per key.
    pub fn upload_static(
        &mut self,
        device: &wgpu::Device,
        key: &str,
        data: &RenderData,
    ) -> &MeshBuffers {
        self.meshes.entry(key.to_string()).or_insert_with(|| {
            log::debug!(
                "static buffers for '{key}': {} vertices, {} indices",
                data.vertices.len(),
                data.indices.len()
            );
            MeshBuffers::new_static(device, key, data)
        })
    }

    /// Rewrites the dynamic buffers under `key`, growing them as needed. A static entry under
    /// the same key is replaced.
    pub fn update_dynamic(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        key: &str,
        vertices: &[SkeletalMeshVertex],
        indices: &[u32],
    ) -> &MeshBuffers {
        let buffers = self
            .meshes
            .entry(key.to_string())
            .and_modify(|b| {
                if !b.dynamic {
                    *b = MeshBuffers::new_dynamic(device, key);
                }
            })
            .or_insert_with(|| MeshBuffers::new_dynamic(device, key));
        buffers.write(device, queue, key, vertices, indices);
        buffers
    }

    pub fn get(&self, key: &str) -> Option<&MeshBuffers> {
        self.meshes.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<MeshBuffers> {
        self.meshes.remove(key)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn clear(&mut self) {
        self.meshes.clear();
    }
}
