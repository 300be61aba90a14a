//! CPU mesh data, procedural generators and the GPU mesh registry.
//!
//! Generated triangles wind counter-clockwise when viewed from the side the
//! normal points to, matching the pipelines' front-face setting.

use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use tracing::{debug, info};
use vesper_rhi::buffer::{Buffer, BufferUsage};
use vesper_rhi::device::Device;
use vesper_rhi::vertex::Vertex;
use vesper_rhi::vk;

use crate::error::{ResourceError, ResourceResult};

/// Indexed triangle list in host memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centred on the origin with per-face normals and tangents.
    pub fn cube() -> Self {
        // (normal, u, v) with u x v == normal
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u, v) in FACES {
            let base = vertices.len() as u32;
            let center = normal * 0.5;
            for (su, sv) in CORNERS {
                vertices.push(Vertex::new(
                    center + (u * su + v * sv) * 0.5,
                    normal,
                    Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5),
                    u.extend(1.0),
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }

    /// Square grid in the XZ plane at height `y`, facing +Y.
    ///
    /// `subdivisions` cells per side; `(subdivisions + 1)^2` vertices.
    pub fn grid(size: f32, subdivisions: u32, y: f32) -> Self {
        let n = subdivisions.max(1);
        let row = n + 1;
        let step = size / n as f32;
        let half = size * 0.5;

        let mut vertices = Vec::with_capacity((row * row) as usize);
        for j in 0..row {
            for i in 0..row {
                vertices.push(Vertex::new(
                    Vec3::new(-half + i as f32 * step, y, -half + j as f32 * step),
                    Vec3::Y,
                    Vec2::new(i as f32 / n as f32, j as f32 / n as f32),
                    Vec4::new(1.0, 0.0, 0.0, 1.0),
                ));
            }
        }

        let mut indices = Vec::with_capacity((n * n * 6) as usize);
        for j in 0..n {
            for i in 0..n {
                let a = j * row + i;
                let b = (j + 1) * row + i;
                let c = (j + 1) * row + i + 1;
                let d = j * row + i + 1;
                indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }

        Self { vertices, indices }
    }

    /// A single quad; `grid` with one cell.
    pub fn plane(size: f32, y: f32) -> Self {
        Self::grid(size, 1, y)
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Checks that the data forms a non-empty, in-bounds triangle list.
    pub fn validate(&self, name: &str) -> ResourceResult<()> {
        let invalid = |reason: String| ResourceError::InvalidMesh {
            name: name.to_string(),
            reason,
        };

        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(invalid("mesh has no geometry".to_string()));
        }
        if !self.indices.len().is_multiple_of(3) {
            return Err(invalid(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(&bad) = self.indices.iter().find(|&&i| i >= vertex_count) {
            return Err(invalid(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }
        Ok(())
    }
}

/// Opaque reference to a mesh uploaded to a [`MeshRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(u32);

impl MeshHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Vertex and index buffers for one mesh.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: Arc<Device>, data: &MeshData) -> ResourceResult<Self> {
        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = Buffer::new_with_data(
            device,
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.index_count(),
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    #[inline]
    pub fn index_type(&self) -> vk::IndexType {
        vk::IndexType::UINT32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Owns every uploaded mesh. Meshes live until the registry is dropped.
pub struct MeshRegistry {
    device: Arc<Device>,
    meshes: Vec<(String, GpuMesh)>,
}

impl MeshRegistry {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            meshes: Vec::new(),
        }
    }

    /// Validates and uploads `data`, returning its handle.
    pub fn upload(&mut self, name: &str, data: &MeshData) -> ResourceResult<MeshHandle> {
        data.validate(name)?;
        let mesh = GpuMesh::upload(self.device.clone(), data)?;
        let handle = MeshHandle(self.meshes.len() as u32);

        info!(
            "Uploaded mesh '{}' as {:?}: {} vertices, {} indices",
            name,
            handle,
            data.vertices.len(),
            data.indices.len()
        );

        self.meshes.push((name.to_string(), mesh));
        Ok(handle)
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle.index()).map(|(_, mesh)| mesh)
    }

    /// Like [`get`](Self::get) but reports unknown handles as an error.
    pub fn require(&self, handle: MeshHandle) -> ResourceResult<&GpuMesh> {
        self.get(handle).ok_or(ResourceError::UnknownMesh(handle))
    }

    pub fn name(&self, handle: MeshHandle) -> Option<&str> {
        self.meshes.get(handle.index()).map(|(name, _)| name.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl Drop for MeshRegistry {
    fn drop(&mut self) {
        debug!("Releasing {} mesh(es)", self.meshes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_front_faces_follow_normals(mesh: &MeshData) {
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.vertices[i as usize]);
            let face = (b.position - a.position).cross(c.position - a.position);
            assert!(
                face.dot(a.normal) > 0.0,
                "triangle {:?} winds against its normal",
                tri
            );
        }
    }

    #[test]
    fn test_cube_counts_and_bounds() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.validate("cube").is_ok());
        for v in &cube.vertices {
            assert!(v.position.abs().max_element() <= 0.5 + 1e-6);
            assert!((v.normal.length() - 1.0).abs() < 1e-6);
            assert!(v.tangent.truncate().dot(v.normal).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cube_winding() {
        assert_front_faces_follow_normals(&MeshData::cube());
    }

    #[test]
    fn test_grid_counts_and_winding() {
        let grid = MeshData::grid(10.0, 4, -0.5);
        assert_eq!(grid.vertices.len(), 25);
        assert_eq!(grid.indices.len(), 4 * 4 * 6);
        assert!(grid.vertices.iter().all(|v| v.position.y == -0.5));
        assert_front_faces_follow_normals(&grid);

        let xs: Vec<f32> = grid.vertices.iter().map(|v| v.position.x).collect();
        let min = xs.iter().copied().fold(f32::MAX, f32::min);
        let max = xs.iter().copied().fold(f32::MIN, f32::max);
        assert!((min + 5.0).abs() < 1e-5 && (max - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_grid_zero_subdivisions_is_one_cell() {
        assert_eq!(MeshData::grid(1.0, 0, 0.0), MeshData::plane(1.0, 0.0));
    }

    #[test]
    fn test_validate_rejects_bad_meshes() {
        assert!(MeshData::default().validate("empty").is_err());

        let mut out_of_range = MeshData::plane(1.0, 0.0);
        out_of_range.indices[0] = 99;
        let err = out_of_range.validate("bad").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidMesh { .. }));

        let mut ragged = MeshData::plane(1.0, 0.0);
        ragged.indices.pop();
        assert!(ragged.validate("ragged").is_err());
    }
}
