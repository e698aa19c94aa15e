use bytemuck::{Pod, Zeroable};
use derive_builder::Builder;
use glam::{Vec2, Vec3};
use lumen_gpu::{GpuError, Result};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tex_coord: tex_coord.to_array(),
        }
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
#[builder(setter(into))]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn positions(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    pub fn normals(&self) -> Vec<[f32; 3]> {
        self.vertices.iter().map(|v| v.normal).collect()
    }

    pub fn tex_coords(&self) -> Vec<[f32; 2]> {
        self.vertices.iter().map(|v| v.tex_coord).collect()
    }

    /// Check that the mesh is a non-empty triangle list with in-range indices.
    pub fn validate(&self, name: &str) -> Result<()> {
        let what = || format!("mesh `{name}`");
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(GpuError::config(
                what(),
                format!("{} indices do not form a triangle list", self.indices.len()),
            ));
        }
        let count = self.vertices.len() as u32;
        if let Some(index) = self.indices.iter().find(|&&index| index >= count) {
            return Err(GpuError::config(what(), format!("index {index} exceeds {count} vertices")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn triangle() -> MeshData {
        MeshDataBuilder::default()
            .vertices(vec![
                Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
                Vertex::new(Vec3::X, Vec3::Z, Vec2::X),
                Vertex::new(Vec3::Y, Vec3::Z, Vec2::Y),
            ])
            .indices(vec![0, 1, 2])
            .build()
            .unwrap()
    }

    #[test]
    fn attribute_streams_follow_vertices() {
        let mesh = triangle();
        assert_eq!(mesh.positions(), vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(mesh.normals()[2], [0.0, 0.0, 1.0]);
        assert_eq!(mesh.tex_coords()[1], [1.0, 0.0]);
        mesh.validate("triangle").unwrap();
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut mesh = triangle();
        mesh.indices[2] = 3;
        assert!(matches!(mesh.validate("bad"), Err(GpuError::Config { .. })));

        mesh.indices.pop();
        assert!(matches!(mesh.validate("bad"), Err(GpuError::Config { .. })));
    }
}
