//! Procedural shape meshes.
//!
//! Every shape is centered on the origin, uses counter-clockwise front faces and reports its
//! vertex and index counts up front so buffers can be sized before generation.

use std::f32::consts::{PI, TAU};
use glam::{UVec2, UVec3, Vec2, Vec3};
use crate::mesh::{MeshData, Vertex};

pub trait Shape {
    /// Number of vertices and indices [`Shape::generate`] produces.
    fn counts(&self) -> (usize, usize);

    fn generate(&self) -> MeshData;
}

/// Axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cuboid {
    pub size: Vec3,
    pub segments: UVec3,
}

impl Cuboid {
    pub fn new(size: Vec3) -> Self {
        Self { size, segments: UVec3::ONE }
    }

    pub fn cube(edge: f32) -> Self {
        Self::new(Vec3::splat(edge))
    }

    fn segments(&self) -> UVec3 {
        self.segments.max(UVec3::ONE)
    }
}

impl Shape for Cuboid {
    fn counts(&self) -> (usize, usize) {
        let s = self.segments();
        let faces = [(s.z, s.y), (s.x, s.z), (s.x, s.y)];
        let vertices: u32 = faces.iter().map(|(u, v)| (u + 1) * (v + 1)).sum();
        let indices: u32 = faces.iter().map(|(u, v)| u * v * 6).sum();
        (2 * vertices as usize, 2 * indices as usize)
    }

    fn generate(&self) -> MeshData {
        let s = self.segments();
        let half = self.size * 0.5;
        let mut mesh = MeshData::default();

        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y, Vec2::new(self.size.z, self.size.y), UVec2::new(s.z, s.y), half.x),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y, Vec2::new(self.size.z, self.size.y), UVec2::new(s.z, s.y), half.x),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec2::new(self.size.x, self.size.z), UVec2::new(s.x, s.z), half.y),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec2::new(self.size.x, self.size.z), UVec2::new(s.x, s.z), half.y),
            (Vec3::Z, Vec3::X, Vec3::Y, Vec2::new(self.size.x, self.size.y), UVec2::new(s.x, s.y), half.z),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, Vec2::new(self.size.x, self.size.y), UVec2::new(s.x, s.y), half.z),
        ];
        for (normal, u, v, size, segments, offset) in faces {
            grid(&mut mesh, normal * offset, normal, u, v, size, segments);
        }
        mesh
    }
}

/// Flat rectangle in the XZ plane facing +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub size: Vec2,
    pub segments: UVec2,
}

impl Plane {
    pub fn new(size: Vec2) -> Self {
        Self { size, segments: UVec2::ONE }
    }
}

impl Shape for Plane {
    fn counts(&self) -> (usize, usize) {
        let s = self.segments.max(UVec2::ONE);
        (((s.x + 1) * (s.y + 1)) as usize, (s.x * s.y * 6) as usize)
    }

    fn generate(&self) -> MeshData {
        let mut mesh = MeshData::default();
        grid(&mut mesh, Vec3::ZERO, Vec3::Y, Vec3::X, Vec3::NEG_Z, self.size, self.segments.max(UVec2::ONE));
        mesh
    }
}

/// Append a subdivided rectangle spanned by the unit axes `u` and `v`, where `u x v == normal`.
fn grid(mesh: &mut MeshData, center: Vec3, normal: Vec3, u: Vec3, v: Vec3, size: Vec2, segments: UVec2) {
    let base = mesh.vertices.len() as u32;
    let row = segments.x + 1;

    for j in 0..=segments.y {
        for i in 0..=segments.x {
            let t = Vec2::new(i as f32 / segments.x as f32, j as f32 / segments.y as f32);
            let position = center + u * (t.x - 0.5) * size.x + v * (t.y - 0.5) * size.y;
            mesh.vertices.push(Vertex::new(position, normal, Vec2::new(t.x, 1.0 - t.y)));
        }
    }

    for j in 0..segments.y {
        for i in 0..segments.x {
            let a = base + j * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            mesh.indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }
}

/// UV sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub radius: f32,
    /// Divisions around the Y axis, at least 3.
    pub segments: u32,
    /// Divisions from pole to pole, at least 2.
    pub rings: u32,
}

impl Sphere {
    pub fn new(radius: f32) -> Self {
        Self { radius, segments: 32, rings: 16 }
    }

    fn divisions(&self) -> (u32, u32) {
        (self.segments.max(3), self.rings.max(2))
    }
}

impl Shape for Sphere {
    fn counts(&self) -> (usize, usize) {
        let (segments, rings) = self.divisions();
        (((segments + 1) * (rings + 1)) as usize, (6 * segments * (rings - 1)) as usize)
    }

    fn generate(&self) -> MeshData {
        let (segments, rings) = self.divisions();
        let mut mesh = MeshData::default();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let phi = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let theta = u * TAU;
                let normal = Vec3::new(-theta.cos() * phi.sin(), phi.cos(), theta.sin() * phi.sin());
                mesh.vertices.push(Vertex::new(normal * self.radius, normal, Vec2::new(u, v)));
            }
        }

        // the pole rows only need one triangle per quad
        let row = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * row + segment + 1;
                let b = ring * row + segment;
                let c = (ring + 1) * row + segment;
                let d = (ring + 1) * row + segment + 1;
                if ring != 0 {
                    mesh.indices.extend_from_slice(&[a, b, d]);
                }
                if ring != rings - 1 {
                    mesh.indices.extend_from_slice(&[b, c, d]);
                }
            }
        }
        mesh
    }
}

/// Cylinder or cone along the Y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cylinder {
    pub top_radius: f32,
    pub bottom_radius: f32,
    pub height: f32,
    /// Divisions around the Y axis, at least 3.
    pub radial_segments: u32,
    pub height_segments: u32,
    pub capped: bool,
}

impl Cylinder {
    pub fn new(radius: f32, height: f32) -> Self {
        Self {
            top_radius: radius,
            bottom_radius: radius,
            height,
            radial_segments: 32,
            height_segments: 1,
            capped: true,
        }
    }

    fn divisions(&self) -> (u32, u32) {
        (self.radial_segments.max(3), self.height_segments.max(1))
    }

    fn caps(&self) -> impl Iterator<Item = (f32, f32)> {
        let capped = self.capped;
        [(self.top_radius, 1.0), (self.bottom_radius, -1.0)]
            .into_iter()
            .filter(move |(radius, _)| capped && *radius > 0.0)
    }

    fn cap(&self, mesh: &mut MeshData, radius: f32, sign: f32) {
        let (radial, _) = self.divisions();
        let y = self.height * 0.5 * sign;
        let normal = Vec3::Y * sign;

        let centers = mesh.vertices.len() as u32;
        for _ in 0..radial {
            mesh.vertices.push(Vertex::new(Vec3::new(0.0, y, 0.0), normal, Vec2::splat(0.5)));
        }
        let rim = mesh.vertices.len() as u32;
        for x in 0..=radial {
            let theta = x as f32 / radial as f32 * TAU;
            let (sin, cos) = theta.sin_cos();
            let uv = Vec2::new(cos * 0.5 + 0.5, sin * 0.5 * sign + 0.5);
            mesh.vertices.push(Vertex::new(Vec3::new(radius * sin, y, radius * cos), normal, uv));
        }

        for x in 0..radial {
            let (center, i) = (centers + x, rim + x);
            if sign > 0.0 {
                mesh.indices.extend_from_slice(&[i, i + 1, center]);
            } else {
                mesh.indices.extend_from_slice(&[i + 1, i, center]);
            }
        }
    }
}

impl Shape for Cylinder {
    fn counts(&self) -> (usize, usize) {
        let (radial, rows) = self.divisions();
        let mut vertices = (radial + 1) * (rows + 1);
        let mut indices = radial * rows * 6;
        for _ in self.caps() {
            vertices += 2 * radial + 1;
            indices += 3 * radial;
        }
        (vertices as usize, indices as usize)
    }

    fn generate(&self) -> MeshData {
        let (radial, rows) = self.divisions();
        let mut mesh = MeshData::default();
        let half = self.height * 0.5;
        let slope = (self.bottom_radius - self.top_radius) / self.height.max(f32::EPSILON);

        for y in 0..=rows {
            let v = y as f32 / rows as f32;
            let radius = v * (self.bottom_radius - self.top_radius) + self.top_radius;
            for x in 0..=radial {
                let u = x as f32 / radial as f32;
                let (sin, cos) = (u * TAU).sin_cos();
                let position = Vec3::new(radius * sin, half - v * self.height, radius * cos);
                let normal = Vec3::new(sin, slope, cos).normalize();
                mesh.vertices.push(Vertex::new(position, normal, Vec2::new(u, v)));
            }
        }

        let row = radial + 1;
        for y in 0..rows {
            for x in 0..radial {
                let a = y * row + x;
                let b = a + row;
                let c = b + 1;
                let d = a + 1;
                mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        for (radius, sign) in self.caps() {
            self.cap(&mut mesh, radius, sign);
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn check(shape: &dyn Shape) -> MeshData {
        let mesh = shape.generate();
        assert_eq!((mesh.vertex_count(), mesh.index_count()), shape.counts());
        mesh.validate("shape").unwrap();
        mesh
    }

    fn face_normal(mesh: &MeshData, triangle: usize) -> Vec3 {
        let [a, b, c] = [0, 1, 2].map(|k| Vec3::from(mesh.vertices[mesh.indices[triangle * 3 + k] as usize].position));
        (b - a).cross(c - a).normalize()
    }

    #[test]
    fn cube_has_four_vertices_per_face() {
        let mesh = check(&Cuboid::cube(2.0));
        assert_eq!((mesh.vertex_count(), mesh.index_count()), (24, 36));
        for vertex in &mesh.vertices {
            assert!(Vec3::from(vertex.position).abs().max_element() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_outwards() {
        let mesh = check(&Cuboid::cube(1.0));
        for triangle in 0..mesh.index_count() / 3 {
            let normal = Vec3::from(mesh.vertices[mesh.indices[triangle * 3] as usize].normal);
            assert!(face_normal(&mesh, triangle).dot(normal) > 0.99, "triangle {triangle}");
        }
    }

    #[test]
    fn subdivided_box_counts() {
        let shape = Cuboid { size: Vec3::ONE, segments: UVec3::new(2, 3, 4) };
        let mesh = check(&shape);
        assert_eq!(mesh.vertex_count(), 2 * (5 * 4 + 3 * 5 + 3 * 4));
        assert_eq!(mesh.index_count(), 12 * (4 * 3 + 2 * 4 + 2 * 3));
    }

    #[test]
    fn plane_faces_up() {
        let shape = Plane { size: Vec2::new(4.0, 2.0), segments: UVec2::new(4, 2) };
        let mesh = check(&shape);
        assert_eq!((mesh.vertex_count(), mesh.index_count()), (15, 48));
        assert!(face_normal(&mesh, 0).dot(Vec3::Y) > 0.99);
        assert!(mesh.vertices.iter().all(|v| v.position[1] == 0.0));
    }

    #[test]
    fn sphere_vertices_lie_on_the_radius() {
        let mesh = check(&Sphere { radius: 2.0, segments: 8, rings: 4 });
        assert_eq!((mesh.vertex_count(), mesh.index_count()), (45, 144));
        for vertex in &mesh.vertices {
            assert!((Vec3::from(vertex.position).length() - 2.0).abs() < 1e-5);
        }
        for triangle in 0..mesh.index_count() / 3 {
            let centroid: Vec3 = (0..3)
                .map(|k| Vec3::from(mesh.vertices[mesh.indices[triangle * 3 + k] as usize].position))
                .sum::<Vec3>()
                / 3.0;
            assert!(face_normal(&mesh, triangle).dot(centroid) > 0.0, "triangle {triangle}");
        }
    }

    #[test]
    fn cylinder_caps_are_optional() {
        let capped = Cylinder { radial_segments: 6, ..Cylinder::new(1.0, 2.0) };
        let mesh = check(&capped);
        assert_eq!(mesh.vertex_count(), 7 * 2 + 2 * 13);
        assert_eq!(mesh.index_count(), 36 + 2 * 18);

        let open = Cylinder { capped: false, ..capped };
        assert_eq!(check(&open).index_count(), 36);

        let cone = Cylinder { top_radius: 0.0, ..capped };
        assert_eq!(check(&cone).index_count(), 36 + 18);
    }

    #[test]
    fn cylinder_side_faces_outwards() {
        let mesh = check(&Cylinder { capped: false, radial_segments: 12, ..Cylinder::new(1.0, 1.0) });
        for triangle in 0..mesh.index_count() / 3 {
            let position = Vec3::from(mesh.vertices[mesh.indices[triangle * 3] as usize].position);
            let outward = Vec3::new(position.x, 0.0, position.z);
            assert!(face_normal(&mesh, triangle).dot(outward) > 0.0, "triangle {triangle}");
        }
    }
}
