//! Phong shading layer of Lumen.
//!
//! [`Phong`] keeps named meshes, textures and objects plus a bounded set of lights, and turns them
//! into the variables of a single-pipeline [`lumen_gpu::System`].

mod lights;
mod mesh;
mod object;
mod phong;
mod registry;
pub mod shapes;

pub use lights::{AmbientLight, DirectionalLight, LightLimits, Lights, PointLight, SpotLight};
pub use mesh::{MeshData, MeshDataBuilder, MeshDataBuilderError, Vertex};
pub use object::{Material, MaterialBuilder, MaterialBuilderError, Object};
pub use phong::{Phong, PhongConfig, PhongConfigBuilder, PhongConfigBuilderError};
pub use shapes::{Cuboid, Cylinder, Plane, Shape, Sphere};
