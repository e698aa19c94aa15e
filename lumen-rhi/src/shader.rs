//! Shader loading, validation and reflection through naga.

use std::borrow::Cow;
use std::path::PathBuf;
use crate::error::{GpuError, Result};
use crate::types::ShaderStage;

/// Where shader code comes from.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    Wgsl(Cow<'static, str>),
    SpirV(Vec<u8>),
    /// A `.wgsl` or `.spv` file.
    File(PathBuf),
}

impl ShaderSource {
    pub fn wgsl(source: impl Into<Cow<'static, str>>) -> Self {
        ShaderSource::Wgsl(source.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ShaderSource::File(path.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Uniform,
    Storage,
    Texture,
    Sampler,
}

/// A `@group(g) @binding(b)` resource declared by a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointInfo {
    pub name: String,
    pub stage: ShaderStage,
    /// Vertex input locations consumed by a vertex entry point.
    pub vertex_inputs: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    pub entry_points: Vec<EntryPointInfo>,
    pub resources: Vec<ResourceBinding>,
}

impl ShaderReflection {
    pub fn entry_point(&self, name: &str) -> Option<&EntryPointInfo> {
        self.entry_points.iter().find(|ep| ep.name == name)
    }
}

/// A parsed and validated shader module.
pub struct ShaderModule {
    label: String,
    module: naga::Module,
    info: naga::valid::ModuleInfo,
    reflection: ShaderReflection,
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("label", &self.label)
            .field("reflection", &self.reflection)
            .finish()
    }
}

impl ShaderModule {
    #[profiling::function]
    pub fn parse(label: &str, source: &ShaderSource) -> Result<Self> {
        match source {
            ShaderSource::Wgsl(code) => Self::from_wgsl(label, code),
            ShaderSource::SpirV(bytes) => Self::from_spirv(label, bytes),
            ShaderSource::File(path) => {
                match path.extension().and_then(|e| e.to_str()) {
                    Some("wgsl") => {
                        let code = std::fs::read_to_string(path)?;
                        Self::from_wgsl(label, &code)
                    }
                    Some("spv") => {
                        let bytes = std::fs::read(path)?;
                        Self::from_spirv(label, &bytes)
                    }
                    _ => Err(GpuError::config(
                        label,
                        format!("cannot infer shader language of {}", path.display()),
                    )),
                }
            }
        }
    }

    fn from_wgsl(label: &str, code: &str) -> Result<Self> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| GpuError::config(label, e.emit_to_string(code)))?;
        Self::validate(label, module, Some(code))
    }

    fn from_spirv(label: &str, bytes: &[u8]) -> Result<Self> {
        let module = naga::front::spv::parse_u8_slice(bytes, &naga::front::spv::Options::default())
            .map_err(|e| GpuError::config(label, e.to_string()))?;
        Self::validate(label, module, None)
    }

    fn validate(label: &str, module: naga::Module, code: Option<&str>) -> Result<Self> {
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| {
            let message = match code {
                Some(code) => e.emit_to_string(code),
                None => e.as_inner().to_string(),
            };
            GpuError::config(label, message)
        })?;

        let reflection = reflect(&module);
        log::debug!(
            "shader `{label}`: {} entry point(s), {} resource binding(s)",
            reflection.entry_points.len(),
            reflection.resources.len()
        );

        Ok(Self {
            label: label.to_owned(),
            module,
            info,
            reflection,
        })
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Emit SPIR-V words for every entry point of the module.
    pub fn to_spirv(&self) -> Result<Vec<u32>> {
        let mut options = naga::back::spv::Options::default();
        options.flags.insert(naga::back::spv::WriterFlags::ADJUST_COORDINATE_SPACE);
        naga::back::spv::write_vec(&self.module, &self.info, &options, None)
            .map_err(|e| GpuError::config(&self.label, e.to_string()))
    }
}

fn reflect(module: &naga::Module) -> ShaderReflection {
    let mut reflection = ShaderReflection::default();

    for ep in &module.entry_points {
        #[allow(unreachable_patterns)]
        let stage = match ep.stage {
            naga::ShaderStage::Vertex => ShaderStage::Vertex,
            naga::ShaderStage::Fragment => ShaderStage::Fragment,
            naga::ShaderStage::Compute => ShaderStage::Compute,
            _ => continue,
        };

        let mut vertex_inputs = Vec::new();
        if stage == ShaderStage::Vertex {
            for arg in &ep.function.arguments {
                collect_locations(module, arg.ty, arg.binding.as_ref(), &mut vertex_inputs);
            }
            vertex_inputs.sort_unstable();
        }

        reflection.entry_points.push(EntryPointInfo {
            name: ep.name.clone(),
            stage,
            vertex_inputs,
        });
    }

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        let kind = match var.space {
            naga::AddressSpace::Uniform => ResourceKind::Uniform,
            naga::AddressSpace::Storage { .. } => ResourceKind::Storage,
            naga::AddressSpace::Handle => match module.types[var.ty].inner {
                naga::TypeInner::Image { .. } => ResourceKind::Texture,
                naga::TypeInner::Sampler { .. } => ResourceKind::Sampler,
                _ => continue,
            },
            _ => continue,
        };
        reflection.resources.push(ResourceBinding {
            group: binding.group,
            binding: binding.binding,
            kind,
            name: var.name.clone(),
        });
    }
    reflection.resources.sort_by_key(|r| (r.group, r.binding));

    reflection
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<u32>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push(*location),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHADER: &str = r#"
struct Globals { tint: vec4<f32> }
@group(0) @binding(0) var<uniform> globals: Globals;
@group(1) @binding(0) var tex: texture_2d<f32>;
@group(1) @binding(1) var samp: sampler;

struct VertexIn {
    @location(0) pos: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(in: VertexIn) -> VertexOut {
    var out: VertexOut;
    out.clip = vec4<f32>(in.pos, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    return textureSample(tex, samp, in.uv) * globals.tint;
}
"#;

    #[test]
    fn reflects_entries_and_bindings() {
        let module = ShaderModule::parse("test", &ShaderSource::wgsl(SHADER)).unwrap();
        let reflection = module.reflection();

        let vs = reflection.entry_point("vs_main").unwrap();
        assert_eq!(vs.stage, ShaderStage::Vertex);
        assert_eq!(vs.vertex_inputs, vec![0, 1]);
        assert_eq!(reflection.entry_point("fs_main").unwrap().stage, ShaderStage::Fragment);

        let kinds: Vec<_> = reflection.resources.iter().map(|r| (r.group, r.binding, r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, 0, ResourceKind::Uniform),
                (1, 0, ResourceKind::Texture),
                (1, 1, ResourceKind::Sampler),
            ]
        );
    }

    #[test]
    fn syntax_errors_are_config_errors() {
        let err = ShaderModule::parse("broken", &ShaderSource::wgsl("fn main( {")).unwrap_err();
        assert!(matches!(err, GpuError::Config { ref what, .. } if what == "broken"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = ShaderModule::parse("file", &ShaderSource::file("shader.glsl")).unwrap_err();
        assert!(matches!(err, GpuError::Config { .. }));
    }

    #[test]
    fn emits_spirv() {
        let module = ShaderModule::parse("test", &ShaderSource::wgsl(SHADER)).unwrap();
        let words = module.to_spirv().unwrap();
        assert_eq!(words[0], 0x0723_0203);
    }
}
