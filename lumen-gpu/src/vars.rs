//! Shader variables grouped into binding sets.
//!
//! Every bind set maps to one bind group index; the vertex set feeds vertex and index buffers.
//! Each variable holds `n_values` buffered [`Value`]s and one of them is selected for the next draw.

use lumen_rhi::{GpuError, Result, ShaderStages, VertexAttribute, VertexBufferLayout, VertexFormat, VertexLayout};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarRole {
    Vertex,
    Index,
    Uniform,
    Storage,
    Texture,
}

impl VarRole {
    #[inline]
    pub fn is_vertex_input(self) -> bool {
        matches!(self, VarRole::Vertex | VarRole::Index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarType {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Sint32,
    Mat4,
    /// Plain-old-data block of `size` bytes.
    Struct { size: u32 },
    /// Interleaved vertex struct; attribute locations are relative to the variable's first location.
    Interleaved { stride: u32, attributes: Vec<VertexAttribute> },
    Texture,
}

impl VarType {
    pub fn interleaved<V: VertexLayout>() -> Self {
        VarType::Interleaved {
            stride: V::stride(),
            attributes: V::attributes(),
        }
    }

    /// Byte size of one element.
    pub fn size(&self) -> u32 {
        match self {
            VarType::Float32 | VarType::Uint32 | VarType::Sint32 => 4,
            VarType::Float32x2 => 8,
            VarType::Float32x3 => 12,
            VarType::Float32x4 => 16,
            VarType::Mat4 => 64,
            VarType::Struct { size } => *size,
            VarType::Interleaved { stride, .. } => *stride,
            VarType::Texture => 0,
        }
    }

    pub fn vertex_format(&self) -> Option<VertexFormat> {
        match self {
            VarType::Float32 => Some(VertexFormat::Float32),
            VarType::Float32x2 => Some(VertexFormat::Float32x2),
            VarType::Float32x3 => Some(VertexFormat::Float32x3),
            VarType::Float32x4 => Some(VertexFormat::Float32x4),
            VarType::Uint32 => Some(VertexFormat::Uint32),
            VarType::Sint32 => Some(VertexFormat::Sint32),
            _ => None,
        }
    }

    /// Number of vertex locations one element occupies.
    fn locations(&self) -> u32 {
        match self {
            VarType::Interleaved { attributes, .. } => attributes.len() as u32,
            other if other.vertex_format().is_some() => 1,
            _ => 0,
        }
    }
}

/// A named shader-visible resource slot.
#[derive(Debug, Clone)]
pub struct Var {
    name: String,
    ty: VarType,
    role: VarRole,
    stages: ShaderStages,
    binding: u32,
    array_len: u32,
    values: Vec<Value>,
    current: usize,
}

impl Var {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> &VarType {
        &self.ty
    }

    #[inline]
    pub fn role(&self) -> VarRole {
        self.role
    }

    #[inline]
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    /// Binding number inside the set. Texture variables also own `binding + 1` for their sampler.
    #[inline]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    /// First vertex location of a vertex variable.
    #[inline]
    pub fn location(&self) -> u32 {
        self.binding
    }

    #[inline]
    pub fn array_len(&self) -> u32 {
        self.array_len
    }

    /// Declare the variable as an array of `len` elements (uniform and storage blocks).
    pub fn set_array_len(&mut self, len: u32) -> &mut Self {
        self.array_len = len.max(1);
        self
    }

    /// Size of one value as declared by type and array length.
    #[inline]
    pub fn element_size(&self) -> u64 {
        self.ty.size() as u64 * self.array_len as u64
    }

    #[inline]
    pub fn n_values(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_mut(&mut self, index: usize) -> Result<&mut Value> {
        let count = self.values.len();
        self.values.get_mut(index).ok_or_else(|| GpuError::ValueIndexOutOfRange {
            var: self.name.clone(),
            index,
            count,
        })
    }

    /// Index of the value selected for the next draw.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current_value(&self) -> &Value {
        &self.values[self.current]
    }

    /// Vertex attributes with absolute locations.
    pub fn vertex_attributes(&self) -> Vec<VertexAttribute> {
        match &self.ty {
            VarType::Interleaved { attributes, .. } => attributes
                .iter()
                .map(|attribute| VertexAttribute {
                    location: self.binding + attribute.location,
                    ..*attribute
                })
                .collect(),
            ty => ty
                .vertex_format()
                .map(|format| VertexAttribute { location: self.binding, format, offset: 0 })
                .into_iter()
                .collect(),
        }
    }

    pub(crate) fn vertex_buffer_layout(&self) -> Option<VertexBufferLayout> {
        (self.role == VarRole::Vertex).then(|| VertexBufferLayout {
            slot: self.binding,
            stride: self.ty.size(),
            attributes: self.vertex_attributes(),
        })
    }

    /// Whether a shader vertex input at `location` is fed by this variable.
    pub(crate) fn feeds_location(&self, location: u32) -> bool {
        self.role == VarRole::Vertex && (self.binding..self.binding + self.ty.locations()).contains(&location)
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.values.len() {
            return Err(GpuError::ValueIndexOutOfRange {
                var: self.name.clone(),
                index,
                count: self.values.len(),
            });
        }
        self.current = index;
        Ok(())
    }

    fn resize(&mut self, n: usize) {
        self.values.resize_with(n, Value::default);
        self.current = self.current.min(n - 1);
    }
}

/// Variables sharing one bind group index, or the vertex set.
#[derive(Debug, Clone)]
pub struct VarSet {
    /// `None` for the vertex set.
    index: Option<u32>,
    vars: Vec<Var>,
    n_values: usize,
    next_binding: u32,
    configured: bool,
}

impl VarSet {
    fn new(index: Option<u32>) -> Self {
        Self {
            index,
            vars: Vec::new(),
            n_values: 1,
            next_binding: 0,
            configured: false,
        }
    }

    pub(crate) fn label(&self) -> String {
        match self.index {
            Some(index) => format!("set {index}"),
            None => "vertex set".to_owned(),
        }
    }

    /// Register a variable. Bindings and vertex locations follow registration order.
    pub fn add(&mut self, name: &str, ty: VarType, role: VarRole, stages: ShaderStages) -> Result<&mut Var> {
        if self.configured {
            return Err(GpuError::AlreadyConfigured { what: self.label() });
        }
        if self.vars.iter().any(|var| var.name == name) {
            return Err(GpuError::config(self.label(), format!("variable `{name}` is already registered")));
        }
        self.check_role(name, &ty, role)?;

        let binding = if role == VarRole::Index { 0 } else { self.next_binding };
        self.next_binding += match role {
            VarRole::Index => 0,
            VarRole::Vertex => ty.locations(),
            VarRole::Texture => 2,
            VarRole::Uniform | VarRole::Storage => 1,
        };

        log::trace!("{}: `{name}` {role:?} {ty:?} at binding {binding}", self.label());
        self.vars.push(Var {
            name: name.to_owned(),
            ty,
            role,
            stages,
            binding,
            array_len: 1,
            values: vec![Value::default(); self.n_values],
            current: 0,
        });
        let last = self.vars.len() - 1;
        Ok(&mut self.vars[last])
    }

    fn check_role(&self, name: &str, ty: &VarType, role: VarRole) -> Result<()> {
        let problem = match (self.index, role) {
            (None, VarRole::Vertex | VarRole::Index) | (Some(_), VarRole::Uniform | VarRole::Storage | VarRole::Texture) => {
                match role {
                    VarRole::Index if *ty != VarType::Uint32 => Some("index variables must be Uint32"),
                    VarRole::Vertex if ty.locations() == 0 => Some("vertex variables need a vertex format"),
                    VarRole::Texture if *ty != VarType::Texture => Some("texture variables must have the Texture type"),
                    VarRole::Uniform | VarRole::Storage if ty.size() == 0 => Some("buffer variables need a non-empty type"),
                    _ => None,
                }
            }
            (None, _) => Some("only vertex and index variables belong to the vertex set"),
            (Some(_), _) => Some("vertex and index variables belong to the vertex set"),
        };
        match problem {
            Some(problem) => Err(GpuError::config(self.label(), format!("`{name}` ({role:?}): {problem}"))),
            None => Ok(()),
        }
    }

    /// Resize the value array of every variable in the set (at least one value).
    pub fn set_n_values(&mut self, n: usize) {
        let n = n.max(1);
        self.n_values = n;
        for var in &mut self.vars {
            var.resize(n);
        }
    }

    #[inline]
    pub fn n_values(&self) -> usize {
        self.n_values
    }

    /// Bind group index, `None` for the vertex set.
    #[inline]
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    #[inline]
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|var| var.name == name)
    }

    pub fn var_mut(&mut self, name: &str) -> Result<&mut Var> {
        let label = self.label();
        self.vars
            .iter_mut()
            .find(|var| var.name == name)
            .ok_or_else(|| GpuError::UnknownVar { set: label, name: name.to_owned() })
    }

    pub fn has_textures(&self) -> bool {
        self.vars.iter().any(|var| var.role == VarRole::Texture)
    }

    pub(crate) fn vars_mut(&mut self) -> &mut [Var] {
        &mut self.vars
    }

    /// Value index selecting the bind group of a set with textures.
    pub(crate) fn texture_index(&self) -> usize {
        self.vars
            .iter()
            .find(|var| var.role == VarRole::Texture)
            .map_or(0, Var::current_index)
    }
}

/// All variables of a system: the vertex set plus bind sets `0..n`.
#[derive(Debug, Clone)]
pub struct Vars {
    vertex: VarSet,
    sets: Vec<VarSet>,
    configured: bool,
}

impl Default for Vars {
    fn default() -> Self {
        Self::new()
    }
}

impl Vars {
    pub fn new() -> Self {
        Self {
            vertex: VarSet::new(None),
            sets: Vec::new(),
            configured: false,
        }
    }

    /// Append a bind set and return its index.
    pub fn add_set(&mut self) -> Result<u32> {
        if self.configured {
            return Err(GpuError::AlreadyConfigured { what: "vars".to_owned() });
        }
        let index = self.sets.len() as u32;
        self.sets.push(VarSet::new(Some(index)));
        Ok(index)
    }

    #[inline]
    pub fn n_sets(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn sets(&self) -> &[VarSet] {
        &self.sets
    }

    pub fn set(&self, index: u32) -> Option<&VarSet> {
        self.sets.get(index as usize)
    }

    pub fn set_mut(&mut self, index: u32) -> Result<&mut VarSet> {
        let count = self.sets.len();
        self.sets
            .get_mut(index as usize)
            .ok_or_else(|| GpuError::config("vars", format!("no set {index} ({count} sets)")))
    }

    #[inline]
    pub fn vertex_set(&self) -> &VarSet {
        &self.vertex
    }

    #[inline]
    pub fn vertex_set_mut(&mut self) -> &mut VarSet {
        &mut self.vertex
    }

    pub fn var_mut(&mut self, set: u32, name: &str) -> Result<&mut Var> {
        self.set_mut(set)?.var_mut(name)
    }

    pub fn vertex_var_mut(&mut self, name: &str) -> Result<&mut Var> {
        self.vertex.var_mut(name)
    }

    /// Select the value of `name` in `set` used by the next draw.
    ///
    /// Selecting a texture selects the same index for every texture of the set, since they share a bind group.
    pub fn bind_dynamic_value(&mut self, set: u32, name: &str, index: usize) -> Result<()> {
        let set = self.set_mut(set)?;
        let var = set.var_mut(name)?;
        var.select(index)?;
        if var.role == VarRole::Texture {
            for var in set.vars.iter_mut().filter(|var| var.role == VarRole::Texture) {
                var.select(index)?;
            }
        }
        Ok(())
    }

    /// Select the value index of every vertex and index variable.
    pub fn bind_vertex_value(&mut self, index: usize) -> Result<()> {
        for var in &mut self.vertex.vars {
            var.select(index)?;
        }
        Ok(())
    }

    pub fn index_var(&self) -> Option<&Var> {
        self.vertex.vars.iter().find(|var| var.role == VarRole::Index)
    }

    /// Validate and freeze the layout. Calling it again is a no-op.
    pub fn config(&mut self) -> Result<()> {
        if self.configured {
            return Ok(());
        }

        let index_vars = self.vertex.vars.iter().filter(|var| var.role == VarRole::Index).count();
        if index_vars > 1 {
            return Err(GpuError::config("vertex set", format!("{index_vars} index variables, at most one allowed")));
        }
        if index_vars == 1 && !self.vertex.vars.iter().any(|var| var.role == VarRole::Vertex) {
            return Err(GpuError::config("vertex set", "index variable without vertex variables"));
        }

        self.vertex.configured = true;
        for set in &mut self.sets {
            set.configured = true;
        }
        self.configured = true;
        Ok(())
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_rhi::ShaderStage;
    use pretty_assertions::assert_eq;

    fn fragment() -> ShaderStages {
        ShaderStage::Fragment.into()
    }

    #[test]
    fn set_indices_are_contiguous() {
        let mut vars = Vars::new();
        assert_eq!(vars.add_set().unwrap(), 0);
        assert_eq!(vars.add_set().unwrap(), 1);
        assert_eq!(vars.add_set().unwrap(), 2);
        assert_eq!(vars.set(1).unwrap().index(), Some(1));
        assert!(vars.set_mut(3).is_err());
    }

    #[test]
    fn bindings_follow_registration_order() {
        let mut vars = Vars::new();
        let set = vars.add_set().unwrap();
        let set = vars.set_mut(set).unwrap();
        set.add("camera", VarType::Mat4, VarRole::Uniform, fragment()).unwrap();
        set.add("albedo", VarType::Texture, VarRole::Texture, fragment()).unwrap();
        set.add("params", VarType::Float32x4, VarRole::Uniform, fragment()).unwrap();

        let bindings: Vec<u32> = set.vars().iter().map(Var::binding).collect();
        assert_eq!(bindings, vec![0, 1, 3]);

        let vertex = vars.vertex_set_mut();
        vertex.add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into()).unwrap();
        vertex.add("index", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into()).unwrap();
        vertex.add("uv", VarType::Float32x2, VarRole::Vertex, ShaderStage::Vertex.into()).unwrap();
        let locations: Vec<u32> = vertex.vars().iter().map(Var::location).collect();
        assert_eq!(locations, vec![0, 0, 1]);
    }

    #[test]
    fn roles_must_fit_the_set() {
        let mut vars = Vars::new();
        let set = vars.add_set().unwrap();
        let err = vars
            .set_mut(set)
            .unwrap()
            .add("pos", VarType::Float32x3, VarRole::Vertex, fragment())
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Config { .. }));

        let err = vars
            .vertex_set_mut()
            .add("camera", VarType::Mat4, VarRole::Uniform, fragment())
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Config { .. }));

        let err = vars
            .vertex_set_mut()
            .add("index", VarType::Float32, VarRole::Index, fragment())
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Config { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut vars = Vars::new();
        let set = vars.vertex_set_mut();
        set.add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into()).unwrap();
        let err = set
            .add("pos", VarType::Float32x2, VarRole::Vertex, ShaderStage::Vertex.into())
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::Config { .. }));
    }

    #[test]
    fn adding_after_config_fails() {
        let mut vars = Vars::new();
        vars.add_set().unwrap();
        vars.config().unwrap();
        let err = vars
            .set_mut(0)
            .unwrap()
            .add("late", VarType::Float32, VarRole::Uniform, fragment())
            .err()
            .unwrap();
        assert!(matches!(err, GpuError::AlreadyConfigured { .. }));
        assert!(matches!(vars.add_set(), Err(GpuError::AlreadyConfigured { .. })));
    }

    #[test]
    fn value_selection_is_bounds_checked() {
        let mut vars = Vars::new();
        let set = vars.add_set().unwrap();
        let object = vars.set_mut(set).unwrap();
        object.add("model", VarType::Mat4, VarRole::Uniform, fragment()).unwrap();
        object.set_n_values(3);

        vars.bind_dynamic_value(set, "model", 2).unwrap();
        assert_eq!(vars.set(set).unwrap().var("model").unwrap().current_index(), 2);

        let err = vars.bind_dynamic_value(set, "model", 3).err().unwrap();
        assert!(matches!(err, GpuError::ValueIndexOutOfRange { index: 3, count: 3, .. }));
        assert!(matches!(vars.bind_dynamic_value(set, "view", 0), Err(GpuError::UnknownVar { .. })));

        let model = vars.var_mut(set, "model").unwrap();
        assert!(model.value_mut(5).is_err());
        assert!(model.value_mut(0).is_ok());
    }

    #[test]
    fn shrinking_clamps_the_selection() {
        let mut vars = Vars::new();
        let set = vars.add_set().unwrap();
        vars.set_mut(set).unwrap().add("model", VarType::Mat4, VarRole::Uniform, fragment()).unwrap();
        vars.set_mut(set).unwrap().set_n_values(4);
        vars.bind_dynamic_value(set, "model", 3).unwrap();

        vars.set_mut(set).unwrap().set_n_values(0);
        let model = vars.set(set).unwrap().var("model").unwrap();
        assert_eq!(model.n_values(), 1);
        assert_eq!(model.current_index(), 0);
    }

    #[test]
    fn textures_are_selected_together() {
        let mut vars = Vars::new();
        let set = vars.add_set().unwrap();
        let textures = vars.set_mut(set).unwrap();
        textures.add("albedo", VarType::Texture, VarRole::Texture, fragment()).unwrap();
        textures.add("normal", VarType::Texture, VarRole::Texture, fragment()).unwrap();
        textures.set_n_values(2);

        vars.bind_dynamic_value(set, "albedo", 1).unwrap();
        assert_eq!(vars.set(set).unwrap().var("normal").unwrap().current_index(), 1);
        assert_eq!(vars.set(set).unwrap().texture_index(), 1);
    }

    #[test]
    fn at_most_one_index_var() {
        let mut vars = Vars::new();
        let vertex = vars.vertex_set_mut();
        vertex.add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into()).unwrap();
        vertex.add("a", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into()).unwrap();
        vertex.add("b", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into()).unwrap();
        assert!(matches!(vars.config(), Err(GpuError::Config { .. })));

        let mut vars = Vars::new();
        vars.vertex_set_mut()
            .add("index", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into())
            .unwrap();
        assert!(matches!(vars.config(), Err(GpuError::Config { .. })));
    }
}
