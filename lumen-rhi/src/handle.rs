//! Generation-checked handles for backend objects.
//!
//! Every backend owns slot maps keyed by these types, so a handle used after
//! its object was destroyed no longer resolves.

use slotmap::new_key_type;

new_key_type! {
    pub struct BufferId;
    pub struct TextureId;
    pub struct SamplerId;
    pub struct ShaderModuleId;
    pub struct BindGroupLayoutId;
    pub struct BindGroupId;
    pub struct PipelineId;
    pub struct SurfaceId;
}
