mod buffer;
pub use buffer::{
    Buffer, BufferBuilder, BufferDescriptor, BufferProperty, BufferUsage, BufferView,
    BufferViewBuilder, BufferViewDescriptor, BufferViewProperty, MapTicket,
};

mod image;
pub use image::{
    Extent3d, Texture, TextureBuilder, TextureDescriptor, TextureDimension, TextureFormat,
    TextureProperty, TextureUsage, TextureView, TextureViewBuilder, TextureViewDescriptor,
};

mod sampler;
pub use sampler::{FilterMode, Sampler, SamplerBuilder, SamplerDescriptor, SamplerProperty};

pub(crate) mod descriptor;
pub use descriptor::{
    BindGroupLayout, BindGroupLayoutBuilder, BindingInfo, BindingMask, BindingResource,
    BindingType, ResourceCategory, ShaderStages, BIND_GROUP_OFFSET_ALIGNMENT, MAX_BINDINGS_PER_GROUP,
};

mod bind_group;
pub use bind_group::{BindGroup, BindGroupBuilder, BindGroupProperty, BindGroupState, BindGroupUsage};

pub mod pipeline;
pub use pipeline::{PipelineLayout, PipelineLayoutBuilder, PipelineLayoutDescriptor, MAX_BIND_GROUPS};
