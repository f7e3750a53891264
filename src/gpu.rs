//! Graphics device and windowing seams.
//!
//! [`Gpu`] is shaped after a Direct3D 11 device plus its immediate context: every `create_*`
//! call hands back an owned resource that is released when dropped, and the command methods
//! record straight into the single context.

use std::ffi::CStr;

use bitflags::bitflags;

use crate::error::Result;
use crate::geometry::{Recti, Sizei};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Colour format shared by the swap chain, eye buffer and resolve buffer.
    Rgba8Unorm,
    Depth24Stencil8,
}

bitflags! {
    /// How a texture will be bound to the pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureUsage: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub size: Sizei,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub usage: TextureUsage,
}

impl TextureDesc {
    pub const fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    Level10_1,
    Level11_0,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub size: Sizei,
    pub format: TextureFormat,
    pub buffer_count: u32,
    pub sample_count: u32,
    pub fullscreen: bool,
    /// Acceptable device feature levels, most preferred first.
    pub feature_levels: Vec<FeatureLevel>,
    pub debug_device: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x3,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            Self::Float32x3 => 12,
        }
    }
}

/// One element of the vertex input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub semantic: &'static CStr,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Pipeline state bound once before the frame loop starts.
pub struct PipelineBindings<'a, G: Gpu + ?Sized> {
    pub input_layout: &'a G::InputLayout,
    pub vertex_buffer: &'a G::Buffer,
    pub vertex_stride: u32,
    pub vertex_shader: &'a G::VertexShader,
    pub pixel_shader: &'a G::PixelShader,
    pub constant_buffer: &'a G::Buffer,
}

/// A graphics device with its immediate context and swap chain.
///
/// Dropping the value releases the swap chain, then the context, then the device.
pub trait Gpu {
    type Texture;
    type RenderTargetView;
    type ShaderResourceView;
    type DepthStencilView;
    type Buffer;
    type VertexShader;
    type PixelShader;
    type InputLayout;

    /// Render-target view onto the swap chain's back buffer.
    fn create_back_buffer_view(&self) -> Result<Self::RenderTargetView>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Self::Texture>;

    fn create_render_target_view(&self, texture: &Self::Texture)
    -> Result<Self::RenderTargetView>;

    fn create_shader_resource_view(
        &self,
        texture: &Self::Texture,
    ) -> Result<Self::ShaderResourceView>;

    fn create_depth_stencil_view(
        &self,
        texture: &Self::Texture,
        desc: &TextureDesc,
    ) -> Result<Self::DepthStencilView>;

    /// Compiles HLSL `source` and returns the bytecode.
    fn compile_shader(&self, source: &str, entry_point: &str, profile: &str) -> Result<Vec<u8>>;

    fn create_vertex_shader(&self, bytecode: &[u8]) -> Result<Self::VertexShader>;

    fn create_pixel_shader(&self, bytecode: &[u8]) -> Result<Self::PixelShader>;

    fn create_input_layout(
        &self,
        attributes: &[VertexAttribute],
        vertex_bytecode: &[u8],
    ) -> Result<Self::InputLayout>;

    /// Immutable vertex buffer initialised with `contents`.
    fn create_vertex_buffer(&self, contents: &[u8]) -> Result<Self::Buffer>;

    /// CPU-writable constant buffer, rewritten through [`Gpu::write_buffer`].
    fn create_constant_buffer(&self, byte_width: u32) -> Result<Self::Buffer>;

    fn bind_pipeline(&self, bindings: &PipelineBindings<'_, Self>);

    fn set_render_target(&self, target: &Self::RenderTargetView, depth: &Self::DepthStencilView);

    fn clear_render_target(&self, target: &Self::RenderTargetView, color: [f32; 4]);

    fn clear_depth_stencil(&self, depth: &Self::DepthStencilView, value: f32, stencil: u8);

    fn set_viewport(&self, viewport: Recti);

    /// Replaces the whole contents of a dynamic buffer (map, copy, unmap).
    fn write_buffer(&self, buffer: &Self::Buffer, contents: &[u8]) -> Result<()>;

    fn draw(&self, vertex_count: u32, start_vertex: u32);

    /// Resolves multisampled `source` into single-sampled `destination`.
    fn resolve(&self, destination: &Self::Texture, source: &Self::Texture, format: TextureFormat);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDesc {
    pub class_name: String,
    pub title: String,
    pub size: Sizei,
}

/// Messages the frame loop cares about. Everything else is dispatched and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    Quit,
    KeyDown,
    Other,
}

/// The windowing system plus graphics device creation.
pub trait Platform {
    type Window;
    type Gpu: Gpu;

    fn create_window(&self, desc: &WindowDesc) -> Result<Self::Window>;

    /// Creates the device, its immediate context and a swap chain presenting to `window`.
    fn create_gpu(&self, window: &Self::Window, desc: &SwapChainDesc) -> Result<Self::Gpu>;

    /// Removes and dispatches the next pending message without blocking.
    fn poll_message(&self) -> Option<WindowMessage>;

    /// Blocking, user-facing error notification.
    fn show_fatal_error(&self, title: &str, message: &str);
}
