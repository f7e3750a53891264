//! Render targets: the swap chain's back-buffer view, the shared eye buffer, its depth
//! buffer and, with multisampling, the single-sampled resolve buffer.
//!
//! Without multisampling the image flows
//!
//! ```text
//! geometry -> eye buffer -> back buffer
//! ```
//!
//! and with it one extra step is needed before the compositor can sample it:
//!
//! ```text
//! geometry -> eye buffer -> resolve buffer -> back buffer
//! ```

use crate::error::Result;
use crate::geometry::{RenderTargetGeometry, Sizei};
use crate::gpu::{Gpu, TextureDesc, TextureFormat, TextureUsage};
use crate::hmd::{Eye, EyeBufferProvider, EyeTexture};

pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24Stencil8;

/// A colour texture usable both as a render target and as a shader input.
// Fields drop in declaration order, the reverse of creation.
pub struct ColorBuffer<G: Gpu> {
    pub render_target: G::RenderTargetView,
    pub shader_resource: G::ShaderResourceView,
    pub texture: G::Texture,
    pub desc: TextureDesc,
}

impl<G: Gpu> ColorBuffer<G> {
    fn create(gpu: &G, desc: TextureDesc) -> Result<Self> {
        let texture = gpu.create_texture(&desc)?;
        let shader_resource = gpu.create_shader_resource_view(&texture)?;
        let render_target = gpu.create_render_target_view(&texture)?;
        log::debug!(
            "created {} ({}x{}, {} samples)",
            desc.label,
            desc.size.width,
            desc.size.height,
            desc.sample_count
        );

        Ok(Self {
            render_target,
            shader_resource,
            texture,
            desc,
        })
    }
}

pub struct DepthBuffer<G: Gpu> {
    pub view: G::DepthStencilView,
    pub texture: G::Texture,
}

impl<G: Gpu> DepthBuffer<G> {
    fn create(gpu: &G, desc: TextureDesc) -> Result<Self> {
        let texture = gpu.create_texture(&desc)?;
        let view = gpu.create_depth_stencil_view(&texture, &desc)?;
        Ok(Self { view, texture })
    }
}

// Fields drop in declaration order, the reverse of creation, also when a run ends early.
pub struct RenderTargets<G: Gpu> {
    /// Present only when the eye buffer is multisampled.
    pub resolve: Option<ColorBuffer<G>>,
    pub depth: DepthBuffer<G>,
    pub eye: ColorBuffer<G>,
    pub back_buffer: G::RenderTargetView,
    pub geometry: RenderTargetGeometry,
}

impl<G: Gpu> RenderTargets<G> {
    pub fn create(gpu: &G, geometry: RenderTargetGeometry, sample_count: u32) -> Result<Self> {
        let back_buffer = gpu.create_back_buffer_view()?;

        let eye = ColorBuffer::create(
            gpu,
            color_desc("eye buffer", geometry.size, sample_count),
        )?;

        let depth = DepthBuffer::create(
            gpu,
            TextureDesc {
                label: "depth buffer",
                size: geometry.size,
                format: DEPTH_FORMAT,
                sample_count,
                usage: TextureUsage::DEPTH_STENCIL,
            },
        )?;

        let resolve = if sample_count > 1 {
            Some(ColorBuffer::create(
                gpu,
                color_desc("resolve buffer", geometry.size, 1),
            )?)
        } else {
            None
        };

        Ok(Self {
            resolve,
            depth,
            eye,
            back_buffer,
            geometry,
        })
    }

    /// The buffer the compositor reads: the resolve buffer when there is one.
    pub fn source(&self) -> &ColorBuffer<G> {
        self.resolve.as_ref().unwrap_or(&self.eye)
    }

    /// Resolves the eye buffer into the resolve buffer. Does nothing without multisampling.
    pub fn resolve(&self, gpu: &G) {
        if let Some(resolve) = &self.resolve {
            gpu.resolve(&resolve.texture, &self.eye.texture, COLOR_FORMAT);
        }
    }

    /// Releases everything in reverse creation order.
    pub fn release(self) {
        drop(self);
    }
}

impl<G: Gpu> EyeBufferProvider<G> for RenderTargets<G> {
    fn eye_texture(&self, eye: Eye) -> EyeTexture<'_, G> {
        let source = self.source();
        EyeTexture {
            texture: &source.texture,
            view: &source.shader_resource,
            texture_size: self.geometry.size,
            viewport: self.geometry.viewport(eye),
        }
    }
}

fn color_desc(label: &'static str, size: Sizei, sample_count: u32) -> TextureDesc {
    TextureDesc {
        label,
        size,
        format: COLOR_FORMAT,
        sample_count,
        usage: TextureUsage::SHADER_RESOURCE | TextureUsage::RENDER_TARGET,
    }
}
