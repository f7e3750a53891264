//! The scene: one static triangle, one shader pair and one constant buffer holding the
//! per-eye transform.

use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::error::Result;
use crate::gpu::{Gpu, PipelineBindings, VertexAttribute, VertexFormat};
use crate::math;

pub const SHADER_SOURCE: &str = include_str!("shaders/triangle.hlsl");
pub const VERTEX_ENTRY_POINT: &str = "VSMain";
pub const PIXEL_ENTRY_POINT: &str = "PSMain";
pub const VERTEX_PROFILE: &str = "vs_4_0";
pub const PIXEL_PROFILE: &str = "ps_4_0";

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
}

pub const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [-1.0, -1.0, -0.5],
    },
    Vertex {
        position: [-1.0, 1.0, -1.5],
    },
    Vertex {
        position: [1.0, -1.0, -0.5],
    },
];

pub const TRIANGLE_VERTEX_COUNT: u32 = TRIANGLE.len() as u32;

pub const VERTEX_LAYOUT: [VertexAttribute; 1] = [VertexAttribute {
    semantic: c"POSITION",
    format: VertexFormat::Float32x3,
    offset: 0,
}];

/// Contents of the vertex shader's constant buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneConstants {
    pub mvp: [f32; 16],
}

// Fields drop in declaration order, the reverse of creation.
pub struct SceneResources<G: Gpu> {
    pub constant_buffer: G::Buffer,
    pub vertex_buffer: G::Buffer,
    pub input_layout: G::InputLayout,
    pub pixel_shader: G::PixelShader,
    pub vertex_shader: G::VertexShader,
}

impl<G: Gpu> SceneResources<G> {
    /// Builds the scene and binds it to the pipeline. The bindings stay in place for the
    /// rest of the run; only the constant buffer contents change afterwards.
    pub fn create(gpu: &G) -> Result<Self> {
        let vs_bytecode = gpu.compile_shader(SHADER_SOURCE, VERTEX_ENTRY_POINT, VERTEX_PROFILE)?;
        let ps_bytecode = gpu.compile_shader(SHADER_SOURCE, PIXEL_ENTRY_POINT, PIXEL_PROFILE)?;

        let vertex_shader = gpu.create_vertex_shader(&vs_bytecode)?;
        let pixel_shader = gpu.create_pixel_shader(&ps_bytecode)?;
        let input_layout = gpu.create_input_layout(&VERTEX_LAYOUT, &vs_bytecode)?;
        let vertex_buffer = gpu.create_vertex_buffer(bytemuck::cast_slice(&TRIANGLE))?;
        let constant_buffer =
            gpu.create_constant_buffer(mem::size_of::<SceneConstants>() as u32)?;

        gpu.bind_pipeline(&PipelineBindings {
            input_layout: &input_layout,
            vertex_buffer: &vertex_buffer,
            vertex_stride: mem::size_of::<Vertex>() as u32,
            vertex_shader: &vertex_shader,
            pixel_shader: &pixel_shader,
            constant_buffer: &constant_buffer,
        });
        log::debug!("scene ready: {} vertices", TRIANGLE.len());

        Ok(Self {
            constant_buffer,
            vertex_buffer,
            input_layout,
            pixel_shader,
            vertex_shader,
        })
    }

    /// Uploads the projection × view transform for the eye about to be drawn.
    pub fn upload_transform(&self, gpu: &G, transform: &Mat4) -> Result<()> {
        let constants = SceneConstants {
            mvp: math::shader_constants(transform),
        };
        gpu.write_buffer(&self.constant_buffer, bytemuck::bytes_of(&constants))
    }

    pub fn release(self) {
        drop(self);
    }
}
