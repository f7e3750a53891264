//! Direct3D 11 implementation of [`Gpu`].

use std::ffi::CString;
use std::{ptr, slice};

use windows::{
    Win32::Foundation::*, Win32::Graphics::Direct3D::Fxc::*, Win32::Graphics::Direct3D::*,
    Win32::Graphics::Direct3D11::*, Win32::Graphics::Dxgi::Common::*, Win32::Graphics::Dxgi::*,
    core::*,
};

use crate::error::{Error, Result};
use crate::geometry::Recti;
use crate::gpu::{
    FeatureLevel, Gpu, PipelineBindings, SwapChainDesc, TextureDesc, TextureFormat, TextureUsage,
    VertexAttribute, VertexFormat,
};

const API: &str = "Direct3D 11";

fn d3d(err: windows::core::Error) -> Error {
    Error::backend(API, err)
}

/// Unwraps a `Create*` out-parameter that the driver left empty despite reporting success.
fn created<T>(resource: Option<T>) -> Result<T> {
    resource.ok_or_else(|| d3d(windows::core::Error::from(E_POINTER)))
}

fn dxgi_format(format: TextureFormat) -> DXGI_FORMAT {
    match format {
        TextureFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        TextureFormat::Depth24Stencil8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
    }
}

fn vertex_format(format: VertexFormat) -> DXGI_FORMAT {
    match format {
        VertexFormat::Float32x3 => DXGI_FORMAT_R32G32B32_FLOAT,
    }
}

fn feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::Level10_1 => D3D_FEATURE_LEVEL_10_1,
        FeatureLevel::Level11_0 => D3D_FEATURE_LEVEL_11_0,
    }
}

fn bind_flags(usage: TextureUsage) -> u32 {
    let mut flags = 0;
    if usage.contains(TextureUsage::SHADER_RESOURCE) {
        flags |= D3D11_BIND_SHADER_RESOURCE.0 as u32;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= D3D11_BIND_RENDER_TARGET.0 as u32;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        flags |= D3D11_BIND_DEPTH_STENCIL.0 as u32;
    }
    flags
}

// Fields drop in declaration order: swap chain, context, device.
pub struct D3D11Gpu {
    swap_chain: IDXGISwapChain,
    context: ID3D11DeviceContext,
    device: ID3D11Device,
}

/// Creates the device, its immediate context and a swap chain presenting to `window`.
pub fn create_gpu(window: HWND, desc: &SwapChainDesc) -> Result<D3D11Gpu> {
    let feature_levels: Vec<D3D_FEATURE_LEVEL> =
        desc.feature_levels.iter().copied().map(feature_level).collect();

    // The back buffer size must be set even when starting windowed.
    let swap_chain_desc = DXGI_SWAP_CHAIN_DESC {
        BufferDesc: DXGI_MODE_DESC {
            Width: desc.size.width,
            Height: desc.size.height,
            RefreshRate: DXGI_RATIONAL {
                Numerator: 0,
                Denominator: 1,
            },
            Format: dxgi_format(desc.format),
            ScanlineOrdering: DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED,
            Scaling: DXGI_MODE_SCALING_UNSPECIFIED,
        },
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: desc.sample_count,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: desc.buffer_count,
        OutputWindow: window,
        Windowed: (!desc.fullscreen).into(),
        SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
        Flags: DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH.0 as u32,
    };

    let flags = if desc.debug_device {
        D3D11_CREATE_DEVICE_DEBUG
    } else {
        D3D11_CREATE_DEVICE_FLAG(0)
    };

    let mut swap_chain: Option<IDXGISwapChain> = None;
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let mut obtained = D3D_FEATURE_LEVEL_10_1;

    unsafe {
        D3D11CreateDeviceAndSwapChain(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            flags,
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&swap_chain_desc),
            Some(&mut swap_chain),
            Some(&mut device),
            Some(&mut obtained),
            Some(&mut context),
        )
        .map_err(d3d)?;
    }

    log::info!(
        "created D3D11 device with feature level {obtained:?} ({}x{}, {} samples, {})",
        desc.size.width,
        desc.size.height,
        desc.sample_count,
        if desc.fullscreen { "fullscreen" } else { "windowed" }
    );

    Ok(D3D11Gpu {
        swap_chain: created(swap_chain)?,
        context: created(context)?,
        device: created(device)?,
    })
}

impl D3D11Gpu {
    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }
}

impl Drop for D3D11Gpu {
    fn drop(&mut self) {
        // A swap chain must not be released while it is fullscreen.
        if let Err(err) = unsafe { self.swap_chain.SetFullscreenState(false, None) } {
            log::warn!("leaving fullscreen failed: {err}");
        }
    }
}

impl Gpu for D3D11Gpu {
    type Texture = ID3D11Texture2D;
    type RenderTargetView = ID3D11RenderTargetView;
    type ShaderResourceView = ID3D11ShaderResourceView;
    type DepthStencilView = ID3D11DepthStencilView;
    type Buffer = ID3D11Buffer;
    type VertexShader = ID3D11VertexShader;
    type PixelShader = ID3D11PixelShader;
    type InputLayout = ID3D11InputLayout;

    fn create_back_buffer_view(&self) -> Result<ID3D11RenderTargetView> {
        unsafe {
            let back_buffer: ID3D11Texture2D = self.swap_chain.GetBuffer(0).map_err(d3d)?;
            let mut view = None;
            self.device
                .CreateRenderTargetView(&back_buffer, None, Some(&mut view))
                .map_err(d3d)?;
            created(view)
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<ID3D11Texture2D> {
        let texture_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.size.width,
            Height: desc.size.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: dxgi_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_count,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: bind_flags(desc.usage),
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };

        let mut texture = None;
        unsafe {
            self.device
                .CreateTexture2D(&texture_desc, None, Some(&mut texture))
                .map_err(d3d)?;
        }
        created(texture)
    }

    fn create_render_target_view(&self, texture: &ID3D11Texture2D) -> Result<ID3D11RenderTargetView> {
        let mut view = None;
        unsafe {
            self.device
                .CreateRenderTargetView(texture, None, Some(&mut view))
                .map_err(d3d)?;
        }
        created(view)
    }

    fn create_shader_resource_view(
        &self,
        texture: &ID3D11Texture2D,
    ) -> Result<ID3D11ShaderResourceView> {
        let mut view = None;
        unsafe {
            self.device
                .CreateShaderResourceView(texture, None, Some(&mut view))
                .map_err(d3d)?;
        }
        created(view)
    }

    fn create_depth_stencil_view(
        &self,
        texture: &ID3D11Texture2D,
        desc: &TextureDesc,
    ) -> Result<ID3D11DepthStencilView> {
        let view_desc = D3D11_DEPTH_STENCIL_VIEW_DESC {
            Format: dxgi_format(desc.format),
            // The view has to match how the texture was sampled.
            ViewDimension: if desc.is_multisampled() {
                D3D11_DSV_DIMENSION_TEXTURE2DMS
            } else {
                D3D11_DSV_DIMENSION_TEXTURE2D
            },
            Flags: 0,
            Anonymous: D3D11_DEPTH_STENCIL_VIEW_DESC_0 {
                Texture2D: D3D11_TEX2D_DSV { MipSlice: 0 },
            },
        };

        let mut view = None;
        unsafe {
            self.device
                .CreateDepthStencilView(texture, Some(&view_desc), Some(&mut view))
                .map_err(d3d)?;
        }
        created(view)
    }

    fn compile_shader(&self, source: &str, entry_point: &str, profile: &str) -> Result<Vec<u8>> {
        let failure = |message: String| Error::ShaderCompilation {
            entry_point: entry_point.to_owned(),
            profile: profile.to_owned(),
            message,
        };
        let entry_point_cstr = CString::new(entry_point).map_err(|e| failure(e.to_string()))?;
        let profile_cstr = CString::new(profile).map_err(|e| failure(e.to_string()))?;

        unsafe {
            let mut blob: Option<ID3DBlob> = None;
            let mut error_blob: Option<ID3DBlob> = None;

            let result = D3DCompile(
                source.as_ptr() as *const _,
                source.len(),
                None,
                None,
                None,
                PCSTR(entry_point_cstr.as_ptr() as *const u8),
                PCSTR(profile_cstr.as_ptr() as *const u8),
                D3DCOMPILE_OPTIMIZATION_LEVEL3,
                0,
                &mut blob,
                Some(&mut error_blob),
            );

            if let Err(err) = result {
                let message = match error_blob {
                    Some(error_blob) => String::from_utf8_lossy(blob_bytes(&error_blob))
                        .trim_end_matches('\0')
                        .trim_end()
                        .to_owned(),
                    None => err.to_string(),
                };
                return Err(failure(message));
            }

            let blob = blob.ok_or_else(|| failure("compiler returned no bytecode".to_owned()))?;
            Ok(blob_bytes(&blob).to_vec())
        }
    }

    fn create_vertex_shader(&self, bytecode: &[u8]) -> Result<ID3D11VertexShader> {
        let mut shader = None;
        unsafe {
            self.device
                .CreateVertexShader(bytecode, None, Some(&mut shader))
                .map_err(d3d)?;
        }
        created(shader)
    }

    fn create_pixel_shader(&self, bytecode: &[u8]) -> Result<ID3D11PixelShader> {
        let mut shader = None;
        unsafe {
            self.device
                .CreatePixelShader(bytecode, None, Some(&mut shader))
                .map_err(d3d)?;
        }
        created(shader)
    }

    fn create_input_layout(
        &self,
        attributes: &[VertexAttribute],
        vertex_bytecode: &[u8],
    ) -> Result<ID3D11InputLayout> {
        let elements: Vec<D3D11_INPUT_ELEMENT_DESC> = attributes
            .iter()
            .map(|attribute| D3D11_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(attribute.semantic.as_ptr() as _),
                SemanticIndex: 0,
                Format: vertex_format(attribute.format),
                InputSlot: 0,
                AlignedByteOffset: attribute.offset,
                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let mut layout = None;
        unsafe {
            self.device
                .CreateInputLayout(&elements, vertex_bytecode, Some(&mut layout))
                .map_err(d3d)?;
        }
        created(layout)
    }

    fn create_vertex_buffer(&self, contents: &[u8]) -> Result<ID3D11Buffer> {
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: contents.len() as u32,
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_VERTEX_BUFFER.0 as u32,
            CPUAccessFlags: 0,
            MiscFlags: 0,
            StructureByteStride: 0,
        };
        let data = D3D11_SUBRESOURCE_DATA {
            pSysMem: contents.as_ptr() as *const _,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        };

        let mut buffer = None;
        unsafe {
            self.device
                .CreateBuffer(&desc, Some(&data), Some(&mut buffer))
                .map_err(d3d)?;
        }
        created(buffer)
    }

    fn create_constant_buffer(&self, byte_width: u32) -> Result<ID3D11Buffer> {
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: byte_width,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
            MiscFlags: 0,
            StructureByteStride: 0,
        };

        let mut buffer = None;
        unsafe {
            self.device
                .CreateBuffer(&desc, None, Some(&mut buffer))
                .map_err(d3d)?;
        }
        created(buffer)
    }

    fn bind_pipeline(&self, bindings: &PipelineBindings<'_, Self>) {
        let offset = 0u32;
        unsafe {
            self.context.IASetInputLayout(bindings.input_layout);
            self.context.IASetVertexBuffers(
                0,
                1,
                Some(&Some(bindings.vertex_buffer.clone())),
                Some(&bindings.vertex_stride),
                Some(&offset),
            );
            self.context
                .IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            self.context.VSSetShader(bindings.vertex_shader, None);
            self.context.PSSetShader(bindings.pixel_shader, None);
            self.context
                .VSSetConstantBuffers(0, Some(&[Some(bindings.constant_buffer.clone())]));
        }
    }

    fn set_render_target(&self, target: &ID3D11RenderTargetView, depth: &ID3D11DepthStencilView) {
        unsafe {
            self.context
                .OMSetRenderTargets(Some(&[Some(target.clone())]), depth);
        }
    }

    fn clear_render_target(&self, target: &ID3D11RenderTargetView, color: [f32; 4]) {
        unsafe {
            self.context.ClearRenderTargetView(target, &color);
        }
    }

    fn clear_depth_stencil(&self, depth: &ID3D11DepthStencilView, value: f32, stencil: u8) {
        unsafe {
            self.context.ClearDepthStencilView(
                depth,
                (D3D11_CLEAR_DEPTH.0 | D3D11_CLEAR_STENCIL.0) as u32,
                value,
                stencil,
            );
        }
    }

    fn set_viewport(&self, viewport: Recti) {
        let viewport = D3D11_VIEWPORT {
            TopLeftX: viewport.x as f32,
            TopLeftY: viewport.y as f32,
            Width: viewport.size.width as f32,
            Height: viewport.size.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        unsafe {
            self.context.RSSetViewports(Some(&[viewport]));
        }
    }

    fn write_buffer(&self, buffer: &ID3D11Buffer, contents: &[u8]) -> Result<()> {
        unsafe {
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.context
                .Map(buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
                .map_err(d3d)?;
            ptr::copy_nonoverlapping(contents.as_ptr(), mapped.pData as *mut u8, contents.len());
            self.context.Unmap(buffer, 0);
        }
        Ok(())
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32) {
        unsafe {
            self.context.Draw(vertex_count, start_vertex);
        }
    }

    fn resolve(
        &self,
        destination: &ID3D11Texture2D,
        source: &ID3D11Texture2D,
        format: TextureFormat,
    ) {
        unsafe {
            self.context
                .ResolveSubresource(destination, 0, source, 0, dxgi_format(format));
        }
    }
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}
