//! Recording stand-ins for the platform, graphics device and headset runtime.
//!
//! Every mock writes into a shared [`Journal`]: API calls as [`Call`]s, and resource
//! lifetimes as [`Event`]s so tests can check that everything is released in reverse
//! creation order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use glam::{Quat, Vec3};

use crate::error::{Error, Result};
use crate::geometry::{Recti, RenderTargetGeometry, Sizei};
use crate::gpu::{
    Gpu, PipelineBindings, Platform, SwapChainDesc, TextureDesc, TextureFormat, VertexAttribute,
    WindowDesc, WindowMessage,
};
use crate::hmd::{
    DistortionCaps, Eye, EyeBufferProvider, EyeRenderDesc, HmdCaps, HmdInfo, HmdRuntime,
    HmdSession, RenderConfig, TrackingCaps,
};
use crate::math::{FovPort, Pose};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create(String),
    Release(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    // Platform
    CreateWindow,
    CreateSwapChain(SwapChainDesc),
    ShowFatalError { title: String },

    // Gpu
    CreateBackBufferView,
    CreateTexture(TextureDesc),
    CreateRenderTargetView { texture: String },
    CreateShaderResourceView { texture: String },
    CreateDepthStencilView { texture: String },
    CompileShader { entry_point: String, profile: String },
    CreateVertexShader,
    CreatePixelShader,
    CreateInputLayout { attributes: usize },
    VertexBuffer { floats: Vec<f32> },
    ConstantBuffer { byte_width: u32 },
    BindPipeline { vertex_stride: u32 },
    SetRenderTarget { target: String, depth: String },
    ClearRenderTarget { target: String, color: [f32; 4] },
    ClearDepthStencil { depth: String },
    SetViewport(Recti),
    WriteBuffer { buffer: String, floats: Vec<f32> },
    Draw { vertex_count: u32, start: u32 },
    Resolve { destination: String, source: String },

    // Runtime and session
    CreateHmd(u32),
    ConfigureTracking { supported: TrackingCaps, required: TrackingCaps },
    FovTextureSize(Eye),
    ConfigureRendering { size: Sizei, caps: DistortionCaps },
    SetEnabledCaps(HmdCaps),
    AttachToWindow,
    BeginFrame(u32),
    EyePoses(u32),
    EndFrame { textures: [String; 2] },
    RecenterPose,
    DismissHealthWarning,
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateWindow => "create_window",
            Self::CreateSwapChain(_) => "create_swap_chain",
            Self::ShowFatalError { .. } => "show_fatal_error",
            Self::CreateBackBufferView => "create_back_buffer_view",
            Self::CreateTexture(_) => "create_texture",
            Self::CreateRenderTargetView { .. } => "create_render_target_view",
            Self::CreateShaderResourceView { .. } => "create_shader_resource_view",
            Self::CreateDepthStencilView { .. } => "create_depth_stencil_view",
            Self::CompileShader { .. } => "compile_shader",
            Self::CreateVertexShader => "create_vertex_shader",
            Self::CreatePixelShader => "create_pixel_shader",
            Self::CreateInputLayout { .. } => "create_input_layout",
            Self::VertexBuffer { .. } => "create_vertex_buffer",
            Self::ConstantBuffer { .. } => "create_constant_buffer",
            Self::BindPipeline { .. } => "bind_pipeline",
            Self::SetRenderTarget { .. } => "set_render_target",
            Self::ClearRenderTarget { .. } => "clear_render_target",
            Self::ClearDepthStencil { .. } => "clear_depth_stencil",
            Self::SetViewport(_) => "set_viewport",
            Self::WriteBuffer { .. } => "write_buffer",
            Self::Draw { .. } => "draw",
            Self::Resolve { .. } => "resolve",
            Self::CreateHmd(_) => "create_hmd",
            Self::ConfigureTracking { .. } => "configure_tracking",
            Self::FovTextureSize(_) => "fov_texture_size",
            Self::ConfigureRendering { .. } => "configure_rendering",
            Self::SetEnabledCaps(_) => "set_enabled_caps",
            Self::AttachToWindow => "attach_to_window",
            Self::BeginFrame(_) => "begin_frame",
            Self::EyePoses(_) => "eye_poses",
            Self::EndFrame { .. } => "end_frame",
            Self::RecenterPose => "recenter_pose",
            Self::DismissHealthWarning => "dismiss_health_warning",
        }
    }
}

#[derive(Default)]
struct Entries {
    events: Vec<Event>,
    calls: Vec<Call>,
    next_id: usize,
}

/// Shared, append-only record of everything the mocks saw.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Entries>>);

impl Journal {
    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().calls.clone()
    }

    fn call(&self, call: Call) {
        self.0.borrow_mut().calls.push(call);
    }

    fn event(&self, event: Event) {
        self.0.borrow_mut().events.push(event);
    }

    fn create(&self, kind: &str) -> MockHandle {
        let label = {
            let mut entries = self.0.borrow_mut();
            let label = format!("{kind}#{}", entries.next_id);
            entries.next_id += 1;
            entries.events.push(Event::Create(label.clone()));
            label
        };
        MockHandle {
            label,
            journal: self.clone(),
        }
    }

    /// Replays the lifetime events as a stack and panics unless every release undoes the
    /// most recent outstanding creation. `alive` lists, oldest first, the kinds that are
    /// expected to still be outstanding.
    pub fn assert_released_in_reverse(&self, alive: &[&str]) {
        let mut stack: Vec<String> = Vec::new();
        for event in self.events() {
            match event {
                Event::Create(label) => stack.push(label),
                Event::Release(label) => {
                    let top = stack.pop();
                    assert_eq!(
                        top.as_deref(),
                        Some(label.as_str()),
                        "released {label} out of order; events: {:?}",
                        self.events()
                    );
                }
            }
        }

        let remaining: Vec<&str> = stack.iter().map(|label| kind_of(label)).collect();
        assert_eq!(remaining, alive, "outstanding resources");
    }
}

fn kind_of(label: &str) -> &str {
    label.split('#').next().unwrap_or_default()
}

/// A journaled resource. Logs its release when dropped.
pub struct MockHandle {
    label: String,
    journal: Journal,
}

impl MockHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &str {
        kind_of(&self.label)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.journal.event(Event::Release(self.label.clone()));
    }
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// Fields drop in declaration order: swap chain, context, device.
pub struct MockGpu {
    _swap_chain: MockHandle,
    _context: MockHandle,
    _device: MockHandle,
    journal: Journal,
    fail_shader_compilation: bool,
    /// Buffer writes that succeed before every further one fails. `None` never fails.
    buffer_writes_left: Cell<Option<u32>>,
}

impl MockGpu {
    pub fn new(journal: &Journal) -> Self {
        let device = journal.create("device");
        let context = journal.create("context");
        let swap_chain = journal.create("swap chain");
        Self {
            _swap_chain: swap_chain,
            _context: context,
            _device: device,
            journal: journal.clone(),
            fail_shader_compilation: false,
            buffer_writes_left: Cell::new(None),
        }
    }
}

impl Gpu for MockGpu {
    type Texture = MockHandle;
    type RenderTargetView = MockHandle;
    type ShaderResourceView = MockHandle;
    type DepthStencilView = MockHandle;
    type Buffer = MockHandle;
    type VertexShader = MockHandle;
    type PixelShader = MockHandle;
    type InputLayout = MockHandle;

    fn create_back_buffer_view(&self) -> Result<MockHandle> {
        self.journal.call(Call::CreateBackBufferView);
        Ok(self.journal.create("back buffer view"))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<MockHandle> {
        self.journal.call(Call::CreateTexture(*desc));
        Ok(self.journal.create(desc.label))
    }

    fn create_render_target_view(&self, texture: &MockHandle) -> Result<MockHandle> {
        self.journal.call(Call::CreateRenderTargetView {
            texture: texture.label().to_owned(),
        });
        Ok(self.journal.create(&format!("{} rtv", texture.kind())))
    }

    fn create_shader_resource_view(&self, texture: &MockHandle) -> Result<MockHandle> {
        self.journal.call(Call::CreateShaderResourceView {
            texture: texture.label().to_owned(),
        });
        Ok(self.journal.create(&format!("{} srv", texture.kind())))
    }

    fn create_depth_stencil_view(
        &self,
        texture: &MockHandle,
        _desc: &TextureDesc,
    ) -> Result<MockHandle> {
        self.journal.call(Call::CreateDepthStencilView {
            texture: texture.label().to_owned(),
        });
        Ok(self.journal.create(&format!("{} dsv", texture.kind())))
    }

    fn compile_shader(&self, source: &str, entry_point: &str, profile: &str) -> Result<Vec<u8>> {
        self.journal.call(Call::CompileShader {
            entry_point: entry_point.to_owned(),
            profile: profile.to_owned(),
        });
        if self.fail_shader_compilation || !source.contains(entry_point) {
            return Err(Error::ShaderCompilation {
                entry_point: entry_point.to_owned(),
                profile: profile.to_owned(),
                message: "error X3501: entrypoint not found".to_owned(),
            });
        }
        Ok(format!("{profile}:{entry_point}").into_bytes())
    }

    fn create_vertex_shader(&self, _bytecode: &[u8]) -> Result<MockHandle> {
        self.journal.call(Call::CreateVertexShader);
        Ok(self.journal.create("vertex shader"))
    }

    fn create_pixel_shader(&self, _bytecode: &[u8]) -> Result<MockHandle> {
        self.journal.call(Call::CreatePixelShader);
        Ok(self.journal.create("pixel shader"))
    }

    fn create_input_layout(
        &self,
        attributes: &[VertexAttribute],
        _vertex_bytecode: &[u8],
    ) -> Result<MockHandle> {
        self.journal.call(Call::CreateInputLayout {
            attributes: attributes.len(),
        });
        Ok(self.journal.create("input layout"))
    }

    fn create_vertex_buffer(&self, contents: &[u8]) -> Result<MockHandle> {
        self.journal.call(Call::VertexBuffer {
            floats: floats(contents),
        });
        Ok(self.journal.create("vertex buffer"))
    }

    fn create_constant_buffer(&self, byte_width: u32) -> Result<MockHandle> {
        self.journal.call(Call::ConstantBuffer { byte_width });
        Ok(self.journal.create("constant buffer"))
    }

    fn bind_pipeline(&self, bindings: &PipelineBindings<'_, Self>) {
        self.journal.call(Call::BindPipeline {
            vertex_stride: bindings.vertex_stride,
        });
    }

    fn set_render_target(&self, target: &MockHandle, depth: &MockHandle) {
        self.journal.call(Call::SetRenderTarget {
            target: target.label().to_owned(),
            depth: depth.label().to_owned(),
        });
    }

    fn clear_render_target(&self, target: &MockHandle, color: [f32; 4]) {
        self.journal.call(Call::ClearRenderTarget {
            target: target.label().to_owned(),
            color,
        });
    }

    fn clear_depth_stencil(&self, depth: &MockHandle, _value: f32, _stencil: u8) {
        self.journal.call(Call::ClearDepthStencil {
            depth: depth.label().to_owned(),
        });
    }

    fn set_viewport(&self, viewport: Recti) {
        self.journal.call(Call::SetViewport(viewport));
    }

    fn write_buffer(&self, buffer: &MockHandle, contents: &[u8]) -> Result<()> {
        self.journal.call(Call::WriteBuffer {
            buffer: buffer.label().to_owned(),
            floats: floats(contents),
        });
        match self.buffer_writes_left.get() {
            Some(0) => Err(Error::runtime("device removed")),
            Some(left) => {
                self.buffer_writes_left.set(Some(left - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32) {
        self.journal.call(Call::Draw {
            vertex_count,
            start: start_vertex,
        });
    }

    fn resolve(&self, destination: &MockHandle, source: &MockHandle, _format: TextureFormat) {
        self.journal.call(Call::Resolve {
            destination: destination.label().to_owned(),
            source: source.label().to_owned(),
        });
    }
}

pub struct MockWindow;

/// Serves window messages from a script.
///
/// `None` entries end a drain. Once the script runs out the platform reports a quit, so a
/// loop under test always terminates.
pub struct MockPlatform {
    journal: Journal,
    script: RefCell<VecDeque<Option<WindowMessage>>>,
    fail_shader_compilation: Cell<bool>,
    buffer_writes_before_failure: Cell<Option<u32>>,
}

impl MockPlatform {
    pub fn new(journal: &Journal, script: &[Option<WindowMessage>]) -> Self {
        Self {
            journal: journal.clone(),
            script: RefCell::new(script.iter().copied().collect()),
            fail_shader_compilation: Cell::new(false),
            buffer_writes_before_failure: Cell::new(None),
        }
    }

    /// Devices created from now on reject every shader.
    pub fn fail_shader_compilation(&self) {
        self.fail_shader_compilation.set(true);
    }

    /// Devices created from now on fail every buffer write after the first `writes`.
    pub fn fail_buffer_writes_after(&self, writes: u32) {
        self.buffer_writes_before_failure.set(Some(writes));
    }
}

impl Platform for MockPlatform {
    type Window = MockWindow;
    type Gpu = MockGpu;

    fn create_window(&self, _desc: &WindowDesc) -> Result<MockWindow> {
        self.journal.call(Call::CreateWindow);
        Ok(MockWindow)
    }

    fn create_gpu(&self, _window: &MockWindow, desc: &SwapChainDesc) -> Result<MockGpu> {
        self.journal.call(Call::CreateSwapChain(desc.clone()));
        let mut gpu = MockGpu::new(&self.journal);
        gpu.fail_shader_compilation = self.fail_shader_compilation.get();
        gpu.buffer_writes_left.set(self.buffer_writes_before_failure.get());
        Ok(gpu)
    }

    fn poll_message(&self) -> Option<WindowMessage> {
        let mut script = self.script.borrow_mut();
        match script.pop_front() {
            Some(entry) => entry,
            None => {
                script.push_back(None);
                Some(WindowMessage::Quit)
            }
        }
    }

    fn show_fatal_error(&self, title: &str, _message: &str) {
        self.journal.call(Call::ShowFatalError {
            title: title.to_owned(),
        });
    }
}

const EYE_SIZES: [Sizei; 2] = [Sizei::new(1000, 1200), Sizei::new(1001, 1210)];
const EYE_SEPARATION: f32 = 0.064;

fn mock_info() -> HmdInfo {
    HmdInfo {
        product_name: "Mock HMD".to_owned(),
        resolution: Sizei::new(1920, 1080),
        default_eye_fov: [FovPort::symmetric(1.2), FovPort::symmetric(1.2)],
        eye_render_order: [Eye::Left, Eye::Right],
        compositor_presents: false,
    }
}

pub struct MockRuntime {
    journal: Journal,
    info: HmdInfo,
    has_device: bool,
    initialized: bool,
}

impl MockRuntime {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            info: mock_info(),
            has_device: true,
            initialized: false,
        }
    }

    /// A runtime with no headset connected.
    pub fn without_device(journal: &Journal) -> Self {
        Self {
            has_device: false,
            ..Self::new(journal)
        }
    }

    /// A runtime whose compositor shows the eye images without the back buffer.
    pub fn presenting_through_compositor(mut self) -> Self {
        self.info.compositor_presents = true;
        self
    }

    pub fn info(&self) -> &HmdInfo {
        &self.info
    }

    /// The geometry sessions from this runtime lead to at unit render density.
    pub fn expected_geometry(&self) -> RenderTargetGeometry {
        RenderTargetGeometry::from_eye_sizes(EYE_SIZES[0], EYE_SIZES[1])
    }
}

impl HmdRuntime<MockPlatform> for MockRuntime {
    type Session = MockSession;

    fn initialize(&mut self) -> Result<()> {
        self.journal.event(Event::Create("runtime".to_owned()));
        self.initialized = true;
        Ok(())
    }

    fn create_hmd(&mut self, index: u32) -> Result<Option<MockSession>> {
        if !self.initialized {
            return Err(Error::RuntimeNotInitialized);
        }
        self.journal.call(Call::CreateHmd(index));
        if !self.has_device {
            return Ok(None);
        }
        let mut session = MockSession::new(&self.journal);
        session.info = self.info.clone();
        Ok(Some(session))
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        self.journal.event(Event::Release("runtime".to_owned()));
    }
}

pub struct MockSession {
    pub info: HmdInfo,
    /// Reports an exit request once this many frames have been submitted.
    pub exit_after_frames: Option<u64>,
    journal: Journal,
    frames: u64,
    last_poses: [Pose; 2],
    _handle: MockHandle,
}

impl MockSession {
    pub fn new(journal: &Journal) -> Self {
        Self {
            info: mock_info(),
            exit_after_frames: None,
            journal: journal.clone(),
            frames: 0,
            last_poses: [Pose::IDENTITY; 2],
            _handle: journal.create("hmd session"),
        }
    }

    /// The pose most recently returned for `eye`.
    pub fn pose_for(&self, eye: Eye) -> Pose {
        self.last_poses[eye.index()]
    }

    /// Head slowly turning, standing at eye height.
    fn head_pose(&self) -> Pose {
        Pose::new(
            Quat::from_rotation_y(0.1 * self.frames as f32),
            Vec3::new(0.0, 1.6, 0.0),
        )
    }
}

impl HmdSession<MockPlatform> for MockSession {
    fn info(&self) -> &HmdInfo {
        &self.info
    }

    fn configure_tracking(&mut self, supported: TrackingCaps, required: TrackingCaps) -> Result<()> {
        self.journal
            .call(Call::ConfigureTracking { supported, required });
        Ok(())
    }

    fn fov_texture_size(&self, eye: Eye, _fov: FovPort, pixels_per_display_pixel: f32) -> Sizei {
        self.journal.call(Call::FovTextureSize(eye));
        let size = EYE_SIZES[eye.index()];
        Sizei::new(
            (size.width as f32 * pixels_per_display_pixel).ceil() as u32,
            (size.height as f32 * pixels_per_display_pixel).ceil() as u32,
        )
    }

    fn configure_rendering(
        &mut self,
        config: RenderConfig<'_, MockGpu>,
        caps: DistortionCaps,
        eye_fov: [FovPort; 2],
    ) -> Result<[EyeRenderDesc; 2]> {
        self.journal.call(Call::ConfigureRendering {
            size: config.size,
            caps,
        });
        Ok(Eye::BOTH.map(|eye| EyeRenderDesc {
            fov: eye_fov[eye.index()],
            hmd_to_eye_offset: match eye {
                Eye::Left => Vec3::new(-EYE_SEPARATION / 2.0, 0.0, 0.0),
                Eye::Right => Vec3::new(EYE_SEPARATION / 2.0, 0.0, 0.0),
            },
        }))
    }

    fn set_enabled_caps(&mut self, caps: HmdCaps) {
        self.journal.call(Call::SetEnabledCaps(caps));
    }

    fn attach_to_window(&mut self, _window: &MockWindow) -> Result<()> {
        self.journal.call(Call::AttachToWindow);
        Ok(())
    }

    fn begin_frame(&mut self, frame_index: u32) -> Result<()> {
        self.journal.call(Call::BeginFrame(frame_index));
        Ok(())
    }

    fn eye_poses(&mut self, frame_index: u32, hmd_to_eye_offset: [Vec3; 2]) -> Result<[Pose; 2]> {
        self.journal.call(Call::EyePoses(frame_index));
        let head = self.head_pose();
        self.last_poses = hmd_to_eye_offset.map(|offset| head.offset_local(offset));
        Ok(self.last_poses)
    }

    fn end_frame(
        &mut self,
        _poses: &[Pose; 2],
        eye_textures: &dyn EyeBufferProvider<MockGpu>,
    ) -> Result<()> {
        let textures = Eye::BOTH.map(|eye| eye_textures.eye_texture(eye).texture.label().to_owned());
        self.journal.call(Call::EndFrame { textures });
        self.frames += 1;
        Ok(())
    }

    fn recenter_pose(&mut self) -> Result<()> {
        self.journal.call(Call::RecenterPose);
        Ok(())
    }

    fn dismiss_health_warning(&mut self) -> Result<()> {
        self.journal.call(Call::DismissHealthWarning);
        Ok(())
    }

    fn exit_requested(&self) -> bool {
        self.exit_after_frames
            .is_some_and(|frames| self.frames >= frames)
    }
}
