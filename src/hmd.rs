//! The head-mounted display runtime, seen from the demo's side.
//!
//! The runtime owns tracking, lens distortion, timewarp and presentation. The demo only
//! configures it once, asks it for eye poses every frame, and hands it the rendered eye
//! buffer to distort onto the panel.

use bitflags::bitflags;
use glam::Vec3;

use crate::error::Result;
use crate::geometry::{Recti, Sizei};
use crate::gpu::{Gpu, Platform};
use crate::math::{FovPort, Pose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

bitflags! {
    /// Tracking features to enable on the headset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackingCaps: u32 {
        const ORIENTATION = 1 << 4;
        const MAG_YAW_CORRECTION = 1 << 5;
        const POSITION = 1 << 6;
    }

    /// Post-processing the distortion compositor applies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DistortionCaps: u32 {
        const CHROMATIC = 1 << 0;
        const TIME_WARP = 1 << 1;
        const VIGNETTE = 1 << 3;
        const OVERDRIVE = 1 << 7;
    }

    /// Display behaviour toggles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HmdCaps: u32 {
        const LOW_PERSISTENCE = 1 << 7;
        const DYNAMIC_PREDICTION = 1 << 9;
        const NO_MIRROR_TO_WINDOW = 1 << 13;
    }
}

/// Static facts about the opened headset.
#[derive(Debug, Clone, PartialEq)]
pub struct HmdInfo {
    pub product_name: String,
    /// Native panel resolution; the swap chain is created at this size.
    pub resolution: Sizei,
    pub default_eye_fov: [FovPort; 2],
    /// The order the runtime would like the eyes rendered in.
    pub eye_render_order: [Eye; 2],
    /// The runtime presents the eye images itself and never reads the back buffer, so the
    /// swap chain is kept windowed instead of taking over the desktop display.
    pub compositor_presents: bool,
}

/// What the distortion compositor reports back for each eye once rendering is configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRenderDesc {
    pub fov: FovPort,
    /// Offset from the centre of the head to this eye, in head space.
    pub hmd_to_eye_offset: Vec3,
}

/// Device, swap chain and back buffer the compositor renders the distorted image with.
pub struct RenderConfig<'a, G: Gpu + ?Sized> {
    pub gpu: &'a G,
    pub back_buffer: &'a G::RenderTargetView,
    /// Size of the back buffer, i.e. the native panel resolution.
    pub size: Sizei,
    /// Size of the texture the eye images are submitted in.
    pub eye_buffer_size: Sizei,
    pub multisample_count: u32,
}

/// A borrowed view of one eye's image for the duration of a frame submission.
pub struct EyeTexture<'a, G: Gpu + ?Sized> {
    pub texture: &'a G::Texture,
    pub view: &'a G::ShaderResourceView,
    pub texture_size: Sizei,
    pub viewport: Recti,
}

/// Lends the rendered eye images to the compositor.
///
/// The demo keeps ownership of the buffers; the session only reads them while `end_frame`
/// runs.
pub trait EyeBufferProvider<G: Gpu + ?Sized> {
    fn eye_texture(&self, eye: Eye) -> EyeTexture<'_, G>;
}

/// Process-wide runtime entry points.
pub trait HmdRuntime<P: Platform> {
    type Session: HmdSession<P>;

    /// Must be called once, before any graphics device is created.
    fn initialize(&mut self) -> Result<()>;

    /// Opens headset `index`. `Ok(None)` means no such device is connected.
    fn create_hmd(&mut self, index: u32) -> Result<Option<Self::Session>>;

    /// Every session must have been dropped before this is called.
    fn shutdown(&mut self);
}

/// An open connection to one headset. Dropping the session destroys it.
pub trait HmdSession<P: Platform> {
    fn info(&self) -> &HmdInfo;

    fn configure_tracking(&mut self, supported: TrackingCaps, required: TrackingCaps)
    -> Result<()>;

    /// Recommended eye-buffer size for `eye` at `fov` and the given render density.
    fn fov_texture_size(&self, eye: Eye, fov: FovPort, pixels_per_display_pixel: f32) -> Sizei;

    fn configure_rendering(
        &mut self,
        config: RenderConfig<'_, P::Gpu>,
        caps: DistortionCaps,
        eye_fov: [FovPort; 2],
    ) -> Result<[EyeRenderDesc; 2]>;

    fn set_enabled_caps(&mut self, caps: HmdCaps);

    /// Switches the session into direct-access mode for `window`.
    fn attach_to_window(&mut self, window: &P::Window) -> Result<()>;

    fn begin_frame(&mut self, frame_index: u32) -> Result<()>;

    /// Pose of each eye right now, `hmd_to_eye_offset` applied to the tracked head pose.
    fn eye_poses(&mut self, frame_index: u32, hmd_to_eye_offset: [Vec3; 2])
    -> Result<[Pose; 2]>;

    /// Distorts the eye images onto the panel and presents the swap chain.
    fn end_frame(
        &mut self,
        poses: &[Pose; 2],
        eye_textures: &dyn EyeBufferProvider<P::Gpu>,
    ) -> Result<()>;

    /// Makes the current head pose the new tracking origin.
    fn recenter_pose(&mut self) -> Result<()>;

    /// Hides the health and safety warning if it is still showing.
    fn dismiss_health_warning(&mut self) -> Result<()>;

    /// Set once the runtime wants the application to stop rendering and exit.
    fn exit_requested(&self) -> bool {
        false
    }
}
