//! [`HmdRuntime`] on top of OpenXR with the `XR_KHR_D3D11_enable` extension.
//!
//! OpenXR has no separate "configure rendering" step; the session is only created once the
//! Direct3D device exists, so [`OpenXrSession`] starts out holding just the instance and
//! system and opens the real session in [`HmdSession::configure_rendering`]. The eye buffer
//! is copied into a swapchain image each frame and submitted as one projection layer, the
//! runtime's compositor then takes care of distortion and presentation.

use std::ffi::c_void;
use std::thread;
use std::time::Duration;

use glam::{EulerRot, Quat, Vec3};
use openxr as xr;
use windows::{
    Win32::Graphics::Direct3D11::*, Win32::Graphics::Dxgi::Common::*, core::Interface,
};

use crate::error::{Error, Result};
use crate::geometry::{Recti, Sizei};
use crate::hmd::{
    DistortionCaps, Eye, EyeBufferProvider, EyeRenderDesc, HmdCaps, HmdInfo, HmdRuntime,
    HmdSession, RenderConfig, TrackingCaps,
};
use crate::math::{FovPort, Pose};
use crate::win32::{Win32Platform, Win32Window};

const API: &str = "OpenXR";
const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;
const APPLICATION_NAME: &str = "simple-hmd-d3d11";

/// Field of view the eyes are rendered with. Roughly 90 degrees in each direction.
pub const DEFAULT_EYE_FOV: FovPort = FovPort::symmetric(1.0);

/// Swapchain formats in order of preference. The eye buffer is UNORM, so a UNORM image can
/// be copied into without any conversion.
const SWAPCHAIN_FORMATS: [DXGI_FORMAT; 2] =
    [DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_R8G8B8A8_UNORM_SRGB];

/// How long to wait for the session to become ready before polling again.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn xr_error(err: xr::sys::Result) -> Error {
    Error::backend(API, err)
}

/// Results that mean no headset can be used right now, as opposed to a broken runtime.
fn headset_unavailable(err: xr::sys::Result) -> bool {
    matches!(
        err,
        xr::sys::Result::ERROR_RUNTIME_UNAVAILABLE
            | xr::sys::Result::ERROR_RUNTIME_FAILURE
            | xr::sys::Result::ERROR_FORM_FACTOR_UNAVAILABLE
            | xr::sys::Result::ERROR_FORM_FACTOR_UNSUPPORTED
    )
}

#[derive(Default)]
pub struct OpenXrRuntime {
    entry: Option<xr::Entry>,
}

impl HmdRuntime<Win32Platform> for OpenXrRuntime {
    type Session = OpenXrSession;

    fn initialize(&mut self) -> Result<()> {
        #[cfg(feature = "static")]
        let entry = xr::Entry::linked();
        #[cfg(not(feature = "static"))]
        let entry = unsafe { xr::Entry::load() }.map_err(|e| Error::backend(API, e))?;

        self.entry = Some(entry);
        log::debug!("OpenXR loader ready");
        Ok(())
    }

    fn create_hmd(&mut self, index: u32) -> Result<Option<OpenXrSession>> {
        let entry = self.entry.as_ref().ok_or(Error::RuntimeNotInitialized)?;
        // OpenXR exposes at most one head-mounted system per instance.
        if index != 0 {
            return Ok(None);
        }

        let available_extensions = entry.enumerate_extensions().map_err(xr_error)?;
        if !available_extensions.khr_d3d11_enable {
            log::warn!("the OpenXR runtime does not support Direct3D 11");
            return Ok(None);
        }

        let mut enabled_extensions = xr::ExtensionSet::default();
        enabled_extensions.khr_d3d11_enable = true;

        let app_info = xr::ApplicationInfo {
            application_name: APPLICATION_NAME,
            application_version: 0,
            engine_name: APPLICATION_NAME,
            engine_version: 0,
            api_version: xr::Version::new(1, 0, 0),
        };
        let instance = match entry.create_instance(&app_info, &enabled_extensions, &[]) {
            Ok(instance) => instance,
            Err(err) if headset_unavailable(err) => {
                log::warn!("no OpenXR runtime available: {err}");
                return Ok(None);
            }
            Err(err) => return Err(xr_error(err)),
        };

        let instance_props = instance.properties().map_err(xr_error)?;
        log::info!(
            "loaded OpenXR runtime: {} {}",
            instance_props.runtime_name,
            instance_props.runtime_version
        );

        let system = match instance.system(xr::FormFactor::HEAD_MOUNTED_DISPLAY) {
            Ok(system) => system,
            Err(err) if headset_unavailable(err) => {
                log::warn!("no head-mounted display: {err}");
                return Ok(None);
            }
            Err(err) => return Err(xr_error(err)),
        };

        OpenXrSession::new(instance, system).map(Some)
    }

    fn shutdown(&mut self) {
        if self.entry.take().is_some() {
            log::debug!("OpenXR loader released");
        }
    }
}

/// The one swapchain the eye buffer is copied into.
// Images are borrowed from the swapchain and must be released first.
struct EyeSwapchain {
    images: Vec<ID3D11Texture2D>,
    handle: xr::Swapchain<xr::D3D11>,
}

impl EyeSwapchain {
    fn create(session: &xr::Session<xr::D3D11>, size: Sizei, max_size: Sizei) -> Result<Self> {
        check_swapchain_size(size, max_size)?;
        let offered = session.enumerate_swapchain_formats().map_err(xr_error)?;
        let format = SWAPCHAIN_FORMATS
            .iter()
            .map(|format| format.0 as u32)
            .find(|format| offered.contains(format))
            .ok_or_else(|| Error::runtime("no RGBA8 swapchain format offered"))?;

        let handle = session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                    | xr::SwapchainUsageFlags::TRANSFER_DST,
                format,
                sample_count: 1,
                width: size.width,
                height: size.height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .map_err(xr_error)?;

        let images = handle
            .enumerate_images()
            .map_err(xr_error)?
            .into_iter()
            .map(|image| {
                let raw = image as *mut c_void;
                unsafe { ID3D11Texture2D::from_raw_borrowed(&raw) }
                    .cloned()
                    .ok_or_else(|| Error::runtime("swapchain returned a null image"))
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "created {}x{} swapchain with {} images (format {format})",
            size.width,
            size.height,
            images.len()
        );
        Ok(Self { images, handle })
    }
}

/// State that only exists once rendering is configured.
// Fields drop in declaration order, the session itself last.
struct GraphicsSession {
    swapchain: EyeSwapchain,
    view: xr::Space,
    local: xr::Space,
    frame_stream: xr::FrameStream<xr::D3D11>,
    frame_waiter: xr::FrameWaiter,
    session: xr::Session<xr::D3D11>,
    context: ID3D11DeviceContext,
}

pub struct OpenXrSession {
    graphics: Option<GraphicsSession>,
    info: HmdInfo,
    recommended: [Sizei; 2],
    max_swapchain_size: Sizei,
    orientation_tracking: bool,
    position_tracking: bool,
    blend_mode: xr::EnvironmentBlendMode,
    eye_fov: [FovPort; 2],
    /// Origin of the LOCAL space in use, relative to the runtime's own LOCAL origin.
    origin: Pose,
    running: bool,
    exit_requested: bool,
    frame_state: Option<xr::FrameState>,
    last_display_time: Option<xr::Time>,
    last_poses: [Pose; 2],
    event_storage: xr::EventDataBuffer,
    system: xr::SystemId,
    instance: xr::Instance,
}

impl OpenXrSession {
    fn new(instance: xr::Instance, system: xr::SystemId) -> Result<Self> {
        let properties = instance.system_properties(system).map_err(xr_error)?;

        let views = instance
            .enumerate_view_configuration_views(system, VIEW_TYPE)
            .map_err(xr_error)?;
        let [left, right] = views.as_slice() else {
            return Err(Error::runtime(format!(
                "expected a stereo view configuration, got {} views",
                views.len()
            )));
        };
        let recommended = [left, right].map(|view| {
            Sizei::new(
                view.recommended_image_rect_width,
                view.recommended_image_rect_height,
            )
        });

        let blend_mode = instance
            .enumerate_environment_blend_modes(system, VIEW_TYPE)
            .map_err(xr_error)?
            .first()
            .copied()
            .ok_or_else(|| Error::runtime("no environment blend mode"))?;

        let graphics = &properties.graphics_properties;
        let max_swapchain_size = Sizei::new(
            graphics.max_swapchain_image_width,
            graphics.max_swapchain_image_height,
        );

        let tracking = &properties.tracking_properties;
        let orientation_tracking: bool = tracking.orientation_tracking.into();
        let position_tracking: bool = tracking.position_tracking.into();

        let info = HmdInfo {
            product_name: properties.system_name.clone(),
            resolution: panel_resolution(recommended),
            default_eye_fov: [DEFAULT_EYE_FOV; 2],
            eye_render_order: Eye::BOTH,
            compositor_presents: true,
        };

        Ok(Self {
            graphics: None,
            info,
            recommended,
            max_swapchain_size,
            orientation_tracking,
            position_tracking,
            blend_mode,
            eye_fov: [DEFAULT_EYE_FOV; 2],
            origin: Pose::IDENTITY,
            running: false,
            exit_requested: false,
            frame_state: None,
            last_display_time: None,
            last_poses: [Pose::IDENTITY; 2],
            event_storage: xr::EventDataBuffer::new(),
            system,
            instance,
        })
    }

    fn graphics(&mut self) -> Result<&mut GraphicsSession> {
        self.graphics
            .as_mut()
            .ok_or_else(|| Error::runtime("rendering has not been configured"))
    }

    fn poll_events(&mut self) -> Result<()> {
        loop {
            let state = match self
                .instance
                .poll_event(&mut self.event_storage)
                .map_err(xr_error)?
            {
                None => return Ok(()),
                Some(xr::Event::SessionStateChanged(e)) => e.state(),
                Some(xr::Event::InstanceLossPending(_)) => {
                    self.exit_requested = true;
                    continue;
                }
                Some(xr::Event::EventsLost(e)) => {
                    log::warn!("lost {} events", e.lost_event_count());
                    continue;
                }
                Some(_) => continue,
            };
            self.on_state_changed(state)?;
        }
    }

    fn on_state_changed(&mut self, state: xr::SessionState) -> Result<()> {
        log::info!("entered state {state:?}");
        let Some(graphics) = &self.graphics else {
            return Ok(());
        };

        match state {
            xr::SessionState::READY => {
                graphics.session.begin(VIEW_TYPE).map_err(xr_error)?;
                self.running = true;
            }
            xr::SessionState::STOPPING => {
                graphics.session.end().map_err(xr_error)?;
                self.running = false;
            }
            xr::SessionState::EXITING | xr::SessionState::LOSS_PENDING => {
                self.running = false;
                self.exit_requested = true;
            }
            _ => {}
        }
        Ok(())
    }
}

impl HmdSession<Win32Platform> for OpenXrSession {
    fn info(&self) -> &HmdInfo {
        &self.info
    }

    fn configure_tracking(&mut self, supported: TrackingCaps, required: TrackingCaps) -> Result<()> {
        let mut available = TrackingCaps::empty();
        if self.orientation_tracking {
            available |= TrackingCaps::ORIENTATION | TrackingCaps::MAG_YAW_CORRECTION;
        }
        if self.position_tracking {
            available |= TrackingCaps::POSITION;
        }

        if !available.contains(required) {
            return Err(Error::runtime(format!(
                "required tracking {:?} not available",
                required - available
            )));
        }
        log::info!("tracking {:?}", supported & available);
        Ok(())
    }

    fn fov_texture_size(&self, eye: Eye, _fov: FovPort, pixels_per_display_pixel: f32) -> Sizei {
        scaled_size(self.recommended[eye.index()], pixels_per_display_pixel)
    }

    fn configure_rendering(
        &mut self,
        config: RenderConfig<'_, crate::d3d11::D3D11Gpu>,
        caps: DistortionCaps,
        eye_fov: [FovPort; 2],
    ) -> Result<[EyeRenderDesc; 2]> {
        let requirements = self
            .instance
            .graphics_requirements::<xr::D3D11>(self.system)
            .map_err(xr_error)?;
        log::info!(
            "D3D11 min feature level: {:?}",
            requirements.min_feature_level
        );

        let (session, frame_waiter, frame_stream) = unsafe {
            self.instance
                .create_session::<xr::D3D11>(
                    self.system,
                    &xr::d3d::SessionCreateInfoD3D11 {
                        device: config.gpu.device().as_raw() as *mut _,
                    },
                )
                .map_err(xr_error)?
        };

        let local = session
            .create_reference_space(xr::ReferenceSpaceType::LOCAL, xr::Posef::IDENTITY)
            .map_err(xr_error)?;
        let view = session
            .create_reference_space(xr::ReferenceSpaceType::VIEW, xr::Posef::IDENTITY)
            .map_err(xr_error)?;
        let swapchain = EyeSwapchain::create(&session, config.eye_buffer_size, self.max_swapchain_size)?;

        // Distortion, chromatic correction and timewarp are the compositor's business.
        log::debug!(
            "compositor handles {caps:?}, {} samples resolved before submission",
            config.multisample_count
        );

        self.graphics = Some(GraphicsSession {
            swapchain,
            view,
            local,
            frame_stream,
            frame_waiter,
            session,
            context: config.gpu.context().clone(),
        });
        self.eye_fov = eye_fov;

        Ok(Eye::BOTH.map(|eye| EyeRenderDesc {
            fov: eye_fov[eye.index()],
            // Located views already are eye poses.
            hmd_to_eye_offset: Vec3::ZERO,
        }))
    }

    fn set_enabled_caps(&mut self, caps: HmdCaps) {
        log::debug!("display caps {caps:?} are managed by the runtime");
    }

    fn attach_to_window(&mut self, _window: &Win32Window) -> Result<()> {
        log::debug!("the compositor presents directly; the window is not used");
        Ok(())
    }

    fn begin_frame(&mut self, _frame_index: u32) -> Result<()> {
        self.poll_events()?;
        if !self.running {
            self.frame_state = None;
            thread::sleep(IDLE_POLL_INTERVAL);
            return Ok(());
        }

        let graphics = self.graphics()?;
        let state = graphics.frame_waiter.wait().map_err(xr_error)?;
        graphics.frame_stream.begin().map_err(xr_error)?;

        self.last_display_time = Some(state.predicted_display_time);
        self.frame_state = Some(state);
        Ok(())
    }

    fn eye_poses(&mut self, _frame_index: u32, hmd_to_eye_offset: [Vec3; 2]) -> Result<[Pose; 2]> {
        let (Some(graphics), Some(state)) = (&self.graphics, &self.frame_state) else {
            return Ok(self.last_poses);
        };

        let (flags, views) = graphics
            .session
            .locate_views(VIEW_TYPE, state.predicted_display_time, &graphics.local)
            .map_err(xr_error)?;
        if !flags.contains(xr::ViewStateFlags::ORIENTATION_VALID) {
            return Ok(self.last_poses);
        }
        let [left, right] = views.as_slice() else {
            return Err(Error::runtime(format!("located {} views", views.len())));
        };

        let poses = [left, right].map(|view| pose_from_xr(&view.pose));
        self.last_poses = Eye::BOTH.map(|eye| {
            poses[eye.index()].offset_local(hmd_to_eye_offset[eye.index()])
        });
        Ok(self.last_poses)
    }

    fn end_frame(
        &mut self,
        poses: &[Pose; 2],
        eye_textures: &dyn EyeBufferProvider<crate::d3d11::D3D11Gpu>,
    ) -> Result<()> {
        let Some(state) = self.frame_state.take() else {
            return Ok(());
        };
        let (blend_mode, eye_fov) = (self.blend_mode, self.eye_fov);
        let graphics = self.graphics()?;

        if !state.should_render {
            graphics
                .frame_stream
                .end(state.predicted_display_time, blend_mode, &[])
                .map_err(xr_error)?;
            return Ok(());
        }

        let swapchain = &mut graphics.swapchain;
        let image_index = swapchain.handle.acquire_image().map_err(xr_error)?;
        swapchain
            .handle
            .wait_image(xr::Duration::INFINITE)
            .map_err(xr_error)?;

        let image = swapchain
            .images
            .get(image_index as usize)
            .ok_or_else(|| Error::runtime(format!("swapchain image {image_index} out of range")))?;
        // Both eyes live in the same texture.
        let source = eye_textures.eye_texture(Eye::Left);
        unsafe {
            graphics.context.CopyResource(image, source.texture);
        }
        swapchain.handle.release_image().map_err(xr_error)?;

        let views = Eye::BOTH.map(|eye| {
            let texture = eye_textures.eye_texture(eye);
            xr::CompositionLayerProjectionView::new()
                .pose(posef(&poses[eye.index()]))
                .fov(fovf(&eye_fov[eye.index()]))
                .sub_image(
                    xr::SwapchainSubImage::new()
                        .swapchain(&swapchain.handle)
                        .image_array_index(0)
                        .image_rect(rect(texture.viewport)),
                )
        });

        graphics
            .frame_stream
            .end(
                state.predicted_display_time,
                blend_mode,
                &[&xr::CompositionLayerProjection::new()
                    .space(&graphics.local)
                    .views(&views)],
            )
            .map_err(xr_error)
    }

    fn recenter_pose(&mut self) -> Result<()> {
        let (Some(graphics), Some(time)) = (&mut self.graphics, self.last_display_time) else {
            log::debug!("recenter ignored: no frame has been displayed yet");
            return Ok(());
        };

        let location = graphics
            .view
            .locate(&graphics.local, time)
            .map_err(xr_error)?;
        if !location
            .location_flags
            .contains(xr::SpaceLocationFlags::ORIENTATION_VALID)
        {
            log::debug!("recenter ignored: head pose not tracked");
            return Ok(());
        }

        let origin = self.origin.compose(&yaw_only(&pose_from_xr(&location.pose)));
        graphics.local = graphics
            .session
            .create_reference_space(xr::ReferenceSpaceType::LOCAL, posef(&origin))
            .map_err(xr_error)?;
        self.origin = origin;
        log::info!("recentered at {:?}", origin.translation);
        Ok(())
    }

    fn dismiss_health_warning(&mut self) -> Result<()> {
        log::debug!("no health warning to dismiss");
        Ok(())
    }

    fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}

/// The size a single window showing both eyes side by side would need.
fn panel_resolution(recommended: [Sizei; 2]) -> Sizei {
    let [left, right] = recommended;
    Sizei::new(left.width + right.width, left.height.max(right.height))
}

fn check_swapchain_size(size: Sizei, max_size: Sizei) -> Result<()> {
    if size.width > max_size.width || size.height > max_size.height {
        return Err(Error::runtime(format!(
            "eye buffer {}x{} exceeds the runtime's {}x{} swapchain limit; lower the pixel density",
            size.width, size.height, max_size.width, max_size.height
        )));
    }
    Ok(())
}

fn scaled_size(size: Sizei, pixels_per_display_pixel: f32) -> Sizei {
    Sizei::new(
        (size.width as f32 * pixels_per_display_pixel).ceil() as u32,
        (size.height as f32 * pixels_per_display_pixel).ceil() as u32,
    )
}

/// Keeps the position and the rotation around the vertical axis, dropping pitch and roll.
fn yaw_only(pose: &Pose) -> Pose {
    let (yaw, _, _) = pose.rotation.to_euler(EulerRot::YXZ);
    Pose::new(Quat::from_rotation_y(yaw), pose.translation)
}

fn pose_from_xr(pose: &xr::Posef) -> Pose {
    let (o, p) = (&pose.orientation, &pose.position);
    Pose::new(Quat::from_xyzw(o.x, o.y, o.z, o.w), Vec3::new(p.x, p.y, p.z))
}

fn posef(pose: &Pose) -> xr::Posef {
    let (r, t) = (pose.rotation, pose.translation);
    xr::Posef {
        orientation: xr::Quaternionf {
            x: r.x,
            y: r.y,
            z: r.z,
            w: r.w,
        },
        position: xr::Vector3f {
            x: t.x,
            y: t.y,
            z: t.z,
        },
    }
}

/// Tangents to signed angles; left and down point in the negative direction.
fn fovf(fov: &FovPort) -> xr::Fovf {
    xr::Fovf {
        angle_left: -fov.left_tan.atan(),
        angle_right: fov.right_tan.atan(),
        angle_up: fov.up_tan.atan(),
        angle_down: -fov.down_tan.atan(),
    }
}

fn rect(viewport: Recti) -> xr::Rect2Di {
    xr::Rect2Di {
        offset: xr::Offset2Di {
            x: viewport.x as i32,
            y: viewport.y as i32,
        },
        extent: xr::Extent2Di {
            width: viewport.size.width as i32,
            height: viewport.size.height as i32,
        },
    }
}
