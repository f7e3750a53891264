//! Bootstrap, setup, frame loop and teardown, in that order.

use crate::config::DemoConfig;
use crate::error::{Error, Result};
use crate::frame::FrameContext;
use crate::geometry::RenderTargetGeometry;
use crate::gpu::{Platform, SwapChainDesc};
use crate::hmd::{Eye, HmdRuntime, HmdSession, RenderConfig};
use crate::scene::SceneResources;
use crate::targets::{COLOR_FORMAT, RenderTargets};

pub const NO_HMD_TITLE: &str = "LibOVR error";
pub const NO_HMD_MESSAGE: &str =
    "Failed initializing HMD, make sure it is connected and turned on.";

/// What a completed run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
}

/// Runs the whole demo.
///
/// The runtime is initialized before anything touches the graphics device and shut down
/// last, after every resource and the session itself have been released, whether the run
/// ends normally or through an error.
pub fn run<P, R>(platform: &P, runtime: &mut R, config: &DemoConfig) -> Result<RunSummary>
where
    P: Platform,
    R: HmdRuntime<P>,
{
    runtime.initialize()?;
    let result = run_session(platform, runtime, config);
    runtime.shutdown();
    result
}

fn run_session<P, R>(platform: &P, runtime: &mut R, config: &DemoConfig) -> Result<RunSummary>
where
    P: Platform,
    R: HmdRuntime<P>,
{
    let Some(mut session) = runtime.create_hmd(0)? else {
        // Forgetting to turn the headset on is common enough to deserve a dialog.
        log::error!("{NO_HMD_MESSAGE}");
        platform.show_fatal_error(NO_HMD_TITLE, NO_HMD_MESSAGE);
        return Err(Error::NoDevice);
    };
    log::info!(
        "opened {} ({}x{})",
        session.info().product_name,
        session.info().resolution.width,
        session.info().resolution.height
    );

    session.configure_tracking(config.supported_tracking, config.required_tracking)?;

    // Both eyes share one texture; size it to hold the two recommended eye buffers.
    let eye_fov = session.info().default_eye_fov;
    let [left, right] = Eye::BOTH.map(|eye| {
        session.fov_texture_size(eye, eye_fov[eye.index()], config.pixels_per_display_pixel)
    });
    let geometry = RenderTargetGeometry::from_eye_sizes(left, right);
    debug_assert!(geometry.is_valid(), "{geometry:?}");
    log::info!(
        "eye buffer {}x{}, viewports {:?}",
        geometry.size.width,
        geometry.size.height,
        geometry.viewports
    );

    let window = platform.create_window(&config.window)?;
    let resolution = session.info().resolution;
    let fullscreen = config.fullscreen && !session.info().compositor_presents;
    let gpu = platform.create_gpu(
        &window,
        &SwapChainDesc {
            size: resolution,
            format: COLOR_FORMAT,
            buffer_count: 1,
            sample_count: config.multisample_count,
            fullscreen,
            feature_levels: config.feature_levels.clone(),
            debug_device: config.debug_device,
        },
    )?;
    let targets = RenderTargets::create(&gpu, geometry, config.multisample_count)?;

    let eye_render_desc = session.configure_rendering(
        RenderConfig {
            gpu: &gpu,
            back_buffer: &targets.back_buffer,
            size: resolution,
            eye_buffer_size: geometry.size,
            multisample_count: config.multisample_count,
        },
        config.distortion_caps,
        eye_fov,
    )?;
    session.set_enabled_caps(config.hmd_caps);
    session.attach_to_window(&window)?;

    let scene = SceneResources::create(&gpu)?;

    let frames = FrameContext {
        platform,
        session: &mut session,
        gpu: &gpu,
        targets: &targets,
        scene: &scene,
        eye_render_desc,
        config,
    }
    .run()?;

    teardown(scene, targets, gpu, session);
    Ok(RunSummary { frames })
}

/// Releases in reverse creation order: scene, render targets, device, then the session.
fn teardown<G, S>(scene: SceneResources<G>, targets: RenderTargets<G>, gpu: G, session: S)
where
    G: crate::gpu::Gpu,
{
    scene.release();
    targets.release();
    drop(gpu);
    drop(session);
    log::debug!("all resources released");
}
