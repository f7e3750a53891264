//! The frame loop: drain window messages, render both eyes, hand the result to the
//! headset, repeat until asked to quit.

use glam::Vec3;

use crate::config::DemoConfig;
use crate::error::Result;
use crate::gpu::{Gpu, Platform, WindowMessage};
use crate::hmd::{EyeRenderDesc, HmdSession};
use crate::math;
use crate::scene::{SceneResources, TRIANGLE_VERTEX_COUNT};
use crate::targets::RenderTargets;

/// Only one frame is ever in flight.
pub const FRAME_INDEX: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Quitting,
}

/// Everything the loop reads or writes each iteration.
pub struct FrameContext<'a, P: Platform, S> {
    pub platform: &'a P,
    pub session: &'a mut S,
    pub gpu: &'a P::Gpu,
    pub targets: &'a RenderTargets<P::Gpu>,
    pub scene: &'a SceneResources<P::Gpu>,
    pub eye_render_desc: [EyeRenderDesc; 2],
    pub config: &'a DemoConfig,
}

impl<P: Platform, S: HmdSession<P>> FrameContext<'_, P, S> {
    /// Runs until a quit message arrives and returns the number of frames submitted.
    ///
    /// The frame during whose message drain the quit arrives is still rendered and
    /// submitted before the loop exits.
    pub fn run(&mut self) -> Result<u64> {
        let mut frames = 0;
        loop {
            let state = self.drain_messages()?;
            self.render_frame()?;
            frames += 1;

            if state == LoopState::Quitting {
                log::info!("quit requested after {frames} frames");
                return Ok(frames);
            }
        }
    }

    /// Empties the message queue without blocking.
    pub fn drain_messages(&mut self) -> Result<LoopState> {
        let mut state = LoopState::Running;
        while let Some(message) = self.platform.poll_message() {
            match message {
                WindowMessage::Quit => state = LoopState::Quitting,
                // Any key recenters and tries to get rid of the health warning.
                WindowMessage::KeyDown => {
                    self.session.recenter_pose()?;
                    self.session.dismiss_health_warning()?;
                }
                WindowMessage::Other => {}
            }
        }

        if self.session.exit_requested() {
            state = LoopState::Quitting;
        }
        Ok(state)
    }

    pub fn render_frame(&mut self) -> Result<()> {
        let (gpu, targets, scene, config) = (self.gpu, self.targets, self.scene, self.config);

        self.session.begin_frame(FRAME_INDEX)?;

        let offsets: [Vec3; 2] = self.eye_render_desc.map(|desc| desc.hmd_to_eye_offset);
        let poses = self.session.eye_poses(FRAME_INDEX, offsets)?;

        gpu.clear_render_target(&targets.eye.render_target, config.clear_color);
        gpu.clear_depth_stencil(&targets.depth.view, 1.0, 0);
        gpu.set_render_target(&targets.eye.render_target, &targets.depth.view);

        let render_order = self.session.info().eye_render_order;
        for eye in render_order {
            gpu.set_viewport(targets.geometry.viewport(eye));

            let transform = math::eye_transform(
                &config.body,
                &poses[eye.index()],
                &self.eye_render_desc[eye.index()].fov,
                config.near_z,
                config.far_z,
            );
            scene.upload_transform(gpu, &transform)?;
            gpu.draw(TRIANGLE_VERTEX_COUNT, 0);
        }

        targets.resolve(gpu);

        log::trace!("submitting frame");
        self.session.end_frame(&poses, targets)
    }
}
