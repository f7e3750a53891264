//! Fixed settings of the demo. Nothing here is read from the command line, the environment
//! or a file.

use glam::Vec3;

use crate::geometry::Sizei;
use crate::gpu::{FeatureLevel, WindowDesc};
use crate::hmd::{DistortionCaps, HmdCaps, TrackingCaps};
use crate::math::BodyPose;

/// Rendered pixels per display pixel. Lower values trade sharpness for speed.
pub const PIXELS_PER_DISPLAY_PIXEL: f32 = 1.0;

/// Set to 1 to disable multisampling.
pub const MULTISAMPLE_COUNT: u32 = 4;

pub const BODY_POSITION: Vec3 = Vec3::new(0.5, 0.5, 0.0);
pub const BODY_YAW: f32 = 0.9;

pub const CLEAR_COLOR: [f32; 4] = [0.2, 0.3, 0.2, 1.0];
pub const NEAR_Z: f32 = 0.01;
pub const FAR_Z: f32 = 10000.0;

pub const WINDOW_CLASS: &str = "SimpleOVR_D3D11";
pub const WINDOW_TITLE: &str = "SimpleOVR - D3D11";

/// Only Direct3D 10.1 class hardware is required.
pub const FEATURE_LEVELS: [FeatureLevel; 2] = [FeatureLevel::Level11_0, FeatureLevel::Level10_1];

#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub pixels_per_display_pixel: f32,
    pub multisample_count: u32,
    pub body: BodyPose,
    pub clear_color: [f32; 4],
    pub near_z: f32,
    pub far_z: f32,
    /// The window is decorative; rendering resolution comes from the headset.
    pub window: WindowDesc,
    pub feature_levels: Vec<FeatureLevel>,
    pub fullscreen: bool,
    pub debug_device: bool,
    pub supported_tracking: TrackingCaps,
    pub required_tracking: TrackingCaps,
    pub distortion_caps: DistortionCaps,
    pub hmd_caps: HmdCaps,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pixels_per_display_pixel: PIXELS_PER_DISPLAY_PIXEL,
            multisample_count: MULTISAMPLE_COUNT,
            body: BodyPose {
                position: BODY_POSITION,
                yaw: BODY_YAW,
            },
            clear_color: CLEAR_COLOR,
            near_z: NEAR_Z,
            far_z: FAR_Z,
            window: WindowDesc {
                class_name: WINDOW_CLASS.to_owned(),
                title: WINDOW_TITLE.to_owned(),
                size: Sizei::new(1280, 720),
            },
            feature_levels: FEATURE_LEVELS.to_vec(),
            fullscreen: true,
            debug_device: cfg!(debug_assertions),
            supported_tracking: TrackingCaps::ORIENTATION | TrackingCaps::POSITION,
            required_tracking: TrackingCaps::empty(),
            distortion_caps: DistortionCaps::CHROMATIC
                | DistortionCaps::TIME_WARP
                | DistortionCaps::OVERDRIVE
                | DistortionCaps::VIGNETTE,
            hmd_caps: HmdCaps::LOW_PERSISTENCE
                | HmdCaps::DYNAMIC_PREDICTION
                | HmdCaps::NO_MIRROR_TO_WINDOW,
        }
    }
}

impl DemoConfig {
    pub fn is_multisampled(&self) -> bool {
        self.multisample_count > 1
    }
}
