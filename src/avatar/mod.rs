//! Teacher avatar: clip data, retargeting, the Idle/Talking controller and
//! the male/female variant bundles.

pub mod clip;
pub mod controller;
pub mod retarget;
pub mod variant;

pub use clip::{AnimationClip, Interpolation, KeyframeTrack};
pub use controller::{AnimationController, AnimationState, Pose};
pub use retarget::retarget;
pub use variant::{select, AvatarStage, AvatarVariant, Gender, LoadedAvatar};
