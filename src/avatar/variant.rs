use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::clip::AnimationClip;
use super::controller::{AnimationController, Pose, IDLE_CLIP, TALKING_CLIP};
use super::retarget::{retarget, MIXAMO_PREFIX};
use crate::error::{Error, Result};

/// Which teacher avatar is shown (and which pitch the voice uses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    /// Only the exact tag "female" selects the female teacher.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "female" {
            Gender::Female
        } else {
            Gender::Male
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// Asset bundle for one avatar: mesh plus the two authored clips.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarVariant {
    pub gender: Gender,
    pub mesh: PathBuf,
    pub idle_clip: PathBuf,
    pub talk_clip: PathBuf,
}

pub fn select(gender: Gender, asset_root: &Path) -> AvatarVariant {
    let g = gender.as_str();
    AvatarVariant {
        gender,
        mesh: asset_root.join("models").join(format!("teacher_{g}.json")),
        idle_clip: asset_root
            .join("animations")
            .join(format!("Idle_Standing_{g}.json")),
        talk_clip: asset_root
            .join("animations")
            .join(format!("Talking_Standing_{g}.json")),
    }
}

fn default_tint() -> [f32; 3] {
    [0.31, 0.45, 0.86]
}

/// Mesh bundle: the skeleton's joint names plus the colour the scene uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeshBundle {
    #[serde(default)]
    pub name: String,
    pub skeleton: Vec<String>,
    #[serde(default = "default_tint")]
    pub tint: [f32; 3],
}

impl MeshBundle {
    pub fn has_joint(&self, joint: &str) -> bool {
        self.skeleton.iter().any(|j| j == joint)
    }
}

/// Fully resolved avatar, ready to mount.
#[derive(Debug, Clone)]
pub struct LoadedAvatar {
    pub variant: AvatarVariant,
    pub mesh: MeshBundle,
    pub clips: Vec<AnimationClip>,
}

/// Names of the tracks whose joint does not exist on `mesh`.
pub fn inert_tracks<'a>(clip: &'a AnimationClip, mesh: &MeshBundle) -> Vec<&'a str> {
    clip.tracks
        .iter()
        .filter(|t| !mesh.has_joint(t.joint()))
        .map(|t| t.name.as_str())
        .collect()
}

async fn load_clip(path: &Path, name: &str) -> Result<AnimationClip> {
    let contents = tokio::fs::read_to_string(path).await?;
    let mut clip = retarget(&AnimationClip::from_json(&contents)?, MIXAMO_PREFIX);
    clip.name = name.to_string();
    Ok(clip)
}

/// Load the mesh and both clips of `variant`.
///
/// A clip that fails to load is left out (the controller reports it when it
/// is requested); a mesh failure fails the whole load.
pub async fn load(variant: AvatarVariant) -> Result<LoadedAvatar> {
    let mesh_json = tokio::fs::read_to_string(&variant.mesh)
        .await
        .map_err(|e| Error::Asset(format!("{}: {}", variant.mesh.display(), e)))?;
    let mesh: MeshBundle = serde_json::from_str(&mesh_json)?;

    let mut clips = Vec::with_capacity(2);
    for (path, name) in [
        (&variant.idle_clip, IDLE_CLIP),
        (&variant.talk_clip, TALKING_CLIP),
    ] {
        match load_clip(path, name).await {
            Ok(clip) => {
                let inert = inert_tracks(&clip, &mesh);
                if !inert.is_empty() {
                    log::warn!(
                        "{}: {} of {} tracks target joints missing from '{}' (first: {})",
                        name,
                        inert.len(),
                        clip.tracks.len(),
                        mesh.name,
                        inert[0]
                    );
                }
                clips.push(clip);
            }
            Err(e) => log::error!("Failed to load {} clip {}: {}", name, path.display(), e),
        }
    }

    log::info!(
        "Loaded {} avatar '{}' ({} joints, {} clips)",
        variant.gender.as_str(),
        mesh.name,
        mesh.skeleton.len(),
        clips.len()
    );

    Ok(LoadedAvatar {
        variant,
        mesh,
        clips,
    })
}

/// A mounted avatar and the controller animating it.
pub struct MountedAvatar {
    pub variant: AvatarVariant,
    pub mesh: MeshBundle,
    pub controller: AnimationController,
}

/// The avatar slot of the scene.
///
/// Shows a placeholder until the requested variant has loaded. Switching
/// variants unmounts the current avatar and bumps the generation so that a
/// late load for the old variant is ignored.
#[derive(Default)]
pub struct AvatarStage {
    generation: u64,
    requested: Option<AvatarVariant>,
    mounted: Option<MountedAvatar>,
}

impl AvatarStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `variant`. Returns the generation to tag the load with, or
    /// `None` if that variant is already requested.
    pub fn request(&mut self, variant: AvatarVariant) -> Option<u64> {
        if self.requested.as_ref() == Some(&variant) {
            return None;
        }

        if let Some(mut old) = self.mounted.take() {
            log::info!("Unmounting {} avatar", old.variant.gender.as_str());
            old.controller.teardown();
        }

        self.generation += 1;
        self.requested = Some(variant);
        Some(self.generation)
    }

    /// Mount a finished load. Stale generations are dropped; failures keep
    /// the placeholder. Returns true if an avatar was mounted.
    pub fn finish(&mut self, generation: u64, result: Result<LoadedAvatar>, speaking: bool) -> bool {
        if generation != self.generation {
            log::debug!("Dropping stale avatar load (generation {})", generation);
            return false;
        }

        match result {
            Ok(loaded) => {
                let mut controller = AnimationController::new(loaded.clips);
                controller.set_speaking(speaking);
                self.mounted = Some(MountedAvatar {
                    variant: loaded.variant,
                    mesh: loaded.mesh,
                    controller,
                });
                true
            }
            Err(e) => {
                log::error!("Avatar failed to load: {}", e);
                // Let the same teacher be asked for again
                self.requested = None;
                false
            }
        }
    }

    /// Generation of the latest request
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn requested(&self) -> Option<&AvatarVariant> {
        self.requested.as_ref()
    }

    pub fn mounted(&self) -> Option<&MountedAvatar> {
        self.mounted.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.mounted.is_none()
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        if let Some(avatar) = &mut self.mounted {
            avatar.controller.set_speaking(speaking);
        }
    }

    pub fn tick(&mut self, dt: f32) {
        if let Some(avatar) = &mut self.mounted {
            avatar.controller.tick(dt);
        }
    }

    pub fn pose(&self) -> Pose {
        self.mounted
            .as_ref()
            .map(|a| a.controller.pose())
            .unwrap_or_default()
    }
}
