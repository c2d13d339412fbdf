use super::clip::{AnimationClip, KeyframeTrack};

/// Joint-name prefix used by Mixamo rigs (`mixamorigHips`, `mixamorigSpine`, ...)
pub const MIXAMO_PREFIX: &str = "mixamorig";

/// Rename every track of `clip` so it addresses the target skeleton's joints.
///
/// Only a leading `prefix` is removed; tracks without it pass through.
/// Keyframe times, values and interpolation are copied as-is.
pub fn retarget(clip: &AnimationClip, prefix: &str) -> AnimationClip {
    let tracks = clip
        .tracks
        .iter()
        .map(|track| {
            let name = track.name.strip_prefix(prefix).unwrap_or(&track.name);
            KeyframeTrack::new(
                name,
                track.times.clone(),
                track.values.clone(),
                track.interpolation,
            )
        })
        .collect();

    AnimationClip {
        name: clip.name.clone(),
        duration: clip.duration,
        tracks,
    }
}
