use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How values between two keyframes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Discrete,
    #[default]
    Linear,
    /// Eased between keys (smoothstep on the segment parameter)
    Smooth,
}

/// One animated property of one joint, e.g. `Hips.position`.
///
/// `values` is flat: each keyframe contributes `value_size()` consecutive
/// floats (3 for position/scale, 4 for quaternion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeTrack {
    pub name: String,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl KeyframeTrack {
    pub fn new(
        name: impl Into<String>,
        times: Vec<f32>,
        values: Vec<f32>,
        interpolation: Interpolation,
    ) -> Self {
        Self {
            name: name.into(),
            times,
            values,
            interpolation,
        }
    }

    /// Joint part of the target path (`Hips` for `Hips.position`)
    pub fn joint(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Property part of the target path (`position` for `Hips.position`)
    pub fn property(&self) -> Option<&str> {
        self.name.split_once('.').map(|(_, prop)| prop)
    }

    pub fn value_size(&self) -> usize {
        if self.times.is_empty() {
            0
        } else {
            self.values.len() / self.times.len()
        }
    }

    pub fn is_quaternion(&self) -> bool {
        self.property() == Some("quaternion")
    }

    fn frame(&self, index: usize) -> &[f32] {
        let size = self.value_size();
        &self.values[index * size..(index + 1) * size]
    }

    /// Sample the track at `time`, clamping outside the keyed range.
    pub fn sample(&self, time: f32) -> Vec<f32> {
        let last = match self.times.len() {
            0 => return Vec::new(),
            n => n - 1,
        };

        if time <= self.times[0] {
            return self.frame(0).to_vec();
        }
        if time >= self.times[last] {
            return self.frame(last).to_vec();
        }

        // First key strictly after `time`; guaranteed in 1..=last here
        let next = self.times.partition_point(|&t| t <= time);
        let prev = next - 1;

        if self.interpolation == Interpolation::Discrete {
            return self.frame(prev).to_vec();
        }

        let span = self.times[next] - self.times[prev];
        let mut alpha = if span > 0.0 {
            (time - self.times[prev]) / span
        } else {
            0.0
        };
        if self.interpolation == Interpolation::Smooth {
            alpha = alpha * alpha * (3.0 - 2.0 * alpha);
        }

        let mut out: Vec<f32> = self
            .frame(prev)
            .iter()
            .zip(self.frame(next))
            .map(|(a, b)| a + (b - a) * alpha)
            .collect();

        if self.is_quaternion() {
            normalize(&mut out);
        }
        out
    }
}

pub(crate) fn normalize(values: &mut [f32]) {
    let len = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if len > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= len;
        }
    }
}

/// A named animation sequence made of per-joint keyframe tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<KeyframeTrack>,
}

/// On-disk clip layout (JSON export of an authored animation).
#[derive(Debug, Deserialize)]
struct ClipFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    duration: Option<f32>,
    tracks: Vec<KeyframeTrack>,
}

impl AnimationClip {
    /// Build a clip whose duration is the last keyframe time over all tracks.
    pub fn new(name: impl Into<String>, tracks: Vec<KeyframeTrack>) -> Self {
        let duration = tracks
            .iter()
            .filter_map(|t| t.times.last().copied())
            .fold(0.0f32, f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ClipFile = serde_json::from_str(contents)?;

        for track in &file.tracks {
            if !track.times.is_empty() && track.values.len() % track.times.len() != 0 {
                return Err(Error::Asset(format!(
                    "track '{}' has {} values for {} keyframes",
                    track.name,
                    track.values.len(),
                    track.times.len()
                )));
            }
            if track.times.windows(2).any(|w| w[1] < w[0]) {
                return Err(Error::Asset(format!(
                    "track '{}' keyframe times are not ordered",
                    track.name
                )));
            }
        }

        let mut clip = AnimationClip::new(file.name.unwrap_or_default(), file.tracks);
        if let Some(duration) = file.duration {
            clip.duration = duration;
        }
        Ok(clip)
    }
}
