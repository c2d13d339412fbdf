use std::collections::HashMap;

use super::clip::{normalize, AnimationClip};

/// Cross-fade window for every Idle <-> Talking transition, in seconds
pub const CROSSFADE_SECONDS: f32 = 0.5;

pub const IDLE_CLIP: &str = "Idle";
pub const TALKING_CLIP: &str = "Talking";

/// Which clip the avatar is heading towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Talking,
}

impl AnimationState {
    pub fn from_speaking(speaking: bool) -> Self {
        if speaking {
            AnimationState::Talking
        } else {
            AnimationState::Idle
        }
    }

    pub fn clip_name(&self) -> &'static str {
        match self {
            AnimationState::Idle => IDLE_CLIP,
            AnimationState::Talking => TALKING_CLIP,
        }
    }
}

/// Linear weight ramp
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fade {
    from: f32,
    to: f32,
    elapsed: f32,
    duration: f32,
}

impl Fade {
    fn new(from: f32, to: f32, duration: f32) -> Self {
        Self {
            from,
            to,
            elapsed: 0.0,
            duration,
        }
    }

    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    fn weight(&self) -> f32 {
        self.from + (self.to - self.from) * self.progress()
    }

    fn finished(&self) -> bool {
        self.progress() >= 1.0
    }
}

/// Playback state of one clip (time, blend weight, fade in flight).
#[derive(Debug, Clone)]
struct Action {
    clip: AnimationClip,
    time: f32,
    weight: f32,
    playing: bool,
    fade: Option<Fade>,
}

impl Action {
    fn new(clip: AnimationClip) -> Self {
        Self {
            clip,
            time: 0.0,
            weight: 0.0,
            playing: false,
            fade: None,
        }
    }

    fn stop_and_reset(&mut self) {
        self.playing = false;
        self.time = 0.0;
        self.weight = 0.0;
        self.fade = None;
    }

    /// Restart from time zero, looping, ramping weight 0 -> 1.
    fn play_fade_in(&mut self, duration: f32) {
        self.time = 0.0;
        self.playing = true;
        if duration <= 0.0 {
            self.weight = 1.0;
            self.fade = None;
        } else {
            self.weight = 0.0;
            self.fade = Some(Fade::new(0.0, 1.0, duration));
        }
    }

    fn fade_out(&mut self, duration: f32) {
        if !self.playing {
            return;
        }
        self.fade = Some(Fade::new(self.weight, 0.0, duration));
    }

    fn advance(&mut self, dt: f32) {
        if !self.playing {
            return;
        }

        self.time += dt;
        self.time = if self.clip.duration > 0.0 {
            self.time.rem_euclid(self.clip.duration)
        } else {
            0.0
        };

        if let Some(mut fade) = self.fade {
            fade.elapsed += dt;
            self.weight = fade.weight();
            if fade.finished() {
                self.fade = None;
                if self.weight <= 0.0 {
                    self.stop_and_reset();
                }
            } else {
                self.fade = Some(fade);
            }
        }
    }
}

/// Blended joint values keyed by track path (`Head.quaternion`, ...)
pub type Pose = HashMap<String, Vec<f32>>;

/// Drives the Idle/Talking clips of one mounted avatar from the speaking flag.
///
/// Lives exactly as long as the mounted avatar. Weight interpolation is
/// advanced by `tick`, once per rendered frame.
pub struct AnimationController {
    actions: Vec<Action>,
    state: AnimationState,
    speaking: bool,
    active: Option<usize>,
}

impl AnimationController {
    /// Mount with the resolved clips; Idle starts immediately at full weight.
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        log::debug!(
            "Available clips: {:?}",
            clips.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );

        let mut controller = Self {
            actions: clips.into_iter().map(Action::new).collect(),
            state: AnimationState::Idle,
            speaking: false,
            active: None,
        };

        match controller.index_of(IDLE_CLIP) {
            Some(idx) => {
                controller.actions[idx].play_fade_in(0.0);
                controller.active = Some(idx);
            }
            None => log::warn!("Animation clip '{}' not found", IDLE_CLIP),
        }
        controller
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.clip.name == name)
    }

    /// Feed the speaking flag. Only a change of value starts a transition.
    /// Returns true if a cross-fade was started.
    pub fn set_speaking(&mut self, speaking: bool) -> bool {
        if speaking == self.speaking {
            return false;
        }
        self.speaking = speaking;

        let target = AnimationState::from_speaking(speaking);
        let Some(target_idx) = self.index_of(target.clip_name()) else {
            log::warn!(
                "Animation clip '{}' not found; staying in {:?}",
                target.clip_name(),
                self.state
            );
            return false;
        };

        if self.active == Some(target_idx) {
            self.state = target;
            return false;
        }

        log::debug!("Animation: {:?} -> {:?}", self.state, target);

        for (idx, action) in self.actions.iter_mut().enumerate() {
            if idx == target_idx {
                continue;
            }
            if Some(idx) == self.active {
                action.fade_out(CROSSFADE_SECONDS);
            } else {
                action.stop_and_reset();
            }
        }

        self.actions[target_idx].play_fade_in(CROSSFADE_SECONDS);
        self.active = Some(target_idx);
        self.state = target;
        true
    }

    /// Fade the active clip out ahead of unmounting. Best effort: the caller
    /// usually drops the controller right after.
    pub fn teardown(&mut self) {
        if let Some(idx) = self.active.take() {
            log::debug!("Fading out '{}' on unmount", self.actions[idx].clip.name);
            self.actions[idx].fade_out(CROSSFADE_SECONDS);
        }
    }

    /// Advance clip times and fade weights by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        for action in &mut self.actions {
            action.advance(dt);
        }
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn weight(&self, clip: &str) -> f32 {
        self.index_of(clip)
            .map(|idx| self.actions[idx].weight)
            .unwrap_or(0.0)
    }

    pub fn is_playing(&self, clip: &str) -> bool {
        self.index_of(clip)
            .map(|idx| self.actions[idx].playing)
            .unwrap_or(false)
    }

    /// Clips currently contributing to the pose
    pub fn weighted_clips(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.playing && a.weight > 0.0)
            .count()
    }

    pub fn is_crossfading(&self) -> bool {
        self.actions.iter().any(|a| a.fade.is_some())
    }

    /// Weighted blend of every contributing clip at its current time.
    pub fn pose(&self) -> Pose {
        let mut sums: HashMap<String, (Vec<f32>, f32)> = HashMap::new();

        for action in self.actions.iter().filter(|a| a.playing && a.weight > 0.0) {
            for track in &action.clip.tracks {
                let mut value = track.sample(action.time);
                let (acc, total) = sums
                    .entry(track.name.clone())
                    .or_insert_with(|| (vec![0.0; value.len()], 0.0));
                if acc.len() != value.len() {
                    continue;
                }

                // Keep quaternions in the same hemisphere before summing
                if track.is_quaternion() && *total > 0.0 {
                    let dot: f32 = acc.iter().zip(&value).map(|(a, b)| a * b).sum();
                    if dot < 0.0 {
                        value.iter_mut().for_each(|v| *v = -*v);
                    }
                }

                for (a, v) in acc.iter_mut().zip(&value) {
                    *a += v * action.weight;
                }
                *total += action.weight;
            }
        }

        sums.into_iter()
            .map(|(name, (mut values, total))| {
                if total > 0.0 {
                    values.iter_mut().for_each(|v| *v /= total);
                }
                if name.ends_with(".quaternion") {
                    normalize(&mut values);
                }
                (name, values)
            })
            .collect()
    }
}
