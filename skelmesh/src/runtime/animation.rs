use crate::{BonePoseSource, Skeleton, Transform};
use glam::{Quat, Vec3};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

/// Local transform keys of one bone. Empty channels leave the bone's current value alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneTrack {
    pub bone: usize,
    pub translation: Vec<Keyframe<Vec3>>,
    pub rotation: Vec<Keyframe<Quat>>,
    pub scale: Vec<Keyframe<Vec3>>,
}

impl BoneTrack {
    fn last_time(&self) -> f32 {
        let last = |t: Option<f32>| t.unwrap_or(0.0);
        last(self.translation.last().map(|k| k.time))
            .max(last(self.rotation.last().map(|k| k.time)))
            .max(last(self.scale.last().map(|k| k.time)))
    }
}

/// Sampled per-bone animation. Keys are sorted by time.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub tracks: Vec<BoneTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, tracks: Vec<BoneTrack>) -> Self {
        let duration = tracks
            .iter()
            .map(BoneTrack::last_time)
            .fold(0.0_f32, f32::max);
        Self {
            name: name.into(),
            duration,
            tracks,
        }
    }

    /// Local pose at `time`, starting from the skeleton's stored local transforms.
    pub fn sample(&self, skeleton: &Skeleton, time: f32) -> Vec<Transform> {
        let mut pose = skeleton.local_transforms();
        self.sample_into(time, &mut pose);
        pose
    }

    /// Overwrites the animated channels in `pose`. Times outside the keys clamp to the ends.
    pub fn sample_into(&self, time: f32, pose: &mut [Transform]) {
        for track in &self.tracks {
            let Some(local) = pose.get_mut(track.bone) else {
                continue;
            };
            if let Some(t) = sample_keys(&track.translation, time, Vec3::lerp) {
                local.translation = t;
            }
            if let Some(r) = sample_keys(&track.rotation, time, Quat::slerp) {
                local.rotation = r.normalize();
            }
            if let Some(s) = sample_keys(&track.scale, time, Vec3::lerp) {
                local.scale = s;
            }
        }
    }
}

fn sample_keys<T: Copy>(
    keys: &[Keyframe<T>],
    time: f32,
    interpolate: impl Fn(T, T, f32) -> T,
) -> Option<T> {
    let first = keys.first()?;
    let last = keys.last()?;
    if keys.len() == 1 || time <= first.time {
        return Some(first.value);
    }
    if time >= last.time {
        return Some(last.value);
    }
    let next = keys.partition_point(|k| k.time <= time);
    let (a, b) = (keys.get(next - 1)?, keys.get(next)?);
    let span = b.time - a.time;
    let alpha = if span > 0.0 { (time - a.time) / span } else { 0.0 };
    Some(interpolate(a.value, b.value, alpha))
}

/// Plays one clip on a component. No blending.
#[derive(Clone, Debug)]
pub struct ClipPlayer {
    clip: AnimationClip,
    time: f32,
    pub speed: f32,
    pub looping: bool,
}

impl ClipPlayer {
    pub fn new(clip: AnimationClip, looping: bool) -> Self {
        Self {
            clip,
            time: 0.0,
            speed: 1.0,
            looping,
        }
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = self.wrap(time);
    }

    fn wrap(&self, time: f32) -> f32 {
        let duration = self.clip.duration;
        if !time.is_finite() || duration <= 0.0 {
            return 0.0;
        }
        if self.looping {
            time.rem_euclid(duration)
        } else {
            time.clamp(0.0, duration)
        }
    }
}

impl BonePoseSource for ClipPlayer {
    fn local_bone_transforms(&self, skeleton: &Skeleton) -> Option<Vec<Transform>> {
        Some(self.clip.sample(skeleton, self.time))
    }

    fn advance(&mut self, dt: f32) {
        self.set_time(self.time + dt * self.speed);
    }
}
