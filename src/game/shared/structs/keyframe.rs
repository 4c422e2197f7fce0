use anyhow::bail;
use glam::{Quat, Vec3};
use std::ops::{Add, Mul};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub value: T,
    pub time_stamp: f32,
}

/// How values between two keyframes are produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackInterpolation {
    Linear,
    /// Holds the previous keyframe until the next one is reached.
    Step,
    /// Cubic Hermite spline through the keyframes, using per-keyframe tangents.
    CubicSpline,
}

impl Default for TrackInterpolation {
    fn default() -> Self {
        TrackInterpolation::Linear
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplineTangents<T> {
    pub in_tangent: T,
    pub out_tangent: T,
}

/// Where a playback time falls inside a track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyframeIndex {
    Clamped {
        index: usize,
    },
    Interpolate {
        index_prev: usize,
        index_next: usize,
        amount: f32,
    },
}

/// Samples of one animated channel, sorted by time stamp.
///
/// A track always holds at least one keyframe. A track with a single keyframe
/// is a constant and is never interpolated.
#[derive(Clone, Debug)]
pub struct KeyframeTrack<T> {
    keyframes: Vec<Keyframe<T>>,
    interpolation: TrackInterpolation,
    // One entry per keyframe for cubic spline tracks, empty otherwise.
    tangents: Vec<SplineTangents<T>>,
}

impl<T: Copy> KeyframeTrack<T> {
    pub fn new(keyframes: Vec<Keyframe<T>>) -> anyhow::Result<Self> {
        if keyframes.is_empty() {
            bail!("A keyframe track needs at least one keyframe.");
        }
        if let Some(keyframe) = keyframes.iter().find(|k| !k.time_stamp.is_finite()) {
            bail!("Keyframe time stamp {} is not finite.", keyframe.time_stamp);
        }
        if let Some(window) = keyframes
            .windows(2)
            .find(|window| window[1].time_stamp < window[0].time_stamp)
        {
            bail!(
                "Keyframe time stamps must not decrease: {} is followed by {}.",
                window[0].time_stamp,
                window[1].time_stamp
            );
        }
        Ok(KeyframeTrack {
            keyframes,
            interpolation: TrackInterpolation::Linear,
            tangents: vec![],
        })
    }

    pub fn from_samples(values: Vec<T>, time_stamps: Vec<f32>) -> anyhow::Result<Self> {
        if values.len() != time_stamps.len() {
            bail!(
                "Keyframe value count {} does not match time stamp count {}.",
                values.len(),
                time_stamps.len()
            );
        }
        let keyframes = values
            .into_iter()
            .zip(time_stamps)
            .map(|(value, time_stamp)| Keyframe { value, time_stamp })
            .collect();
        Self::new(keyframes)
    }

    pub fn from_step_samples(values: Vec<T>, time_stamps: Vec<f32>) -> anyhow::Result<Self> {
        let mut track = Self::from_samples(values, time_stamps)?;
        track.interpolation = TrackInterpolation::Step;
        Ok(track)
    }

    /// Builds a spline track from `(in tangent, value, out tangent)` triples,
    /// one triple per time stamp.
    pub fn from_cubic_spline(triples: Vec<T>, time_stamps: Vec<f32>) -> anyhow::Result<Self> {
        if triples.len() != time_stamps.len() * 3 {
            bail!(
                "Cubic spline needs three values per keyframe, got {} for {} time stamps.",
                triples.len(),
                time_stamps.len()
            );
        }
        let values = triples.chunks_exact(3).map(|chunk| chunk[1]).collect();
        let tangents = triples
            .chunks_exact(3)
            .map(|chunk| SplineTangents {
                in_tangent: chunk[0],
                out_tangent: chunk[2],
            })
            .collect();
        let mut track = Self::from_samples(values, time_stamps)?;
        track.interpolation = TrackInterpolation::CubicSpline;
        track.tangents = tangents;
        Ok(track)
    }

    pub fn constant(value: T) -> Self {
        KeyframeTrack {
            keyframes: vec![Keyframe {
                value,
                time_stamp: 0.0,
            }],
            interpolation: TrackInterpolation::Linear,
            tangents: vec![],
        }
    }

    pub fn interpolation(&self) -> TrackInterpolation {
        self.interpolation
    }

    pub fn tangents(&self) -> &[SplineTangents<T>] {
        &self.tangents
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn is_constant(&self) -> bool {
        self.keyframes.len() == 1
    }

    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    pub fn first_value(&self) -> T {
        self.keyframes[0].value
    }

    pub fn last_time_stamp(&self) -> f32 {
        self.keyframes[self.keyframes.len() - 1].time_stamp
    }

    /// Brackets `time` between two keyframes.
    ///
    /// `index_next` is always in `[1, len - 1]`, so neither index can read past
    /// the last keyframe. Times before the first or at/after the last keyframe
    /// clamp to that keyframe.
    pub fn index(&self, time: f32) -> KeyframeIndex {
        let last = self.keyframes.len() - 1;
        if last == 0 || !(time > self.keyframes[0].time_stamp) {
            return KeyframeIndex::Clamped { index: 0 };
        }
        if time >= self.keyframes[last].time_stamp {
            return KeyframeIndex::Clamped { index: last };
        }
        let index_next = self
            .keyframes
            .partition_point(|keyframe| keyframe.time_stamp <= time)
            .clamp(1, last);
        let index_prev = index_next - 1;
        let prev = self.keyframes[index_prev].time_stamp;
        let span = self.keyframes[index_next].time_stamp - prev;
        let amount = if span > f32::EPSILON {
            ((time - prev) / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        KeyframeIndex::Interpolate {
            index_prev,
            index_next,
            amount,
        }
    }
}

impl<T> KeyframeTrack<T>
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    /// Samples the track at `time`. `lerp` blends two keyframes for linear
    /// tracks; step and spline tracks do not use it.
    pub fn sample_with<F>(&self, time: f32, lerp: F) -> T
    where
        F: Fn(T, T, f32) -> T,
    {
        let (index_prev, index_next, amount) = match self.index(time) {
            KeyframeIndex::Clamped { index } => return self.keyframes[index].value,
            KeyframeIndex::Interpolate {
                index_prev,
                index_next,
                amount,
            } => (index_prev, index_next, amount),
        };
        let prev = self.keyframes[index_prev];
        let next = self.keyframes[index_next];
        match self.interpolation {
            TrackInterpolation::Linear => lerp(prev.value, next.value, amount),
            TrackInterpolation::Step => prev.value,
            TrackInterpolation::CubicSpline => {
                let span = next.time_stamp - prev.time_stamp;
                let m0 = self.tangents[index_prev].out_tangent * span;
                let m1 = self.tangents[index_next].in_tangent * span;
                hermite(prev.value, next.value, m0, m1, amount)
            }
        }
    }
}

fn hermite<T>(p0: T, p1: T, m0: T, m1: T, t: f32) -> T
where
    T: Add<Output = T> + Mul<f32, Output = T>,
{
    let t2 = t * t;
    let t3 = t2 * t;
    p0 * (2.0 * t3 - 3.0 * t2 + 1.0)
        + m0 * (t3 - 2.0 * t2 + t)
        + p1 * (-2.0 * t3 + 3.0 * t2)
        + m1 * (t3 - t2)
}

impl KeyframeTrack<Vec3> {
    pub fn sample_vector(&self, time: f32) -> Vec3 {
        self.sample_with(time, |prev, next, amount| prev.lerp(next, amount))
    }
}

impl KeyframeTrack<Quat> {
    /// Slerps linear tracks; every result is re-normalized.
    pub fn sample_rotation(&self, time: f32) -> Quat {
        self.sample_with(time, |prev, next, amount| prev.slerp(next, amount))
            .normalize()
    }
}
