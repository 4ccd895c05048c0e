//! Kinematic estimation
//!
//! Finite-difference velocity and acceleration over consecutive position samples,
//! z-score outlier rejection, and Stop/Move classification.
//!
//! Policy: a zero (or negative) time delta yields velocity and acceleration of exactly
//! 0. Outliers stay in the stream; they are only left out of aggregate statistics, and
//! each column is judged against its own mean and standard deviation.

use crate::types::{KinematicSample, MovementState, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which coordinates enter the displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Full 3D distance
    Spatial,
    /// Horizontal (x, z) plane
    Planar,
}

impl Projection {
    fn distance(self, a: &Vec3, b: &Vec3) -> f64 {
        match self {
            Projection::Spatial => a.distance(b),
            Projection::Planar => a.planar_distance(b),
        }
    }
}

/// Mean, population standard deviation and sample count of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Summarize a column; an empty column summarizes to zeros.
pub fn summarize(values: impl IntoIterator<Item = f64>) -> Summary {
    let values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return Summary::default();
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Summary {
        mean,
        std: variance.sqrt(),
        count: values.len(),
    }
}

/// Summarize only the entries whose mask flag is false.
pub fn summarize_inliers(values: &[f64], outliers: &[bool]) -> Summary {
    summarize(
        values
            .iter()
            .zip(outliers)
            .filter(|(_, &out)| !out)
            .map(|(&v, _)| v),
    )
}

/// Distance between each point and its predecessor; the first point gets 0.
pub fn displacements(points: &[Vec3], projection: Projection) -> Vec<f64> {
    let mut out = Vec::with_capacity(points.len());
    if let Some(first) = points.first() {
        out.push(0.0);
        let mut previous = first;
        for point in &points[1..] {
            out.push(projection.distance(previous, point));
            previous = point;
        }
    }
    out
}

/// Displacement over elapsed time for every sample.
pub fn velocities(points: &[Vec3], deltas: &[f64], projection: Projection) -> Vec<f64> {
    displacements(points, projection)
        .into_iter()
        .zip(deltas)
        .map(|(d, &dt)| rate(d, dt))
        .collect()
}

/// Finite difference of a speed column over elapsed time; the first sample gets 0.
pub fn accelerations(speeds: &[f64], deltas: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(speeds.len());
    let mut previous: Option<f64> = None;
    for (&v, &dt) in speeds.iter().zip(deltas) {
        out.push(previous.map_or(0.0, |p| rate(v - p, dt)));
        previous = Some(v);
    }
    out
}

fn rate(change: f64, dt: f64) -> f64 {
    if dt > 0.0 {
        change / dt
    } else {
        0.0
    }
}

/// Flag entries whose |z| against the full column is at or above `cutoff`.
///
/// A column with zero spread has no outliers.
pub fn outlier_mask(values: &[f64], cutoff: f64) -> Vec<bool> {
    let summary = summarize(values.iter().copied());
    if summary.std == 0.0 || !summary.std.is_finite() {
        return vec![false; values.len()];
    }
    values
        .iter()
        .map(|v| ((v - summary.mean) / summary.std).abs() >= cutoff)
        .collect()
}

/// Build kinematic samples from an already computed speed column.
pub fn samples_from_speeds(
    frame_ids: &[u64],
    speeds: &[f64],
    deltas: &[f64],
    cutoff: f64,
) -> Vec<KinematicSample> {
    let acc = accelerations(speeds, deltas);
    let speed_outliers = outlier_mask(speeds, cutoff);
    let acc_outliers = outlier_mask(&acc, cutoff);

    frame_ids
        .iter()
        .enumerate()
        .map(|(i, &frame_id)| KinematicSample {
            frame_id,
            velocity: speeds[i],
            acceleration: acc[i],
            outlier: speed_outliers[i],
            acceleration_outlier: acc_outliers[i],
        })
        .collect()
}

/// Kinematic samples from a position track.
pub fn estimate(
    frame_ids: &[u64],
    points: &[Vec3],
    deltas: &[f64],
    projection: Projection,
    cutoff: f64,
) -> Vec<KinematicSample> {
    let speeds = velocities(points, deltas, projection);
    samples_from_speeds(frame_ids, &speeds, deltas, cutoff)
}

/// Stop when the 3D step is below `threshold`, otherwise Move. The first frame has
/// nothing to compare against and is always Stop.
pub fn movement_states(points: &[Vec3], threshold: f64) -> Vec<MovementState> {
    displacements(points, Projection::Spatial)
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            if i == 0 || d < threshold {
                MovementState::Stop
            } else {
                MovementState::Move
            }
        })
        .collect()
}

/// Planar distance walked, leaving out the jumps made by teleporting.
pub fn distance_without_teleports(
    frame_ids: &[u64],
    points: &[Vec3],
    teleport_frames: &HashSet<u64>,
) -> f64 {
    displacements(points, Projection::Planar)
        .into_iter()
        .zip(frame_ids)
        .filter(|(_, id)| !teleport_frames.contains(id))
        .map(|(d, _)| d)
        .sum()
}
