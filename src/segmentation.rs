//! Episode segmentation
//!
//! Run-length partitioning of a categorical column into episodes. A new episode starts
//! whenever a frame's value differs from the previous frame's value; the first frame
//! always opens episode 1. For paired dimensions the key is the pair itself, so a change
//! in either component starts a new episode.
//!
//! Time inside an episode is the sum of the deltas between its own consecutive frames.
//! The frame that opens an episode contributes 0, so an episode's duration equals
//! `end_time - start_time`.

use crate::types::Episode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Combined gaze target: product/AOI on a given shelf.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AoiShelf {
    pub shelf: String,
    pub aoi: String,
}

/// Segment parallel columns of frame ids, timestamps and category keys.
pub fn segment<K: PartialEq + Clone>(
    frame_ids: &[u64],
    timestamps: &[f64],
    keys: &[K],
) -> Vec<Episode<K>> {
    debug_assert_eq!(frame_ids.len(), keys.len());
    debug_assert_eq!(timestamps.len(), keys.len());

    let mut episodes: Vec<Episode<K>> = Vec::new();

    for ((&frame_id, &t), key) in frame_ids.iter().zip(timestamps).zip(keys) {
        match episodes.last_mut() {
            Some(open) if open.category == *key => {
                open.duration += t - open.end_time;
                open.end_frame = frame_id;
                open.end_time = t;
                open.frame_count += 1;
            }
            _ => {
                let episode_id = episodes.len() as u32 + 1;
                episodes.push(Episode {
                    episode_id,
                    category: key.clone(),
                    start_frame: frame_id,
                    end_frame: frame_id,
                    start_time: t,
                    end_time: t,
                    duration: 0.0,
                    frame_count: 1,
                });
            }
        }
    }

    episodes
}

/// Per-frame deltas as attributed by the segmenter: 0 wherever the category changes.
pub fn run_deltas<K: PartialEq>(timestamps: &[f64], keys: &[K]) -> Vec<f64> {
    let mut out = Vec::with_capacity(keys.len());
    for i in 0..keys.len() {
        if i > 0 && keys[i] == keys[i - 1] {
            out.push(timestamps[i] - timestamps[i - 1]);
        } else {
            out.push(0.0);
        }
    }
    out
}

/// Number of episodes per category value.
pub fn visit_counts<K: Ord + Clone>(episodes: &[Episode<K>]) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for episode in episodes {
        *counts.entry(episode.category.clone()).or_insert(0) += 1;
    }
    counts
}

/// Visit, dwell and frame statistics for one category value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats<K> {
    pub category: K,
    /// Number of episodes
    pub visits: usize,
    /// Share of all episodes, in percent
    pub visit_share_pct: f64,
    /// Sum of episode durations
    pub dwell_time: f64,
    /// Dwell time per visit
    pub mean_visit_time: f64,
    /// Number of frames bearing the value
    pub frames: usize,
    /// Share of all frames, in percent
    pub frame_share_pct: f64,
    /// Sum of the stream's frame-to-frame deltas over frames bearing the value,
    /// including the delta that leads into each visit
    pub observed_time: f64,
}

/// Build the category table from the per-frame keys, the stream's global time deltas and
/// the episodes segmented from the same keys. Rows are ordered by category.
pub fn category_stats<K: Ord + Clone>(
    keys: &[K],
    deltas: &[f64],
    episodes: &[Episode<K>],
) -> Vec<CategoryStats<K>> {
    #[derive(Default)]
    struct Acc {
        visits: usize,
        dwell: f64,
        frames: usize,
        observed: f64,
    }

    let mut table: BTreeMap<K, Acc> = BTreeMap::new();
    for episode in episodes {
        let acc = table.entry(episode.category.clone()).or_default();
        acc.visits += 1;
        acc.dwell += episode.duration;
    }
    for (key, &dt) in keys.iter().zip(deltas) {
        let acc = table.entry(key.clone()).or_default();
        acc.frames += 1;
        acc.observed += dt;
    }

    let total_visits = episodes.len();
    let total_frames = keys.len();

    table
        .into_iter()
        .map(|(category, acc)| CategoryStats {
            category,
            visits: acc.visits,
            visit_share_pct: percent(acc.visits, total_visits),
            dwell_time: acc.dwell,
            mean_visit_time: if acc.visits > 0 {
                acc.dwell / acc.visits as f64
            } else {
                0.0
            },
            frames: acc.frames,
            frame_share_pct: percent(acc.frames, total_frames),
            observed_time: acc.observed,
        })
        .collect()
}

pub(crate) fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
