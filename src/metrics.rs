//! Metrics aggregation
//!
//! Pure reducers from episodes, kinematic samples and frame-level columns to the
//! statistics of a session report. Empty groups and zero totals resolve to 0, never to
//! NaN; standard deviations are population deviations.

use crate::error::AnalysisError;
use crate::interaction;
use crate::kinematics::{summarize, summarize_inliers, Summary};
use crate::segmentation::{percent, AoiShelf, CategoryStats};
use crate::types::{
    CartAction, CartActionKind, Episode, Frame, HandUsage, InteractionSpan, KinematicSample,
    MovementState, TeleportEvent, Vec3, Zone,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Stop/Move episode counts. Percentages are shares of all movement episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub stop_episodes: usize,
    pub move_episodes: usize,
    pub stop_pct: f64,
    pub move_pct: f64,
}

pub fn movement_summary(episodes: &[Episode<MovementState>]) -> MovementSummary {
    let stops = episodes
        .iter()
        .filter(|e| e.category == MovementState::Stop)
        .count();
    let moves = episodes.len() - stops;
    MovementSummary {
        stop_episodes: stops,
        move_episodes: moves,
        stop_pct: percent(stops, episodes.len()),
        move_pct: percent(moves, episodes.len()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeleportSummary {
    pub attempts: usize,
    pub successful: usize,
    /// Mean time spent per successful teleport, including the failed attempts before it
    pub mean_successful_duration: f64,
    /// Successful teleports per hotspot
    pub hotspots: BTreeMap<String, usize>,
}

/// Durations accumulate over consecutive rows until a successful teleport closes the sum.
pub fn teleport_summary(teleports: &[TeleportEvent]) -> TeleportSummary {
    let mut pending = 0.0;
    let mut completed: Vec<f64> = Vec::new();
    let mut hotspots = BTreeMap::new();

    for tp in teleports {
        pending += tp.duration;
        if tp.was_teleport {
            completed.push(pending);
            pending = 0.0;
            *hotspots.entry(tp.hotspot.clone()).or_insert(0) += 1;
        }
    }

    TeleportSummary {
        attempts: teleports.len(),
        successful: completed.len(),
        mean_successful_duration: summarize(completed.iter().copied()).mean,
        hotspots,
    }
}

/// Inlier summary of a kinematic column per category value.
pub fn speed_by_category<K: Ord + Clone>(
    keys: &[K],
    samples: &[KinematicSample],
) -> BTreeMap<K, Summary> {
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (key, sample) in keys.iter().zip(samples) {
        let values = groups.entry(key.clone()).or_default();
        if !sample.outlier {
            values.push(sample.velocity);
        }
    }
    groups
        .into_iter()
        .map(|(key, values)| (key, summarize(values)))
        .collect()
}

/// Hand movement statistics from the recorded velocity vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandSummary {
    pub speed: Summary,
    pub acceleration: Summary,
    /// Mean velocity vector over the frames whose speed is not an outlier
    pub mean_velocity: Vec3,
}

pub fn hand_summary(vectors: &[Vec3], samples: &[KinematicSample]) -> HandSummary {
    let speeds: Vec<f64> = samples.iter().map(|s| s.velocity).collect();
    let outliers: Vec<bool> = samples.iter().map(|s| s.outlier).collect();

    let acceleration = summarize(
        samples
            .iter()
            .filter(|s| !s.acceleration_outlier)
            .map(|s| s.acceleration),
    );

    let inliers: Vec<&Vec3> = vectors
        .iter()
        .zip(samples)
        .filter(|(_, s)| !s.outlier)
        .map(|(v, _)| v)
        .collect();
    let axis = |get: fn(&Vec3) -> f64| summarize(inliers.iter().map(|v| get(v))).mean;

    HandSummary {
        speed: summarize_inliers(&speeds, &outliers),
        acceleration,
        mean_velocity: Vec3::new(axis(|v| v.x), axis(|v| v.y), axis(|v| v.z)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationMetrics {
    /// Sum of all frame deltas of the tracking table
    pub total_time: f64,
    /// Planar distance walked, teleport jumps excluded
    pub distance_travelled: f64,
    pub movement: MovementSummary,
    pub teleports: TeleportSummary,
    pub zones: Vec<CategoryStats<Zone>>,
    pub sections: Vec<CategoryStats<String>>,
    pub head_speed: Summary,
    pub head_speed_by_zone: BTreeMap<Zone, Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_hand: Option<HandSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_hand: Option<HandSummary>,
}

// ---------------------------------------------------------------------------
// Gaze
// ---------------------------------------------------------------------------

/// A fixation delimited by a `fixation_start` frame and the next `fixation_end` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixationEvent {
    pub target: AoiShelf,
    pub start_frame: u64,
    pub end_frame: u64,
    pub duration: f64,
}

/// Pair start and end flags into events; the event belongs to the target at its start.
///
/// A frame flagged as both start and end opens a new event. An end without an open
/// event, or a start never closed, is ignored.
pub fn fixation_events(frames: &[Frame], targets: &[AoiShelf]) -> Vec<FixationEvent> {
    let mut events = Vec::new();
    let mut open: Option<(&Frame, &AoiShelf)> = None;

    for (frame, target) in frames.iter().zip(targets) {
        if frame.fixation_start {
            open = Some((frame, target));
        } else if frame.fixation_end {
            if let Some((start, start_target)) = open.take() {
                events.push(FixationEvent {
                    target: start_target.clone(),
                    start_frame: start.frame_id,
                    end_frame: frame.frame_id,
                    duration: frame.timestamp - start.timestamp,
                });
            }
        }
    }

    events
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixationSummary {
    pub fixation_frames: usize,
    pub saccade_frames: usize,
    pub fixation_time: f64,
    pub saccade_time: f64,
    /// Fixation time over fixation plus saccade time; 0 when no time elapsed
    pub fixation_pct: f64,
    pub saccade_pct: f64,
    pub events: usize,
    pub mean_event_duration: f64,
    /// Mean of the classifier's non-zero `fixation_duration` values
    pub mean_fixation_duration: f64,
}

pub fn fixation_summary(frames: &[Frame], deltas: &[f64], events: &[FixationEvent]) -> FixationSummary {
    let mut summary = FixationSummary::default();

    for (frame, &dt) in frames.iter().zip(deltas) {
        if frame.fixation {
            summary.fixation_frames += 1;
            summary.fixation_time += dt;
        } else {
            summary.saccade_frames += 1;
            summary.saccade_time += dt;
        }
    }

    let total = summary.fixation_time + summary.saccade_time;
    if total > 0.0 {
        summary.fixation_pct = summary.fixation_time / total * 100.0;
        summary.saccade_pct = summary.saccade_time / total * 100.0;
    }

    summary.events = events.len();
    summary.mean_event_duration = summarize(events.iter().map(|e| e.duration)).mean;
    summary.mean_fixation_duration = mean_nonzero_duration(frames.iter());
    summary
}

fn mean_nonzero_duration<'a>(frames: impl Iterator<Item = &'a Frame>) -> f64 {
    summarize(
        frames
            .map(|f| f.fixation_duration)
            .filter(|d| *d != 0.0),
    )
    .mean
}

/// Gaze behaviour on one AOI × shelf target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetAttention {
    pub target: AoiShelf,
    /// Mean gaze-hit speed; absent when the stream carries no gaze hit points
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_gaze_speed: Option<f64>,
    pub fixation_frames: usize,
    pub saccade_frames: usize,
    pub fixation_events: usize,
    pub fixation_event_time: f64,
    pub mean_fixation_duration: f64,
}

pub fn target_attention(
    frames: &[Frame],
    targets: &[AoiShelf],
    gaze_speeds: Option<&[f64]>,
    events: &[FixationEvent],
) -> Vec<TargetAttention> {
    let mut table: BTreeMap<&AoiShelf, (TargetAttention, Vec<&Frame>, Vec<f64>)> = BTreeMap::new();

    for (i, (frame, target)) in frames.iter().zip(targets).enumerate() {
        let (row, members, speeds) = table.entry(target).or_insert_with(|| {
            (
                TargetAttention {
                    target: target.clone(),
                    ..Default::default()
                },
                Vec::new(),
                Vec::new(),
            )
        });
        if frame.fixation {
            row.fixation_frames += 1;
        } else {
            row.saccade_frames += 1;
        }
        members.push(frame);
        if let Some(speed) = gaze_speeds.and_then(|s| s.get(i)) {
            speeds.push(*speed);
        }
    }

    for event in events {
        if let Some((row, _, _)) = table.get_mut(&event.target) {
            row.fixation_events += 1;
            row.fixation_event_time += event.duration;
        }
    }

    table
        .into_values()
        .map(|(mut row, members, speeds)| {
            row.mean_fixation_duration = mean_nonzero_duration(members.into_iter());
            row.mean_gaze_speed = gaze_speeds.map(|_| summarize(speeds).mean);
            row
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeMetrics {
    /// Sum of all frame deltas of the gaze table
    pub observation_time: f64,
    pub aoi: Vec<CategoryStats<String>>,
    pub shelves: Vec<CategoryStats<String>>,
    pub targets: Vec<CategoryStats<AoiShelf>>,
    pub attention: Vec<TargetAttention>,
    pub fixation: FixationSummary,
}

// ---------------------------------------------------------------------------
// Interaction and cart
// ---------------------------------------------------------------------------

/// Share of frames per section, in percent.
pub fn section_share(sections: &[String]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for section in sections {
        *counts.entry(section.clone()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(section, n)| (section, percent(n, sections.len())))
        .collect()
}

/// Cart additions per interaction; 0 when there were no interactions.
pub fn conversion_ratio(adds: usize, interactions: usize) -> f64 {
    if interactions == 0 {
        0.0
    } else {
        adds as f64 / interactions as f64
    }
}

/// Time between adding an item to the cart and taking it out again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldTimes {
    /// Mean hold time per item, over matched additions only
    pub per_item: BTreeMap<String, f64>,
    /// Mean over all matched additions
    pub mean: f64,
    pub matched: usize,
    pub unmatched: usize,
}

/// Each ADD is matched with the earliest REMOVE of the same item strictly after it.
/// Unmatched additions are left out of the statistics.
pub fn hold_times(cart: &[CartAction]) -> HoldTimes {
    let mut durations: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut unmatched = 0;

    for add in cart.iter().filter(|a| a.action == CartActionKind::Add) {
        let removal = cart
            .iter()
            .filter(|r| {
                r.action == CartActionKind::Remove && r.item == add.item && r.timestamp > add.timestamp
            })
            .map(|r| r.timestamp)
            .reduce(f64::min);

        match removal {
            Some(t) => durations
                .entry(add.item.clone())
                .or_default()
                .push(t - add.timestamp),
            None => unmatched += 1,
        }
    }

    if unmatched > 0 {
        warn!(unmatched, "cart_adds_without_removal");
    }

    let all: Vec<f64> = durations.values().flatten().copied().collect();
    HoldTimes {
        per_item: durations
            .iter()
            .map(|(item, d)| (item.clone(), summarize(d.iter().copied()).mean))
            .collect(),
        mean: summarize(all.iter().copied()).mean,
        matched: all.len(),
        unmatched,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartItemSummary {
    pub item: String,
    pub interactions: usize,
    pub adds: usize,
    pub removes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartMetrics {
    pub adds: usize,
    pub removes: usize,
    pub conversion_ratio: f64,
    pub hold_times: HoldTimes,
    /// Items with at least one cart action
    pub items: Vec<CartItemSummary>,
}

pub fn cart_metrics(
    cart: &[CartAction],
    object_counts: &BTreeMap<String, usize>,
    total_interactions: usize,
) -> CartMetrics {
    let mut items: BTreeMap<&str, CartItemSummary> = BTreeMap::new();
    for action in cart {
        let row = items.entry(action.item.as_str()).or_insert_with(|| CartItemSummary {
            item: action.item.clone(),
            interactions: object_counts.get(&action.item).copied().unwrap_or(0),
            ..Default::default()
        });
        match action.action {
            CartActionKind::Add => row.adds += 1,
            CartActionKind::Remove => row.removes += 1,
        }
    }

    let adds = cart
        .iter()
        .filter(|a| a.action == CartActionKind::Add)
        .count();

    CartMetrics {
        adds,
        removes: cart.len() - adds,
        conversion_ratio: conversion_ratio(adds, total_interactions),
        hold_times: hold_times(cart),
        items: items.into_values().collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionMetrics {
    pub total_interactions: usize,
    pub per_object: BTreeMap<String, usize>,
    pub by_hand: BTreeMap<HandUsage, usize>,
    pub per_object_by_hand: BTreeMap<String, BTreeMap<HandUsage, usize>>,
    /// Share of interaction frames per store section
    pub section_share_pct: BTreeMap<String, f64>,
    pub mean_interaction_duration: BTreeMap<String, f64>,
    pub mean_release_duration: BTreeMap<String, f64>,
    pub cart: CartMetrics,
}

impl InteractionMetrics {
    /// Counts derived from the spans; the per-object and per-hand views must agree.
    pub fn from_spans(spans: &[InteractionSpan]) -> Result<Self, AnalysisError> {
        let per_object = interaction::object_counts(spans);
        let per_object_by_hand = interaction::object_hand_counts(spans);
        interaction::check_consistency(&per_object, &per_object_by_hand)?;

        Ok(Self {
            total_interactions: spans.len(),
            by_hand: interaction::hand_counts(spans),
            per_object,
            per_object_by_hand,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add(item: &str, t: f64) -> CartAction {
        CartAction {
            item: item.to_string(),
            action: CartActionKind::Add,
            timestamp: t,
        }
    }

    fn remove(item: &str, t: f64) -> CartAction {
        CartAction {
            item: item.to_string(),
            action: CartActionKind::Remove,
            timestamp: t,
        }
    }

    fn target(shelf: &str, aoi: &str) -> AoiShelf {
        AoiShelf {
            shelf: shelf.to_string(),
            aoi: aoi.to_string(),
        }
    }

    fn episode<K>(category: K) -> Episode<K> {
        Episode {
            episode_id: 1,
            category,
            start_frame: 0,
            end_frame: 0,
            start_time: 0.0,
            end_time: 0.0,
            duration: 0.0,
            frame_count: 1,
        }
    }

    #[test]
    fn test_conversion_ratio() {
        assert_eq!(conversion_ratio(4, 10), 0.4);
        assert_eq!(conversion_ratio(3, 0), 0.0);
    }

    #[test]
    fn test_cart_metrics_conversion() {
        let cart = vec![add("Milk", 1.0), add("Milk", 2.0), add("Eggs", 3.0), add("Tea", 4.0)];
        let counts = BTreeMap::from([("Milk".to_string(), 6), ("Eggs".to_string(), 4)]);
        let metrics = cart_metrics(&cart, &counts, 10);

        assert_eq!(metrics.adds, 4);
        assert_eq!(metrics.conversion_ratio, 0.4);
        let milk = metrics.items.iter().find(|i| i.item == "Milk").unwrap();
        assert_eq!(milk.interactions, 6);
        assert_eq!(milk.adds, 2);
        let tea = metrics.items.iter().find(|i| i.item == "Tea").unwrap();
        assert_eq!(tea.interactions, 0);
    }

    #[test]
    fn test_hold_time_matches_first_later_removal() {
        let cart = vec![
            remove("Milk", 0.5),
            add("Milk", 1.0),
            remove("Milk", 1.0),
            remove("Milk", 4.0),
            remove("Milk", 3.0),
            add("Eggs", 2.0),
        ];
        let hold = hold_times(&cart);

        assert_eq!(hold.per_item, BTreeMap::from([("Milk".to_string(), 2.0)]));
        assert_eq!(hold.matched, 1);
        assert_eq!(hold.unmatched, 1);
        assert_eq!(hold.mean, 2.0);
    }

    #[test]
    fn test_hold_times_empty_cart() {
        assert_eq!(hold_times(&[]), HoldTimes::default());
    }

    #[test]
    fn test_movement_summary_counts_episodes() {
        let episodes = vec![
            episode(MovementState::Stop),
            episode(MovementState::Move),
            episode(MovementState::Stop),
            episode(MovementState::Move),
        ];
        let summary = movement_summary(&episodes);
        assert_eq!(summary.stop_episodes, 2);
        assert_eq!(summary.move_pct, 50.0);
        assert_eq!(movement_summary(&[]).stop_pct, 0.0);
    }

    #[test]
    fn test_teleport_durations_accumulate_until_success() {
        let tp = |duration: f64, ok: bool| TeleportEvent {
            frame_id: 0,
            timestamp: 0.0,
            hotspot: "TP_Food1".to_string(),
            was_teleport: ok,
            duration,
        };
        let summary = teleport_summary(&[tp(1.0, false), tp(2.0, true), tp(4.0, true), tp(9.0, false)]);

        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.mean_successful_duration, 3.5);
        assert_eq!(summary.hotspots.get("TP_Food1"), Some(&2));
        assert_eq!(teleport_summary(&[]).mean_successful_duration, 0.0);
    }

    #[test]
    fn test_speed_by_category_skips_outliers() {
        let sample = |velocity: f64, outlier: bool| KinematicSample {
            frame_id: 0,
            velocity,
            acceleration: 0.0,
            outlier,
            acceleration_outlier: false,
        };
        let keys = [Zone::Far, Zone::Far, Zone::Far, Zone::Shelf];
        let samples = [sample(1.0, false), sample(3.0, false), sample(99.0, true), sample(0.5, false)];
        let by_zone = speed_by_category(&keys, &samples);

        assert_eq!(by_zone[&Zone::Far].mean, 2.0);
        assert_eq!(by_zone[&Zone::Far].std, 1.0);
        assert_eq!(by_zone[&Zone::Shelf].count, 1);
    }

    #[test]
    fn test_hand_summary_axis_means() {
        let sample = |velocity: f64| KinematicSample {
            frame_id: 0,
            velocity,
            acceleration: 0.0,
            outlier: false,
            acceleration_outlier: false,
        };
        let vectors = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 2.0)];
        let samples = [sample(1.0), sample(13f64.sqrt())];
        let summary = hand_summary(&vectors, &samples);
        assert_eq!(summary.mean_velocity, Vec3::new(2.0, 0.0, 1.0));
    }

    #[test]
    fn test_fixation_percentages() {
        let mut frames: Vec<Frame> = (0..4).map(|i| Frame::new(i, i as f64)).collect();
        frames[1].fixation = true;
        frames[2].fixation = true;
        let deltas = [0.0, 1.0, 1.0, 1.0];
        let summary = fixation_summary(&frames, &deltas, &[]);

        assert_eq!(summary.fixation_frames, 2);
        assert_eq!(summary.fixation_time, 2.0);
        assert_eq!(summary.saccade_time, 1.0);
        assert!((summary.fixation_pct - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixation_percentage_with_no_elapsed_time() {
        let frames = vec![Frame::new(0, 0.0)];
        let summary = fixation_summary(&frames, &[0.0], &[]);
        assert_eq!(summary.fixation_pct, 0.0);
        assert_eq!(summary.saccade_pct, 0.0);
    }

    #[test]
    fn test_fixation_events_pair_start_and_end() {
        let mut frames: Vec<Frame> = (0..6).map(|i| Frame::new(i, i as f64 * 0.5)).collect();
        frames[0].fixation_end = true;
        frames[1].fixation_start = true;
        frames[3].fixation_end = true;
        frames[4].fixation_start = true;
        let targets = vec![
            target("S1", "Milk"),
            target("S1", "Milk"),
            target("S1", "Eggs"),
            target("S1", "Eggs"),
            target("S2", "Tea"),
            target("S2", "Tea"),
        ];
        let events = fixation_events(&frames, &targets);

        assert_eq!(
            events,
            vec![FixationEvent {
                target: target("S1", "Milk"),
                start_frame: 1,
                end_frame: 3,
                duration: 1.0,
            }]
        );
    }

    #[test]
    fn test_target_attention() {
        let mut frames: Vec<Frame> = (0..3).map(|i| Frame::new(i, i as f64)).collect();
        frames[0].fixation = true;
        frames[0].fixation_duration = 0.4;
        frames[1].fixation = true;
        frames[1].fixation_duration = 0.0;
        let targets = vec![target("S1", "Milk"), target("S1", "Milk"), target("S1", "Eggs")];
        let speeds = [0.0, 2.0, 5.0];
        let rows = target_attention(&frames, &targets, Some(&speeds[..]), &[]);

        assert_eq!(rows.len(), 2);
        let milk = rows.iter().find(|r| r.target.aoi == "Milk").unwrap();
        assert_eq!(milk.fixation_frames, 2);
        assert_eq!(milk.mean_fixation_duration, 0.4);
        assert_eq!(milk.mean_gaze_speed, Some(1.0));

        let without_hits = target_attention(&frames, &targets, None, &[]);
        assert!(without_hits.iter().all(|r| r.mean_gaze_speed.is_none()));
    }

    #[test]
    fn test_section_share() {
        let sections: Vec<String> = ["Food", "Food", "Toys", "NIAS"].iter().map(|s| s.to_string()).collect();
        let share = section_share(&sections);
        assert_eq!(share["Food"], 50.0);
        assert_eq!(share["NIAS"], 25.0);
    }

    #[test]
    fn test_interaction_metrics_from_spans() {
        let span = |object: &str, hand: HandUsage| InteractionSpan {
            object: object.to_string(),
            hand,
            start_frame: 0,
            end_frame: 0,
            start_time: 0.0,
            end_time: 0.0,
        };
        let spans = vec![
            span("Milk", HandUsage::Right),
            span("Milk", HandUsage::Both),
            span("Eggs", HandUsage::Left),
        ];
        let metrics = InteractionMetrics::from_spans(&spans).unwrap();

        assert_eq!(metrics.total_interactions, 3);
        assert_eq!(metrics.per_object["Milk"], 2);
        assert_eq!(metrics.by_hand[&HandUsage::Left], 1);
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["by_hand"]["Both Hands"], 1);
    }
}
