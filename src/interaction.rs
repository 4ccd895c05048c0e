//! Interaction span extraction
//!
//! A single fold over the product-interaction stream tracks the triple
//! (object, right-hand state, left-hand state). Whenever the triple changes, the interval
//! that just closed becomes an [`InteractionSpan`] if at least one hand was selecting
//! during it. The interval still open at end of stream is closed the same way.
//!
//! Per-hand and per-object counts are both read off the resulting spans.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::types::{Frame, HandState, HandUsage, InteractionSpan, ProductRelease};
use std::collections::BTreeMap;
use tracing::debug;

/// The tracked triple plus where its current interval began and last extended to.
struct OpenInterval<'a> {
    object: &'a str,
    right: &'a HandState,
    left: &'a HandState,
    start_frame: u64,
    start_time: f64,
    end_frame: u64,
    end_time: f64,
}

impl<'a> OpenInterval<'a> {
    fn open(frame: &'a Frame, object: &'a str, right: &'a HandState, left: &'a HandState) -> Self {
        Self {
            object,
            right,
            left,
            start_frame: frame.frame_id,
            start_time: frame.timestamp,
            end_frame: frame.frame_id,
            end_time: frame.timestamp,
        }
    }

    fn same_triple(&self, object: &str, right: &HandState, left: &HandState) -> bool {
        self.object == object && self.right == right && self.left == left
    }

    fn close(self) -> Option<InteractionSpan> {
        let hand = match (self.right.is_selecting(), self.left.is_selecting()) {
            (true, true) => HandUsage::Both,
            (true, false) => HandUsage::Right,
            (false, true) => HandUsage::Left,
            (false, false) => return None,
        };
        Some(InteractionSpan {
            object: self.object.to_string(),
            hand,
            start_frame: self.start_frame,
            end_frame: self.end_frame,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }
}

/// Extract interaction spans from an ordered interaction stream.
///
/// Every frame must name the object it refers to and carry both hand states.
pub fn extract_spans(table: &str, frames: &[Frame]) -> Result<Vec<InteractionSpan>, AnalysisError> {
    let mut spans = Vec::new();
    let mut open: Option<OpenInterval<'_>> = None;

    for frame in frames {
        let object = frame
            .object
            .as_deref()
            .ok_or_else(|| AnalysisError::missing_column(table, "Object"))?;
        let right = frame
            .right_hand_state
            .as_ref()
            .ok_or_else(|| AnalysisError::missing_column(table, "RightHand_State"))?;
        let left = frame
            .left_hand_state
            .as_ref()
            .ok_or_else(|| AnalysisError::missing_column(table, "LeftHand_State"))?;

        match open.as_mut() {
            Some(current) if current.same_triple(object, right, left) => {
                current.end_frame = frame.frame_id;
                current.end_time = frame.timestamp;
            }
            _ => {
                if let Some(span) = open.take().and_then(OpenInterval::close) {
                    spans.push(span);
                }
                open = Some(OpenInterval::open(frame, object, right, left));
            }
        }
    }

    if let Some(span) = open.and_then(OpenInterval::close) {
        spans.push(span);
    }

    debug!(table, frames = frames.len(), spans = spans.len(), "interaction_spans_extracted");
    Ok(spans)
}

/// Interactions attributed to each hand usage; all three keys are always present.
pub fn hand_counts(spans: &[InteractionSpan]) -> BTreeMap<HandUsage, usize> {
    let mut counts: BTreeMap<HandUsage, usize> = [HandUsage::Right, HandUsage::Left, HandUsage::Both]
        .into_iter()
        .map(|h| (h, 0))
        .collect();
    for span in spans {
        *counts.entry(span.hand).or_insert(0) += 1;
    }
    counts
}

/// Hand-agnostic interaction count per object.
pub fn object_counts(spans: &[InteractionSpan]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for span in spans {
        *counts.entry(span.object.clone()).or_insert(0) += 1;
    }
    counts
}

/// Per-object breakdown of spans by hand usage.
pub fn object_hand_counts(spans: &[InteractionSpan]) -> BTreeMap<String, BTreeMap<HandUsage, usize>> {
    let mut counts: BTreeMap<String, BTreeMap<HandUsage, usize>> = BTreeMap::new();
    for span in spans {
        *counts
            .entry(span.object.clone())
            .or_default()
            .entry(span.hand)
            .or_insert(0) += 1;
    }
    counts
}

/// Verify that each object's coarse count equals its Right + Left + Both counts.
///
/// Both maps are derived from the same spans today, so this only fails if a later
/// change computes one of them some other way.
pub fn check_consistency(
    coarse: &BTreeMap<String, usize>,
    by_hand: &BTreeMap<String, BTreeMap<HandUsage, usize>>,
) -> Result<(), AnalysisError> {
    let objects = coarse.keys().chain(by_hand.keys());
    for object in objects {
        let total = coarse.get(object).copied().unwrap_or(0);
        let attributed: usize = by_hand
            .get(object)
            .map(|hands| hands.values().sum())
            .unwrap_or(0);
        if total != attributed {
            return Err(AnalysisError::InvariantViolation(format!(
                "object '{}' has {} interactions but {} hand-attributed interactions",
                object, total, attributed
            )));
        }
    }
    Ok(())
}

/// Mean span duration per product, leaving placeholder interactables out.
pub fn mean_span_durations(
    spans: &[InteractionSpan],
    config: &AnalysisConfig,
) -> BTreeMap<String, f64> {
    mean_by_key(
        spans
            .iter()
            .filter(|s| !config.is_placeholder(&s.object))
            .map(|s| (s.object.as_str(), s.duration())),
    )
}

/// Mean time-until-release per product, leaving placeholder interactables out.
pub fn mean_release_durations(
    releases: &[ProductRelease],
    config: &AnalysisConfig,
) -> BTreeMap<String, f64> {
    mean_by_key(
        releases
            .iter()
            .filter(|r| !config.is_placeholder(&r.object))
            .map(|r| (r.object.as_str(), r.duration_until_release)),
    )
}

fn mean_by_key<'a>(entries: impl Iterator<Item = (&'a str, f64)>) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (key, value) in entries {
        let entry = sums.entry(key.to_string()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(key, (sum, n))| (key, sum / n as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(id: u64, object: &str, right: &str, left: &str) -> Frame {
        let mut frame = Frame::new(id, id as f64);
        frame.object = Some(object.to_string());
        frame.right_hand_state = Some(HandState::from(right.to_string()));
        frame.left_hand_state = Some(HandState::from(left.to_string()));
        frame
    }

    #[test]
    fn test_hand_attribution() {
        let frames = vec![
            row(0, "Milk", "Hover", "Normal"),
            row(1, "Milk", "Select", "Normal"),
            row(2, "Milk", "Select", "Normal"),
            row(3, "Milk", "Select", "Select"),
            row(4, "Milk", "Normal", "Select"),
            row(5, "Eggs", "Normal", "Normal"),
        ];
        let spans = extract_spans("interactions", &frames).unwrap();

        let summary: Vec<(HandUsage, u64, u64)> = spans
            .iter()
            .map(|s| (s.hand, s.start_frame, s.end_frame))
            .collect();
        assert_eq!(
            summary,
            vec![
                (HandUsage::Right, 1, 2),
                (HandUsage::Both, 3, 3),
                (HandUsage::Left, 4, 4),
            ]
        );
        assert_eq!(spans[0].duration(), 1.0);

        let counts = hand_counts(&spans);
        assert_eq!(counts[&HandUsage::Right], 1);
        assert_eq!(counts[&HandUsage::Left], 1);
        assert_eq!(counts[&HandUsage::Both], 1);
    }

    #[test]
    fn test_final_interval_is_closed() {
        let frames = vec![row(0, "Milk", "Normal", "Normal"), row(1, "Milk", "Select", "Normal")];
        let spans = extract_spans("interactions", &frames).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end_frame, 1);
    }

    #[test]
    fn test_object_change_splits_a_held_selection() {
        let frames = vec![
            row(0, "Milk", "Select", "Normal"),
            row(1, "Eggs", "Select", "Normal"),
        ];
        let spans = extract_spans("interactions", &frames).unwrap();
        assert_eq!(
            object_counts(&spans),
            BTreeMap::from([("Eggs".to_string(), 1), ("Milk".to_string(), 1)])
        );
    }

    #[test]
    fn test_no_selection_no_interactions() {
        let frames = vec![row(0, "Milk", "Hover", "Normal"), row(1, "Milk", "Normal", "Hover")];
        assert!(extract_spans("interactions", &frames).unwrap().is_empty());
        assert!(extract_spans("interactions", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_object_fails() {
        let frames = vec![Frame::new(0, 0.0)];
        let result = extract_spans("interactions", &frames);
        assert!(matches!(result, Err(AnalysisError::MissingColumn { .. })));
    }

    #[test]
    fn test_missing_hand_states_fail() {
        let frames: Vec<Frame> = (0..4)
            .map(|id| {
                let mut frame = Frame::new(id, id as f64);
                frame.object = Some("Milk".to_string());
                frame
            })
            .collect();
        let result = extract_spans("interactions", &frames);
        assert!(matches!(
            result,
            Err(AnalysisError::MissingColumn { ref column, .. }) if column == "RightHand_State"
        ));

        let mut one_hand = frames;
        for frame in &mut one_hand {
            frame.right_hand_state = Some(HandState::Select);
        }
        let result = extract_spans("interactions", &one_hand);
        assert!(matches!(
            result,
            Err(AnalysisError::MissingColumn { ref column, .. }) if column == "LeftHand_State"
        ));
    }

    #[test]
    fn test_coarse_counts_match_hand_counts() {
        let frames = vec![
            row(0, "Milk", "Select", "Normal"),
            row(1, "Milk", "Select", "Select"),
            row(2, "Eggs", "Normal", "Select"),
            row(3, "Eggs", "Normal", "Normal"),
            row(4, "Milk", "Select", "Normal"),
        ];
        let spans = extract_spans("interactions", &frames).unwrap();
        let coarse = object_counts(&spans);
        let by_hand = object_hand_counts(&spans);

        assert_eq!(coarse["Milk"], 3);
        assert_eq!(coarse["Eggs"], 1);
        assert!(check_consistency(&coarse, &by_hand).is_ok());
    }

    #[test]
    fn test_consistency_violation_detected() {
        let coarse = BTreeMap::from([("Milk".to_string(), 2)]);
        let by_hand = BTreeMap::from([(
            "Milk".to_string(),
            BTreeMap::from([(HandUsage::Right, 1)]),
        )]);
        assert!(matches!(
            check_consistency(&coarse, &by_hand),
            Err(AnalysisError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_placeholders_excluded_from_averages() {
        let config = AnalysisConfig::default();
        let release = |object: &str, d: f64| ProductRelease {
            object: object.to_string(),
            duration_until_release: d,
        };
        let releases = vec![
            release("Milk", 2.0),
            release("Milk", 4.0),
            release("HandGrabInteractable", 100.0),
        ];
        let means = mean_release_durations(&releases, &config);
        assert_eq!(means, BTreeMap::from([("Milk".to_string(), 3.0)]));

        let frames = vec![
            row(0, "HandGrabInteractable_mirror", "Select", "Normal"),
            row(1, "HandGrabInteractable_mirror", "Select", "Normal"),
            row(2, "Milk", "Select", "Normal"),
        ];
        let spans = extract_spans("interactions", &frames).unwrap();
        let means = mean_span_durations(&spans, &config);
        assert_eq!(means, BTreeMap::from([("Milk".to_string(), 0.0)]));
    }
}
