//! Frame store
//!
//! A typed, time-ordered frame table. Construction either asserts the ordering
//! preconditions ([`FrameStore::new`]) or establishes them by dropping repeated frame
//! ids and sorting by timestamp ([`FrameStore::sanitize`]).

use crate::error::AnalysisError;
use crate::types::{Frame, Zone};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Ordered, de-duplicated frames of one session table.
#[derive(Debug, Clone)]
pub struct FrameStore {
    table: String,
    frames: Vec<Frame>,
}

impl FrameStore {
    /// Build a store, failing fast if frame ids repeat or timestamps decrease.
    pub fn new(table: &str, frames: Vec<Frame>) -> Result<Self, AnalysisError> {
        let mut seen = HashSet::with_capacity(frames.len());
        let mut previous: Option<f64> = None;

        for frame in &frames {
            check_finite(table, frame)?;
            if !seen.insert(frame.frame_id) {
                return Err(AnalysisError::DuplicateFrame {
                    table: table.to_string(),
                    frame_id: frame.frame_id,
                });
            }
            if let Some(prev) = previous {
                if frame.timestamp < prev {
                    return Err(AnalysisError::NonMonotonicTimestamps {
                        table: table.to_string(),
                        frame_id: frame.frame_id,
                        previous: prev,
                        current: frame.timestamp,
                    });
                }
            }
            previous = Some(frame.timestamp);
        }

        Ok(Self {
            table: table.to_string(),
            frames,
        })
    }

    /// Keep the first occurrence of every frame id, then stable-sort by timestamp.
    pub fn sanitize(table: &str, frames: Vec<Frame>) -> Result<Self, AnalysisError> {
        let total = frames.len();
        let mut seen = HashSet::with_capacity(total);
        let mut kept = Vec::with_capacity(total);

        for frame in frames {
            check_finite(table, &frame)?;
            if seen.insert(frame.frame_id) {
                kept.push(frame);
            }
        }

        let dropped = total - kept.len();
        if dropped > 0 {
            warn!(table, dropped, "duplicate_frames_dropped");
        }

        kept.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        debug!(table, frames = kept.len(), "frame_store_sanitized");

        Ok(Self {
            table: table.to_string(),
            frames: kept,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.frames.iter().map(|f| f.timestamp).collect()
    }

    /// Per-frame time delta to the previous frame; the first frame gets 0.
    pub fn time_deltas(&self) -> Vec<f64> {
        time_deltas(&self.timestamps())
    }

    /// Elapsed time between the first and last frame.
    pub fn duration(&self) -> f64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Fill the section column where the table did not record one.
    ///
    /// Recorded values are never overwritten.
    pub fn fill_sections(&mut self, labels: Vec<String>) {
        debug_assert_eq!(labels.len(), self.frames.len());
        for (frame, label) in self.frames.iter_mut().zip(labels) {
            if frame.section.is_none() {
                frame.section = Some(label);
            }
        }
    }

    /// Fill the zone column where the table did not record one.
    pub fn fill_zones(&mut self, zones: Vec<Option<Zone>>) {
        debug_assert_eq!(zones.len(), self.frames.len());
        for (frame, zone) in self.frames.iter_mut().zip(zones) {
            if frame.zone.is_none() {
                frame.zone = zone;
            }
        }
    }

    /// Fail with a missing-column error unless every frame carries the column.
    pub fn require<T>(
        &self,
        column: &str,
        get: impl Fn(&Frame) -> Option<T>,
    ) -> Result<Vec<T>, AnalysisError> {
        self.frames
            .iter()
            .map(|f| get(f).ok_or_else(|| AnalysisError::missing_column(&self.table, column)))
            .collect()
    }

    /// Like [`FrameStore::require`] for a column the table may omit entirely.
    ///
    /// Returns `None` when no frame carries the column; a column present on only some
    /// frames is reported as missing.
    pub fn optional<T>(
        &self,
        column: &str,
        get: impl Fn(&Frame) -> Option<T>,
    ) -> Result<Option<Vec<T>>, AnalysisError> {
        if self.frames.iter().all(|f| get(f).is_none()) {
            return Ok(None);
        }
        self.require(column, get).map(Some)
    }
}

/// Differences between consecutive timestamps, with 0 for the first sample.
pub fn time_deltas(timestamps: &[f64]) -> Vec<f64> {
    let mut deltas = Vec::with_capacity(timestamps.len());
    let mut previous: Option<f64> = None;
    for &t in timestamps {
        deltas.push(previous.map_or(0.0, |p| t - p));
        previous = Some(t);
    }
    deltas
}

fn check_finite(table: &str, frame: &Frame) -> Result<(), AnalysisError> {
    if frame.timestamp.is_finite() {
        Ok(())
    } else {
        Err(AnalysisError::InvalidTimestamp {
            table: table.to_string(),
            frame_id: frame.frame_id,
            value: frame.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(rows: &[(u64, f64)]) -> Vec<Frame> {
        rows.iter().map(|&(id, t)| Frame::new(id, t)).collect()
    }

    #[test]
    fn test_strict_store_accepts_ordered_frames() {
        let store = FrameStore::new("tracking", frames(&[(0, 0.0), (1, 0.5), (2, 0.5)])).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.time_deltas(), vec![0.0, 0.5, 0.0]);
        assert_eq!(store.duration(), 0.5);
    }

    #[test]
    fn test_strict_store_rejects_duplicates() {
        let result = FrameStore::new("gaze", frames(&[(0, 0.0), (0, 0.1)]));
        assert!(matches!(
            result,
            Err(AnalysisError::DuplicateFrame { frame_id: 0, .. })
        ));
    }

    #[test]
    fn test_strict_store_rejects_time_going_backwards() {
        let result = FrameStore::new("gaze", frames(&[(0, 1.0), (1, 0.5)]));
        assert!(matches!(
            result,
            Err(AnalysisError::NonMonotonicTimestamps { frame_id: 1, .. })
        ));
    }

    #[test]
    fn test_sanitize_keeps_first_occurrence_and_sorts() {
        let mut input = frames(&[(2, 2.0), (1, 1.0), (2, 9.0), (0, 0.0)]);
        input[0].aoi = Some("first".to_string());
        input[2].aoi = Some("second".to_string());

        let store = FrameStore::sanitize("gaze", input).unwrap();
        let ids: Vec<u64> = store.frames().iter().map(|f| f.frame_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(store.frames()[2].aoi.as_deref(), Some("first"));
    }

    #[test]
    fn test_nan_timestamp_rejected() {
        let result = FrameStore::sanitize("gaze", frames(&[(0, f64::NAN)]));
        assert!(matches!(result, Err(AnalysisError::InvalidTimestamp { .. })));
    }

    #[test]
    fn test_fill_sections_never_overwrites() {
        let mut input = frames(&[(0, 0.0), (1, 1.0)]);
        input[0].section = Some("Toys".to_string());
        let mut store = FrameStore::new("interactions", input).unwrap();
        store.fill_sections(vec!["Food".to_string(), "Food".to_string()]);

        assert_eq!(store.frames()[0].section.as_deref(), Some("Toys"));
        assert_eq!(store.frames()[1].section.as_deref(), Some("Food"));
    }

    #[test]
    fn test_require_reports_missing_column() {
        let store = FrameStore::new("tracking", frames(&[(0, 0.0)])).unwrap();
        let result = store.require("head", |f| f.head);
        assert!(matches!(result, Err(AnalysisError::MissingColumn { .. })));
    }

    #[test]
    fn test_optional_column() {
        let mut input = frames(&[(0, 0.0), (1, 1.0)]);
        let store = FrameStore::new("tracking", input.clone()).unwrap();
        assert_eq!(store.optional("RCHit", |f| f.gaze_hit).unwrap(), None);

        input[0].shelf_distance = Some(0.2);
        let store = FrameStore::new("tracking", input.clone()).unwrap();
        assert!(store.optional("Distance", |f| f.shelf_distance).is_err());

        input[1].shelf_distance = Some(0.4);
        let store = FrameStore::new("tracking", input).unwrap();
        assert_eq!(
            store.optional("Distance", |f| f.shelf_distance).unwrap(),
            Some(vec![0.2, 0.4])
        );
    }

    #[test]
    fn test_empty_store() {
        let store = FrameStore::new("gaze", Vec::new()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.duration(), 0.0);
        assert!(store.time_deltas().is_empty());
    }
}
