//! Causal label propagation
//!
//! Sparse, timestamped events (teleports) are forward-filled onto the dense frame
//! stream: every frame takes the label of the latest event at or before its timestamp,
//! and frames before the first event take a sentinel. The join is a single forward
//! sweep over both ordered sequences.

use crate::config::{AnalysisConfig, ZoneBreakpoints};
use crate::error::AnalysisError;
use crate::store::FrameStore;
use crate::types::{TeleportEvent, Zone};
use tracing::debug;

/// Running state of the as-of join.
struct Cursor<L> {
    next_event: usize,
    current: L,
}

/// Assign to each frame time the label of the most recent event with
/// `event_time <= frame_time`, or `sentinel` when no such event exists.
///
/// Both sequences must be ordered by time; an out-of-order event sequence is
/// rejected rather than silently mislabelling frames.
pub fn propagate_labels<L: Clone>(
    source: &str,
    frame_times: &[f64],
    events: &[(f64, L)],
    sentinel: L,
) -> Result<Vec<L>, AnalysisError> {
    ensure_ordered(source, events.iter().map(|(t, _)| *t))?;
    ensure_ordered("frames", frame_times.iter().copied())?;

    let cursor = Cursor {
        next_event: 0,
        current: sentinel,
    };

    let labels = frame_times
        .iter()
        .scan(cursor, |cursor, &t| {
            while let Some((event_time, label)) = events.get(cursor.next_event) {
                if *event_time > t {
                    break;
                }
                cursor.current = label.clone();
                cursor.next_event += 1;
            }
            Some(cursor.current.clone())
        })
        .collect();

    Ok(labels)
}

fn ensure_ordered(source: &str, times: impl Iterator<Item = f64>) -> Result<(), AnalysisError> {
    let mut previous: Option<f64> = None;
    for (position, t) in times.enumerate() {
        if let Some(prev) = previous {
            if t < prev || t.is_nan() {
                return Err(AnalysisError::UnorderedEvents {
                    source_name: source.to_string(),
                    position,
                    previous: prev,
                    current: t,
                });
            }
        }
        previous = Some(t);
    }
    Ok(())
}

/// Resolve a hotspot name such as `TP_Food1` to its store section.
///
/// The letters immediately following `TP_` form the section name; anything not in the
/// configured set maps to the sentinel.
pub fn parse_section(hotspot: &str, valid_sections: &[String], sentinel: &str) -> String {
    let letters: Option<String> = hotspot.find("TP_").map(|pos| {
        hotspot[pos + 3..]
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect()
    });

    match letters {
        Some(name) if !name.is_empty() && valid_sections.iter().any(|s| *s == name) => name,
        _ => sentinel.to_string(),
    }
}

/// Section-change events from the teleport table; only successful teleports count.
pub fn section_events(teleports: &[TeleportEvent], config: &AnalysisConfig) -> Vec<(f64, String)> {
    teleports
        .iter()
        .filter(|tp| tp.was_teleport)
        .map(|tp| {
            (
                tp.timestamp,
                parse_section(&tp.hotspot, &config.valid_sections, &config.sentinel_section),
            )
        })
        .collect()
}

/// Store section for every frame, causally attributed from the teleport history.
pub fn assign_sections(
    store: &FrameStore,
    teleports: &[TeleportEvent],
    config: &AnalysisConfig,
) -> Result<Vec<String>, AnalysisError> {
    let events = section_events(teleports, config);
    let labels = propagate_labels(
        "teleports",
        &store.timestamps(),
        &events,
        config.sentinel_section.clone(),
    )?;
    debug!(
        table = store.table(),
        events = events.len(),
        frames = labels.len(),
        "sections_assigned"
    );
    Ok(labels)
}

/// Distance band for a shelf distance; each upper bound is inclusive.
pub fn classify_zone(distance: f64, breakpoints: &ZoneBreakpoints) -> Zone {
    if distance <= breakpoints.shelf {
        Zone::Shelf
    } else if distance <= breakpoints.adjacent {
        Zone::Adjacent
    } else if distance <= breakpoints.near {
        Zone::Near
    } else {
        Zone::Far
    }
}

/// Zone for every frame of the tracking table.
///
/// Recorded zones are kept. Otherwise frames before the first successful teleport are
/// `Start`, and later frames are classified from their shelf distance. A session with
/// no successful teleport is classified entirely by distance.
pub fn assign_zones(
    store: &FrameStore,
    teleports: &[TeleportEvent],
    breakpoints: &ZoneBreakpoints,
) -> Result<Vec<Option<Zone>>, AnalysisError> {
    let first_teleport = teleports
        .iter()
        .filter(|tp| tp.was_teleport)
        .map(|tp| tp.timestamp)
        .reduce(f64::min);

    let times = store.timestamps();
    let started = match first_teleport {
        Some(t) => propagate_labels("teleports", &times, &[(t, true)], false)?,
        None => vec![true; times.len()],
    };

    store
        .frames()
        .iter()
        .zip(started)
        .map(|(frame, started)| {
            if let Some(zone) = frame.zone {
                return Ok(Some(zone));
            }
            if !started {
                return Ok(Some(Zone::Start));
            }
            frame
                .shelf_distance
                .map(|d| Some(classify_zone(d, breakpoints)))
                .ok_or_else(|| AnalysisError::missing_column(store.table(), "Distance"))
        })
        .collect()
}
