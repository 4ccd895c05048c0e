//! Pipeline orchestration
//!
//! This module provides the public API for VRSI Analytics.
//! It runs one recorded session through the fixed stage order: frame store →
//! label propagation → kinematics → segmentation → metrics aggregation.

use crate::config::AnalysisConfig;
use crate::encoder::ReportEncoder;
use crate::error::AnalysisError;
use crate::fixation::{self, FixationClassifier, RecordedFixations};
use crate::interaction;
use crate::kinematics::{self, Projection};
use crate::labels;
use crate::metrics::{
    self, FixationEvent, GazeMetrics, InteractionMetrics, NavigationMetrics,
};
use crate::segmentation::{self, AoiShelf};
use crate::store::FrameStore;
use crate::types::{
    Episode, Frame, InteractionSpan, KinematicSample, MovementState, SessionInput, TeleportEvent,
    Vec3, Zone,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Derived per-frame view of the tracking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicFrame {
    pub frame_id: u64,
    pub timestamp: f64,
    pub zone: Zone,
    pub section: String,
    pub movement: MovementState,
    /// Planar head speed
    pub head: KinematicSample,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_hand: Option<KinematicSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_hand: Option<KinematicSample>,
}

/// Every episode table produced while analysing a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTables {
    pub zones: Vec<Episode<Zone>>,
    pub sections: Vec<Episode<String>>,
    pub movement: Vec<Episode<MovementState>>,
    pub aoi: Vec<Episode<String>>,
    pub shelves: Vec<Episode<String>>,
    pub targets: Vec<Episode<AoiShelf>>,
    pub interactions: Vec<InteractionSpan>,
    pub fixations: Vec<FixationEvent>,
}

/// Analysis result for one session. Tables the session did not record yield no metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gaze: Option<GazeMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction: Option<InteractionMetrics>,
    pub episodes: EpisodeTables,
    pub kinematic_frames: Vec<KinematicFrame>,
}

/// Row counts of a session that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub session_id: String,
    pub tracking_frames: usize,
    pub gaze_frames: usize,
    pub interaction_frames: usize,
    pub teleports: usize,
    pub cart_actions: usize,
    pub releases: usize,
}

/// Analyse a session given as JSON and return the encoded report.
///
/// # Arguments
/// * `session_json` - Session tables in the loader's JSON form
/// * `config` - Analysis configuration; validated before any computation
///
/// # Example
/// ```ignore
/// let report_json = analyze_session_json(&session_json, &AnalysisConfig::default())?;
/// ```
pub fn analyze_session_json(
    session_json: &str,
    config: &AnalysisConfig,
) -> Result<String, AnalysisError> {
    let analyzer = SessionAnalyzer::new(config.clone())?;
    let report = analyzer.analyze_json(session_json)?;
    ReportEncoder::new().encode_to_json(&report)
}

/// Parse session tables from JSON.
pub fn parse_session(session_json: &str) -> Result<SessionInput, AnalysisError> {
    serde_json::from_str(session_json).map_err(|e| AnalysisError::ParseError(e.to_string()))
}

/// Runs sessions through the analysis pipeline with one validated configuration.
pub struct SessionAnalyzer {
    config: AnalysisConfig,
    classifier: Box<dyn FixationClassifier>,
    sanitize: bool,
}

impl SessionAnalyzer {
    /// Create an analyzer; the configuration is checked here, before any data is read.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: Box::new(RecordedFixations),
            sanitize: false,
        })
    }

    /// Use an external fixation classifier instead of the recorded flags
    pub fn with_classifier(mut self, classifier: impl FixationClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Drop duplicate frame ids and sort tables by time instead of rejecting them
    pub fn sanitizing(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Parse and analyse a session given as JSON
    pub fn analyze_json(&self, session_json: &str) -> Result<SessionReport, AnalysisError> {
        self.analyze(parse_session(session_json)?)
    }

    /// Check the preconditions of every table without computing metrics.
    pub fn validate(&self, input: &SessionInput) -> Result<ValidationSummary, AnalysisError> {
        ensure_not_empty(input)?;
        let tracking = self.store("tracking", input.tracking.clone())?;
        let gaze = self.store("gaze", input.gaze.clone())?;
        let interactions = self.store("interactions", input.interactions.clone())?;
        let teleports = self.teleports(input.teleports.clone())?;

        Ok(ValidationSummary {
            session_id: input.session_id.clone(),
            tracking_frames: tracking.len(),
            gaze_frames: gaze.len(),
            interaction_frames: interactions.len(),
            teleports: teleports.len(),
            cart_actions: input.cart.len(),
            releases: input.releases.len(),
        })
    }

    /// Analyse one complete session.
    pub fn analyze(&self, input: SessionInput) -> Result<SessionReport, AnalysisError> {
        ensure_not_empty(&input)?;
        info!(
            session_id = %input.session_id,
            tracking = input.tracking.len(),
            gaze = input.gaze.len(),
            interactions = input.interactions.len(),
            "session_analysis_started"
        );

        let SessionInput {
            session_id,
            tracking,
            gaze,
            interactions,
            teleports,
            cart,
            releases,
        } = input;

        let teleports = self.teleports(teleports)?;
        let mut report = SessionReport {
            session_id,
            ..Default::default()
        };

        let tracking = self.store("tracking", tracking)?;
        if !tracking.is_empty() {
            let (navigation, frames) = self.navigation(tracking, &teleports, &mut report.episodes)?;
            report.navigation = Some(navigation);
            report.kinematic_frames = frames;
        }

        let gaze = self.store("gaze", gaze)?;
        if !gaze.is_empty() {
            report.gaze = Some(self.gaze(gaze, &mut report.episodes)?);
        }

        let interactions = self.store("interactions", interactions)?;
        if !interactions.is_empty() || !cart.is_empty() || !releases.is_empty() {
            let mut summary = self.interaction(interactions, &teleports, &mut report.episodes)?;
            summary.mean_release_duration = interaction::mean_release_durations(&releases, &self.config);
            summary.cart = metrics::cart_metrics(&cart, &summary.per_object, summary.total_interactions);
            report.interaction = Some(summary);
        }

        info!(
            session_id = %report.session_id,
            zone_episodes = report.episodes.zones.len(),
            aoi_episodes = report.episodes.aoi.len(),
            interactions = report.episodes.interactions.len(),
            "session_analysis_completed"
        );
        Ok(report)
    }

    fn store(&self, table: &str, frames: Vec<Frame>) -> Result<FrameStore, AnalysisError> {
        if self.sanitize {
            FrameStore::sanitize(table, frames)
        } else {
            FrameStore::new(table, frames)
        }
    }

    fn teleports(&self, mut teleports: Vec<TeleportEvent>) -> Result<Vec<TeleportEvent>, AnalysisError> {
        if self.sanitize {
            teleports.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        }
        for pair in teleports.windows(2) {
            if !(pair[1].timestamp >= pair[0].timestamp) {
                return Err(AnalysisError::NonMonotonicTimestamps {
                    table: "teleports".to_string(),
                    frame_id: pair[1].frame_id,
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }
        Ok(teleports)
    }

    fn navigation(
        &self,
        mut store: FrameStore,
        teleports: &[TeleportEvent],
        episodes: &mut EpisodeTables,
    ) -> Result<(NavigationMetrics, Vec<KinematicFrame>), AnalysisError> {
        let config = &self.config;

        // Stage 2: causal labels
        let sections = labels::assign_sections(&store, teleports, config)?;
        store.fill_sections(sections);
        let zones = labels::assign_zones(&store, teleports, &config.zones)?;
        store.fill_zones(zones);

        let zones: Vec<Zone> = store.require("Zone", |f| f.zone)?;
        let sections: Vec<String> = store.require("Section", |f| f.section.clone())?;
        let head: Vec<Vec3> = store.require("HMD", |f| f.head)?;
        let ids: Vec<u64> = store.frames().iter().map(|f| f.frame_id).collect();
        let times = store.timestamps();
        let deltas = store.time_deltas();

        // Stage 3: kinematics
        let cutoff = config.outlier_z_cutoff;
        let head_samples = kinematics::estimate(&ids, &head, &deltas, Projection::Planar, cutoff);
        let movement = kinematics::movement_states(&head, config.movement_stop_distance);
        let right = hand_kinematics(&store, "Velocity_HandR", |f| f.right_hand_velocity, &ids, &deltas, cutoff)?;
        let left = hand_kinematics(&store, "Velocity_HandL", |f| f.left_hand_velocity, &ids, &deltas, cutoff)?;

        let teleport_frames: HashSet<u64> = teleports
            .iter()
            .filter(|tp| tp.was_teleport)
            .map(|tp| tp.frame_id)
            .collect();

        // Stage 4: segmentation
        episodes.zones = segmentation::segment(&ids, &times, &zones);
        episodes.sections = segmentation::segment(&ids, &times, &sections);
        episodes.movement = segmentation::segment(&ids, &times, &movement);
        debug!(
            zones = episodes.zones.len(),
            sections = episodes.sections.len(),
            movement = episodes.movement.len(),
            "tracking_segmented"
        );

        // Stage 5: aggregation
        let navigation = NavigationMetrics {
            total_time: deltas.iter().sum(),
            distance_travelled: kinematics::distance_without_teleports(&ids, &head, &teleport_frames),
            movement: metrics::movement_summary(&episodes.movement),
            teleports: metrics::teleport_summary(teleports),
            zones: segmentation::category_stats(&zones, &deltas, &episodes.zones),
            sections: segmentation::category_stats(&sections, &deltas, &episodes.sections),
            head_speed: kinematics::summarize_inliers(
                &head_samples.iter().map(|s| s.velocity).collect::<Vec<_>>(),
                &head_samples.iter().map(|s| s.outlier).collect::<Vec<_>>(),
            ),
            head_speed_by_zone: metrics::speed_by_category(&zones, &head_samples),
            right_hand: right
                .as_ref()
                .map(|(vectors, samples)| metrics::hand_summary(vectors, samples)),
            left_hand: left
                .as_ref()
                .map(|(vectors, samples)| metrics::hand_summary(vectors, samples)),
        };

        let frames = store
            .frames()
            .iter()
            .enumerate()
            .map(|(i, frame)| KinematicFrame {
                frame_id: frame.frame_id,
                timestamp: frame.timestamp,
                zone: zones[i],
                section: sections[i].clone(),
                movement: movement[i],
                head: head_samples[i],
                right_hand: right.as_ref().map(|(_, samples)| samples[i]),
                left_hand: left.as_ref().map(|(_, samples)| samples[i]),
            })
            .collect();

        Ok((navigation, frames))
    }

    fn gaze(&self, store: FrameStore, episodes: &mut EpisodeTables) -> Result<GazeMetrics, AnalysisError> {
        let aoi: Vec<String> = store.require("Product/AOI", |f| f.aoi.clone())?;
        let shelves: Vec<String> = store.require("Section/Shelf", |f| f.shelf.clone())?;
        let targets: Vec<AoiShelf> = shelves
            .iter()
            .zip(&aoi)
            .map(|(shelf, aoi)| AoiShelf {
                shelf: shelf.clone(),
                aoi: aoi.clone(),
            })
            .collect();

        let ids: Vec<u64> = store.frames().iter().map(|f| f.frame_id).collect();
        let times = store.timestamps();
        let deltas = store.time_deltas();
        let gaze_speeds = store
            .optional("RCHit", |f| f.gaze_hit)?
            .map(|hits| kinematics::velocities(&hits, &deltas, Projection::Spatial));

        let frames = fixation::annotate(self.classifier.as_ref(), store.into_frames(), &self.config.fixation)?;

        episodes.aoi = segmentation::segment(&ids, &times, &aoi);
        episodes.shelves = segmentation::segment(&ids, &times, &shelves);
        episodes.targets = segmentation::segment(&ids, &times, &targets);
        episodes.fixations = metrics::fixation_events(&frames, &targets);
        debug!(
            aoi = episodes.aoi.len(),
            shelves = episodes.shelves.len(),
            targets = episodes.targets.len(),
            fixations = episodes.fixations.len(),
            "gaze_segmented"
        );

        Ok(GazeMetrics {
            observation_time: deltas.iter().sum(),
            aoi: segmentation::category_stats(&aoi, &deltas, &episodes.aoi),
            shelves: segmentation::category_stats(&shelves, &deltas, &episodes.shelves),
            targets: segmentation::category_stats(&targets, &deltas, &episodes.targets),
            attention: metrics::target_attention(
                &frames,
                &targets,
                gaze_speeds.as_deref(),
                &episodes.fixations,
            ),
            fixation: metrics::fixation_summary(&frames, &deltas, &episodes.fixations),
        })
    }

    fn interaction(
        &self,
        mut store: FrameStore,
        teleports: &[TeleportEvent],
        episodes: &mut EpisodeTables,
    ) -> Result<InteractionMetrics, AnalysisError> {
        let sections = labels::assign_sections(&store, teleports, &self.config)?;
        store.fill_sections(sections);
        let sections: Vec<String> = store.require("Section", |f| f.section.clone())?;

        let spans = interaction::extract_spans(store.table(), store.frames())?;
        let mut summary = InteractionMetrics::from_spans(&spans)?;
        summary.section_share_pct = metrics::section_share(&sections);
        summary.mean_interaction_duration = interaction::mean_span_durations(&spans, &self.config);

        episodes.interactions = spans;
        Ok(summary)
    }
}

/// Speed samples from a recorded hand velocity column, if the table carries one.
fn hand_kinematics(
    store: &FrameStore,
    column: &str,
    get: impl Fn(&Frame) -> Option<Vec3>,
    ids: &[u64],
    deltas: &[f64],
    cutoff: f64,
) -> Result<Option<(Vec<Vec3>, Vec<KinematicSample>)>, AnalysisError> {
    Ok(store.optional(column, get)?.map(|vectors| {
        let speeds: Vec<f64> = vectors.iter().map(Vec3::magnitude).collect();
        let samples = kinematics::samples_from_speeds(ids, &speeds, deltas, cutoff);
        (vectors, samples)
    }))
}

fn ensure_not_empty(input: &SessionInput) -> Result<(), AnalysisError> {
    if input.tracking.is_empty() && input.gaze.is_empty() && input.interactions.is_empty() {
        return Err(AnalysisError::EmptyStream(format!(
            "session '{}' has no tracking, gaze or interaction frames",
            input.session_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixationParams;
    use crate::types::{CartAction, CartActionKind, HandState};
    use pretty_assertions::assert_eq;

    fn tracking_frame(id: u64, t: f64, x: f64, distance: f64) -> Frame {
        let mut frame = Frame::new(id, t);
        frame.head = Some(Vec3::new(x, 1.7, 0.0));
        frame.shelf_distance = Some(distance);
        frame
    }

    fn gaze_frame(id: u64, t: f64, shelf: &str, aoi: &str, fixation: bool) -> Frame {
        let mut frame = Frame::new(id, t);
        frame.shelf = Some(shelf.to_string());
        frame.aoi = Some(aoi.to_string());
        frame.fixation = fixation;
        frame
    }

    fn interaction_frame(id: u64, object: &str, right: HandState, left: HandState) -> Frame {
        let mut frame = Frame::new(id, id as f64);
        frame.object = Some(object.to_string());
        frame.right_hand_state = Some(right);
        frame.left_hand_state = Some(left);
        frame
    }

    fn teleport(frame_id: u64, t: f64, hotspot: &str) -> TeleportEvent {
        TeleportEvent {
            frame_id,
            timestamp: t,
            hotspot: hotspot.to_string(),
            was_teleport: true,
            duration: 1.0,
        }
    }

    fn sample_session() -> SessionInput {
        SessionInput {
            session_id: "test-session".to_string(),
            tracking: vec![
                tracking_frame(0, 0.0, 0.0, 1.0),
                tracking_frame(1, 1.0, 0.0, 1.0),
                tracking_frame(2, 2.0, 0.5, 0.1),
                tracking_frame(3, 3.0, 0.5, 0.1),
                tracking_frame(4, 4.0, 0.5, 0.1),
                tracking_frame(5, 5.0, 1.0, 0.5),
            ],
            gaze: vec![
                gaze_frame(0, 0.0, "S1", "Milk", false),
                gaze_frame(1, 0.5, "S1", "Milk", true),
                gaze_frame(2, 1.0, "S1", "Eggs", true),
                gaze_frame(3, 1.5, "S1", "Milk", false),
            ],
            interactions: vec![
                interaction_frame(0, "Milk", HandState::Normal, HandState::Normal),
                interaction_frame(1, "Milk", HandState::Select, HandState::Normal),
                interaction_frame(2, "Milk", HandState::Select, HandState::Select),
                interaction_frame(3, "Eggs", HandState::Normal, HandState::Select),
            ],
            teleports: vec![teleport(1, 1.0, "TP_Food1"), teleport(4, 4.0, "TP_Toys2")],
            cart: vec![
                CartAction {
                    item: "Milk".to_string(),
                    action: CartActionKind::Add,
                    timestamp: 2.5,
                },
                CartAction {
                    item: "Milk".to_string(),
                    action: CartActionKind::Remove,
                    timestamp: 4.0,
                },
            ],
            releases: Vec::new(),
        }
    }

    fn analyzer() -> SessionAnalyzer {
        SessionAnalyzer::new(AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_full_session() {
        let report = analyzer().analyze(sample_session()).unwrap();
        assert_eq!(report.session_id, "test-session");

        let zones: Vec<(Zone, f64)> = report
            .episodes
            .zones
            .iter()
            .map(|e| (e.category, e.duration))
            .collect();
        assert_eq!(
            zones,
            vec![(Zone::Start, 0.0), (Zone::Far, 0.0), (Zone::Shelf, 2.0), (Zone::Near, 0.0)]
        );

        let sections: Vec<&str> = report
            .kinematic_frames
            .iter()
            .map(|f| f.section.as_str())
            .collect();
        assert_eq!(sections, vec!["NIAS", "Food", "Food", "Food", "Toys", "Toys"]);

        let navigation = report.navigation.as_ref().unwrap();
        assert_eq!(navigation.total_time, 5.0);
        assert_eq!(navigation.teleports.successful, 2);
        assert_eq!(navigation.distance_travelled, 1.0);
        assert!(navigation.right_hand.is_none());

        let gaze = report.gaze.as_ref().unwrap();
        assert_eq!(gaze.observation_time, 1.5);
        let milk = gaze.aoi.iter().find(|s| s.category == "Milk").unwrap();
        assert_eq!(milk.visits, 2);
        assert_eq!(gaze.fixation.fixation_time, 1.0);

        let interaction = report.interaction.as_ref().unwrap();
        assert_eq!(interaction.total_interactions, 3);
        assert_eq!(interaction.per_object["Milk"], 2);
        assert_eq!(interaction.cart.adds, 1);
        assert_eq!(interaction.cart.hold_times.mean, 1.5);
        assert!((interaction.cart.conversion_ratio - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let first = analyzer().analyze(sample_session()).unwrap();
        let second = analyzer().analyze(sample_session()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_config_rejected_before_analysis() {
        let mut config = AnalysisConfig::default();
        config.zones.shelf = 0.9;
        assert!(matches!(
            SessionAnalyzer::new(config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_session() {
        let result = analyzer().analyze(SessionInput::default());
        assert!(matches!(result, Err(AnalysisError::EmptyStream(_))));
    }

    #[test]
    fn test_duplicate_frames_need_sanitizing() {
        let mut session = sample_session();
        session.gaze.push(gaze_frame(3, 2.0, "S1", "Tea", false));

        assert!(matches!(
            analyzer().analyze(session.clone()),
            Err(AnalysisError::DuplicateFrame { .. })
        ));

        let report = analyzer().sanitizing(true).analyze(session).unwrap();
        assert_eq!(report.gaze.unwrap().observation_time, 1.5);
    }

    #[test]
    fn test_unordered_teleports_fail_fast() {
        let mut session = sample_session();
        session.teleports.reverse();
        assert!(matches!(
            analyzer().analyze(session.clone()),
            Err(AnalysisError::NonMonotonicTimestamps { .. })
        ));
        assert!(analyzer().sanitizing(true).analyze(session).is_ok());
    }

    #[test]
    fn test_classifier_failure_propagates() {
        struct Unavailable;
        impl FixationClassifier for Unavailable {
            fn classify(&self, _: Vec<Frame>, _: &FixationParams) -> Result<Vec<Frame>, AnalysisError> {
                Err(AnalysisError::Classifier("not installed".to_string()))
            }
        }

        let result = analyzer().with_classifier(Unavailable).analyze(sample_session());
        assert!(matches!(result, Err(AnalysisError::Classifier(_))));
    }

    #[test]
    fn test_interactions_without_hand_states_fail() {
        let mut session = sample_session();
        for frame in &mut session.interactions {
            frame.right_hand_state = None;
            frame.left_hand_state = None;
        }

        let result = analyzer().analyze(session);
        assert!(matches!(
            result,
            Err(AnalysisError::MissingColumn { ref table, ref column })
                if table == "interactions" && column == "RightHand_State"
        ));
    }

    #[test]
    fn test_validate_counts_rows() {
        let summary = analyzer().validate(&sample_session()).unwrap();
        assert_eq!(summary.tracking_frames, 6);
        assert_eq!(summary.gaze_frames, 4);
        assert_eq!(summary.teleports, 2);
    }

    #[test]
    fn test_analyze_session_json() {
        let json = serde_json::to_string(&sample_session()).unwrap();
        let output = analyze_session_json(&json, &AnalysisConfig::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["report"]["session_id"], "test-session");
        assert_eq!(parsed["producer"]["name"], crate::PRODUCER_NAME);
    }

    #[test]
    fn test_invalid_json() {
        let result = analyze_session_json("not valid json", &AnalysisConfig::default());
        assert!(matches!(result, Err(AnalysisError::ParseError(_))));
    }
}
