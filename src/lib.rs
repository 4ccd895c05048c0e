//! VRSI Analytics - Behavioural analytics engine for VR shopping sessions
//!
//! The engine turns per-frame VR telemetry (head and hand tracking, gaze hits, teleports,
//! grab states, cart actions) into behavioural metrics through a deterministic batch
//! pipeline: frame store → causal label propagation → kinematic estimation → episode
//! segmentation → metrics aggregation → report encoding.
//!
//! ## Modules
//!
//! - **Navigation**: zones, store sections, movement episodes, head and hand kinematics
//! - **Gaze**: AOI and shelf visits, dwell times, fixation and saccade statistics
//! - **Interaction**: hand-attributed interaction spans, cart conversion and hold times

pub mod config;
pub mod encoder;
pub mod error;
pub mod fixation;
pub mod interaction;
pub mod kinematics;
pub mod labels;
pub mod metrics;
pub mod pipeline;
pub mod segmentation;
pub mod store;
pub mod types;

pub use config::{AnalysisConfig, FixationParams, ZoneBreakpoints};
pub use encoder::{OutputFormat, ReportEncoder};
pub use error::AnalysisError;
pub use fixation::{FixationClassifier, RecordedFixations};
pub use pipeline::{analyze_session_json, parse_session, SessionAnalyzer, SessionReport};
pub use store::FrameStore;
pub use types::{Episode, Frame, SessionInput};

/// Engine version embedded in every report
pub const VRSI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report envelopes
pub const PRODUCER_NAME: &str = "vrsi-analytics";
