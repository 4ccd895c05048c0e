//! Report encoding
//!
//! This module wraps a session report in its producer envelope and serializes it as a
//! single JSON document or as NDJSON, one record per line.

use crate::error::AnalysisError;
use crate::pipeline::SessionReport;
use crate::{PRODUCER_NAME, VRSI_VERSION};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Envelope around a session report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEnvelope<'a> {
    pub schema_version: &'static str,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub report: &'a SessionReport,
}

/// Serialization layout of an encoded report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    JsonPretty,
    Ndjson,
}

/// Report encoder for producing enveloped output
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Wrap a report in its envelope
    pub fn envelope<'a>(&self, report: &'a SessionReport) -> ReportEnvelope<'a> {
        ReportEnvelope {
            schema_version: REPORT_SCHEMA_VERSION,
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: VRSI_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            report,
        }
    }

    pub fn encode(&self, report: &SessionReport, format: OutputFormat) -> Result<String, AnalysisError> {
        match format {
            OutputFormat::Json => self.encode_to_json(report),
            OutputFormat::JsonPretty => self.encode_to_json_pretty(report),
            OutputFormat::Ndjson => self.encode_to_ndjson(report),
        }
    }

    /// Encode to a compact JSON string
    pub fn encode_to_json(&self, report: &SessionReport) -> Result<String, AnalysisError> {
        serde_json::to_string(&self.envelope(report)).map_err(AnalysisError::JsonError)
    }

    /// Encode to an indented JSON string
    pub fn encode_to_json_pretty(&self, report: &SessionReport) -> Result<String, AnalysisError> {
        serde_json::to_string_pretty(&self.envelope(report)).map_err(AnalysisError::JsonError)
    }

    /// Encode as newline-delimited JSON.
    ///
    /// The first line is the envelope header; every following line is one record tagged
    /// with a `record` field (metrics block, episode, interaction span, fixation event or
    /// kinematic frame).
    pub fn encode_to_ndjson(&self, report: &SessionReport) -> Result<String, AnalysisError> {
        let envelope = self.envelope(report);
        let mut lines: Vec<Value> = vec![json!({
            "record": "header",
            "schema_version": envelope.schema_version,
            "producer": envelope.producer,
            "computed_at_utc": envelope.computed_at_utc,
            "session_id": report.session_id,
        })];

        if let Some(navigation) = &report.navigation {
            lines.push(tagged("navigation", navigation)?);
        }
        if let Some(gaze) = &report.gaze {
            lines.push(tagged("gaze", gaze)?);
        }
        if let Some(interaction) = &report.interaction {
            lines.push(tagged("interaction", interaction)?);
        }

        let episodes = &report.episodes;
        push_episodes(&mut lines, "zone", &episodes.zones)?;
        push_episodes(&mut lines, "section", &episodes.sections)?;
        push_episodes(&mut lines, "movement", &episodes.movement)?;
        push_episodes(&mut lines, "aoi", &episodes.aoi)?;
        push_episodes(&mut lines, "shelf", &episodes.shelves)?;
        push_episodes(&mut lines, "target", &episodes.targets)?;
        for span in &episodes.interactions {
            lines.push(tagged("interaction_span", span)?);
        }
        for event in &episodes.fixations {
            lines.push(tagged("fixation_event", event)?);
        }
        for frame in &report.kinematic_frames {
            lines.push(tagged("kinematic_frame", frame)?);
        }

        let mut out = String::new();
        for line in lines {
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        Ok(out)
    }
}

fn push_episodes<T: Serialize>(lines: &mut Vec<Value>, dimension: &str, episodes: &[T]) -> Result<(), AnalysisError> {
    for episode in episodes {
        let mut value = tagged("episode", episode)?;
        if let Value::Object(map) = &mut value {
            map.insert("dimension".to_string(), Value::from(dimension));
        }
        lines.push(value);
    }
    Ok(())
}

fn tagged<T: Serialize>(record: &str, value: &T) -> Result<Value, AnalysisError> {
    let mut value = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut value {
        map.insert("record".to_string(), Value::from(record));
    }
    Ok(value)
}
