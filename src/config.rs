//! Analysis configuration
//!
//! Every threshold the engine recognizes lives here, with the defaults used by the
//! recording environment. The configuration is validated once, before any computation.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Distance breakpoints (world units) separating the shelf zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneBreakpoints {
    pub shelf: f64,
    pub adjacent: f64,
    pub near: f64,
}

impl Default for ZoneBreakpoints {
    fn default() -> Self {
        Self {
            shelf: 0.15,
            adjacent: 0.325,
            near: 0.55,
        }
    }
}

/// Parameters handed to the external fixation classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixationParams {
    /// Minimum fixation duration in seconds
    pub min_duration: f64,
    /// Maximum dispersion angle in degrees
    pub max_angle: f64,
    /// Minimum sampling frequency in Hz
    pub min_frequency: f64,
}

impl Default for FixationParams {
    fn default() -> Self {
        Self {
            min_duration: 0.15,
            max_angle: 1.5,
            min_frequency: 30.0,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Displacement below which a frame counts as "Stop"
    pub movement_stop_distance: f64,
    pub zones: ZoneBreakpoints,
    /// Samples with |z| at or above this are excluded from aggregates
    pub outlier_z_cutoff: f64,
    /// Store sections a teleport hotspot may resolve to
    pub valid_sections: Vec<String>,
    /// Label for frames with no valid section
    pub sentinel_section: String,
    /// Interactable scaffolding that is not a product
    pub placeholder_objects: Vec<String>,
    pub fixation: FixationParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            movement_stop_distance: 0.01,
            zones: ZoneBreakpoints::default(),
            outlier_z_cutoff: 3.0,
            valid_sections: ["Food", "Technology", "Decoration", "Toys", "Fashion"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sentinel_section: "NIAS".to_string(),
            placeholder_objects: vec![
                "HandGrabInteractable".to_string(),
                "HandGrabInteractable_mirror".to_string(),
            ],
            fixation: FixationParams::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        serde_json::from_str(json)
            .map_err(|e| AnalysisError::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check every option before the pipeline touches any data.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        require_positive("movement_stop_distance", self.movement_stop_distance)?;
        require_positive("outlier_z_cutoff", self.outlier_z_cutoff)?;

        let zones = &self.zones;
        require_positive("zones.shelf", zones.shelf)?;
        require_positive("zones.adjacent", zones.adjacent)?;
        require_positive("zones.near", zones.near)?;
        if !(zones.shelf < zones.adjacent && zones.adjacent < zones.near) {
            return Err(AnalysisError::InvalidConfig(format!(
                "Zone breakpoints must be strictly increasing (shelf {} < adjacent {} < near {})",
                zones.shelf, zones.adjacent, zones.near
            )));
        }

        if self.valid_sections.iter().all(|s| s.trim().is_empty()) {
            return Err(AnalysisError::InvalidConfig(
                "At least one valid section is required".to_string(),
            ));
        }
        if self.sentinel_section.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "Sentinel section label must not be empty".to_string(),
            ));
        }

        require_positive("fixation.min_duration", self.fixation.min_duration)?;
        require_positive("fixation.max_angle", self.fixation.max_angle)?;
        require_positive("fixation.min_frequency", self.fixation.min_frequency)?;

        Ok(())
    }

    pub fn is_placeholder(&self, object: &str) -> bool {
        self.placeholder_objects.iter().any(|p| p == object)
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::InvalidConfig(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )))
    }
}
