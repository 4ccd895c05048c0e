//! Core data types for VR session telemetry
//!
//! This module defines the frame model recorded by the VR shopping environment and the
//! derived records (episodes, kinematic samples, interaction spans) that flow through
//! the analysis pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A point or vector in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length of the vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to another point in 3D
    pub fn distance(&self, other: &Vec3) -> f64 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z).magnitude()
    }

    /// Distance on the horizontal (x, z) plane, ignoring height
    pub fn planar_distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// Distance band of the player relative to the nearest shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zone {
    /// Before the first successful teleport
    Start,
    Shelf,
    Adjacent,
    Near,
    Far,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zone::Start => "Start",
            Zone::Shelf => "Shelf",
            Zone::Adjacent => "Adjacent",
            Zone::Near => "Near",
            Zone::Far => "Far",
        };
        f.write_str(name)
    }
}

/// Point-to-point movement classification of the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MovementState {
    Stop,
    Move,
}

/// Interactor state reported for a single hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HandState {
    Normal,
    Hover,
    Select,
    Disabled,
    Other(String),
}

impl HandState {
    pub fn is_selecting(&self) -> bool {
        matches!(self, HandState::Select)
    }
}

impl From<String> for HandState {
    fn from(value: String) -> Self {
        match value.trim() {
            "Normal" => HandState::Normal,
            "Hover" => HandState::Hover,
            "Select" => HandState::Select,
            "Disabled" => HandState::Disabled,
            other => HandState::Other(other.to_string()),
        }
    }
}

impl From<HandState> for String {
    fn from(value: HandState) -> Self {
        match value {
            HandState::Normal => "Normal".to_string(),
            HandState::Hover => "Hover".to_string(),
            HandState::Select => "Select".to_string(),
            HandState::Disabled => "Disabled".to_string(),
            HandState::Other(s) => s,
        }
    }
}

/// One simulation tick of recorded telemetry.
///
/// Every table of a session (head/hand tracking, gaze, product interaction) is a stream
/// of frames; columns that a table does not record stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(alias = "Frame")]
    pub frame_id: u64,
    /// Seconds since session start
    #[serde(alias = "Timestamp")]
    pub timestamp: f64,

    #[serde(default, alias = "HMD", skip_serializing_if = "Option::is_none")]
    pub head: Option<Vec3>,
    #[serde(default, alias = "HandR", skip_serializing_if = "Option::is_none")]
    pub right_hand: Option<Vec3>,
    #[serde(default, alias = "HandL", skip_serializing_if = "Option::is_none")]
    pub left_hand: Option<Vec3>,
    /// Hand velocity vector as sampled by the recorder
    #[serde(default, alias = "Velocity_HandR", skip_serializing_if = "Option::is_none")]
    pub right_hand_velocity: Option<Vec3>,
    #[serde(default, alias = "Velocity_HandL", skip_serializing_if = "Option::is_none")]
    pub left_hand_velocity: Option<Vec3>,
    /// World-space point hit by the gaze ray
    #[serde(default, alias = "RCHit", skip_serializing_if = "Option::is_none")]
    pub gaze_hit: Option<Vec3>,

    #[serde(
        default,
        alias = "Product/AOI",
        alias = "AOI",
        deserialize_with = "trimmed",
        skip_serializing_if = "Option::is_none"
    )]
    pub aoi: Option<String>,
    #[serde(
        default,
        alias = "Section/Shelf",
        alias = "Shelf",
        deserialize_with = "trimmed",
        skip_serializing_if = "Option::is_none"
    )]
    pub shelf: Option<String>,
    #[serde(
        default,
        alias = "Section",
        deserialize_with = "trimmed",
        skip_serializing_if = "Option::is_none"
    )]
    pub section: Option<String>,
    #[serde(default, alias = "Zone", skip_serializing_if = "Option::is_none")]
    pub zone: Option<Zone>,
    /// Distance from the player to the closest shelf
    #[serde(default, alias = "Distance", skip_serializing_if = "Option::is_none")]
    pub shelf_distance: Option<f64>,

    #[serde(default, deserialize_with = "flag")]
    pub fixation: bool,
    #[serde(default, deserialize_with = "flag")]
    pub fixation_start: bool,
    #[serde(default, deserialize_with = "flag")]
    pub fixation_end: bool,
    #[serde(default)]
    pub fixation_duration: f64,

    #[serde(
        default,
        alias = "Object",
        deserialize_with = "trimmed",
        skip_serializing_if = "Option::is_none"
    )]
    pub object: Option<String>,
    #[serde(default, alias = "RightHand_State", skip_serializing_if = "Option::is_none")]
    pub right_hand_state: Option<HandState>,
    #[serde(default, alias = "LeftHand_State", skip_serializing_if = "Option::is_none")]
    pub left_hand_state: Option<HandState>,
}

impl Frame {
    pub fn new(frame_id: u64, timestamp: f64) -> Self {
        Self {
            frame_id,
            timestamp,
            ..Default::default()
        }
    }
}

/// A row of the teleport table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportEvent {
    #[serde(alias = "Frame")]
    pub frame_id: u64,
    #[serde(alias = "Timestamp")]
    pub timestamp: f64,
    /// Name of the teleport hotspot, e.g. `TP_Food1`
    #[serde(alias = "TPHotspot", deserialize_with = "trimmed_string")]
    pub hotspot: String,
    /// Whether the teleport attempt succeeded
    #[serde(alias = "WasTP", deserialize_with = "flag")]
    pub was_teleport: bool,
    /// Seconds since the previous teleport row
    #[serde(default, alias = "Duration")]
    pub duration: f64,
}

/// Shopping cart action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CartActionKind {
    Add,
    Remove,
}

/// A row of the shopping cart table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartAction {
    #[serde(alias = "Item", deserialize_with = "trimmed_string")]
    pub item: String,
    #[serde(alias = "Action")]
    pub action: CartActionKind,
    #[serde(alias = "Timestamp")]
    pub timestamp: f64,
}

/// A row of the product release table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRelease {
    #[serde(alias = "Object", deserialize_with = "trimmed_string")]
    pub object: String,
    /// Seconds the product was held before release
    #[serde(alias = "DurationUntilRelease")]
    pub duration_until_release: f64,
}

/// Complete recorded session as produced by the loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInput {
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// Head and hand tracking frames
    #[serde(default)]
    pub tracking: Vec<Frame>,
    /// Eye tracking frames (AOI / shelf labelled)
    #[serde(default)]
    pub gaze: Vec<Frame>,
    /// Product interaction frames
    #[serde(default)]
    pub interactions: Vec<Frame>,
    #[serde(default)]
    pub teleports: Vec<TeleportEvent>,
    #[serde(default)]
    pub cart: Vec<CartAction>,
    #[serde(default)]
    pub releases: Vec<ProductRelease>,
}

fn default_session_id() -> String {
    "session".to_string()
}

/// A maximal run of consecutive frames sharing one category value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode<K> {
    /// 1-based, assigned in stream order
    pub episode_id: u32,
    pub category: K,
    pub start_frame: u64,
    pub end_frame: u64,
    pub start_time: f64,
    pub end_time: f64,
    /// Sum of inter-frame deltas inside the run
    pub duration: f64,
    pub frame_count: usize,
}

/// Per-frame derived kinematics of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicSample {
    pub frame_id: u64,
    pub velocity: f64,
    pub acceleration: f64,
    /// Velocity excluded from aggregate statistics (|z| at or above the cutoff)
    pub outlier: bool,
    /// Acceleration excluded from aggregate statistics, judged on its own column
    pub acceleration_outlier: bool,
}

/// Which hand(s) held the select state during an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HandUsage {
    #[serde(rename = "Right Hand")]
    Right,
    #[serde(rename = "Left Hand")]
    Left,
    #[serde(rename = "Both Hands")]
    Both,
}

/// One continuous engagement of a hand (or both) with an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSpan {
    pub object: String,
    pub hand: HandUsage,
    pub start_frame: u64,
    pub end_frame: u64,
    pub start_time: f64,
    pub end_time: f64,
}

impl InteractionSpan {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

fn trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(|s| s.trim().to_string()))
}

fn trimmed_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().to_string())
}

/// Recorder flags arrive as booleans, 0/1 numbers, or "True"/"False" strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match FlagRepr::deserialize(deserializer)? {
        FlagRepr::Bool(b) => b,
        FlagRepr::Int(i) => i != 0,
        FlagRepr::Float(f) => f != 0.0,
        FlagRepr::Text(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
    })
}
