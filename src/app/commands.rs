//! Inbound commands to the feed controller.
//!
//! POST bodies are flat JSON objects whose `command` field names the
//! action; the remaining fields are its parameters:
//!
//! ```json
//! {"command": "run_motor", "duty_cycle": 60, "duration": 2000, "period": 10}
//! {"command": "feed_fish", "override": true}
//! {"command": "set_auto_mode", "enabled": false}
//! ```
//!
//! Parsing happens in two steps so the error says which part was wrong: the
//! body must be JSON, carry a string `command`, name a known command, and
//! only then are the parameters checked.

use core::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Commands the request server can send into the application core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AppCommand {
    /// Run the motor once with explicit PWM parameters (clamped, not
    /// rejected, when out of range).
    RunMotor {
        #[serde(default = "default_duty_cycle", deserialize_with = "truncating_int")]
        duty_cycle: i64,
        #[serde(default = "default_duration", deserialize_with = "truncating_int")]
        duration: i64,
        #[serde(default = "default_period", deserialize_with = "truncating_int")]
        period: i64,
    },

    /// Run the configured feed sequence.  `override` bypasses detection.
    FeedFish {
        #[serde(rename = "override", default)]
        override_detection: bool,
    },

    /// Take one pH sample now.
    ReadPh,

    /// Open (or re-open) the analog channel.
    #[serde(alias = "init_ph_sensor")]
    InitAnalogSensor,

    /// Switch automatic feeding on or off.
    SetAutoMode { enabled: bool },
}

/// Any JSON number; fractions are truncated toward zero and values past the
/// `i64` range saturate.
fn truncating_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(i64),
        Float(f64),
    }

    Ok(match Number::deserialize(deserializer)? {
        Number::Int(n) => n,
        Number::Float(f) => f as i64,
    })
}

fn default_duty_cycle() -> i64 {
    100
}

fn default_duration() -> i64 {
    1_000
}

fn default_period() -> i64 {
    10
}

const KNOWN_COMMANDS: [&str; 6] = [
    "run_motor",
    "feed_fish",
    "read_ph",
    "init_analog_sensor",
    "init_ph_sensor",
    "set_auto_mode",
];

/// Why a POST body was not turned into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    MalformedJson(String),
    MissingCommand,
    UnknownCommand(String),
    InvalidParams { command: String, reason: String },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson(msg) => write!(f, "malformed JSON: {msg}"),
            Self::MissingCommand => write!(f, "no command specified"),
            Self::UnknownCommand(name) => write!(f, "unknown command: {name}"),
            Self::InvalidParams { command, reason } => {
                write!(f, "invalid parameters for {command}: {reason}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Parse one POST body.
pub fn parse_command(body: &str) -> Result<AppCommand, ProtocolError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    let name = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingCommand)?;
    if !KNOWN_COMMANDS.contains(&name) {
        return Err(ProtocolError::UnknownCommand(name.to_owned()));
    }
    let command = name.to_owned();
    AppCommand::deserialize(value).map_err(|e| ProtocolError::InvalidParams {
        command,
        reason: e.to_string(),
    })
}
