//! Event-driven entry point.
//!
//! Whatever delivers compaction requests (a scheduler, an operator, an API)
//! hands a [`CompactEvent`] to [`handle_compact`], which always answers with
//! a [`CompactionResult`]. Engine failures become a `failed` result instead
//! of an error, so the delivering side never has to interpret one.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info};

use crate::engine::{CompactionEngine, CompactionResult, RunOptions};

/// Who asked for the run.
///
/// The three known sources get their own variant; any other label is kept
/// verbatim so schedulers can tag runs however they like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Trigger {
    #[default]
    Scheduled,
    Manual,
    Api,
    Other(String),
}

impl Trigger {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Api => "api",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Trigger {
    fn from(raw: String) -> Self {
        let label = raw.trim();
        match label.to_ascii_lowercase().as_str() {
            "" | "scheduled" => Self::Scheduled,
            "manual" => Self::Manual,
            "api" => Self::Api,
            _ => Self::Other(label.to_string()),
        }
    }
}

impl From<Trigger> for String {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for Trigger {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

fn trigger_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Trigger, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .map(Trigger::from)
        .unwrap_or_default())
}

/// A request to compact the corpus. Every field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactEvent {
    #[serde(default, deserialize_with = "trigger_or_default")]
    pub trigger: Trigger,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Default for CompactEvent {
    fn default() -> Self {
        Self::new(Trigger::default(), false)
    }
}

impl CompactEvent {
    #[must_use]
    pub fn new(trigger: Trigger, dry_run: bool) -> Self {
        Self {
            trigger,
            dry_run,
            timestamp: Utc::now(),
        }
    }
}

/// Run the engine for `event` and report the outcome.
///
/// Never fails: a [`crate::engine::CompactError`] is logged with its code
/// and turned into [`CompactionResult::failed`].
pub fn handle_compact(event: &CompactEvent, engine: &CompactionEngine<'_>) -> CompactionResult {
    info!(
        trigger = %event.trigger,
        dry_run = event.dry_run,
        timestamp = %event.timestamp.to_rfc3339(),
        "received compact event"
    );

    match engine.run(RunOptions {
        dry_run: event.dry_run,
    }) {
        Ok(result) => {
            info!(
                merged = result.merged,
                deleted = result.deleted,
                "compact completed"
            );
            result
        }
        Err(err) => {
            error!(code = %err.code(), "compact failed: {err}");
            CompactionResult::failed(event.dry_run)
        }
    }
}
