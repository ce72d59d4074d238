use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SyncError;

/// Supported leagues. Unknown keys are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Championship {
    SerieA,
    PremierLeague,
    LaLiga,
    Bundesliga,
    Ligue1,
    ChampionsLeague,
    Other(String),
}

impl Championship {
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match key.as_str() {
            "serie_a" | "seriea" => Championship::SerieA,
            "premier_league" | "epl" => Championship::PremierLeague,
            "la_liga" | "laliga" => Championship::LaLiga,
            "bundesliga" => Championship::Bundesliga,
            "ligue_1" | "ligue1" => Championship::Ligue1,
            "champions_league" | "ucl" => Championship::ChampionsLeague,
            _ => Championship::Other(raw.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Championship::SerieA => "serie_a",
            Championship::PremierLeague => "premier_league",
            Championship::LaLiga => "la_liga",
            Championship::Bundesliga => "bundesliga",
            Championship::Ligue1 => "ligue_1",
            Championship::ChampionsLeague => "champions_league",
            Championship::Other(raw) => raw,
        }
    }
}

impl Default for Championship {
    fn default() -> Self {
        Championship::Other(String::new())
    }
}

impl From<String> for Championship {
    fn from(raw: String) -> Self {
        Championship::parse(&raw)
    }
}

impl From<Championship> for String {
    fn from(c: Championship) -> Self {
        c.key().to_string()
    }
}

impl fmt::Display for Championship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Match lifecycle phase. Unrecognized strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchStatus {
    Prematch,
    Live,
    Finished,
    Other(String),
}

impl Default for MatchStatus {
    fn default() -> Self {
        MatchStatus::Prematch
    }
}

impl From<String> for MatchStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PREMATCH" => MatchStatus::Prematch,
            "LIVE" => MatchStatus::Live,
            "FINISHED" => MatchStatus::Finished,
            _ => MatchStatus::Other(raw),
        }
    }
}

impl From<MatchStatus> for String {
    fn from(s: MatchStatus) -> Self {
        match s {
            MatchStatus::Prematch => "PREMATCH".to_string(),
            MatchStatus::Live => "LIVE".to_string(),
            MatchStatus::Finished => "FINISHED".to_string(),
            MatchStatus::Other(raw) => raw,
        }
    }
}

/// Home/draw/away outcome probabilities, treated as already normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Probabilities {
    #[serde(default)]
    pub home: f64,
    #[serde(default)]
    pub draw: f64,
    #[serde(default)]
    pub away: f64,
}

/// Latest known forecast state for one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    #[serde(default)]
    pub championship: Championship,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    #[serde(default)]
    pub status: MatchStatus,
    /// Scheduled kickoff (epoch seconds), absent if unscheduled
    #[serde(default)]
    pub kickoff_unix: Option<i64>,
    /// Freshness clock used to arbitrate concurrent writers
    #[serde(default)]
    pub updated_at_unix: i64,
    #[serde(default)]
    pub probabilities: Probabilities,
    /// Loosely typed derived-analytics bag; read through `metrics::explain`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<serde_json::Value>,
}

impl Match {
    /// Decode one match payload. The identity field is checked first so a
    /// payload without it is reported as such rather than as a generic
    /// serde error.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, SyncError> {
        let has_id = payload
            .get("match_id")
            .and_then(|v| v.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_id {
            return Err(SyncError::MissingMatchId);
        }
        Ok(serde_json::from_value(payload)?)
    }
}

/// Rolling calibration metrics for one league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSnapshot {
    pub championship: Championship,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub brier: Option<f64>,
    #[serde(default)]
    pub log_loss: Option<f64>,
    /// Expected calibration error
    #[serde(default)]
    pub ece: Option<f64>,
    #[serde(default)]
    pub drift_level: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/// Current-vs-prior window deltas for one league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueTrend {
    pub championship: Championship,
    #[serde(default)]
    pub delta_accuracy: Option<f64>,
    #[serde(default)]
    pub delta_ece: Option<f64>,
    /// False when two comparable windows were not available
    #[serde(default)]
    pub ok: bool,
}
