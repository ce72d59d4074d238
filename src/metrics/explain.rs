//! Narrow, independently validated views over a match's `explain` bag.
//!
//! The upstream payload is optional everywhere and loosely typed. Each view
//! reads one sub-section and reports every field as [`Field::Present`],
//! [`Field::Absent`] or [`Field::Invalid`]; a malformed field never aborts
//! the rest of the extraction and non-finite numbers never leave this module.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use crate::registry::Match;

/// One field read from the explain bag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<T> {
    Present(T),
    Absent,
    Invalid,
}

impl<T> Field<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent | Field::Invalid => None,
        }
    }
}

/// Confidence tier, S > A > B > C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
    S,
    A,
    B,
    C,
}

impl Tier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "S" => Some(Tier::S),
            "A" => Some(Tier::A),
            "B" => Some(Tier::B),
            "C" => Some(Tier::C),
            _ => None,
        }
    }

    /// Higher is more confident.
    pub fn rank(self) -> u8 {
        match self {
            Tier::S => 3,
            Tier::A => 2,
            Tier::B => 1,
            Tier::C => 0,
        }
    }

    pub fn at_least(self, floor: Tier) -> bool {
        self.rank() >= floor.rank()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::S => "S",
            Tier::A => "A",
            Tier::B => "B",
            Tier::C => "C",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragilityLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl FragilityLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "low" => Some(FragilityLevel::Low),
            "medium" => Some(FragilityLevel::Medium),
            "high" => Some(FragilityLevel::High),
            "very_high" => Some(FragilityLevel::VeryHigh),
            _ => None,
        }
    }

    pub fn is_risky(self) -> bool {
        matches!(self, FragilityLevel::High | FragilityLevel::VeryHigh)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierView {
    pub tier: Field<Tier>,
    pub score: Field<f64>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvView {
    pub ev: Field<f64>,
    pub outcome: Field<String>,
    pub odds: Field<f64>,
}

impl EvView {
    /// Strictly positive expected value
    pub fn is_positive(&self) -> bool {
        matches!(self.ev, Field::Present(ev) if ev > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChaosView {
    pub index: Field<f64>,
    pub upset_watch: Field<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragilityView {
    pub level: Field<FragilityLevel>,
    pub score: Field<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarView {
    /// Percentage of similar past matches the model called correctly
    pub reliability: Field<f64>,
    pub sample_count: Field<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestView {
    pub accuracy: Field<f64>,
    pub n: Field<u32>,
}

/// Read-only accessor over a match's explain payload.
#[derive(Debug, Clone, Copy)]
pub struct Explain<'a> {
    root: Option<&'a Value>,
}

impl<'a> Explain<'a> {
    pub fn of(m: &'a Match) -> Self {
        Self::from_value(m.explain.as_ref())
    }

    pub fn from_value(root: Option<&'a Value>) -> Self {
        Explain { root }
    }

    fn section(&self, key: &str) -> Field<&'a Map<String, Value>> {
        let Some(root) = self.root.and_then(Value::as_object) else {
            return match self.root {
                None | Some(Value::Null) => Field::Absent,
                Some(_) => Field::Invalid,
            };
        };
        match root.get(key) {
            None | Some(Value::Null) => Field::Absent,
            Some(Value::Object(obj)) => Field::Present(obj),
            Some(_) => Field::Invalid,
        }
    }

    /// Decision-gate tier, confidence score (0–100) and warnings.
    pub fn tier(&self) -> TierView {
        let gate = self.section("decision_gate");
        TierView {
            tier: text_field(gate, "tier").and_then_opt(|s| Tier::parse(&s)),
            score: number_field(gate, "score", 0.0..=100.0),
            warnings: string_list(gate, "warnings"),
        }
    }

    /// Best-outcome expected value, outcome name and decimal odds.
    pub fn best_ev(&self) -> EvView {
        let ev = self.section("best_ev");
        EvView {
            ev: number_field(ev, "ev", f64::MIN..=f64::MAX),
            outcome: text_field(ev, "outcome"),
            odds: number_field(ev, "odds", 1.0..=f64::MAX),
        }
    }

    /// Chaos index (0–100) and upset-watch flag.
    pub fn chaos(&self) -> ChaosView {
        let chaos = self.section("chaos");
        ChaosView {
            index: number_field(chaos, "index", 0.0..=100.0),
            upset_watch: bool_field(chaos, "upset_watch"),
        }
    }

    pub fn fragility(&self) -> FragilityView {
        let fragility = self.section("fragility");
        FragilityView {
            level: text_field(fragility, "level")
                .and_then_opt(|s| FragilityLevel::parse(&s)),
            score: number_field(fragility, "score", 0.0..=100.0),
        }
    }

    /// Reliability over the "similar matches" bucket. Non-positive values
    /// mean the bucket was empty upstream and read as absent.
    pub fn similar_matches(&self) -> SimilarView {
        let similar = self.section("similar_matches");
        SimilarView {
            reliability: positive(number_field(
                similar,
                "reliability",
                f64::MIN..=100.0,
            )),
            sample_count: positive_count(number_field(
                similar,
                "sample_count",
                f64::MIN..=u32::MAX as f64,
            )),
        }
    }

    /// Backtest accuracy (0–1) over `n` evaluated matches.
    pub fn backtest(&self) -> BacktestView {
        let backtest = self.section("backtest");
        BacktestView {
            accuracy: number_field(backtest, "accuracy", 0.0..=1.0),
            n: positive_count(number_field(
                backtest,
                "n",
                f64::MIN..=u32::MAX as f64,
            )),
        }
    }

    /// Championship key features the model leaned on, in upstream order.
    pub fn key_features(&self) -> Vec<String> {
        match self.root.and_then(|r| r.get("key_features")) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => vec![],
        }
    }

    /// Derived-market probabilities (over/under, both-teams-to-score, …).
    /// Entries outside [0, 1] are dropped.
    pub fn derived_markets(&self) -> BTreeMap<String, f64> {
        let Field::Present(markets) = self.section("markets") else {
            return BTreeMap::new();
        };
        markets
            .iter()
            .filter_map(|(name, v)| {
                number_value(v, &(0.0..=1.0))
                    .ok()
                    .map(|p| (name.clone(), p))
            })
            .collect()
    }
}

impl<T> Field<T> {
    fn and_then_opt<U>(self, f: impl FnOnce(T) -> Option<U>) -> Field<U> {
        match self {
            Field::Present(v) => match f(v) {
                Some(u) => Field::Present(u),
                None => Field::Invalid,
            },
            Field::Absent => Field::Absent,
            Field::Invalid => Field::Invalid,
        }
    }
}

// ── Field readers ────────────────────────────────────────────────────────────

fn raw_field<'a>(section: Field<&'a Map<String, Value>>, key: &str) -> Field<&'a Value> {
    match section {
        Field::Present(obj) => match obj.get(key) {
            None | Some(Value::Null) => Field::Absent,
            Some(v) => Field::Present(v),
        },
        Field::Absent => Field::Absent,
        Field::Invalid => Field::Invalid,
    }
}

/// Parse a JSON number or numeric string; must be finite and in `range`.
fn number_value(v: &Value, range: &RangeInclusive<f64>) -> Field<f64> {
    let parsed = v
        .as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()));
    match parsed {
        Some(x) if x.is_finite() && range.contains(&x) => Field::Present(x),
        _ => Field::Invalid,
    }
}

fn number_field(
    section: Field<&Map<String, Value>>,
    key: &str,
    range: RangeInclusive<f64>,
) -> Field<f64> {
    match raw_field(section, key) {
        Field::Present(v) => number_value(v, &range),
        Field::Absent => Field::Absent,
        Field::Invalid => Field::Invalid,
    }
}

fn text_field(section: Field<&Map<String, Value>>, key: &str) -> Field<String> {
    match raw_field(section, key) {
        Field::Present(Value::String(s)) if !s.trim().is_empty() => {
            Field::Present(s.trim().to_string())
        }
        Field::Present(Value::String(_)) | Field::Absent => Field::Absent,
        Field::Present(_) | Field::Invalid => Field::Invalid,
    }
}

fn bool_field(section: Field<&Map<String, Value>>, key: &str) -> Field<bool> {
    match raw_field(section, key) {
        Field::Present(Value::Bool(b)) => Field::Present(*b),
        Field::Present(_) | Field::Invalid => Field::Invalid,
        Field::Absent => Field::Absent,
    }
}

fn string_list(section: Field<&Map<String, Value>>, key: &str) -> Vec<String> {
    match raw_field(section, key) {
        Field::Present(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => vec![],
    }
}

fn positive(field: Field<f64>) -> Field<f64> {
    match field {
        Field::Present(x) if x <= 0.0 => Field::Absent,
        other => other,
    }
}

fn positive_count(field: Field<f64>) -> Field<u32> {
    match positive(field) {
        Field::Present(x) if x.fract() == 0.0 => Field::Present(x as u32),
        Field::Present(_) => Field::Invalid,
        Field::Absent => Field::Absent,
        Field::Invalid => Field::Invalid,
    }
}
