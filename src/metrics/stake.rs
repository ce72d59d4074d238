//! Stake hint derived from the confidence tier and risk signals.
//!
//! The base level comes straight from the tier on the ordered scale
//! `[minimo, basso, medio, alto]`:
//!   S → alto, A → medio, B → basso, C → minimo, anything else → basso
//!
//! A risk downgrade then moves the level down by exactly one step (floored at
//! `minimo`) when any of these hold:
//!   - chaos index ≥ 70
//!   - fragility level is `high` or `very_high`
//!   - a decision-gate warning mentions drift
//!
//! Several signals firing together still cost a single step.

use serde::Serialize;

use super::explain::{Explain, Tier};

/// Chaos index at or above which the stake is downgraded.
pub const CHAOS_DOWNGRADE_THRESHOLD: f64 = 70.0;

/// Warning substrings (lowercase) that indicate model drift.
const DRIFT_MARKERS: &[&str] = &["drift"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeLevel {
    Minimo,
    Basso,
    Medio,
    Alto,
}

impl StakeLevel {
    pub fn from_tier(tier: Option<Tier>) -> Self {
        match tier {
            Some(Tier::S) => StakeLevel::Alto,
            Some(Tier::A) => StakeLevel::Medio,
            Some(Tier::B) => StakeLevel::Basso,
            Some(Tier::C) => StakeLevel::Minimo,
            None => StakeLevel::Basso,
        }
    }

    /// One step down the scale, clamped at `Minimo`.
    pub fn step_down(self) -> Self {
        match self {
            StakeLevel::Alto => StakeLevel::Medio,
            StakeLevel::Medio => StakeLevel::Basso,
            StakeLevel::Basso | StakeLevel::Minimo => StakeLevel::Minimo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignal {
    HighChaos,
    Fragile,
    DriftWarning,
}

/// Which risk signals are currently firing for a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskSignals {
    pub high_chaos: bool,
    pub fragile: bool,
    pub drift_warning: bool,
}

impl RiskSignals {
    pub fn from_explain(explain: &Explain<'_>) -> Self {
        let high_chaos = explain
            .chaos()
            .index
            .ok()
            .map(|idx| idx >= CHAOS_DOWNGRADE_THRESHOLD)
            .unwrap_or(false);
        let fragile = explain
            .fragility()
            .level
            .ok()
            .map(|level| level.is_risky())
            .unwrap_or(false);
        let drift_warning = explain
            .tier()
            .warnings
            .iter()
            .any(|w| is_drift_warning(w));
        RiskSignals {
            high_chaos,
            fragile,
            drift_warning,
        }
    }

    pub fn any(&self) -> bool {
        self.high_chaos || self.fragile || self.drift_warning
    }

    pub fn fired(&self) -> Vec<RiskSignal> {
        let mut out = Vec::new();
        if self.high_chaos {
            out.push(RiskSignal::HighChaos);
        }
        if self.fragile {
            out.push(RiskSignal::Fragile);
        }
        if self.drift_warning {
            out.push(RiskSignal::DriftWarning);
        }
        out
    }
}

pub fn is_drift_warning(text: &str) -> bool {
    let lower = text.to_lowercase();
    DRIFT_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakeHint {
    pub base: StakeLevel,
    pub level: StakeLevel,
    pub downgraded: bool,
    pub reasons: Vec<RiskSignal>,
}

/// Map a tier and the active risk signals to a stake hint.
pub fn stake_hint(tier: Option<Tier>, risk: &RiskSignals) -> StakeHint {
    let base = StakeLevel::from_tier(tier);
    let level = if risk.any() { base.step_down() } else { base };
    StakeHint {
        base,
        level,
        downgraded: level != base,
        reasons: risk.fired(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL_RISK: RiskSignals = RiskSignals {
        high_chaos: true,
        fragile: true,
        drift_warning: true,
    };

    #[test]
    fn test_base_levels_from_tier() {
        let calm = RiskSignals::default();
        assert_eq!(stake_hint(Some(Tier::S), &calm).level, StakeLevel::Alto);
        assert_eq!(stake_hint(Some(Tier::A), &calm).level, StakeLevel::Medio);
        assert_eq!(stake_hint(Some(Tier::B), &calm).level, StakeLevel::Basso);
        assert_eq!(stake_hint(Some(Tier::C), &calm).level, StakeLevel::Minimo);
        assert_eq!(stake_hint(None, &calm).level, StakeLevel::Basso);
        assert!(!stake_hint(Some(Tier::S), &calm).downgraded);
    }

    #[test]
    fn test_single_signal_downgrades_one_step() {
        let risk = RiskSignals {
            high_chaos: true,
            ..Default::default()
        };
        let hint = stake_hint(Some(Tier::S), &risk);
        assert_eq!(hint.base, StakeLevel::Alto);
        assert_eq!(hint.level, StakeLevel::Medio);
        assert!(hint.downgraded);
        assert_eq!(hint.reasons, vec![RiskSignal::HighChaos]);
    }

    #[test]
    fn test_downgrade_never_exceeds_one_step() {
        let tiers = [Some(Tier::S), Some(Tier::A), Some(Tier::B), Some(Tier::C), None];
        let combos = [
            RiskSignals { high_chaos: true, fragile: false, drift_warning: false },
            RiskSignals { high_chaos: true, fragile: true, drift_warning: false },
            RiskSignals { high_chaos: false, fragile: true, drift_warning: true },
            ALL_RISK,
        ];
        for tier in tiers {
            let base = StakeLevel::from_tier(tier);
            for risk in &combos {
                let hint = stake_hint(tier, risk);
                assert_eq!(hint.level, base.step_down(), "tier {:?} risk {:?}", tier, risk);
                assert!(hint.level <= hint.base);
            }
        }
    }

    #[test]
    fn test_floor_is_minimo() {
        let hint = stake_hint(Some(Tier::C), &ALL_RISK);
        assert_eq!(hint.level, StakeLevel::Minimo);
        assert!(!hint.downgraded);
        assert_eq!(hint.reasons.len(), 3);
    }

    #[test]
    fn test_risk_signals_from_explain() {
        let bag = json!({
            "decision_gate": {"tier": "A", "warnings": ["League DRIFT above threshold"]},
            "chaos": {"index": 70},
            "fragility": {"level": "medium"}
        });
        let risk = RiskSignals::from_explain(&Explain::from_value(Some(&bag)));
        assert!(risk.high_chaos);
        assert!(!risk.fragile);
        assert!(risk.drift_warning);
    }

    #[test]
    fn test_invalid_chaos_does_not_fire() {
        let bag = json!({"chaos": {"index": "NaN"}, "fragility": {"level": "unknown"}});
        let risk = RiskSignals::from_explain(&Explain::from_value(Some(&bag)));
        assert!(!risk.any());
    }

    #[test]
    fn test_chaos_just_below_threshold() {
        let bag = json!({"chaos": {"index": 69.9}});
        let risk = RiskSignals::from_explain(&Explain::from_value(Some(&bag)));
        assert!(!risk.high_chaos);
    }

    #[test]
    fn test_drift_marker_matching() {
        assert!(is_drift_warning("calibration drift detected"));
        assert!(is_drift_warning("Drift"));
        assert!(!is_drift_warning("small sample size"));
    }
}
