use serde::Serialize;
use std::collections::BTreeMap;

use super::explain::{Explain, FragilityLevel, Tier};
use super::stake::{stake_hint, RiskSignals, StakeHint};
use crate::registry::Match;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestEv {
    pub ev: f64,
    pub outcome: Option<String>,
    pub odds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarMatches {
    pub reliability: f64,
    pub sample_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Backtest {
    pub accuracy: f64,
    pub n: Option<u32>,
}

/// Everything the UI renders for one match, derived from its explain bag.
/// `None` means unavailable (absent or invalid upstream).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedSignals {
    pub tier: Option<Tier>,
    pub confidence_score: Option<f64>,
    pub warnings: Vec<String>,
    pub best_ev: Option<BestEv>,
    pub positive_ev: bool,
    pub chaos_index: Option<f64>,
    pub upset_watch: Option<bool>,
    pub fragility: Option<FragilityLevel>,
    pub fragility_score: Option<f64>,
    pub stake: StakeHint,
    pub similar_matches: Option<SimilarMatches>,
    pub backtest: Option<Backtest>,
    pub key_features: Vec<String>,
    pub derived_markets: BTreeMap<String, f64>,
}

impl DerivedSignals {
    pub fn from_match(m: &Match) -> Self {
        let explain = Explain::of(m);
        let tier_view = explain.tier();
        let ev_view = explain.best_ev();
        let chaos = explain.chaos();
        let fragility = explain.fragility();
        let similar = explain.similar_matches();
        let backtest = explain.backtest();

        let tier = tier_view.tier.ok();
        let stake = stake_hint(tier, &RiskSignals::from_explain(&explain));
        let positive_ev = ev_view.is_positive();

        DerivedSignals {
            tier,
            confidence_score: tier_view.score.ok(),
            warnings: tier_view.warnings,
            best_ev: ev_view.ev.ok().map(|ev| BestEv {
                ev,
                outcome: ev_view.outcome.ok(),
                odds: ev_view.odds.ok(),
            }),
            positive_ev,
            chaos_index: chaos.index.ok(),
            upset_watch: chaos.upset_watch.ok(),
            fragility: fragility.level.ok(),
            fragility_score: fragility.score.ok(),
            stake,
            similar_matches: similar.reliability.ok().map(|reliability| SimilarMatches {
                reliability,
                sample_count: similar.sample_count.ok(),
            }),
            backtest: backtest.accuracy.ok().map(|accuracy| Backtest {
                accuracy,
                n: backtest.n.ok(),
            }),
            key_features: explain.key_features(),
            derived_markets: explain.derived_markets(),
        }
    }

    /// Tier S or A
    pub fn is_high_confidence(&self) -> bool {
        self.tier.map(|t| t.at_least(Tier::A)).unwrap_or(false)
    }
}

/// Number of matches whose best expected value is strictly positive.
pub fn count_positive_ev(matches: &[Match]) -> usize {
    matches
        .iter()
        .filter(|m| Explain::of(m).best_ev().is_positive())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::stake::{RiskSignal, StakeLevel};
    use crate::registry::models::Probabilities;
    use crate::registry::{Championship, MatchStatus};
    use serde_json::{json, Value};

    fn make_match(id: &str, explain: Option<Value>) -> Match {
        Match {
            match_id: id.to_string(),
            championship: Championship::PremierLeague,
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            status: MatchStatus::Prematch,
            kickoff_unix: None,
            updated_at_unix: 1,
            probabilities: Probabilities::default(),
            explain,
        }
    }

    #[test]
    fn test_full_payload() {
        let m = make_match(
            "m1",
            Some(json!({
                "decision_gate": {"tier": "S", "score": 88, "warnings": []},
                "best_ev": {"ev": 0.07, "outcome": "home", "odds": 1.95},
                "chaos": {"index": 82, "upset_watch": true},
                "fragility": {"level": "low", "score": 12},
                "similar_matches": {"reliability": 61.5, "sample_count": 44},
                "backtest": {"accuracy": 0.56, "n": 380},
                "key_features": ["xg_diff"],
                "markets": {"btts": 0.52}
            })),
        );
        let s = DerivedSignals::from_match(&m);
        assert_eq!(s.tier, Some(Tier::S));
        assert!(s.is_high_confidence());
        assert!(s.positive_ev);
        assert_eq!(s.best_ev.as_ref().unwrap().outcome.as_deref(), Some("home"));
        assert_eq!(s.upset_watch, Some(true));
        assert_eq!(s.stake.base, StakeLevel::Alto);
        assert_eq!(s.stake.level, StakeLevel::Medio);
        assert_eq!(s.stake.reasons, vec![RiskSignal::HighChaos]);
        assert_eq!(s.similar_matches.unwrap().sample_count, Some(44));
        assert_eq!(s.backtest.unwrap().n, Some(380));
        assert_eq!(s.key_features, vec!["xg_diff"]);
        assert_eq!(s.derived_markets.len(), 1);
    }

    #[test]
    fn test_malformed_fields_degrade_individually() {
        let m = make_match(
            "m1",
            Some(json!({
                "decision_gate": {"tier": "B", "score": "lots"},
                "best_ev": {"ev": "NaN", "odds": 2.0},
                "chaos": "high"
            })),
        );
        let s = DerivedSignals::from_match(&m);
        assert_eq!(s.tier, Some(Tier::B));
        assert_eq!(s.confidence_score, None);
        assert_eq!(s.best_ev, None);
        assert!(!s.positive_ev);
        assert_eq!(s.chaos_index, None);
        assert_eq!(s.stake.level, StakeLevel::Basso);
        assert!(!s.is_high_confidence());
    }

    #[test]
    fn test_no_explain_bag() {
        let s = DerivedSignals::from_match(&make_match("m1", None));
        assert_eq!(s.tier, None);
        assert_eq!(s.stake.level, StakeLevel::Basso);
        assert!(s.warnings.is_empty());
        // Non-finite values never reach the serialized form
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["chaos_index"], Value::Null);
    }

    #[test]
    fn test_count_positive_ev() {
        let matches = vec![
            make_match("a", Some(json!({"best_ev": {"ev": 0.05}}))),
            make_match("b", Some(json!({"best_ev": {"ev": 0}}))),
            make_match("c", Some(json!({"best_ev": {"ev": -0.1}}))),
            make_match("d", Some(json!({"best_ev": {"ev": "0.2"}}))),
            make_match("e", None),
        ];
        assert_eq!(count_positive_ev(&matches), 2);
    }
}
