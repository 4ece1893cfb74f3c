use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{RouterMode, RoutingAction, RoutingOutcome};

/// Raw per-court signal components. The point scale of each component is its weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSignal {
    pub filename_score: u32,
    pub path_score: u32,
    pub content_score: u32,
    pub validation_ratio_score: u32,
    pub recency_score: u32,
}

impl RoutingSignal {
    pub fn total(&self) -> u32 {
        self.filename_score
            + self.path_score
            + self.content_score
            + self.validation_ratio_score
            + self.recency_score
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtScore {
    pub court_code: String,
    pub signal: RoutingSignal,
    pub total: u32,
}

/// Result of ranking candidate courts against the threshold and margin rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub outcome: RoutingOutcome,
    /// Candidates ordered best first; ties keep configured court order.
    pub ranked: Vec<CourtScore>,
    pub margin: u32,
    pub threshold: u32,
    pub required_margin: u32,
    pub explanation: String,
}

impl Classification {
    pub fn best(&self) -> Option<&CourtScore> {
        self.ranked.first()
    }

    pub fn second(&self) -> Option<&CourtScore> {
        self.ranked.get(1)
    }

    pub fn chosen_court(&self) -> Option<&str> {
        match self.outcome {
            RoutingOutcome::Confirmed => self.best().map(|b| b.court_code.as_str()),
            RoutingOutcome::Unknown | RoutingOutcome::Ambiguous => None,
        }
    }

    pub fn confidence(&self) -> u32 {
        self.best().map_or(0, |b| b.total)
    }

    /// Serialized audit payload stored in `router_scores`.
    pub fn scores_json(&self) -> Result<String, serde_json::Error> {
        let scores: BTreeMap<&str, u32> = self
            .ranked
            .iter()
            .map(|s| (s.court_code.as_str(), s.total))
            .collect();
        let signals: BTreeMap<&str, &RoutingSignal> = self
            .ranked
            .iter()
            .map(|s| (s.court_code.as_str(), &s.signal))
            .collect();
        serde_json::to_string(&serde_json::json!({
            "scores": scores,
            "signals": signals,
            "outcome": self.outcome,
            "best": self.best().map(|b| &b.court_code),
            "second": self.second().map(|s| &s.court_code),
            "margin": self.margin,
        }))
    }
}

/// One classification of one file observation, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: Uuid,
    pub idempotency_key: String,
    pub file_path: String,
    pub file_name: String,
    pub classification: Classification,
    pub mode: RouterMode,
    pub action: RoutingAction,
    pub decided_at: NaiveDateTime,
}

impl RoutingDecision {
    pub fn chosen_court(&self) -> Option<&str> {
        self.classification.chosen_court()
    }

    pub fn confidence(&self) -> u32 {
        self.classification.confidence()
    }

    pub fn margin(&self) -> u32 {
        self.classification.margin
    }

    pub fn explanation(&self) -> &str {
        &self.classification.explanation
    }
}
