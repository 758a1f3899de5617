// Factor calculators: each scores one aspect of a matchup as an advantage
// in [-1, 1], positive favouring the first player.

pub mod breakout;
pub mod fatigue;
pub mod form;
pub mod h2h;
pub mod health;
pub mod performance;
pub mod ranking;
pub mod recent;
pub mod surface;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use courtline_core::config::FactorWeights;
use courtline_core::model::{MatchRecord, PlayerId};
use serde::Serialize;
use tracing::warn;

// ---------------------------------------------------------------------------
// Factor identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Form,
    Surface,
    Ranking,
    HeadToHead,
    Fatigue,
    Health,
    OpponentQuality,
    Recency,
    RecentLoss,
    Momentum,
    PerformanceRating,
    Breakout,
}

impl FactorKind {
    pub const ALL: [FactorKind; 12] = [
        FactorKind::Form,
        FactorKind::Surface,
        FactorKind::Ranking,
        FactorKind::HeadToHead,
        FactorKind::Fatigue,
        FactorKind::Health,
        FactorKind::OpponentQuality,
        FactorKind::Recency,
        FactorKind::RecentLoss,
        FactorKind::Momentum,
        FactorKind::PerformanceRating,
        FactorKind::Breakout,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FactorKind::Form => "form",
            FactorKind::Surface => "surface",
            FactorKind::Ranking => "ranking",
            FactorKind::HeadToHead => "head_to_head",
            FactorKind::Fatigue => "fatigue",
            FactorKind::Health => "health",
            FactorKind::OpponentQuality => "opponent_quality",
            FactorKind::Recency => "recency",
            FactorKind::RecentLoss => "recent_loss",
            FactorKind::Momentum => "momentum",
            FactorKind::PerformanceRating => "performance_rating",
            FactorKind::Breakout => "breakout",
        }
    }

    /// Configured static weight. The breakout factor is informational and
    /// never carries weight of its own.
    pub fn static_weight(&self, weights: &FactorWeights) -> f64 {
        match self {
            FactorKind::Form => weights.form,
            FactorKind::Surface => weights.surface,
            FactorKind::Ranking => weights.ranking,
            FactorKind::HeadToHead => weights.head_to_head,
            FactorKind::Fatigue => weights.fatigue,
            FactorKind::Health => weights.health,
            FactorKind::OpponentQuality => weights.opponent_quality,
            FactorKind::Recency => weights.recency,
            FactorKind::RecentLoss => weights.recent_loss,
            FactorKind::Momentum => weights.momentum,
            FactorKind::PerformanceRating => weights.performance_rating,
            FactorKind::Breakout => 0.0,
        }
    }

    /// Factors whose positive contribution is discounted when a player
    /// competes below their usual tier.
    pub fn is_tier_sensitive(&self) -> bool {
        matches!(
            self,
            FactorKind::Ranking | FactorKind::PerformanceRating | FactorKind::HeadToHead
        )
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Factor result
// ---------------------------------------------------------------------------

/// Output of one factor calculator.
///
/// A result without data always carries an advantage of exactly 0; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorResult {
    pub kind: FactorKind,
    advantage: f64,
    /// Static importance before dynamic reweighting.
    pub weight: f64,
    has_data: bool,
    pub details: BTreeMap<String, f64>,
}

impl FactorResult {
    /// A populated factor. The advantage is clamped to [-1, 1]; a non-finite
    /// advantage is treated as neutral.
    pub fn new(kind: FactorKind, advantage: f64, weight: f64) -> Self {
        let advantage = if advantage.is_finite() {
            advantage.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Self {
            kind,
            advantage,
            weight,
            has_data: true,
            details: BTreeMap::new(),
        }
    }

    /// A factor whose sample was too small to trust.
    pub fn neutral(kind: FactorKind, weight: f64) -> Self {
        Self {
            kind,
            advantage: 0.0,
            weight,
            has_data: false,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: f64) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn advantage(&self) -> f64 {
        self.advantage
    }

    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// Scale the advantage in place, keeping it inside [-1, 1]. No-op on a
    /// factor without data.
    pub fn scale_advantage(&mut self, multiplier: f64) {
        if self.has_data {
            self.advantage = (self.advantage * multiplier).clamp(-1.0, 1.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Per-side history
// ---------------------------------------------------------------------------

/// One player's identity set and recent results as of the analysis date.
#[derive(Debug, Clone)]
pub struct PlayerHistory {
    /// Canonical id.
    pub id: PlayerId,
    /// Every id that resolves to `id`, including `id` itself.
    pub identities: Vec<PlayerId>,
    pub as_of: NaiveDate,
    /// Most recent first, none after `as_of`.
    pub recent: Vec<MatchRecord>,
}

impl PlayerHistory {
    /// Completed matches: walkovers are dropped, retirements kept.
    pub fn played(&self) -> impl Iterator<Item = &MatchRecord> {
        self.recent.iter().filter(|m| !m.walkover)
    }

    pub fn days_since(&self, m: &MatchRecord, undated_age_days: i64) -> i64 {
        m.days_before(self.as_of, undated_age_days)
    }
}

/// Collapse a failed history read into an empty value, logging the failure.
/// Calculators treat the empty value as missing data.
pub fn read_or_default<T: Default>(what: &str, player: PlayerId, result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            warn!("history read `{what}` failed for player {player}: {e:#}");
            T::default()
        }
    }
}

/// Strength of an opponent ranking on the Elo scale, or `None` when unknown.
pub(crate) fn opponent_rating(rank: Option<u32>) -> Option<f64> {
    rank.map(crate::elo::rank_to_elo)
}
