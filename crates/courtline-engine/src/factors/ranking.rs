// Ranking gap: logistic win probability on the rank-derived Elo scale.

use courtline_core::config::ComposerConfig;
use courtline_core::model::RankingSnapshot;
use serde::Serialize;

use crate::elo::{price_implied_rank, rank_to_elo, rank_win_probability};
use crate::factors::{FactorKind, FactorResult};

/// Where a player's ranking came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    Official,
    PriceImplied,
    DefaultWorst,
}

/// A player's ranking as used by this analysis.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RankingInput {
    /// Official or fallback ranking.
    pub rank: u32,
    pub source: RankSource,
    /// Breakout-adjusted ranking, used in place of `rank` when present.
    pub effective_override: Option<u32>,
}

impl RankingInput {
    /// Resolve the ranking, falling back to the player's price and then to
    /// the default-worst ranking.
    pub fn resolve(official: Option<u32>, price: Option<f64>, default_worst: u32) -> Self {
        let (rank, source) = match (official, price) {
            (Some(r), _) => (r, RankSource::Official),
            (None, Some(p)) if p.is_finite() && p > 1.0 => {
                (price_implied_rank(p), RankSource::PriceImplied)
            }
            _ => (default_worst, RankSource::DefaultWorst),
        };
        Self {
            rank,
            source,
            effective_override: None,
        }
    }

    pub fn with_override(mut self, effective: Option<u32>) -> Self {
        self.effective_override = effective;
        self
    }

    /// Ranking fed into rating calculations.
    pub fn effective(&self) -> u32 {
        self.effective_override.unwrap_or(self.rank)
    }
}

/// Whether the raw ranking gap is large enough to trigger gap handling.
pub fn is_large_gap(a: u32, b: u32, cfg: &ComposerConfig) -> bool {
    let gap = a.abs_diff(b);
    gap > cfg.large_gap_ranks || (a.min(b) <= cfg.top_player_rank && gap > cfg.top_player_gap_ranks)
}

/// Positive when the player's ranking improved across the snapshots
/// (most recent first).
pub fn trajectory(history: &[RankingSnapshot]) -> Option<i64> {
    let latest = history.first()?;
    let oldest = history.last()?;
    Some(i64::from(oldest.rank) - i64::from(latest.rank))
}

/// Ranking factor. Always has data: a fallback ranking exists for everyone.
/// The large-gap flag is computed on official/fallback rankings, not on
/// breakout overrides.
pub fn ranking_factor(
    a: &RankingInput,
    b: &RankingInput,
    cfg: &ComposerConfig,
    weight: f64,
) -> (FactorResult, bool) {
    let p = rank_win_probability(a.effective(), b.effective());
    let large_gap = is_large_gap(a.rank, b.rank, cfg);
    let factor = FactorResult::new(FactorKind::Ranking, 2.0 * p - 1.0, weight)
        .with_detail("rank_a", f64::from(a.effective()))
        .with_detail("rank_b", f64::from(b.effective()))
        .with_detail("elo_a", rank_to_elo(a.effective()))
        .with_detail("elo_b", rank_to_elo(b.effective()))
        .with_detail("probability", p)
        .with_detail("large_gap", if large_gap { 1.0 } else { 0.0 });
    (factor, large_gap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::test_support::day;

    fn official(rank: u32) -> RankingInput {
        RankingInput::resolve(Some(rank), None, 1500)
    }

    #[test]
    fn fallback_chain() {
        let r = RankingInput::resolve(None, Some(1.45), 1500);
        assert_eq!((r.rank, r.source), (40, RankSource::PriceImplied));
        let r = RankingInput::resolve(None, None, 1234);
        assert_eq!((r.rank, r.source), (1234, RankSource::DefaultWorst));
        let r = RankingInput::resolve(None, Some(0.5), 1234);
        assert_eq!(r.source, RankSource::DefaultWorst);
        let r = RankingInput::resolve(Some(7), Some(1.45), 1500);
        assert_eq!((r.rank, r.source), (7, RankSource::Official));
    }

    #[test]
    fn equal_ranks_are_even() {
        let (f, gap) = ranking_factor(&official(50), &official(50), &ComposerConfig::default(), 0.22);
        assert!(f.has_data());
        assert!(f.advantage().abs() < 1e-12);
        assert!(!gap);
    }

    #[test]
    fn better_rank_is_favoured() {
        let (f, _) = ranking_factor(&official(10), &official(80), &ComposerConfig::default(), 0.22);
        assert!(f.advantage() > 0.0);
        let (g, _) = ranking_factor(&official(80), &official(10), &ComposerConfig::default(), 0.22);
        assert!((f.advantage() + g.advantage()).abs() < 1e-12);
    }

    #[test]
    fn large_gap_rules() {
        let cfg = ComposerConfig::default();
        assert!(is_large_gap(20, 150, &cfg));
        assert!(!is_large_gap(20, 110, &cfg));
        assert!(is_large_gap(5, 70, &cfg));
        assert!(!is_large_gap(15, 70, &cfg));
    }

    #[test]
    fn override_moves_rating_but_not_gap_flag() {
        let cfg = ComposerConfig::default();
        let a = official(400).with_override(Some(120));
        let (f, gap) = ranking_factor(&a, &official(60), &cfg, 0.22);
        assert!(gap);
        assert_eq!(f.details["rank_a"], 120.0);
    }

    #[test]
    fn trajectory_from_snapshots() {
        let snap = |rank| RankingSnapshot {
            player: 1,
            date: day(2026, 1, 1),
            rank,
            points: 0,
        };
        assert_eq!(trajectory(&[snap(40), snap(55), snap(70)]), Some(30));
        assert_eq!(trajectory(&[]), None);
    }
}
