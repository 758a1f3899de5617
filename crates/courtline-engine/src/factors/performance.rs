// Long-horizon performance rating factor.

use serde::Serialize;

use crate::elo::{expected_score, rank_to_elo};
use crate::factors::breakout::BreakoutSignal;
use crate::factors::{FactorKind, FactorResult};

/// A player's rating for this analysis and where it came from.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatingInput {
    pub rating: f64,
    /// A stored performance rating existed.
    pub stored: bool,
}

impl RatingInput {
    /// Use the stored rating when present, otherwise the ranking-derived
    /// rating. A breakout nudges the rating toward the effective ranking's
    /// rating by the breakout blend, never downward.
    pub fn resolve(stored: Option<f64>, ranking: u32, breakout: Option<&BreakoutSignal>) -> Self {
        let (mut rating, is_stored) = match stored {
            Some(r) if r.is_finite() => (r, true),
            _ => (rank_to_elo(ranking), false),
        };
        if let Some(sig) = breakout {
            let target = rank_to_elo(sig.effective_ranking);
            if target > rating {
                rating += sig.blend * (target - rating);
            }
        }
        Self {
            rating,
            stored: is_stored,
        }
    }
}

/// Has data when at least one side has a stored rating.
pub fn performance_factor(a: &RatingInput, b: &RatingInput, weight: f64) -> FactorResult {
    if !a.stored && !b.stored {
        return FactorResult::neutral(FactorKind::PerformanceRating, weight);
    }
    let p = expected_score(a.rating, b.rating);
    FactorResult::new(FactorKind::PerformanceRating, 2.0 * p - 1.0, weight)
        .with_detail("rating_a", a.rating)
        .with_detail("rating_b", b.rating)
        .with_detail("probability", p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use courtline_core::config::RatingConfig;

    use crate::factors::test_support::{day, played, ranked};
    use crate::rating::compute_performance_ratings;

    /// Stored rating for player 1 after an even win and an even loss, every
    /// player ranked `rank`.
    fn replayed_rating(rank: u32) -> f64 {
        let matches = [
            ranked(played(day(2026, 3, 1), 1, 2), rank, rank),
            ranked(played(day(2026, 3, 8), 3, 1), rank, rank),
        ];
        let r = compute_performance_ratings(&matches, &HashMap::new(), day(2026, 4, 1), &RatingConfig::default());
        r[&1]
    }

    #[test]
    fn falls_back_to_ranking_rating() {
        let r = RatingInput::resolve(None, 64, None);
        assert!(!r.stored);
        assert!((r.rating - rank_to_elo(64)).abs() < 1e-12);
    }

    #[test]
    fn neutral_when_neither_side_has_stored_rating() {
        let a = RatingInput::resolve(None, 10, None);
        let b = RatingInput::resolve(None, 200, None);
        let f = performance_factor(&a, &b, 0.08);
        assert!(!f.has_data());
        assert_eq!(f.advantage(), 0.0);
    }

    #[test]
    fn breakout_nudges_toward_effective_rating() {
        let sig = BreakoutSignal {
            actual_ranking: 300,
            effective_ranking: 100,
            implied_ranking: 60,
            quality_wins: 2,
            blend: 0.5,
        };
        let plain = RatingInput::resolve(Some(1400.0), 300, None);
        let nudged = RatingInput::resolve(Some(1400.0), 300, Some(&sig));
        let target = rank_to_elo(100);
        assert!((nudged.rating - (1400.0 + 0.5 * (target - 1400.0))).abs() < 1e-9);
        assert!(nudged.rating > plain.rating);
    }

    #[test]
    fn stored_rating_drives_factor() {
        let a = RatingInput::resolve(Some(1700.0), 100, None);
        let b = RatingInput::resolve(Some(1500.0), 20, None);
        let f = performance_factor(&a, &b, 0.08);
        assert!(f.has_data());
        assert!(f.advantage() > 0.0);
    }

    #[test]
    fn stored_and_fallback_ratings_share_a_scale() {
        let stored = replayed_rating(40);
        assert!((stored - rank_to_elo(40)).abs() < 2.0);

        let a = RatingInput::resolve(Some(stored), 40, None);
        let b = RatingInput::resolve(None, 40, None);
        let f = performance_factor(&a, &b, 0.08);
        assert!(f.has_data());
        assert!(f.advantage().abs() < 0.02);
    }

    #[test]
    fn breakout_lifts_replayed_rating() {
        let stored = replayed_rating(300);
        let sig = BreakoutSignal {
            actual_ranking: 300,
            effective_ranking: 150,
            implied_ranking: 90,
            quality_wins: 2,
            blend: 0.5,
        };
        let nudged = RatingInput::resolve(Some(stored), 300, Some(&sig));
        let target = rank_to_elo(150);
        assert!((nudged.rating - (stored + 0.5 * (target - stored))).abs() < 1e-9);
        assert!(nudged.rating > stored + 50.0);
    }
}
