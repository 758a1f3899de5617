// Health: penalty for recent retirements and walkovers conceded.

use courtline_core::config::RecentConfig;
use serde::Serialize;

use crate::factors::{FactorKind, FactorResult, PlayerHistory};

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthStatus {
    /// 0 when healthy, up to the first tier's penalty.
    pub penalty: f64,
    pub days_since_concession: Option<i64>,
    pub completed_since: bool,
    pub has_data: bool,
}

/// Look for the most recent match the player failed to finish.
///
/// The penalty follows `health_tiers` by days since that match and is
/// halved once the player has completed a match afterwards.
pub fn health_status(history: &PlayerHistory, cfg: &RecentConfig, undated_age_days: i64) -> HealthStatus {
    let ids = &history.identities;
    if history.recent.is_empty() {
        return HealthStatus::default();
    }

    let mut completed_since = false;
    for m in &history.recent {
        let conceded = !m.won_by(ids) && (m.retired || m.walkover);
        if !conceded {
            completed_since |= !m.retired && !m.walkover;
            continue;
        }
        let days = history.days_since(m, undated_age_days);
        let base = cfg
            .health_tiers
            .iter()
            .find(|(max_days, _)| days <= *max_days)
            .map(|(_, p)| *p)
            .unwrap_or(0.0);
        let penalty = if completed_since { base / 2.0 } else { base };
        return HealthStatus {
            penalty,
            days_since_concession: Some(days),
            completed_since,
            has_data: true,
        };
    }

    HealthStatus {
        has_data: true,
        ..Default::default()
    }
}

pub fn health_factor(a: &HealthStatus, b: &HealthStatus, weight: f64) -> FactorResult {
    if !a.has_data || !b.has_data {
        return FactorResult::neutral(FactorKind::Health, weight);
    }
    FactorResult::new(FactorKind::Health, b.penalty - a.penalty, weight)
        .with_detail("penalty_a", a.penalty)
        .with_detail("penalty_b", b.penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::test_support::{day, history, played};

    #[test]
    fn fresh_retirement_is_full_penalty() {
        let mut ret = played(day(2026, 4, 25), 9, 1);
        ret.retired = true;
        let h = history(1, day(2026, 5, 1), vec![ret]);
        let s = health_status(&h, &RecentConfig::default(), 90);
        assert_eq!(s.penalty, 1.0);
        assert_eq!(s.days_since_concession, Some(6));
    }

    #[test]
    fn completed_match_since_halves_penalty() {
        let mut ret = played(day(2026, 4, 10), 9, 1);
        ret.retired = true;
        let h = history(1, day(2026, 5, 1), vec![played(day(2026, 4, 28), 1, 5), ret]);
        let s = health_status(&h, &RecentConfig::default(), 90);
        // 21 days: 0.6 tier, halved.
        assert!((s.penalty - 0.3).abs() < 1e-12);
        assert!(s.completed_since);
    }

    #[test]
    fn opponent_retiring_is_not_a_concession() {
        let mut ret = played(day(2026, 4, 25), 1, 9);
        ret.retired = true;
        let h = history(1, day(2026, 5, 1), vec![ret]);
        let s = health_status(&h, &RecentConfig::default(), 90);
        assert!(s.has_data);
        assert_eq!(s.penalty, 0.0);
    }

    #[test]
    fn factor_favours_healthy_side() {
        let healthy = HealthStatus {
            has_data: true,
            ..Default::default()
        };
        let hurt = HealthStatus {
            penalty: 0.6,
            has_data: true,
            ..Default::default()
        };
        assert!((health_factor(&healthy, &hurt, 0.04).advantage() - 0.6).abs() < 1e-12);
        assert!(!health_factor(&healthy, &HealthStatus::default(), 0.04).has_data());
    }
}
