// Short-horizon scans: opponent quality, recency, recent loss and momentum.

use courtline_core::config::RecentConfig;
use serde::Serialize;

use crate::factors::{opponent_rating, FactorKind, FactorResult, PlayerHistory};

/// Summary of one player's recent window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentActivity {
    /// Mean opponent rating over the opponent-quality window, when enough
    /// opponents were ranked.
    pub opponent_rating: Option<f64>,
    pub rated_opponents: usize,
    pub days_since_last: Option<i64>,
    pub recency: f64,
    pub recent_loss_penalty: f64,
    pub win_streak: usize,
    pub momentum: f64,
    pub has_matches: bool,
}

fn tier_value(days: i64, tiers: &[(i64, f64)], fallback: f64) -> f64 {
    tiers
        .iter()
        .find(|(max_days, _)| days <= *max_days)
        .map(|(_, v)| *v)
        .unwrap_or(fallback)
}

/// Scan the most recent completed matches once for all four signals.
pub fn recent_activity(history: &PlayerHistory, cfg: &RecentConfig, undated_age_days: i64) -> RecentActivity {
    let ids = &history.identities;
    let played: Vec<_> = history.played().collect();
    let Some(last) = played.first() else {
        return RecentActivity {
            recency: cfg.recency_floor,
            ..Default::default()
        };
    };

    let ratings: Vec<f64> = played
        .iter()
        .take(cfg.opponent_window)
        .filter_map(|m| opponent_rating(m.opponent_of(ids).1))
        .collect();
    let opponent_rating = (ratings.len() >= cfg.opponent_min_matches)
        .then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);

    let days_since_last = history.days_since(last, undated_age_days);
    let recency = tier_value(days_since_last, &cfg.recency_tiers, cfg.recency_floor);

    let recent_loss_penalty = played
        .iter()
        .find(|m| !m.won_by(ids))
        .map(|loss| {
            let days = history.days_since(loss, undated_age_days);
            let base = tier_value(days, &cfg.recent_loss_tiers, 0.0);
            let five_setter = loss.sets_played().is_some_and(|s| s >= 5);
            if base > 0.0 && five_setter {
                base + cfg.five_set_loss_penalty
            } else {
                base
            }
        })
        .unwrap_or(0.0);

    let win_streak = played
        .iter()
        .take(cfg.momentum_window)
        .take_while(|m| m.won_by(ids))
        .count();
    let momentum = (win_streak as f64 * cfg.momentum_per_win).min(cfg.momentum_cap);

    RecentActivity {
        opponent_rating,
        rated_opponents: ratings.len(),
        days_since_last: Some(days_since_last),
        recency,
        recent_loss_penalty,
        win_streak,
        momentum,
        has_matches: true,
    }
}

/// Difference in mean opponent rating, tanh-bounded over `quality_scale`.
pub fn opponent_quality_factor(
    a: &RecentActivity,
    b: &RecentActivity,
    cfg: &RecentConfig,
    weight: f64,
) -> FactorResult {
    match (a.opponent_rating, b.opponent_rating) {
        (Some(ra), Some(rb)) => FactorResult::new(
            FactorKind::OpponentQuality,
            ((ra - rb) / cfg.quality_scale).tanh(),
            weight,
        )
        .with_detail("opponent_rating_a", ra)
        .with_detail("opponent_rating_b", rb),
        _ => FactorResult::neutral(FactorKind::OpponentQuality, weight),
    }
}

pub fn recency_factor(a: &RecentActivity, b: &RecentActivity, weight: f64) -> FactorResult {
    if !a.has_matches || !b.has_matches {
        return FactorResult::neutral(FactorKind::Recency, weight);
    }
    FactorResult::new(FactorKind::Recency, a.recency - b.recency, weight)
        .with_detail("recency_a", a.recency)
        .with_detail("recency_b", b.recency)
}

/// Penalty difference, normalized against the harshest possible penalty.
pub fn recent_loss_factor(
    a: &RecentActivity,
    b: &RecentActivity,
    cfg: &RecentConfig,
    weight: f64,
) -> FactorResult {
    if !a.has_matches || !b.has_matches {
        return FactorResult::neutral(FactorKind::RecentLoss, weight);
    }
    let worst = cfg
        .recent_loss_tiers
        .iter()
        .map(|(_, p)| *p)
        .fold(0.0_f64, f64::max)
        + cfg.five_set_loss_penalty;
    let adv = if worst > 0.0 {
        (b.recent_loss_penalty - a.recent_loss_penalty) / worst
    } else {
        0.0
    };
    FactorResult::new(FactorKind::RecentLoss, adv, weight)
        .with_detail("penalty_a", a.recent_loss_penalty)
        .with_detail("penalty_b", b.recent_loss_penalty)
}

pub fn momentum_factor(a: &RecentActivity, b: &RecentActivity, cfg: &RecentConfig, weight: f64) -> FactorResult {
    if !a.has_matches || !b.has_matches || cfg.momentum_cap <= 0.0 {
        return FactorResult::neutral(FactorKind::Momentum, weight);
    }
    FactorResult::new(
        FactorKind::Momentum,
        (a.momentum - b.momentum) / cfg.momentum_cap,
        weight,
    )
    .with_detail("streak_a", a.win_streak as f64)
    .with_detail("streak_b", b.win_streak as f64)
}
