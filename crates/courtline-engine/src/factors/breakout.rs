// Breakout detection: a cluster of quality wins the ranking has not caught
// up with yet.

use chrono::Duration;
use courtline_core::config::BreakoutConfig;
use serde::Serialize;

use crate::factors::{FactorKind, FactorResult, PlayerHistory};

/// A detected breakout. Lives only for the analysis that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakoutSignal {
    pub actual_ranking: u32,
    /// Strictly better (lower) than `actual_ranking`.
    pub effective_ranking: u32,
    pub implied_ranking: u32,
    pub quality_wins: usize,
    pub blend: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BreakoutScan {
    pub quality_wins: usize,
    pub signal: Option<BreakoutSignal>,
}

impl BreakoutScan {
    /// One quality win short of triggering.
    pub fn is_near(&self, cfg: &BreakoutConfig) -> bool {
        self.signal.is_none() && self.quality_wins > 0 && self.quality_wins + 1 == cfg.min_quality_wins
    }
}

fn age_factor(age: Option<u32>, cfg: &BreakoutConfig) -> f64 {
    match age {
        Some(age) => cfg
            .age_factors
            .iter()
            .find(|(max_age, _)| age <= *max_age)
            .map(|(_, f)| *f)
            .unwrap_or(cfg.senior_age_factor),
        None => 1.0,
    }
}

/// Scan recent wins for a breakout.
///
/// Algorithm:
/// 1. Collect dated wins inside `window_days` over ranked opponents whose
///    ranking is at least `rank_ratio` times better than the player's own.
/// 2. Below `min_quality_wins`, no signal.
/// 3. Implied ranking = mean beaten-opponent rank * `implied_rank_buffer`.
/// 4. Blend = (`base_blend` + `blend_per_extra_win` per win above the
///    minimum) * age factor, capped at `max_blend`.
/// 5. Effective ranking = actual - blend * (actual - implied). A signal is
///    only produced when this is strictly better than the actual ranking.
pub fn detect_breakout(
    history: &PlayerHistory,
    actual_ranking: Option<u32>,
    age: Option<u32>,
    cfg: &BreakoutConfig,
) -> BreakoutScan {
    let Some(actual) = actual_ranking else {
        return BreakoutScan::default();
    };
    let ids = &history.identities;
    let window_start = history.as_of - Duration::days(cfg.window_days);

    let beaten: Vec<u32> = history
        .played()
        .filter(|m| m.date.is_some_and(|d| d >= window_start))
        .filter(|m| m.won_by(ids))
        .filter_map(|m| m.opponent_of(ids).1)
        .filter(|&opp| opp > 0 && f64::from(actual) / f64::from(opp) >= cfg.rank_ratio)
        .collect();

    let quality_wins = beaten.len();
    if quality_wins < cfg.min_quality_wins.max(1) {
        return BreakoutScan {
            quality_wins,
            signal: None,
        };
    }

    let mean_beaten = beaten.iter().map(|&r| f64::from(r)).sum::<f64>() / quality_wins as f64;
    let implied = (mean_beaten * cfg.implied_rank_buffer).round().max(1.0);
    if implied >= f64::from(actual) {
        return BreakoutScan {
            quality_wins,
            signal: None,
        };
    }

    let extra = (quality_wins - cfg.min_quality_wins.max(1)) as f64;
    let blend = ((cfg.base_blend + cfg.blend_per_extra_win * extra) * age_factor(age, cfg))
        .clamp(0.0, cfg.max_blend);
    let effective = (f64::from(actual) - blend * (f64::from(actual) - implied)).round() as u32;

    let signal = (effective < actual).then_some(BreakoutSignal {
        actual_ranking: actual,
        effective_ranking: effective.max(1),
        implied_ranking: implied as u32,
        quality_wins,
        blend,
    });
    BreakoutScan {
        quality_wins,
        signal,
    }
}

/// Informational factor: carries no weight, reports both sides' signals.
pub fn breakout_factor(a: &BreakoutScan, b: &BreakoutScan) -> FactorResult {
    if a.signal.is_none() && b.signal.is_none() {
        return FactorResult::neutral(FactorKind::Breakout, 0.0)
            .with_detail("quality_wins_a", a.quality_wins as f64)
            .with_detail("quality_wins_b", b.quality_wins as f64);
    }
    let blend = |s: &BreakoutScan| s.signal.map(|sig| sig.blend).unwrap_or(0.0);
    let mut f = FactorResult::new(FactorKind::Breakout, blend(a) - blend(b), 0.0)
        .with_detail("quality_wins_a", a.quality_wins as f64)
        .with_detail("quality_wins_b", b.quality_wins as f64);
    if let Some(sig) = a.signal {
        f = f.with_detail("effective_ranking_a", f64::from(sig.effective_ranking));
    }
    if let Some(sig) = b.signal {
        f = f.with_detail("effective_ranking_b", f64::from(sig.effective_ranking));
    }
    f
}
