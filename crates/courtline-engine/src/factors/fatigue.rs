// Fatigue: rest since the last match plus recent workload.

use courtline_core::config::FatigueConfig;
use courtline_core::model::MatchRecord;
use serde::Serialize;

use crate::factors::{FactorKind, FactorResult, PlayerHistory};

const MIN_DIFFICULTY: f64 = 0.5;
const MAX_DIFFICULTY: f64 = 3.0;
const BASELINE_SETS: f64 = 2.0;
const BASELINE_MINUTES: f64 = 60.0;
const MAX_REST_POINTS: f64 = 40.0;
const MAX_WORKLOAD_POINTS: f64 = 40.0;
/// Undated matches are too uncertain to count toward rest or load.
const UNDATED_AGE: i64 = i64::MAX / 2;

/// Physical cost of one match on a 0.5-3.0 scale, 1.0 being two sets in an
/// hour. Retirements and walkovers cost the minimum; an unparseable score
/// counts as the two-set baseline.
pub fn match_difficulty(m: &MatchRecord) -> f64 {
    if m.retired || m.walkover {
        return MIN_DIFFICULTY;
    }
    let sets = m.sets_played().map(|s| s as f64).unwrap_or(BASELINE_SETS);
    let set_load = sets / BASELINE_SETS;
    let time_load = match m.duration_minutes {
        Some(mins) if mins > 0 => f64::from(mins) / BASELINE_MINUTES,
        _ => set_load,
    };
    (0.5 * set_load + 0.5 * time_load).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FatigueScore {
    pub days_rest: Option<i64>,
    pub rest: f64,
    pub workload: f64,
    /// 0-100, higher is fresher.
    pub total: f64,
    pub load_7d: f64,
    pub matches_14d: usize,
    pub matches_30d: usize,
    pub has_data: bool,
}

/// Rest points: full credit inside the optimal window, a ramp up to it,
/// exponential decay (rust) beyond it.
fn rest_points(days: i64, cfg: &FatigueConfig) -> f64 {
    if days < cfg.optimal_rest_min_days {
        let reached = (days.max(0) + 1) as f64 / (cfg.optimal_rest_min_days + 1) as f64;
        MAX_REST_POINTS * reached
    } else if days <= cfg.optimal_rest_max_days {
        MAX_REST_POINTS
    } else {
        let excess = (days - cfg.optimal_rest_max_days) as f64;
        MAX_REST_POINTS * (-excess / cfg.rust_decay_days).exp()
    }
}

fn capped_penalty(excess: f64, per_unit: f64, cap: f64) -> f64 {
    (excess.max(0.0) * per_unit).min(cap)
}

/// Score fitness from dated matches in the player's recent history.
pub fn fatigue_score(history: &PlayerHistory, cfg: &FatigueConfig) -> FatigueScore {
    let dated: Vec<(i64, &MatchRecord)> = history
        .recent
        .iter()
        .filter(|m| m.date.is_some())
        .map(|m| (history.days_since(m, UNDATED_AGE), m))
        .collect();

    let Some(&(days_rest, _)) = dated.first() else {
        return FatigueScore::default();
    };

    let load_7d: f64 = dated
        .iter()
        .filter(|(d, _)| *d <= 7)
        .map(|(_, m)| match_difficulty(m))
        .sum();
    let matches_14d = dated.iter().filter(|(d, _)| *d <= 14).count();
    let matches_30d = dated.iter().filter(|(d, _)| *d <= 30).count();

    let penalty = capped_penalty(load_7d - cfg.load_7d_threshold, cfg.load_7d_per_unit, cfg.load_7d_cap)
        + capped_penalty(
            matches_14d as f64 - cfg.count_14d_threshold as f64,
            cfg.count_14d_per_match,
            cfg.count_14d_cap,
        )
        + capped_penalty(
            matches_30d as f64 - cfg.count_30d_threshold as f64,
            cfg.count_30d_per_match,
            cfg.count_30d_cap,
        );

    let rest = rest_points(days_rest, cfg);
    let workload = (MAX_WORKLOAD_POINTS - penalty).max(0.0);
    FatigueScore {
        days_rest: Some(days_rest),
        rest,
        workload,
        total: rest + workload + cfg.base_fitness,
        load_7d,
        matches_14d,
        matches_30d,
        has_data: true,
    }
}

pub fn fatigue_factor(a: &FatigueScore, b: &FatigueScore, weight: f64) -> FactorResult {
    if !a.has_data || !b.has_data {
        return FactorResult::neutral(FactorKind::Fatigue, weight);
    }
    FactorResult::new(FactorKind::Fatigue, (a.total - b.total) / 50.0, weight)
        .with_detail("total_a", a.total)
        .with_detail("total_b", b.total)
        .with_detail("rest_days_a", a.days_rest.unwrap_or_default() as f64)
        .with_detail("rest_days_b", b.days_rest.unwrap_or_default() as f64)
        .with_detail("load_7d_a", a.load_7d)
        .with_detail("load_7d_b", b.load_7d)
}
