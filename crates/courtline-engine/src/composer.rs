// Probability composer: dynamic reweighting, logistic transform and the
// large-gap Elo blend.

use std::collections::BTreeMap;

use courtline_core::config::{ComposerConfig, FactorWeights};
use serde::Serialize;
use tracing::debug;

use crate::factors::{FactorKind, FactorResult};

/// Everything the reweighting rules look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightInputs {
    /// Both sides have a trustworthy form sample.
    pub form_available: bool,
    /// Both sides have a trustworthy surface sample.
    pub surface_available: bool,
    /// At least one side has a stored performance rating.
    pub rating_available: bool,
    pub large_gap: bool,
    pub breakout_detected: bool,
    pub max_displacement: u8,
}

impl WeightInputs {
    /// Gap handling (ranking boost and Elo blend) applies only to a large
    /// gap with no breakout and less than two tiers of displacement.
    pub fn gap_handling(&self) -> bool {
        self.large_gap && !self.breakout_detected && self.max_displacement < 2
    }
}

pub type WeightTable = BTreeMap<FactorKind, f64>;

pub fn base_weights(weights: &FactorWeights) -> WeightTable {
    FactorKind::ALL
        .iter()
        .map(|k| (*k, k.static_weight(weights)))
        .collect()
}

fn move_to_ranking(table: &mut WeightTable, kind: FactorKind) {
    let moved = table.insert(kind, 0.0).unwrap_or(0.0);
    *table.entry(FactorKind::Ranking).or_insert(0.0) += moved;
}

/// Final weights from base weights and data availability.
///
/// Rules, in order:
/// 1. Missing form or surface data moves that weight to ranking.
/// 2. No stored performance rating on either side moves its weight to ranking.
/// 3. Under gap handling the ranking weight gains `gap_ranking_boost`
///    (capped at `gap_ranking_cap`); other non-zero weights shrink
///    proportionally, each floored at `min_weight`.
pub fn reweight(base: &WeightTable, inputs: &WeightInputs, cfg: &ComposerConfig) -> WeightTable {
    let mut table = base.clone();

    if !inputs.form_available {
        move_to_ranking(&mut table, FactorKind::Form);
    }
    if !inputs.surface_available {
        move_to_ranking(&mut table, FactorKind::Surface);
    }
    if !inputs.rating_available {
        move_to_ranking(&mut table, FactorKind::PerformanceRating);
    }

    if inputs.gap_handling() {
        let total: f64 = table.values().sum();
        let old = table.get(&FactorKind::Ranking).copied().unwrap_or(0.0);
        let new = (old + cfg.gap_ranking_boost).min(cfg.gap_ranking_cap).max(old);
        let others = total - old;
        if others > 0.0 && new > old {
            let scale = ((total - new) / others).max(0.0);
            for (kind, w) in table.iter_mut() {
                if *kind != FactorKind::Ranking && *w > 0.0 {
                    *w = (*w * scale).max(cfg.min_weight);
                }
            }
            table.insert(FactorKind::Ranking, new);
        }
    }
    table
}

/// `1 / (1 + e^(-k x))`
pub fn logistic(x: f64, k: f64) -> f64 {
    1.0 / (1.0 + (-k * x).exp())
}

#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    pub weights: WeightTable,
    pub weighted_advantage: f64,
    /// Logistic of the weighted advantage.
    pub raw_probability: f64,
    /// Rank-derived probability, present when the gap blend applied.
    pub elo_probability: Option<f64>,
    /// Probability for the first player, clamped.
    pub probability: f64,
}

/// Combine factor advantages into a win probability for the first player.
///
/// `elo_probability` is the pure ranking-based probability, used only when
/// gap handling applies: blended `elo_blend_agree` factor-based when both
/// point the same way, `elo_blend_disagree` when they do not.
pub fn compose(
    factors: &[FactorResult],
    weights: WeightTable,
    inputs: &WeightInputs,
    elo_probability: f64,
    cfg: &ComposerConfig,
) -> Composition {
    let weighted_advantage: f64 = factors
        .iter()
        .map(|f| weights.get(&f.kind).copied().unwrap_or(0.0) * f.advantage())
        .sum();
    let raw_probability = logistic(weighted_advantage, cfg.logistic_k);

    let (blended, elo_used) = if inputs.gap_handling() {
        let agree = (raw_probability - 0.5) * (elo_probability - 0.5) >= 0.0;
        let share = if agree {
            cfg.elo_blend_agree
        } else {
            cfg.elo_blend_disagree
        };
        debug!(
            raw_probability,
            elo_probability, agree, share, "large ranking gap: blending with Elo probability"
        );
        (
            share * raw_probability + (1.0 - share) * elo_probability,
            Some(elo_probability),
        )
    } else {
        (raw_probability, None)
    };

    Composition {
        weights,
        weighted_advantage,
        raw_probability,
        elo_probability: elo_used,
        probability: blended.clamp(cfg.probability_floor, cfg.probability_ceiling),
    }
}
