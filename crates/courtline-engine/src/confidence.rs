// Confidence estimate from data quality, factor agreement and clarity.

use courtline_core::config::ConfidenceConfig;
use serde::Serialize;

use crate::composer::WeightTable;
use crate::factors::FactorResult;

const MIN_CONFIDENCE: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 0.95;

/// Sample sizes behind one analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataSufficiency {
    pub form_matches: (usize, usize),
    /// Minimum form sample considered reliable.
    pub form_minimum: usize,
    pub surface_matches: (usize, usize),
    pub h2h_meetings: u32,
    pub ranked: (bool, bool),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Confidence {
    pub data_quality: f64,
    pub agreement: f64,
    pub clarity: f64,
    /// Clamped to [0.05, 0.95].
    pub score: f64,
}

fn saturate(n: f64, full: f64) -> f64 {
    (n / full).min(1.0)
}

pub fn data_quality(d: &DataSufficiency) -> f64 {
    let form = saturate(d.form_matches.0.min(d.form_matches.1) as f64, 10.0);
    let surface = saturate(d.surface_matches.0.min(d.surface_matches.1) as f64, 10.0);
    let h2h = saturate(f64::from(d.h2h_meetings), 5.0);
    let ranking = (f64::from(u8::from(d.ranked.0)) + f64::from(u8::from(d.ranked.1))) / 2.0;

    let quality = 0.35 * form + 0.20 * surface + 0.15 * h2h + 0.30 * ranking;
    if d.form_matches.0.min(d.form_matches.1) < d.form_minimum {
        quality * 0.5
    } else {
        quality
    }
}

/// Share of factor weight pointing the same way as the final probability.
/// Factors within `neutral_threshold` of zero count as half agreement.
pub fn agreement(
    factors: &[FactorResult],
    weights: &WeightTable,
    probability: f64,
    neutral_threshold: f64,
) -> f64 {
    let direction = probability - 0.5;
    let mut agreeing = 0.0;
    let mut total = 0.0;
    for f in factors.iter().filter(|f| f.has_data()) {
        let w = weights.get(&f.kind).copied().unwrap_or(0.0);
        if w <= 0.0 {
            continue;
        }
        total += w;
        if f.advantage().abs() < neutral_threshold || direction == 0.0 {
            agreeing += 0.5 * w;
        } else if f.advantage().signum() == direction.signum() {
            agreeing += w;
        }
    }
    if total <= 0.0 {
        0.5
    } else {
        agreeing / total
    }
}

pub fn estimate_confidence(
    factors: &[FactorResult],
    weights: &WeightTable,
    probability: f64,
    data: &DataSufficiency,
    cfg: &ConfidenceConfig,
) -> Confidence {
    let data_quality = data_quality(data);
    let agreement = agreement(factors, weights, probability, cfg.neutral_threshold);
    let clarity = saturate((probability - 0.5).abs(), cfg.clarity_ceiling);
    let score = (cfg.data_quality_share * data_quality
        + cfg.agreement_share * agreement
        + cfg.clarity_share * clarity)
        .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
    Confidence {
        data_quality,
        agreement,
        clarity,
        score,
    }
}
