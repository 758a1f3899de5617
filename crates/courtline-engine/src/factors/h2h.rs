// Head-to-head record, overall and on the match surface.

use courtline_core::config::HeadToHeadConfig;
use courtline_core::model::HeadToHead;

use crate::factors::{FactorKind, FactorResult};

fn record_advantage(h: &HeadToHead) -> f64 {
    let n = h.total();
    if n == 0 {
        return 0.0;
    }
    (f64::from(h.a_wins) - f64::from(h.b_wins)) / f64::from(n)
}

/// Blend overall and surface records (60/40 by default) once there are
/// `min_surface_meetings` surface meetings, otherwise use the overall record
/// alone. The result is shrunk by `n / (n + shrink_prior)`.
pub fn head_to_head_factor(
    overall: &HeadToHead,
    surface: Option<&HeadToHead>,
    cfg: &HeadToHeadConfig,
    weight: f64,
) -> FactorResult {
    let n = overall.total();
    if n == 0 {
        return FactorResult::neutral(FactorKind::HeadToHead, weight).with_detail("meetings", 0.0);
    }

    let overall_adv = record_advantage(overall);
    let (blended, surface_meetings) = match surface {
        Some(s) if s.total() >= cfg.min_surface_meetings => (
            cfg.overall_share * overall_adv + cfg.surface_share * record_advantage(s),
            s.total(),
        ),
        Some(s) => (overall_adv, s.total()),
        None => (overall_adv, 0),
    };
    let shrink = f64::from(n) / (f64::from(n) + cfg.shrink_prior);

    FactorResult::new(FactorKind::HeadToHead, blended * shrink, weight)
        .with_detail("meetings", f64::from(n))
        .with_detail("a_wins", f64::from(overall.a_wins))
        .with_detail("b_wins", f64::from(overall.b_wins))
        .with_detail("surface_meetings", f64::from(surface_meetings))
}
