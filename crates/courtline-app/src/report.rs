// Plain-text rendering of analysis, stake and set-score results.
//
// Each renderer returns lines rather than printing so the output can be
// asserted on in tests.

use courtline_engine::{AnalysisResult, SetScoreDistribution, StakeDecision};

fn pct(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

fn signed(x: f64) -> String {
    format!("{x:+.3}")
}

/// Render a match analysis.
pub fn analysis_lines(r: &AnalysisResult) -> Vec<String> {
    let a = &r.side_a;
    let b = &r.side_b;
    let mut out = vec![
        format!("{} vs {} ({})", a.name, b.name, r.as_of),
        format!(
            "  {:<24} {:>7}   rank {}",
            a.name,
            pct(r.p1_probability),
            a.ranking.effective()
        ),
        format!(
            "  {:<24} {:>7}   rank {}",
            b.name,
            pct(r.p2_probability),
            b.ranking.effective()
        ),
        format!(
            "  confidence {} (data {:.2}, agreement {:.2}, clarity {:.2})",
            pct(r.confidence.score),
            r.confidence.data_quality,
            r.confidence.agreement,
            r.confidence.clarity
        ),
    ];
    if let Some(tier) = r.match_tier() {
        out.push(format!("  match tier: {tier}"));
    }
    if let Some(elo) = r.elo_probability {
        out.push(format!(
            "  large ranking gap: factor model {}, ranking model {}",
            pct(r.raw_probability),
            pct(elo)
        ));
    }

    out.push(String::new());
    out.push(format!("  {:<20} {:>8} {:>7}", "factor", "adv", "weight"));
    for f in &r.factors {
        let weight = r.weights.get(&f.kind).copied().unwrap_or(0.0);
        let adv = if f.has_data() {
            signed(f.advantage())
        } else {
            "n/a".to_string()
        };
        out.push(format!("  {:<20} {:>8} {:>7.3}", f.kind.name(), adv, weight));
    }
    out.push(format!(
        "  {:<20} {:>8}",
        "weighted",
        signed(r.weighted_advantage)
    ));

    if !r.warnings.is_empty() {
        out.push(String::new());
        out.extend(r.warnings.iter().map(|w| format!("  ! {w}")));
    }
    out
}

/// Render a stake decision.
pub fn stake_lines(d: &StakeDecision) -> Vec<String> {
    let verdict = match d.reject_reason() {
        None => format!("BET {:.1} units", d.recommended_units),
        Some(reason) => format!("PASS ({reason})"),
    };
    vec![
        verdict,
        format!(
            "  model {} -> calibrated {} vs implied {} @ {:.2}",
            pct(d.model_probability),
            pct(d.calibrated_probability),
            pct(d.implied_probability),
            d.decimal_odds
        ),
        format!("  edge {}  ev {}", signed(d.edge), signed(d.expected_value)),
        format!(
            "  disagreement {:.2} ({}, x{:.2})  odds {}",
            d.disagreement_ratio,
            d.disagreement_tier,
            d.disagreement_multiplier,
            d.odds_category.label()
        ),
        format!(
            "  kelly {:.4}  stake fraction {:.4}",
            d.kelly_fraction, d.stake_fraction
        ),
    ]
}

/// Render a set-score distribution.
pub fn set_score_lines(d: &SetScoreDistribution) -> Vec<String> {
    let mut out = vec![format!(
        "{}: per-set probability {}",
        d.best_of,
        pct(d.set_probability)
    )];
    out.extend(
        d.outcomes
            .iter()
            .map(|(score, p)| format!("  {score:<5} {:>7}", pct(*p))),
    );
    let sets = u32::from(d.best_of.sets_to_win());
    let line = f64::from(2 * sets - 1) - 0.5;
    out.push(format!(
        "  match {}  -1.5 sets {}  over {line} sets {}",
        pct(d.match_probability()),
        pct(d.handicap_cover(-1.5)),
        pct(d.total_sets_over(line))
    ));
    out
}
