// Recent form: decayed, tier-weighted results scored against expectation.

use courtline_core::config::FormConfig;
use serde::Serialize;

use crate::elo::{expected_score, rank_to_elo};
use crate::factors::{FactorKind, FactorResult, PlayerHistory};

/// Score reported when the sample is too small.
pub const NEUTRAL_FORM: f64 = 50.0;

const EXPECTED_MIN: f64 = 0.05;
const EXPECTED_MAX: f64 = 0.95;
/// Upsets and surprise losses weigh up to this multiple of an expected result.
const MAX_SURPRISE_MULTIPLIER: f64 = 3.0;
/// How many later results may confirm an upset.
const CONFIRMATION_LOOKAHEAD: usize = 2;

/// One scored match, kept for the detail view.
#[derive(Debug, Clone, Serialize)]
pub struct FormEntry {
    pub match_id: i64,
    pub won: bool,
    /// Pre-match win expectation, clamped to [0.05, 0.95].
    pub expected: f64,
    pub weight: f64,
    pub upset: bool,
    pub confirmed: bool,
}

/// Spread of opponent strength across a player's losses.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LossQuality {
    /// Mean of `1 - expected` over losses: high when losses came against
    /// stronger opponents.
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormScore {
    /// 0-100, 50 is neutral.
    pub score: f64,
    pub wins: usize,
    pub losses: usize,
    pub has_data: bool,
    pub loss_quality: Option<LossQuality>,
    pub entries: Vec<FormEntry>,
}

impl FormScore {
    fn neutral(wins: usize, losses: usize, entries: Vec<FormEntry>) -> Self {
        Self {
            score: NEUTRAL_FORM,
            wins,
            losses,
            has_data: false,
            loss_quality: None,
            entries,
        }
    }

    pub fn matches(&self) -> usize {
        self.wins + self.losses
    }
}

/// Value of a result relative to an expected one: 1.0 for an expected
/// outcome, rising to 3.0 for the largest surprises.
fn surprise_multiplier(won: bool, expected: f64) -> f64 {
    let surprise = if won { 0.5 - expected } else { expected - 0.5 };
    let scaled = (surprise / (0.5 - EXPECTED_MIN)).clamp(0.0, 1.0);
    1.0 + (MAX_SURPRISE_MULTIPLIER - 1.0) * scaled
}

/// Score a player's recent form.
///
/// Algorithm:
/// 1. Take up to `window` completed matches, most recent first.
/// 2. Weight each by `position_decay^i * tier weight * exp(-days / date_decay_days)`.
/// 3. Expected result comes from the rank-derived Elo of both players at
///    match time; when either rank is unknown the match counts as even.
/// 4. Upset wins and surprise losses scale by up to 3x. An upset confirmed
///    by another upset win in the next two results is boosted (capped);
///    an isolated upset keeps only half its bonus.
/// 5. Score = 100 * weighted wins / (weighted wins + weighted losses).
pub fn score_form(history: &PlayerHistory, current_rank: Option<u32>, cfg: &FormConfig) -> FormScore {
    let ids = &history.identities;
    let mut entries: Vec<FormEntry> = history
        .played()
        .take(cfg.window)
        .enumerate()
        .map(|(i, m)| {
            let won = m.won_by(ids);
            let own = m.own_rank(ids).or(current_rank);
            let (_, opp) = m.opponent_of(ids);
            let expected = match (own, opp) {
                (Some(o), Some(p)) => expected_score(rank_to_elo(o), rank_to_elo(p)),
                _ => 0.5,
            }
            .clamp(EXPECTED_MIN, EXPECTED_MAX);
            let days = history.days_since(m, cfg.undated_age_days) as f64;
            let weight = cfg.position_decay.powi(i as i32)
                * m.category().form_weight()
                * (-days / cfg.date_decay_days).exp();
            FormEntry {
                match_id: m.id,
                won,
                expected,
                weight,
                upset: won && expected < cfg.upset_threshold,
                confirmed: false,
            }
        })
        .collect();

    let wins = entries.iter().filter(|e| e.won).count();
    let losses = entries.len() - wins;
    if entries.len() < cfg.min_matches {
        return FormScore::neutral(wins, losses, entries);
    }

    // Entries are most recent first, so the results that followed entry `i`
    // sit at indices i-1 and i-2.
    let upset_flags: Vec<bool> = entries.iter().map(|e| e.upset).collect();
    for (i, entry) in entries.iter_mut().enumerate() {
        if !entry.upset {
            continue;
        }
        let confirmations = (1..=CONFIRMATION_LOOKAHEAD)
            .filter_map(|step| i.checked_sub(step))
            .filter(|&j| upset_flags[j])
            .count();
        entry.confirmed = confirmations > 0;
        if entry.confirmed {
            let boost = cfg
                .confirmation_boost
                .powi(confirmations as i32)
                .min(cfg.confirmation_cap);
            entry.weight *= boost;
        }
    }

    let mut won_total = 0.0;
    let mut lost_total = 0.0;
    for e in &entries {
        let mut mult = surprise_multiplier(e.won, e.expected);
        if e.upset && !e.confirmed {
            mult = 1.0 + (mult - 1.0) / 2.0;
        }
        if e.won {
            won_total += e.weight * mult;
        } else {
            lost_total += e.weight * mult;
        }
    }

    let total = won_total + lost_total;
    if total <= f64::EPSILON {
        return FormScore::neutral(wins, losses, entries);
    }

    FormScore {
        score: 100.0 * won_total / total,
        wins,
        losses,
        has_data: true,
        loss_quality: loss_quality(&entries),
        entries,
    }
}

fn loss_quality(entries: &[FormEntry]) -> Option<LossQuality> {
    let values: Vec<f64> = entries
        .iter()
        .filter(|e| !e.won)
        .map(|e| 1.0 - e.expected)
        .collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(LossQuality {
        mean,
        std_dev: variance.sqrt(),
    })
}

/// Combine both sides' form into an advantage.
///
/// The score difference is tanh-bounded so one lopsided sample cannot
/// dominate. A stability term rewards the side whose losses came against
/// stronger opponents, damped when either side's losses are scattered.
pub fn form_factor(a: &FormScore, b: &FormScore, cfg: &FormConfig, weight: f64) -> FactorResult {
    if !a.has_data || !b.has_data {
        return FactorResult::neutral(FactorKind::Form, weight)
            .with_detail("score_a", a.score)
            .with_detail("score_b", b.score)
            .with_detail("matches_a", a.matches() as f64)
            .with_detail("matches_b", b.matches() as f64);
    }

    let base = ((a.score - b.score) / cfg.score_scale).tanh();
    let stability = match (a.loss_quality, b.loss_quality) {
        (Some(la), Some(lb)) => {
            let damping = (1.0 - 2.0 * la.std_dev.max(lb.std_dev)).clamp(0.0, 1.0);
            (la.mean - lb.mean) * cfg.stability_weight * damping
        }
        _ => 0.0,
    };

    FactorResult::new(FactorKind::Form, base + stability, weight)
        .with_detail("score_a", a.score)
        .with_detail("score_b", b.score)
        .with_detail("matches_a", a.matches() as f64)
        .with_detail("matches_b", b.matches() as f64)
        .with_detail("stability", stability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::test_support::{day, history, played, ranked};

    const ME: i64 = 1;

    fn cfg() -> FormConfig {
        FormConfig::default()
    }

    #[test]
    fn too_few_matches_is_neutral() {
        let as_of = day(2026, 5, 1);
        let h = history(
            ME,
            as_of,
            vec![played(day(2026, 4, 20), ME, 2), played(day(2026, 4, 10), ME, 3)],
        );
        let f = score_form(&h, Some(50), &cfg());
        assert!(!f.has_data);
        assert_eq!(f.score, NEUTRAL_FORM);
        assert_eq!(f.wins, 2);
    }

    #[test]
    fn no_matches_is_neutral() {
        let h = history(ME, day(2026, 5, 1), vec![]);
        let f = score_form(&h, None, &cfg());
        assert!(!f.has_data);
        assert_eq!(f.matches(), 0);
    }

    #[test]
    fn walkovers_do_not_count() {
        let as_of = day(2026, 5, 1);
        let mut wo = played(day(2026, 4, 25), ME, 9);
        wo.walkover = true;
        let h = history(
            ME,
            as_of,
            vec![wo, played(day(2026, 4, 20), ME, 2), played(day(2026, 4, 10), 3, ME)],
        );
        assert!(!score_form(&h, None, &cfg()).has_data);
    }

    #[test]
    fn all_wins_scores_100_and_all_losses_0() {
        let as_of = day(2026, 5, 1);
        let wins = history(
            ME,
            as_of,
            (1..=5).map(|d| played(day(2026, 4, d), ME, 10 + d as i64)).collect(),
        );
        let f = score_form(&wins, None, &cfg());
        assert!(f.has_data);
        assert!((f.score - 100.0).abs() < 1e-9);

        let losses = history(
            ME,
            as_of,
            (1..=5).map(|d| played(day(2026, 4, d), 10 + d as i64, ME)).collect(),
        );
        assert!(score_form(&losses, None, &cfg()).score.abs() < 1e-9);
    }

    #[test]
    fn upset_win_outweighs_expected_win() {
        let as_of = day(2026, 5, 1);
        // Same record (2 wins, 2 losses, alternating), but the first
        // player's most recent win is a big upset.
        let upset_side = history(
            ME,
            as_of,
            vec![
                ranked(played(day(2026, 4, 28), ME, 20), 200, 5),
                ranked(played(day(2026, 4, 26), 21, ME), 100, 200),
                ranked(played(day(2026, 4, 24), ME, 22), 200, 210),
                ranked(played(day(2026, 4, 22), 23, ME), 100, 200),
            ],
        );
        let plain_side = history(
            ME,
            as_of,
            vec![
                ranked(played(day(2026, 4, 28), ME, 20), 200, 210),
                ranked(played(day(2026, 4, 26), 21, ME), 100, 200),
                ranked(played(day(2026, 4, 24), ME, 22), 200, 210),
                ranked(played(day(2026, 4, 22), 23, ME), 100, 200),
            ],
        );
        let a = score_form(&upset_side, Some(200), &cfg());
        let b = score_form(&plain_side, Some(200), &cfg());
        assert!(a.entries[0].upset);
        assert!(a.score > b.score);
    }

    #[test]
    fn confirmed_upset_is_boosted() {
        let as_of = day(2026, 5, 1);
        let h = history(
            ME,
            as_of,
            vec![
                ranked(played(day(2026, 4, 28), ME, 20), 300, 10),
                ranked(played(day(2026, 4, 26), ME, 21), 300, 12),
                ranked(played(day(2026, 4, 24), 22, ME), 100, 300),
            ],
        );
        let f = score_form(&h, Some(300), &cfg());
        // The older upset (index 1) is followed by another upset (index 0).
        assert!(f.entries[1].confirmed);
        // The most recent upset has nothing after it yet.
        assert!(!f.entries[0].confirmed);
    }

    #[test]
    fn surprise_multiplier_bounds() {
        assert!((surprise_multiplier(true, 0.95) - 1.0).abs() < 1e-12);
        assert!((surprise_multiplier(true, 0.05) - 3.0).abs() < 1e-12);
        assert!((surprise_multiplier(false, 0.95) - 3.0).abs() < 1e-12);
        assert!((surprise_multiplier(false, 0.30) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn factor_is_neutral_when_either_side_lacks_data() {
        let as_of = day(2026, 5, 1);
        let full = history(
            ME,
            as_of,
            (1..=5).map(|d| played(day(2026, 4, d), ME, 10 + d as i64)).collect(),
        );
        let empty = history(2, as_of, vec![]);
        let a = score_form(&full, None, &cfg());
        let b = score_form(&empty, None, &cfg());
        let f = form_factor(&a, &b, &cfg(), 0.2);
        assert!(!f.has_data());
        assert_eq!(f.advantage(), 0.0);
    }

    #[test]
    fn factor_favours_better_form_and_is_bounded() {
        let as_of = day(2026, 5, 1);
        let good = history(
            ME,
            as_of,
            (1..=6).map(|d| played(day(2026, 4, d), ME, 10 + d as i64)).collect(),
        );
        let bad = history(
            2,
            as_of,
            (1..=6).map(|d| played(day(2026, 4, d), 10 + d as i64, 2)).collect(),
        );
        let a = score_form(&good, None, &cfg());
        let b = score_form(&bad, None, &cfg());
        let f = form_factor(&a, &b, &cfg(), 0.2);
        assert!(f.has_data());
        assert!(f.advantage() > 0.9 && f.advantage() <= 1.0);
        let g = form_factor(&b, &a, &cfg(), 0.2);
        assert!(g.advantage() < -0.9);
    }

    fn even_form(loss_quality: Option<LossQuality>) -> FormScore {
        FormScore {
            score: 60.0,
            wins: 3,
            losses: 2,
            has_data: true,
            loss_quality,
            entries: Vec::new(),
        }
    }

    fn lq(mean: f64, std_dev: f64) -> Option<LossQuality> {
        Some(LossQuality { mean, std_dev })
    }

    fn stability(f: &FactorResult) -> f64 {
        f.details["stability"]
    }

    #[test]
    fn losses_to_stronger_opponents_earn_stability() {
        let a = even_form(lq(0.7, 0.0));
        let b = even_form(lq(0.3, 0.0));
        let f = form_factor(&a, &b, &cfg(), 0.2);
        // Equal scores, so the stability term is the whole advantage.
        assert!((stability(&f) - 0.4 * 0.15).abs() < 1e-12);
        assert!((f.advantage() - stability(&f)).abs() < 1e-12);

        let g = form_factor(&b, &a, &cfg(), 0.2);
        assert!((stability(&g) + 0.4 * 0.15).abs() < 1e-12);
    }

    #[test]
    fn scattered_losses_damp_stability() {
        let b = even_form(lq(0.3, 0.0));
        let terms: Vec<f64> = [0.0, 0.1, 0.3, 0.5, 0.8]
            .iter()
            .map(|&sd| stability(&form_factor(&even_form(lq(0.7, sd)), &b, &cfg(), 0.2)))
            .collect();
        assert!(terms.windows(2).take(3).all(|w| w[1] < w[0]));
        assert!((terms[1] - 0.06 * 0.8).abs() < 1e-12);
        assert_eq!(terms[3], 0.0);
        assert_eq!(terms[4], 0.0);

        // Either side's spread damps the term.
        let noisy_b = even_form(lq(0.3, 0.3));
        let f = form_factor(&even_form(lq(0.7, 0.0)), &noisy_b, &cfg(), 0.2);
        assert!((stability(&f) - 0.06 * 0.4).abs() < 1e-12);
    }

    #[test]
    fn stability_is_zero_when_a_side_has_no_losses() {
        for (a, b) in [
            (even_form(None), even_form(lq(0.2, 0.0))),
            (even_form(lq(0.9, 0.0)), even_form(None)),
            (even_form(None), even_form(None)),
        ] {
            let f = form_factor(&a, &b, &cfg(), 0.2);
            assert_eq!(stability(&f), 0.0);
            assert_eq!(f.advantage(), 0.0);
        }
    }

    #[test]
    fn loss_quality_reflects_opponent_strength() {
        let as_of = day(2026, 5, 1);
        let wins = |first: i64| -> Vec<_> {
            (1..=3)
                .map(|d| ranked(played(day(2026, 4, d), ME, first + d as i64), 100, 150))
                .collect()
        };
        let mut strong = wins(10);
        strong.push(ranked(played(day(2026, 4, 10), 20, ME), 5, 100));
        strong.push(ranked(played(day(2026, 4, 12), 21, ME), 8, 100));
        let mut weak = wins(30);
        weak.push(ranked(played(day(2026, 4, 10), 40, ME), 400, 100));
        weak.push(ranked(played(day(2026, 4, 12), 41, ME), 500, 100));

        let a = score_form(&history(ME, as_of, strong), Some(100), &cfg());
        let b = score_form(&history(ME, as_of, weak), Some(100), &cfg());
        let (la, lb) = (a.loss_quality.unwrap(), b.loss_quality.unwrap());
        assert!(la.mean > 0.5);
        assert!(lb.mean < 0.5);

        let f = form_factor(&even_form(a.loss_quality), &even_form(b.loss_quality), &cfg(), 0.2);
        assert!(stability(&f) > 0.0);
    }
}
