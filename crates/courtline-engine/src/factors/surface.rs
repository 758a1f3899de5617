// Surface ability: career and recent win rates on the match surface.

use chrono::Duration;
use courtline_core::config::SurfaceConfig;
use courtline_core::history::{HistoryReader, MatchQuery};
use courtline_core::model::{MatchRecord, Surface};
use serde::Serialize;

use crate::factors::{read_or_default, FactorKind, FactorResult, PlayerHistory};

const BASELINE_RATE: f64 = 0.5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SurfaceRecord {
    pub career_wins: usize,
    pub career_matches: usize,
    pub recent_wins: usize,
    pub recent_matches: usize,
    /// Blended, reliability-adjusted win rate in [0, 1].
    pub rating: f64,
    pub has_data: bool,
}

/// Pull a player's surface history and summarize it.
pub fn surface_record<R: HistoryReader + ?Sized>(
    reader: &R,
    history: &PlayerHistory,
    surface: Option<Surface>,
    cfg: &SurfaceConfig,
) -> SurfaceRecord {
    let Some(surface) = surface else {
        return SurfaceRecord {
            rating: BASELINE_RATE,
            ..Default::default()
        };
    };
    let query = MatchQuery::recent(cfg.career_limit)
        .surface(Some(surface))
        .until(history.as_of);
    let matches = read_or_default(
        "surface matches",
        history.id,
        reader.get_matches(history.id, query),
    );
    summarize_surface(&matches, history, cfg)
}

/// Reliability-weighted rate: a sample below `reliable` matches is pulled
/// toward 50% in proportion to how far short it falls.
fn shrunk_rate(wins: usize, matches: usize, reliable: usize) -> f64 {
    if matches == 0 {
        return BASELINE_RATE;
    }
    let rate = wins as f64 / matches as f64;
    let reliability = (matches as f64 / reliable.max(1) as f64).min(1.0);
    reliability * rate + (1.0 - reliability) * BASELINE_RATE
}

/// Summarize surface matches (already filtered to one surface).
pub fn summarize_surface(
    matches: &[MatchRecord],
    history: &PlayerHistory,
    cfg: &SurfaceConfig,
) -> SurfaceRecord {
    let ids = &history.identities;
    let recent_cutoff = history.as_of - Duration::days(cfg.recent_window_days);

    let mut rec = SurfaceRecord::default();
    for m in matches.iter().filter(|m| !m.walkover) {
        let won = m.won_by(ids);
        rec.career_matches += 1;
        rec.career_wins += usize::from(won);
        if m.date.is_some_and(|d| d >= recent_cutoff) {
            rec.recent_matches += 1;
            rec.recent_wins += usize::from(won);
        }
    }

    let career = shrunk_rate(rec.career_wins, rec.career_matches, cfg.career_reliable_matches);
    let recent = shrunk_rate(rec.recent_wins, rec.recent_matches, cfg.recent_reliable_matches);
    let total_weight = cfg.career_weight + cfg.recent_weight;
    rec.rating = if total_weight > 0.0 {
        (cfg.career_weight * career + cfg.recent_weight * recent) / total_weight
    } else {
        BASELINE_RATE
    };
    rec.has_data =
        rec.career_matches >= cfg.min_matches || rec.recent_matches >= cfg.min_matches;
    rec
}

/// Advantage is twice the rating difference, so a 75% vs 50% player is +0.5.
pub fn surface_factor(a: &SurfaceRecord, b: &SurfaceRecord, weight: f64) -> FactorResult {
    let detailed = |f: FactorResult| {
        f.with_detail("rating_a", a.rating)
            .with_detail("rating_b", b.rating)
            .with_detail("matches_a", a.career_matches as f64)
            .with_detail("matches_b", b.career_matches as f64)
    };
    if !a.has_data || !b.has_data {
        return detailed(FactorResult::neutral(FactorKind::Surface, weight));
    }
    detailed(FactorResult::new(
        FactorKind::Surface,
        2.0 * (a.rating - b.rating),
        weight,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::test_support::{day, history, played};

    fn matches(wins: usize, losses: usize, date: chrono::NaiveDate) -> Vec<MatchRecord> {
        let mut out = Vec::new();
        for i in 0..wins {
            out.push(played(date, 1, 100 + i as i64));
        }
        for i in 0..losses {
            out.push(played(date, 200 + i as i64, 1));
        }
        out
    }

    #[test]
    fn small_sample_is_pulled_to_baseline() {
        assert!((shrunk_rate(2, 2, 20) - 0.55).abs() < 1e-12);
        assert!((shrunk_rate(20, 20, 20) - 1.0).abs() < 1e-12);
        assert_eq!(shrunk_rate(0, 0, 20), 0.5);
    }

    #[test]
    fn requires_minimum_matches() {
        let as_of = day(2026, 6, 1);
        let h = history(1, as_of, vec![]);
        let rec = summarize_surface(&matches(3, 1, day(2026, 5, 1)), &h, &SurfaceConfig::default());
        assert!(!rec.has_data);
        let rec = summarize_surface(&matches(4, 1, day(2026, 5, 1)), &h, &SurfaceConfig::default());
        assert!(rec.has_data);
        assert_eq!(rec.recent_matches, 5);
    }

    #[test]
    fn old_matches_only_count_toward_career() {
        let as_of = day(2026, 6, 1);
        let h = history(1, as_of, vec![]);
        let rec = summarize_surface(&matches(10, 0, day(2022, 5, 1)), &h, &SurfaceConfig::default());
        assert_eq!(rec.career_matches, 10);
        assert_eq!(rec.recent_matches, 0);
        // career 0.5*0.5 + 0.5*1.0 = 0.75; recent baseline 0.5
        assert!((rec.rating - (0.6 * 0.75 + 0.4 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn factor_neutral_without_surface_data() {
        let a = SurfaceRecord {
            rating: 0.8,
            has_data: true,
            ..Default::default()
        };
        let b = SurfaceRecord::default();
        let f = surface_factor(&a, &b, 0.12);
        assert!(!f.has_data());
        assert_eq!(f.advantage(), 0.0);
    }

    #[test]
    fn factor_scales_rating_gap() {
        let a = SurfaceRecord {
            rating: 0.75,
            has_data: true,
            ..Default::default()
        };
        let b = SurfaceRecord {
            rating: 0.5,
            has_data: true,
            ..Default::default()
        };
        assert!((surface_factor(&a, &b, 0.12).advantage() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn walkovers_are_ignored() {
        let as_of = day(2026, 6, 1);
        let h = history(1, as_of, vec![]);
        let mut ms = matches(5, 0, day(2026, 5, 1));
        for m in &mut ms {
            m.walkover = true;
        }
        let rec = summarize_surface(&ms, &h, &SurfaceConfig::default());
        assert_eq!(rec.career_matches, 0);
        assert!(!rec.has_data);
    }
}
