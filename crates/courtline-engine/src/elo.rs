// Elo-like ratings derived from rankings and market prices.

use courtline_core::config::ComposerConfig;

/// Rating assigned to rank 1.
const TOP_RATING: f64 = 2500.0;
/// Rating points lost per doubling of the rank number.
const POINTS_PER_DOUBLING: f64 = 150.0;
/// No ranking maps below this rating.
pub const RATING_FLOOR: f64 = 1000.0;

/// Map a ranking onto an Elo-like scale: `max(1000, 2500 - 150 * log2(rank))`.
///
/// Rank 0 is treated as rank 1.
pub fn rank_to_elo(rank: u32) -> f64 {
    let r = f64::from(rank.max(1));
    (TOP_RATING - POINTS_PER_DOUBLING * r.log2()).max(RATING_FLOOR)
}

/// Standard logistic expectation of `a` beating `b`.
pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-(r_a - r_b) / 400.0))
}

/// Win probability of rank `a` over rank `b` on the ranking-derived scale.
pub fn rank_win_probability(a: u32, b: u32) -> f64 {
    expected_score(rank_to_elo(a), rank_to_elo(b))
}

/// Price-implied ranking bands: `(max decimal odds, implied rank)`.
const PRICE_RANK_TABLE: &[(f64, u32)] = &[
    (1.20, 15),
    (1.50, 40),
    (2.00, 80),
    (3.00, 150),
    (5.00, 300),
];
const LONGSHOT_RANK: u32 = 500;

/// Estimate a ranking from a player's own decimal price when no official
/// ranking exists.
pub fn price_implied_rank(decimal_odds: f64) -> u32 {
    PRICE_RANK_TABLE
        .iter()
        .find(|(max_odds, _)| decimal_odds <= *max_odds)
        .map(|(_, rank)| *rank)
        .unwrap_or(LONGSHOT_RANK)
}

/// Ranking used for a player with neither a ranking nor a price.
pub fn default_worst_rank(lowest_observed: Option<u32>, cfg: &ComposerConfig) -> u32 {
    match lowest_observed {
        Some(worst) => worst.saturating_add(cfg.default_rank_buffer),
        None => cfg.empty_store_rank,
    }
}
