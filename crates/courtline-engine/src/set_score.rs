// Set-score distribution derived from a match win probability.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Exponent damping a match probability into a per-set probability.
const SET_EXPONENT: f64 = 0.7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetScoreError {
    #[error("unsupported match format: best of {0} (expected 3 or 5)")]
    UnsupportedFormat(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BestOf {
    Three,
    Five,
}

impl BestOf {
    pub fn sets_to_win(&self) -> u8 {
        match self {
            BestOf::Three => 2,
            BestOf::Five => 3,
        }
    }
}

impl TryFrom<u8> for BestOf {
    type Error = SetScoreError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            3 => Ok(BestOf::Three),
            5 => Ok(BestOf::Five),
            other => Err(SetScoreError::UnsupportedFormat(other)),
        }
    }
}

impl fmt::Display for BestOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BestOf::Three => f.write_str("best of 3"),
            BestOf::Five => f.write_str("best of 5"),
        }
    }
}

/// Final score in sets, from the first player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SetScore {
    pub first: u8,
    pub second: u8,
}

impl SetScore {
    pub fn mirrored(&self) -> Self {
        Self {
            first: self.second,
            second: self.first,
        }
    }

    pub fn first_wins(&self) -> bool {
        self.first > self.second
    }
}

impl fmt::Display for SetScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetScoreDistribution {
    pub best_of: BestOf,
    pub set_probability: f64,
    /// First-player wins (straight sets first), then first-player losses.
    pub outcomes: Vec<(SetScore, f64)>,
}

impl SetScoreDistribution {
    pub fn probability(&self, score: SetScore) -> f64 {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == score)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    /// Probability that the first player wins the match.
    pub fn match_probability(&self) -> f64 {
        self.outcomes
            .iter()
            .filter(|(s, _)| s.first_wins())
            .map(|(_, p)| p)
            .sum()
    }

    /// Probability that the first player covers a set handicap `line`
    /// (e.g. -1.5 means winning by two sets or more).
    pub fn handicap_cover(&self, line: f64) -> f64 {
        self.outcomes
            .iter()
            .filter(|(s, _)| f64::from(s.first) - f64::from(s.second) + line > 0.0)
            .map(|(_, p)| p)
            .sum()
    }

    /// Probability that more than `line` sets are played.
    pub fn total_sets_over(&self, line: f64) -> f64 {
        self.outcomes
            .iter()
            .filter(|(s, _)| f64::from(s.first + s.second) > line)
            .map(|(_, p)| p)
            .sum()
    }
}

/// Per-set win probability: `p^0.7 / (p^0.7 + (1-p)^0.7)`.
///
/// Keeps the 0.7 damping while staying symmetric, so the distributions for
/// `p` and `1 - p` mirror each other exactly.
pub fn set_win_probability(p_match: f64) -> f64 {
    let p = p_match.clamp(0.0, 1.0);
    let a = p.powf(SET_EXPONENT);
    let b = (1.0 - p).powf(SET_EXPONENT);
    if a + b <= 0.0 {
        0.5
    } else {
        a / (a + b)
    }
}

fn binomial(n: u32, k: u32) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * f64::from(n - i) / f64::from(i + 1))
}

/// Exact set-score distribution via path counting.
///
/// A win `n-k` requires the winner to take the last set, so there are
/// `C(n - 1 + k, k)` orderings, each with probability `s^n (1-s)^k`.
pub fn set_score_distribution(p_match: f64, best_of: BestOf) -> SetScoreDistribution {
    let s = set_win_probability(p_match);
    let q = 1.0 - s;
    let n = u32::from(best_of.sets_to_win());

    let mut outcomes = Vec::with_capacity(2 * n as usize);
    for k in 0..n {
        let paths = binomial(n - 1 + k, k);
        outcomes.push((
            SetScore {
                first: n as u8,
                second: k as u8,
            },
            paths * s.powi(n as i32) * q.powi(k as i32),
        ));
    }
    for k in (0..n).rev() {
        let paths = binomial(n - 1 + k, k);
        outcomes.push((
            SetScore {
                first: k as u8,
                second: n as u8,
            },
            paths * q.powi(n as i32) * s.powi(k as i32),
        ));
    }

    let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
    if total > 0.0 {
        for (_, p) in &mut outcomes {
            *p /= total;
        }
    }

    SetScoreDistribution {
        best_of,
        set_probability: s,
        outcomes,
    }
}
