// Domain data model: players, match records, rankings, surfaces and tiers.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable numeric player identity. Aliases are distinct ids that resolve to
/// the same canonical id.
pub type PlayerId = i64;

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

/// Court surface a match was played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Hard,
    Clay,
    Grass,
    Carpet,
}

impl Surface {
    /// Parse a surface name as stored in match records. Case-insensitive;
    /// indoor hard courts are folded into `Hard`.
    pub fn from_str_surface(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "hard" | "indoor hard" | "i.hard" | "outdoor hard" => Some(Surface::Hard),
            "clay" | "red clay" | "green clay" => Some(Surface::Clay),
            "grass" => Some(Surface::Grass),
            "carpet" => Some(Surface::Carpet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Hard => "hard",
            Surface::Clay => "clay",
            Surface::Grass => "grass",
            Surface::Carpet => "carpet",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Competitive tiers
// ---------------------------------------------------------------------------

/// Tournament category, used for form weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TournamentCategory {
    GrandSlam,
    Masters,
    Tour500,
    Tour250,
    Challenger,
    Itf,
}

impl TournamentCategory {
    /// Classify a tournament from its descriptive name. Unknown names are
    /// treated as regular tour events.
    ///
    /// Lower-tier markers win over slam names, and slam names match whole
    /// words only, so "M25 Cyprus Open" stays an ITF event.
    pub fn from_name(name: &str) -> Self {
        let n = name.to_lowercase();
        let tokens: Vec<&str> = n
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let has_phrase = |phrase: &[&str]| tokens.windows(phrase.len()).any(|w| w == phrase);

        const ITF_TOKENS: &[&str] = &[
            "itf", "futures", "m15", "m25", "w15", "w25", "w35", "w50", "w75", "w100",
        ];
        const SLAMS: &[&[&str]] = &[
            &["grand", "slam"],
            &["australian", "open"],
            &["roland", "garros"],
            &["french", "open"],
            &["wimbledon"],
            &["us", "open"],
        ];

        if tokens.iter().any(|t| t.starts_with("challenger")) {
            return TournamentCategory::Challenger;
        }
        if tokens.iter().any(|t| ITF_TOKENS.contains(t)) {
            return TournamentCategory::Itf;
        }
        if SLAMS.iter().any(|&s| has_phrase(s)) {
            return TournamentCategory::GrandSlam;
        }
        if n.contains("masters") || n.contains("1000") {
            return TournamentCategory::Masters;
        }
        if n.contains("500") {
            return TournamentCategory::Tour500;
        }
        TournamentCategory::Tour250
    }

    /// Relative importance of a result at this category when scoring form.
    pub fn form_weight(&self) -> f64 {
        match self {
            TournamentCategory::GrandSlam => 1.30,
            TournamentCategory::Masters => 1.20,
            TournamentCategory::Tour500 => 1.10,
            TournamentCategory::Tour250 => 1.00,
            TournamentCategory::Challenger => 0.85,
            TournamentCategory::Itf => 0.70,
        }
    }

    /// The competitive level this category belongs to.
    pub fn level(&self) -> TierLevel {
        match self {
            TournamentCategory::Challenger => TierLevel::Challenger,
            TournamentCategory::Itf => TierLevel::Itf,
            _ => TierLevel::Tour,
        }
    }
}

/// Coarse competitive level. Ordered: `Itf < Challenger < Tour`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    Itf,
    Challenger,
    Tour,
}

impl TierLevel {
    pub fn rank(&self) -> u8 {
        match self {
            TierLevel::Itf => 0,
            TierLevel::Challenger => 1,
            TierLevel::Tour => 2,
        }
    }

    pub fn from_str_level(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "itf" | "futures" => Some(TierLevel::Itf),
            "challenger" => Some(TierLevel::Challenger),
            "tour" | "atp" | "wta" => Some(TierLevel::Tour),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TierLevel::Itf => "itf",
            TierLevel::Challenger => "challenger",
            TierLevel::Tour => "tour",
        }
    }
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Match records
// ---------------------------------------------------------------------------

/// Optional serve/return box score for one side of a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServeStats {
    pub aces: Option<u32>,
    pub double_faults: Option<u32>,
    pub first_serve_in_pct: Option<f64>,
    pub first_serve_won_pct: Option<f64>,
    pub second_serve_won_pct: Option<f64>,
    pub break_points_saved: Option<u32>,
    pub break_points_faced: Option<u32>,
}

/// Both sides' box scores, stored as a single JSON column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxScore {
    pub winner: ServeStats,
    pub loser: ServeStats,
}

/// One historical match. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: i64,
    /// `None` when the source record was undated or its date was unparseable.
    pub date: Option<NaiveDate>,
    pub winner: PlayerId,
    pub loser: PlayerId,
    /// Rankings at the time of the match, when known.
    pub winner_rank: Option<u32>,
    pub loser_rank: Option<u32>,
    pub surface: Option<Surface>,
    pub tournament: String,
    pub score: String,
    pub best_of: u8,
    pub winner_games: u32,
    pub loser_games: u32,
    pub duration_minutes: Option<u32>,
    /// The loser retired during the match.
    pub retired: bool,
    /// The loser conceded before play started.
    pub walkover: bool,
    pub box_score: Option<BoxScore>,
}

impl MatchRecord {
    pub fn category(&self) -> TournamentCategory {
        TournamentCategory::from_name(&self.tournament)
    }

    /// Whether any of `ids` is the winner of this match.
    pub fn won_by(&self, ids: &[PlayerId]) -> bool {
        ids.contains(&self.winner)
    }

    pub fn involves(&self, ids: &[PlayerId]) -> bool {
        ids.contains(&self.winner) || ids.contains(&self.loser)
    }

    /// Opponent id and opponent's ranking at match time, from the
    /// perspective of the player identified by `ids`.
    pub fn opponent_of(&self, ids: &[PlayerId]) -> (PlayerId, Option<u32>) {
        if self.won_by(ids) {
            (self.loser, self.loser_rank)
        } else {
            (self.winner, self.winner_rank)
        }
    }

    /// Own ranking at match time for the player identified by `ids`.
    pub fn own_rank(&self, ids: &[PlayerId]) -> Option<u32> {
        if self.won_by(ids) {
            self.winner_rank
        } else {
            self.loser_rank
        }
    }

    /// Number of sets played, parsed from the score string.
    pub fn sets_played(&self) -> Option<usize> {
        parse_set_scores(&self.score).map(|sets| sets.len())
    }

    /// Days between this match and `as_of`. Undated matches report
    /// `undated_age_days`.
    pub fn days_before(&self, as_of: NaiveDate, undated_age_days: i64) -> i64 {
        match self.date {
            Some(d) => (as_of - d).num_days().max(0),
            None => undated_age_days,
        }
    }
}

/// Parse a set score such as `"6-4 3-6 7-6(5)"` into per-set game counts.
///
/// Returns `None` for empty strings or any token that is not of the form
/// `a-b` (tiebreak suffixes in parentheses are ignored). Retirement markers
/// (`RET`, `W/O`, `DEF`) end parsing without failing it.
pub fn parse_set_scores(score: &str) -> Option<Vec<(u8, u8)>> {
    let mut sets = Vec::new();
    for token in score.split_whitespace() {
        let upper = token.to_uppercase();
        if matches!(upper.as_str(), "RET" | "RET." | "W/O" | "WO" | "DEF" | "DEF.") {
            break;
        }
        let core = token.split('(').next().unwrap_or(token);
        let (a, b) = core.split_once('-')?;
        let a: u8 = a.trim().parse().ok()?;
        let b: u8 = b.trim().parse().ok()?;
        sets.push((a, b));
    }
    if sets.is_empty() {
        None
    } else {
        Some(sets)
    }
}

// ---------------------------------------------------------------------------
// Rankings, head-to-head, profiles
// ---------------------------------------------------------------------------

/// A dated ranking snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub player: PlayerId,
    pub date: NaiveDate,
    pub rank: u32,
    pub points: u32,
}

/// Head-to-head win counts from the perspective of `(a, b)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub a_wins: u32,
    pub b_wins: u32,
}

impl HeadToHead {
    pub fn total(&self) -> u32 {
        self.a_wins + self.b_wins
    }
}

/// Static player attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub name: String,
    pub country: Option<String>,
    pub hand: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl PlayerProfile {
    /// Age in whole years on `as_of`, if the date of birth is known.
    pub fn age_on(&self, as_of: NaiveDate) -> Option<u32> {
        let dob = self.birth_date?;
        as_of.years_since(dob)
    }
}
