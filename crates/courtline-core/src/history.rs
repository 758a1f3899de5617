// Read interface over the historical match store.
//
// The engine never talks to storage directly; everything it knows about a
// player comes through this trait. Implementations must resolve aliases
// themselves: every query keyed by a player id aggregates over the full
// identity set of that player's canonical id.

use anyhow::Result;
use chrono::NaiveDate;

use crate::model::{HeadToHead, MatchRecord, PlayerId, PlayerProfile, RankingSnapshot, Surface};

/// Filters for a match-history query.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchQuery {
    /// Maximum number of rows returned (most recent first).
    pub limit: usize,
    pub surface: Option<Surface>,
    /// Only matches on or after this date (undated matches are excluded
    /// when a lower bound is given).
    pub since: Option<NaiveDate>,
    /// Only matches on or before this date. Undated matches are kept.
    pub until: Option<NaiveDate>,
}

impl MatchQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn surface(mut self, surface: Option<Surface>) -> Self {
        self.surface = surface;
        self
    }

    pub fn since(mut self, since: NaiveDate) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }
}

/// Read-only access to match results, rankings and identities.
///
/// Implementations must be safe to call from several worker threads at
/// once; per-side factor calculations are dispatched concurrently.
pub trait HistoryReader: Send + Sync {
    /// Matches involving the player (any alias), most recent first.
    fn get_matches(&self, player: PlayerId, query: MatchQuery) -> Result<Vec<MatchRecord>>;

    /// Latest known rank for the player.
    fn get_ranking(&self, player: PlayerId) -> Result<Option<u32>>;

    /// Trailing ranking snapshots, most recent first.
    fn get_ranking_history(&self, player: PlayerId, limit: usize) -> Result<Vec<RankingSnapshot>>;

    /// Head-to-head counts between `a` and `b`, optionally restricted to a surface.
    fn get_head_to_head(&self, a: PlayerId, b: PlayerId, surface: Option<Surface>)
        -> Result<HeadToHead>;

    /// Follow alias links to the canonical id. Must be idempotent.
    fn resolve_canonical_identity(&self, player: PlayerId) -> Result<PlayerId>;

    /// Every id (canonical included) that resolves to `canonical`.
    fn all_identities_for(&self, canonical: PlayerId) -> Result<Vec<PlayerId>>;

    /// Long-horizon performance rating, if one has been computed.
    fn get_performance_rating(&self, player: PlayerId) -> Result<Option<f64>>;

    fn get_player_profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>>;

    /// The numerically largest rank on record, used to build a default
    /// ranking for players with no ranking at all.
    fn lowest_observed_ranking(&self) -> Result<Option<u32>>;
}
