// SQLite-backed history store.
//
// Implements `HistoryReader` over locally stored results, rankings, aliases
// and performance ratings, and keeps the stake audit trail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::audit::StakeAuditRecord;
use crate::history::{HistoryReader, MatchQuery};
use crate::model::{
    BoxScore, HeadToHead, MatchRecord, PlayerId, PlayerProfile, RankingSnapshot, Surface,
};

const DATE_FMT: &str = "%Y-%m-%d";

/// Upper bound on alias chain length; guards against accidental cycles.
const MAX_ALIAS_HOPS: usize = 16;

const MATCH_COLUMNS: &str = "id, match_date, winner_id, loser_id, winner_rank, loser_rank, \
     surface, tournament, score, best_of, winner_games, loser_games, duration_minutes, \
     retired, walkover, box_score";

/// Latest rank per canonical player plus the worst rank on record.
/// Built once in full and then shared read-only.
#[derive(Debug, Default)]
struct RankingIndex {
    latest: HashMap<PlayerId, (NaiveDate, u32)>,
    lowest_observed: Option<u32>,
}

/// SQLite-backed store for match history and the stake audit trail.
pub struct Database {
    conn: Mutex<Connection>,
    rankings: RwLock<Option<Arc<RankingIndex>>>,
    /// Bumped on every ranking invalidation. An index built under an older
    /// generation is served to its caller but never published.
    rankings_generation: AtomicU64,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL,
                country     TEXT,
                hand        TEXT,
                birth_date  TEXT
            );

            CREATE TABLE IF NOT EXISTS player_aliases (
                alias_id     INTEGER PRIMARY KEY,
                canonical_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS matches (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                match_date       TEXT,
                winner_id        INTEGER NOT NULL,
                loser_id         INTEGER NOT NULL,
                winner_rank      INTEGER,
                loser_rank       INTEGER,
                surface          TEXT,
                tournament       TEXT NOT NULL DEFAULT '',
                score            TEXT NOT NULL DEFAULT '',
                best_of          INTEGER NOT NULL DEFAULT 3,
                winner_games     INTEGER NOT NULL DEFAULT 0,
                loser_games      INTEGER NOT NULL DEFAULT 0,
                duration_minutes INTEGER,
                retired          INTEGER NOT NULL DEFAULT 0,
                walkover         INTEGER NOT NULL DEFAULT 0,
                box_score        TEXT
            );

            CREATE TABLE IF NOT EXISTS rankings (
                player_id    INTEGER NOT NULL,
                ranking_date TEXT NOT NULL,
                rank         INTEGER NOT NULL,
                points       INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (player_id, ranking_date)
            );

            CREATE TABLE IF NOT EXISTS performance_ratings (
                player_id   INTEGER PRIMARY KEY,
                rating      REAL NOT NULL,
                computed_on TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stake_audit (
                id                     INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at            TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                selection              TEXT NOT NULL,
                model_probability      REAL NOT NULL,
                calibrated_probability REAL NOT NULL,
                implied_probability    REAL NOT NULL,
                decimal_odds           REAL NOT NULL,
                edge                   REAL NOT NULL,
                expected_value         REAL NOT NULL,
                disagreement_ratio     REAL NOT NULL,
                disagreement_tier      TEXT NOT NULL,
                odds_category          TEXT NOT NULL,
                recommended_units      REAL NOT NULL,
                outcome                TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_matches_winner ON matches(winner_id, match_date);
            CREATE INDEX IF NOT EXISTS idx_matches_loser ON matches(loser_id, match_date);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            rankings: RwLock::new(None),
            rankings_generation: AtomicU64::new(0),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    fn invalidate_rankings(&self) {
        self.rankings_generation.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut slot) = self.rankings.write() {
            *slot = None;
        }
    }

    // ------------------------------------------------------------------
    // Identity resolution
    // ------------------------------------------------------------------

    fn resolve_with(conn: &Connection, player: PlayerId) -> Result<PlayerId> {
        let mut current = player;
        for _ in 0..MAX_ALIAS_HOPS {
            let next: Option<PlayerId> = conn
                .query_row(
                    "SELECT canonical_id FROM player_aliases WHERE alias_id = ?1",
                    params![current],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to query player alias")?;
            match next {
                Some(n) if n != current => current = n,
                _ => return Ok(current),
            }
        }
        warn!("alias chain for player {player} exceeds {MAX_ALIAS_HOPS} hops");
        Ok(current)
    }

    fn identities_with(conn: &Connection, canonical: PlayerId) -> Result<Vec<PlayerId>> {
        let mut stmt = conn
            .prepare("SELECT alias_id FROM player_aliases")
            .context("failed to prepare alias listing")?;
        let aliases = stmt
            .query_map([], |row| row.get::<_, PlayerId>(0))
            .context("failed to list aliases")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map alias rows")?;

        let mut ids = vec![canonical];
        for alias in aliases {
            if alias != canonical && Self::resolve_with(conn, alias)? == canonical {
                ids.push(alias);
            }
        }
        Ok(ids)
    }

    /// Canonical id and the full identity set, under a single lock.
    fn identity_set(&self, player: PlayerId) -> Result<Vec<PlayerId>> {
        let conn = self.conn();
        let canonical = Self::resolve_with(&conn, player)?;
        Self::identities_with(&conn, canonical)
    }

    // ------------------------------------------------------------------
    // Ranking index (lazy, build-then-publish)
    // ------------------------------------------------------------------

    fn ranking_index(&self) -> Result<Arc<RankingIndex>> {
        if let Ok(slot) = self.rankings.read() {
            if let Some(index) = slot.as_ref() {
                return Ok(Arc::clone(index));
            }
        }

        let generation = self.rankings_generation.load(Ordering::Acquire);
        let built = Arc::new(self.build_ranking_index()?);
        Ok(self.publish_ranking_index(built, generation))
    }

    /// Publish `built` unless the cache was filled or invalidated since
    /// `generation` was read. Returns the index the caller should use.
    fn publish_ranking_index(&self, built: Arc<RankingIndex>, generation: u64) -> Arc<RankingIndex> {
        let mut slot = match self.rankings.write() {
            Ok(slot) => slot,
            // A poisoned cache only costs a rebuild; serve the fresh copy.
            Err(_) => return built,
        };
        // Another thread may have published while we were building.
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
        if self.rankings_generation.load(Ordering::Acquire) != generation {
            debug!("rankings changed during index build; not publishing");
            return built;
        }
        *slot = Some(Arc::clone(&built));
        debug!(players = built.latest.len(), "ranking index published");
        built
    }

    fn build_ranking_index(&self) -> Result<RankingIndex> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT player_id, ranking_date, rank FROM rankings")
            .context("failed to prepare ranking scan")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, PlayerId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })
            .context("failed to scan rankings")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map ranking rows")?;

        let mut canonical_of: HashMap<PlayerId, PlayerId> = HashMap::new();
        let mut index = RankingIndex::default();
        for (player, date_str, rank) in rows {
            let Ok(date) = NaiveDate::parse_from_str(&date_str, DATE_FMT) else {
                warn!("skipping ranking for player {player}: unparseable date '{date_str}'");
                continue;
            };
            let canonical = match canonical_of.get(&player) {
                Some(c) => *c,
                None => {
                    let c = Self::resolve_with(&conn, player)?;
                    canonical_of.insert(player, c);
                    c
                }
            };
            index.lowest_observed = Some(index.lowest_observed.map_or(rank, |r| r.max(rank)));
            let entry = index.latest.entry(canonical).or_insert((date, rank));
            if date > entry.0 || (date == entry.0 && rank < entry.1) {
                *entry = (date, rank);
            }
        }
        Ok(index)
    }

    // ------------------------------------------------------------------
    // Writes (fixtures, imports, rating job)
    // ------------------------------------------------------------------

    /// Insert a player or update their profile if the id already exists.
    pub fn upsert_player(&self, profile: &PlayerProfile) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (id, name, country, hand, birth_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name       = excluded.name,
                country    = excluded.country,
                hand       = excluded.hand,
                birth_date = excluded.birth_date",
            params![
                profile.id,
                profile.name,
                profile.country,
                profile.hand,
                profile.birth_date.map(|d| d.format(DATE_FMT).to_string()),
            ],
        )
        .context("failed to upsert player")?;
        Ok(())
    }

    /// Register `alias` as another identity of `canonical`.
    ///
    /// Fails if the link would create a cycle.
    pub fn add_alias(&self, alias: PlayerId, canonical: PlayerId) -> Result<()> {
        {
            let conn = self.conn();
            if alias == canonical || Self::resolve_with(&conn, canonical)? == alias {
                bail!("alias {alias} -> {canonical} would create a cycle");
            }
            conn.execute(
                "INSERT OR REPLACE INTO player_aliases (alias_id, canonical_id) VALUES (?1, ?2)",
                params![alias, canonical],
            )
            .context("failed to insert alias")?;
        }
        self.invalidate_rankings();
        Ok(())
    }

    /// Store a match. The record's `id` is ignored; the new row id is returned.
    pub fn insert_match(&self, m: &MatchRecord) -> Result<i64> {
        let conn = self.conn();
        let box_json = match &m.box_score {
            Some(b) => Some(serde_json::to_string(b).context("failed to serialize box score")?),
            None => None,
        };
        conn.execute(
            "INSERT INTO matches
                (match_date, winner_id, loser_id, winner_rank, loser_rank, surface, tournament,
                 score, best_of, winner_games, loser_games, duration_minutes, retired, walkover,
                 box_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                m.date.map(|d| d.format(DATE_FMT).to_string()),
                m.winner,
                m.loser,
                m.winner_rank,
                m.loser_rank,
                m.surface.map(|s| s.as_str()),
                m.tournament,
                m.score,
                m.best_of,
                m.winner_games,
                m.loser_games,
                m.duration_minutes,
                m.retired,
                m.walkover,
                box_json,
            ],
        )
        .context("failed to insert match")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_ranking(&self, snapshot: &RankingSnapshot) -> Result<()> {
        {
            let conn = self.conn();
            conn.execute(
                "INSERT OR REPLACE INTO rankings (player_id, ranking_date, rank, points)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.player,
                    snapshot.date.format(DATE_FMT).to_string(),
                    snapshot.rank,
                    snapshot.points,
                ],
            )
            .context("failed to insert ranking")?;
        }
        self.invalidate_rankings();
        Ok(())
    }

    /// Replace stored performance ratings in a single transaction.
    pub fn store_performance_ratings(
        &self,
        ratings: &[(PlayerId, f64)],
        computed_on: NaiveDate,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin rating transaction")?;
        let day = computed_on.format(DATE_FMT).to_string();
        for &(player, rating) in ratings {
            tx.execute(
                "INSERT OR REPLACE INTO performance_ratings (player_id, rating, computed_on)
                 VALUES (?1, ?2, ?3)",
                params![player, rating, day],
            )
            .context("failed to store performance rating")?;
        }
        tx.commit().context("failed to commit performance ratings")?;
        Ok(())
    }

    /// All dated matches in `[since, until]`, oldest first.
    pub fn matches_between(&self, since: NaiveDate, until: NaiveDate) -> Result<Vec<MatchRecord>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE match_date >= ?1 AND match_date <= ?2
             ORDER BY match_date ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql).context("failed to prepare matches_between")?;
        let rows = stmt
            .query_map(
                params![
                    since.format(DATE_FMT).to_string(),
                    until.format(DATE_FMT).to_string()
                ],
                map_match_row,
            )
            .context("failed to query matches_between")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map match rows")?;
        Ok(rows)
    }

    /// Canonical id for every id that appears in the alias table.
    pub fn canonical_map(&self) -> Result<HashMap<PlayerId, PlayerId>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT alias_id FROM player_aliases")
            .context("failed to prepare alias listing")?;
        let aliases = stmt
            .query_map([], |row| row.get::<_, PlayerId>(0))
            .context("failed to list aliases")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map alias rows")?;
        let mut out = HashMap::new();
        for alias in aliases {
            out.insert(alias, Self::resolve_with(&conn, alias)?);
        }
        Ok(out)
    }

    /// Append a stake decision to the audit trail.
    pub fn record_stake_audit(&self, r: &StakeAuditRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO stake_audit
                (selection, model_probability, calibrated_probability, implied_probability,
                 decimal_odds, edge, expected_value, disagreement_ratio, disagreement_tier,
                 odds_category, recommended_units, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                r.selection,
                r.model_probability,
                r.calibrated_probability,
                r.implied_probability,
                r.decimal_odds,
                r.edge,
                r.expected_value,
                r.disagreement_ratio,
                r.disagreement_tier,
                r.odds_category,
                r.recommended_units,
                r.outcome,
            ],
        )
        .context("failed to record stake audit")?;
        Ok(())
    }

    /// Most recent audit records first.
    pub fn load_stake_audit(&self, limit: usize) -> Result<Vec<StakeAuditRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT selection, model_probability, calibrated_probability, implied_probability,
                        decimal_odds, edge, expected_value, disagreement_ratio, disagreement_tier,
                        odds_category, recommended_units, outcome
                 FROM stake_audit ORDER BY id DESC LIMIT ?1",
            )
            .context("failed to prepare audit query")?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StakeAuditRecord {
                    selection: row.get(0)?,
                    model_probability: row.get(1)?,
                    calibrated_probability: row.get(2)?,
                    implied_probability: row.get(3)?,
                    decimal_odds: row.get(4)?,
                    edge: row.get(5)?,
                    expected_value: row.get(6)?,
                    disagreement_ratio: row.get(7)?,
                    disagreement_tier: row.get(8)?,
                    odds_category: row.get(9)?,
                    recommended_units: row.get(10)?,
                    outcome: row.get(11)?,
                })
            })
            .context("failed to query stake audit")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map audit rows")?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// HistoryReader
// ---------------------------------------------------------------------------

impl HistoryReader for Database {
    fn get_matches(&self, player: PlayerId, query: MatchQuery) -> Result<Vec<MatchRecord>> {
        let ids = self.identity_set(player)?;
        let placeholders = vec!["?"; ids.len()].join(", ");

        let mut sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE (winner_id IN ({placeholders}) OR loser_id IN ({placeholders}))"
        );
        let mut values: Vec<Value> = ids
            .iter()
            .chain(ids.iter())
            .map(|id| Value::Integer(*id))
            .collect();

        if let Some(surface) = query.surface {
            sql.push_str(" AND surface = ?");
            values.push(Value::Text(surface.as_str().to_string()));
        }
        if let Some(since) = query.since {
            sql.push_str(" AND match_date IS NOT NULL AND match_date >= ?");
            values.push(Value::Text(since.format(DATE_FMT).to_string()));
        }
        if let Some(until) = query.until {
            sql.push_str(" AND (match_date IS NULL OR match_date <= ?)");
            values.push(Value::Text(until.format(DATE_FMT).to_string()));
        }
        sql.push_str(" ORDER BY match_date IS NULL, match_date DESC, id DESC LIMIT ?");
        values.push(Value::Integer(query.limit as i64));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).context("failed to prepare match query")?;
        let rows = stmt
            .query_map(params_from_iter(values), map_match_row)
            .context("failed to query matches")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map match rows")?;
        Ok(rows)
    }

    fn get_ranking(&self, player: PlayerId) -> Result<Option<u32>> {
        let canonical = {
            let conn = self.conn();
            Self::resolve_with(&conn, player)?
        };
        let index = self.ranking_index()?;
        Ok(index.latest.get(&canonical).map(|(_, rank)| *rank))
    }

    fn get_ranking_history(&self, player: PlayerId, limit: usize) -> Result<Vec<RankingSnapshot>> {
        let ids = self.identity_set(player)?;
        let canonical = ids[0];
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT ranking_date, rank, points FROM rankings
             WHERE player_id IN ({placeholders})
             ORDER BY ranking_date DESC LIMIT ?"
        );
        let mut values: Vec<Value> = ids.iter().map(|id| Value::Integer(*id)).collect();
        values.push(Value::Integer(limit as i64));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).context("failed to prepare ranking history")?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })
            .context("failed to query ranking history")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map ranking rows")?;

        Ok(rows
            .into_iter()
            .filter_map(|(date_str, rank, points)| {
                match NaiveDate::parse_from_str(&date_str, DATE_FMT) {
                    Ok(date) => Some(RankingSnapshot {
                        player: canonical,
                        date,
                        rank,
                        points,
                    }),
                    Err(_) => {
                        warn!("skipping ranking row with unparseable date '{date_str}'");
                        None
                    }
                }
            })
            .collect())
    }

    fn get_head_to_head(
        &self,
        a: PlayerId,
        b: PlayerId,
        surface: Option<Surface>,
    ) -> Result<HeadToHead> {
        let ids_a = self.identity_set(a)?;
        let ids_b = self.identity_set(b)?;
        if ids_a[0] == ids_b[0] {
            return Ok(HeadToHead::default());
        }

        let conn = self.conn();
        let count = |winners: &[PlayerId], losers: &[PlayerId]| -> Result<u32> {
            let w = vec!["?"; winners.len()].join(", ");
            let l = vec!["?"; losers.len()].join(", ");
            let mut sql = format!(
                "SELECT COUNT(*) FROM matches WHERE winner_id IN ({w}) AND loser_id IN ({l})
                 AND walkover = 0"
            );
            let mut values: Vec<Value> = winners
                .iter()
                .chain(losers.iter())
                .map(|id| Value::Integer(*id))
                .collect();
            if let Some(s) = surface {
                sql.push_str(" AND surface = ?");
                values.push(Value::Text(s.as_str().to_string()));
            }
            let n: i64 = conn
                .query_row(&sql, params_from_iter(values), |row| row.get(0))
                .context("failed to count head-to-head")?;
            Ok(n as u32)
        };

        Ok(HeadToHead {
            a_wins: count(&ids_a[..], &ids_b[..])?,
            b_wins: count(&ids_b[..], &ids_a[..])?,
        })
    }

    fn resolve_canonical_identity(&self, player: PlayerId) -> Result<PlayerId> {
        let conn = self.conn();
        Self::resolve_with(&conn, player)
    }

    fn all_identities_for(&self, canonical: PlayerId) -> Result<Vec<PlayerId>> {
        let conn = self.conn();
        let canonical = Self::resolve_with(&conn, canonical)?;
        let mut ids = Self::identities_with(&conn, canonical)?;
        // Alias rows may repeat an id.
        let mut seen = HashSet::new();
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    fn get_performance_rating(&self, player: PlayerId) -> Result<Option<f64>> {
        let conn = self.conn();
        let canonical = Self::resolve_with(&conn, player)?;
        conn.query_row(
            "SELECT rating FROM performance_ratings WHERE player_id = ?1",
            params![canonical],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query performance rating")
    }

    fn get_player_profile(&self, player: PlayerId) -> Result<Option<PlayerProfile>> {
        let conn = self.conn();
        let canonical = Self::resolve_with(&conn, player)?;
        let row = conn
            .query_row(
                "SELECT id, name, country, hand, birth_date FROM players WHERE id = ?1",
                params![canonical],
                |row| {
                    Ok((
                        row.get::<_, PlayerId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .context("failed to query player profile")?;

        Ok(row.map(|(id, name, country, hand, dob)| PlayerProfile {
            id,
            name,
            country,
            hand,
            birth_date: dob.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FMT).ok()),
        }))
    }

    fn lowest_observed_ranking(&self) -> Result<Option<u32>> {
        Ok(self.ranking_index()?.lowest_observed)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn map_match_row(row: &Row<'_>) -> rusqlite::Result<MatchRecord> {
    let id: i64 = row.get(0)?;
    let date_str: Option<String> = row.get(1)?;
    let date = date_str.and_then(|s| match NaiveDate::parse_from_str(&s, DATE_FMT) {
        Ok(d) => Some(d),
        Err(_) => {
            warn!("match {id}: unparseable date '{s}', treating as undated");
            None
        }
    });
    let surface: Option<String> = row.get(6)?;
    let box_json: Option<String> = row.get(15)?;
    let box_score = box_json.and_then(|s| match serde_json::from_str::<BoxScore>(&s) {
        Ok(b) => Some(b),
        Err(e) => {
            warn!("match {id}: ignoring malformed box score: {e}");
            None
        }
    });

    Ok(MatchRecord {
        id,
        date,
        winner: row.get(2)?,
        loser: row.get(3)?,
        winner_rank: row.get(4)?,
        loser_rank: row.get(5)?,
        surface: surface.as_deref().and_then(Surface::from_str_surface),
        tournament: row.get(7)?,
        score: row.get(8)?,
        best_of: row.get(9)?,
        winner_games: row.get(10)?,
        loser_games: row.get(11)?,
        duration_minutes: row.get(12)?,
        retired: row.get(13)?,
        walkover: row.get(14)?,
        box_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_match(date: Option<NaiveDate>, winner: PlayerId, loser: PlayerId) -> MatchRecord {
        MatchRecord {
            id: 0,
            date,
            winner,
            loser,
            winner_rank: Some(50),
            loser_rank: Some(80),
            surface: Some(Surface::Clay),
            tournament: "Challenger Biella".into(),
            score: "6-3 6-4".into(),
            best_of: 3,
            winner_games: 12,
            loser_games: 7,
            duration_minutes: Some(85),
            retired: false,
            walkover: false,
            box_score: None,
        }
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for t in [
            "players",
            "player_aliases",
            "matches",
            "rankings",
            "performance_ratings",
            "stake_audit",
        ] {
            assert!(tables.contains(&t.to_string()), "missing table {t}");
        }
    }

    // ------------------------------------------------------------------
    // Aliases
    // ------------------------------------------------------------------

    #[test]
    fn alias_resolution_is_idempotent() {
        let db = test_db();
        db.add_alias(2, 1).unwrap();
        db.add_alias(3, 2).unwrap();

        for id in [1, 2, 3] {
            let once = db.resolve_canonical_identity(id).unwrap();
            let twice = db.resolve_canonical_identity(once).unwrap();
            assert_eq!(once, 1);
            assert_eq!(once, twice);
        }
        // Unknown ids resolve to themselves.
        assert_eq!(db.resolve_canonical_identity(99).unwrap(), 99);
    }

    #[test]
    fn alias_cycle_is_rejected() {
        let db = test_db();
        db.add_alias(2, 1).unwrap();
        assert!(db.add_alias(1, 2).is_err());
        assert!(db.add_alias(5, 5).is_err());
    }

    #[test]
    fn identities_include_transitive_aliases() {
        let db = test_db();
        db.add_alias(2, 1).unwrap();
        db.add_alias(3, 2).unwrap();
        db.add_alias(7, 6).unwrap();

        let mut ids = db.all_identities_for(1).unwrap();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
        // Asking via an alias yields the same set.
        let mut via_alias = db.all_identities_for(3).unwrap();
        via_alias.sort();
        assert_eq!(via_alias, vec![1, 2, 3]);
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    #[test]
    fn get_matches_aggregates_aliases_most_recent_first() {
        let db = test_db();
        db.add_alias(11, 10).unwrap();
        db.insert_match(&sample_match(Some(day(2026, 1, 5)), 10, 20)).unwrap();
        db.insert_match(&sample_match(Some(day(2026, 2, 5)), 30, 11)).unwrap();
        db.insert_match(&sample_match(None, 11, 40)).unwrap();
        db.insert_match(&sample_match(Some(day(2026, 3, 5)), 50, 60)).unwrap();

        let rows = db.get_matches(10, MatchQuery::recent(10)).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, Some(day(2026, 2, 5)));
        assert_eq!(rows[1].date, Some(day(2026, 1, 5)));
        assert_eq!(rows[2].date, None, "undated matches sort last");
    }

    #[test]
    fn get_matches_applies_filters() {
        let db = test_db();
        let mut grass = sample_match(Some(day(2026, 6, 20)), 10, 20);
        grass.surface = Some(Surface::Grass);
        db.insert_match(&grass).unwrap();
        db.insert_match(&sample_match(Some(day(2025, 5, 1)), 10, 21)).unwrap();
        db.insert_match(&sample_match(None, 10, 22)).unwrap();

        let clay = db
            .get_matches(10, MatchQuery::recent(10).surface(Some(Surface::Clay)))
            .unwrap();
        assert_eq!(clay.len(), 2);

        let since = db
            .get_matches(10, MatchQuery::recent(10).since(day(2026, 1, 1)))
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].surface, Some(Surface::Grass));

        let until = db
            .get_matches(10, MatchQuery::recent(10).until(day(2026, 1, 1)))
            .unwrap();
        assert_eq!(until.len(), 2, "undated rows survive an upper bound");

        let limited = db.get_matches(10, MatchQuery::recent(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn malformed_stored_date_degrades_to_undated() {
        let db = test_db();
        let id = db.insert_match(&sample_match(Some(day(2026, 1, 5)), 10, 20)).unwrap();
        db.conn()
            .execute(
                "UPDATE matches SET match_date = 'not-a-date' WHERE id = ?1",
                params![id],
            )
            .unwrap();
        let rows = db.get_matches(10, MatchQuery::recent(5)).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].date.is_none());
    }

    #[test]
    fn box_score_round_trips_through_json_column() {
        let db = test_db();
        let mut m = sample_match(Some(day(2026, 1, 5)), 10, 20);
        m.box_score = Some(BoxScore {
            winner: crate::model::ServeStats {
                aces: Some(9),
                ..Default::default()
            },
            loser: Default::default(),
        });
        db.insert_match(&m).unwrap();
        let rows = db.get_matches(10, MatchQuery::recent(1)).unwrap();
        assert_eq!(rows[0].box_score.as_ref().unwrap().winner.aces, Some(9));
    }

    #[test]
    fn head_to_head_counts_across_aliases_and_surface() {
        let db = test_db();
        db.add_alias(11, 10).unwrap();
        db.insert_match(&sample_match(Some(day(2026, 1, 5)), 10, 20)).unwrap();
        db.insert_match(&sample_match(Some(day(2026, 2, 5)), 11, 20)).unwrap();
        let mut hard = sample_match(Some(day(2026, 3, 5)), 20, 11);
        hard.surface = Some(Surface::Hard);
        db.insert_match(&hard).unwrap();

        let h2h = db.get_head_to_head(10, 20, None).unwrap();
        assert_eq!(h2h, HeadToHead { a_wins: 2, b_wins: 1 });

        let clay = db.get_head_to_head(11, 20, Some(Surface::Clay)).unwrap();
        assert_eq!(clay, HeadToHead { a_wins: 2, b_wins: 0 });
    }

    // ------------------------------------------------------------------
    // Rankings
    // ------------------------------------------------------------------

    #[test]
    fn latest_ranking_and_lowest_observed() {
        let db = test_db();
        db.add_alias(11, 10).unwrap();
        let snap = |player, date, rank| RankingSnapshot {
            player,
            date,
            rank,
            points: 0,
        };
        db.insert_ranking(&snap(10, day(2026, 1, 1), 120)).unwrap();
        db.insert_ranking(&snap(11, day(2026, 2, 1), 95)).unwrap();
        db.insert_ranking(&snap(20, day(2026, 2, 1), 640)).unwrap();

        assert_eq!(db.get_ranking(10).unwrap(), Some(95));
        assert_eq!(db.get_ranking(11).unwrap(), Some(95));
        assert_eq!(db.get_ranking(99).unwrap(), None);
        assert_eq!(db.lowest_observed_ranking().unwrap(), Some(640));

        let history = db.get_ranking_history(10, 5).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].rank, 95);
    }

    #[test]
    fn ranking_cache_is_invalidated_by_writes() {
        let db = test_db();
        db.insert_ranking(&RankingSnapshot {
            player: 10,
            date: day(2026, 1, 1),
            rank: 120,
            points: 0,
        })
        .unwrap();
        assert_eq!(db.get_ranking(10).unwrap(), Some(120));

        db.insert_ranking(&RankingSnapshot {
            player: 10,
            date: day(2026, 3, 1),
            rank: 70,
            points: 0,
        })
        .unwrap();
        assert_eq!(db.get_ranking(10).unwrap(), Some(70));
    }

    #[test]
    fn index_built_before_a_write_is_not_published() {
        let db = test_db();
        let snapshot = |date, rank| RankingSnapshot {
            player: 10,
            date,
            rank,
            points: 0,
        };
        db.insert_ranking(&snapshot(day(2026, 1, 1), 120)).unwrap();

        let generation = db.rankings_generation.load(Ordering::Acquire);
        let stale = Arc::new(db.build_ranking_index().unwrap());
        db.insert_ranking(&snapshot(day(2026, 3, 1), 70)).unwrap();

        // The in-flight reader still gets its own snapshot.
        let served = db.publish_ranking_index(stale, generation);
        assert_eq!(served.latest[&10].1, 120);
        assert!(db.rankings.read().unwrap().is_none());
        assert_eq!(db.get_ranking(10).unwrap(), Some(70));

        // An index built under the current generation is published.
        assert!(db.rankings.read().unwrap().is_some());
    }

    #[test]
    fn ranking_index_survives_concurrent_first_population() {
        let db = Arc::new(test_db());
        for i in 0..50 {
            db.insert_ranking(&RankingSnapshot {
                player: i,
                date: day(2026, 1, 1),
                rank: (i + 1) as u32,
                points: 0,
            })
            .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.get_ranking(t).unwrap())
            })
            .collect();
        for (t, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), Some(t as u32 + 1));
        }
        assert_eq!(db.lowest_observed_ranking().unwrap(), Some(50));
    }

    // ------------------------------------------------------------------
    // Profiles, ratings, audit
    // ------------------------------------------------------------------

    #[test]
    fn profile_and_rating_resolve_through_alias() {
        let db = test_db();
        db.upsert_player(&PlayerProfile {
            id: 10,
            name: "Canonical".into(),
            country: Some("ESP".into()),
            hand: Some("R".into()),
            birth_date: Some(day(2005, 5, 5)),
        })
        .unwrap();
        db.add_alias(11, 10).unwrap();
        db.store_performance_ratings(&[(10, 1712.5)], day(2026, 1, 1)).unwrap();

        let profile = db.get_player_profile(11).unwrap().unwrap();
        assert_eq!(profile.id, 10);
        assert_eq!(profile.birth_date, Some(day(2005, 5, 5)));
        assert_eq!(db.get_performance_rating(11).unwrap(), Some(1712.5));
        assert_eq!(db.get_performance_rating(20).unwrap(), None);
    }

    #[test]
    fn stake_audit_round_trip() {
        let db = test_db();
        let rec = StakeAuditRecord {
            selection: "A vs B".into(),
            model_probability: 0.6,
            calibrated_probability: 0.59,
            implied_probability: 0.5,
            decimal_odds: 2.0,
            edge: 0.09,
            expected_value: 0.18,
            disagreement_ratio: 1.18,
            disagreement_tier: "mild".into(),
            odds_category: "sweet_spot".into(),
            recommended_units: 3.0,
            outcome: "accepted".into(),
        };
        db.record_stake_audit(&rec).unwrap();
        let loaded = db.load_stake_audit(10).unwrap();
        assert_eq!(loaded, vec![rec]);
    }

    #[test]
    fn matches_between_is_chronological() {
        let db = test_db();
        db.insert_match(&sample_match(Some(day(2026, 3, 5)), 10, 20)).unwrap();
        db.insert_match(&sample_match(Some(day(2026, 1, 5)), 10, 20)).unwrap();
        db.insert_match(&sample_match(None, 10, 20)).unwrap();
        db.insert_match(&sample_match(Some(day(2024, 1, 5)), 10, 20)).unwrap();

        let rows = db.matches_between(day(2025, 6, 1), day(2026, 6, 1)).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].date < rows[1].date);
    }
}
