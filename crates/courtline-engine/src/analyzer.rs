// Match analysis facade: gathers both sides' profiles concurrently, runs the
// factor calculators and composes the final probability.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use courtline_core::config::EngineConfig;
use courtline_core::history::{HistoryReader, MatchQuery};
use courtline_core::model::{HeadToHead, PlayerId, Surface, TierLevel};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::composer::{base_weights, compose, reweight, WeightInputs, WeightTable};
use crate::confidence::{estimate_confidence, Confidence, DataSufficiency};
use crate::context::{home_tier, resolve_context, MatchContext};
use crate::elo::{default_worst_rank, rank_win_probability};
use crate::factors::breakout::{breakout_factor, detect_breakout, BreakoutScan, BreakoutSignal};
use crate::factors::fatigue::{fatigue_factor, fatigue_score, FatigueScore};
use crate::factors::form::{form_factor, score_form, FormScore};
use crate::factors::h2h::head_to_head_factor;
use crate::factors::health::{health_factor, health_status, HealthStatus};
use crate::factors::performance::{performance_factor, RatingInput};
use crate::factors::ranking::{ranking_factor, trajectory, RankSource, RankingInput};
use crate::factors::recent::{
    momentum_factor, opponent_quality_factor, recency_factor, recent_activity, recent_loss_factor,
    RecentActivity,
};
use crate::factors::surface::{surface_factor, surface_record, SurfaceRecord};
use crate::factors::{read_or_default, FactorKind, FactorResult, PlayerHistory};

/// Matches fetched per side for the short-horizon calculators.
const RECENT_MATCH_LIMIT: usize = 60;
const RANKING_HISTORY_LIMIT: usize = 8;
/// Worker threads for per-side profile building.
const SIDE_WORKERS: usize = 2;

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub surface: Option<Surface>,
    /// Analysis date; today when absent.
    pub as_of: Option<NaiveDate>,
    /// Decimal prices, used for ranking fallback when a player is unranked.
    pub price_a: Option<f64>,
    pub price_b: Option<f64>,
    /// Descriptive tournament name, used to classify the match tier.
    pub tournament: Option<String>,
}

impl AnalysisRequest {
    pub fn new(player_a: PlayerId, player_b: PlayerId) -> Self {
        Self {
            player_a,
            player_b,
            surface: None,
            as_of: None,
            price_a: None,
            price_b: None,
            tournament: None,
        }
    }

    pub fn surface(mut self, surface: Surface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    pub fn prices(mut self, price_a: f64, price_b: f64) -> Self {
        self.price_a = Some(price_a);
        self.price_b = Some(price_b);
        self
    }

    pub fn tournament(mut self, name: impl Into<String>) -> Self {
        self.tournament = Some(name.into());
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("players {0} and {1} resolve to the same competitor")]
    SamePlayer(PlayerId, PlayerId),
}

/// Per-player summary carried in the result.
#[derive(Debug, Clone, Serialize)]
pub struct SideSummary {
    /// Canonical id.
    pub player: PlayerId,
    pub name: String,
    pub ranking: RankingInput,
    pub ranking_trajectory: Option<i64>,
    pub matches_on_record: usize,
    pub breakout: Option<BreakoutSignal>,
}

/// Outcome of one analysis. `p1_probability + p2_probability == 1`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub as_of: NaiveDate,
    pub side_a: SideSummary,
    pub side_b: SideSummary,
    pub p1_probability: f64,
    pub p2_probability: f64,
    pub weighted_advantage: f64,
    pub raw_probability: f64,
    pub elo_probability: Option<f64>,
    pub confidence: Confidence,
    pub factors: Vec<FactorResult>,
    pub weights: WeightTable,
    pub context: MatchContext,
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    pub fn factor(&self, kind: FactorKind) -> Option<&FactorResult> {
        self.factors.iter().find(|f| f.kind == kind)
    }

    pub fn breakout_detected(&self) -> bool {
        self.side_a.breakout.is_some() || self.side_b.breakout.is_some()
    }

    /// Tier of the match, when the tournament was recognised.
    pub fn match_tier(&self) -> Option<TierLevel> {
        self.context.match_tier
    }
}

// ---------------------------------------------------------------------------
// Per-side profile
// ---------------------------------------------------------------------------

struct SideProfile {
    history: PlayerHistory,
    name: String,
    ranking: Option<u32>,
    ranking_trajectory: Option<i64>,
    stored_rating: Option<f64>,
    form: FormScore,
    surface: SurfaceRecord,
    fatigue: FatigueScore,
    health: HealthStatus,
    recent: RecentActivity,
    breakout: BreakoutScan,
    home_tier: Option<TierLevel>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct MatchAnalyzer<R: HistoryReader> {
    reader: Arc<R>,
    config: EngineConfig,
    pool: Option<rayon::ThreadPool>,
}

impl<R: HistoryReader> MatchAnalyzer<R> {
    pub fn new(reader: Arc<R>, config: EngineConfig) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(SIDE_WORKERS)
            .thread_name(|i| format!("courtline-side-{i}"))
            .build()
            .ok();
        Self {
            reader,
            config,
            pool,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn canonical(&self, player: PlayerId) -> PlayerId {
        match self.reader.resolve_canonical_identity(player) {
            Ok(id) => id,
            Err(e) => {
                debug!("alias resolution failed for {player}, using raw id: {e:#}");
                player
            }
        }
    }

    fn build_side(&self, player: PlayerId, surface: Option<Surface>, as_of: NaiveDate) -> SideProfile {
        let cfg = &self.config;
        let reader = self.reader.as_ref();

        let mut identities = read_or_default("identities", player, reader.all_identities_for(player));
        if !identities.contains(&player) {
            identities.push(player);
        }
        let recent = read_or_default(
            "recent matches",
            player,
            reader.get_matches(player, MatchQuery::recent(RECENT_MATCH_LIMIT).until(as_of)),
        );
        let history = PlayerHistory {
            id: player,
            identities,
            as_of,
            recent,
        };

        let ranking = read_or_default("ranking", player, reader.get_ranking(player));
        let snapshots = read_or_default(
            "ranking history",
            player,
            reader.get_ranking_history(player, RANKING_HISTORY_LIMIT),
        );
        let stored_rating = read_or_default("performance rating", player, reader.get_performance_rating(player));
        let profile = read_or_default("profile", player, reader.get_player_profile(player));
        let age = profile.as_ref().and_then(|p| p.age_on(as_of));
        let name = profile
            .map(|p| p.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("player {player}"));

        let undated = cfg.form.undated_age_days;
        SideProfile {
            form: score_form(&history, ranking, &cfg.form),
            surface: surface_record(reader, &history, surface, &cfg.surface),
            fatigue: fatigue_score(&history, &cfg.fatigue),
            health: health_status(&history, &cfg.recent, undated),
            recent: recent_activity(&history, &cfg.recent, undated),
            breakout: detect_breakout(&history, ranking, age, &cfg.breakout),
            home_tier: home_tier(ranking, &history.recent, &cfg.context),
            ranking_trajectory: trajectory(&snapshots),
            history,
            name,
            ranking,
            stored_rating,
        }
    }

    fn build_sides(
        &self,
        a: PlayerId,
        b: PlayerId,
        surface: Option<Surface>,
        as_of: NaiveDate,
    ) -> (SideProfile, SideProfile) {
        let both = || {
            rayon::join(
                || self.build_side(a, surface, as_of),
                || self.build_side(b, surface, as_of),
            )
        };
        match self.pool.as_ref() {
            Some(pool) => pool.install(both),
            None => both(),
        }
    }

    fn head_to_head(&self, a: PlayerId, b: PlayerId, surface: Option<Surface>) -> (HeadToHead, Option<HeadToHead>) {
        let reader = self.reader.as_ref();
        let overall = read_or_default("head to head", a, reader.get_head_to_head(a, b, None));
        let on_surface = surface.map(|s| {
            read_or_default("surface head to head", a, reader.get_head_to_head(a, b, Some(s)))
        });
        (overall, on_surface)
    }

    /// Analyze one matchup.
    ///
    /// Never fails for missing data: unknown players fall back to
    /// price-implied or default-worst rankings and every data-starved factor
    /// reports `has_data = false`. The only error is asking a player to face
    /// themselves.
    pub fn analyze(&self, req: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let cfg = &self.config;
        let as_of = req.as_of.unwrap_or_else(|| Utc::now().date_naive());
        let a = self.canonical(req.player_a);
        let b = self.canonical(req.player_b);
        if a == b {
            return Err(AnalysisError::SamePlayer(req.player_a, req.player_b));
        }

        let (side_a, side_b) = self.build_sides(a, b, req.surface, as_of);
        let (h2h, h2h_surface) = self.head_to_head(a, b, req.surface);

        let lowest = read_or_default("lowest ranking", a, self.reader.lowest_observed_ranking());
        let default_worst = default_worst_rank(lowest, &cfg.composer);
        let signal_a = side_a.breakout.signal;
        let signal_b = side_b.breakout.signal;
        let rank_a = RankingInput::resolve(side_a.ranking, req.price_a, default_worst)
            .with_override(signal_a.map(|s| s.effective_ranking));
        let rank_b = RankingInput::resolve(side_b.ranking, req.price_b, default_worst)
            .with_override(signal_b.map(|s| s.effective_ranking));

        // Factors, in table order.
        let w = &cfg.weights;
        let (ranking, large_gap) = ranking_factor(&rank_a, &rank_b, &cfg.composer, w.ranking);
        let rating_a = RatingInput::resolve(side_a.stored_rating, rank_a.rank, signal_a.as_ref());
        let rating_b = RatingInput::resolve(side_b.stored_rating, rank_b.rank, signal_b.as_ref());
        let mut factors = vec![
            form_factor(&side_a.form, &side_b.form, &cfg.form, w.form),
            surface_factor(&side_a.surface, &side_b.surface, w.surface),
            ranking,
            head_to_head_factor(&h2h, h2h_surface.as_ref(), &cfg.head_to_head, w.head_to_head),
            fatigue_factor(&side_a.fatigue, &side_b.fatigue, w.fatigue),
            health_factor(&side_a.health, &side_b.health, w.health),
            opponent_quality_factor(&side_a.recent, &side_b.recent, &cfg.recent, w.opponent_quality),
            recency_factor(&side_a.recent, &side_b.recent, w.recency),
            recent_loss_factor(&side_a.recent, &side_b.recent, &cfg.recent, w.recent_loss),
            momentum_factor(&side_a.recent, &side_b.recent, &cfg.recent, w.momentum),
            performance_factor(&rating_a, &rating_b, w.performance_rating),
            breakout_factor(&side_a.breakout, &side_b.breakout),
        ];

        let context = resolve_context(
            req.tournament.as_deref(),
            side_a.home_tier,
            side_b.home_tier,
            (&side_a.name, &side_b.name),
            &cfg.context,
        );
        for f in &mut factors {
            context.apply_discount(f);
        }

        let inputs = WeightInputs {
            form_available: side_a.form.has_data && side_b.form.has_data,
            surface_available: side_a.surface.has_data && side_b.surface.has_data,
            rating_available: rating_a.stored || rating_b.stored,
            large_gap,
            breakout_detected: signal_a.is_some() || signal_b.is_some(),
            max_displacement: context.max_displacement(),
        };
        let weights = reweight(&base_weights(w), &inputs, &cfg.composer);
        let elo_probability = rank_win_probability(rank_a.rank, rank_b.rank);
        let composition = compose(&factors, weights, &inputs, elo_probability, &cfg.composer);

        let confidence = estimate_confidence(
            &factors,
            &composition.weights,
            composition.probability,
            &DataSufficiency {
                form_matches: (side_a.form.matches(), side_b.form.matches()),
                form_minimum: cfg.form.min_matches,
                surface_matches: (side_a.surface.career_matches, side_b.surface.career_matches),
                h2h_meetings: h2h.total(),
                ranked: (side_a.ranking.is_some(), side_b.ranking.is_some()),
            },
            &cfg.confidence,
        );

        let mut warnings = context.warnings.clone();
        for (side, rank) in [(&side_a, &rank_a), (&side_b, &rank_b)] {
            warnings.extend(side_warnings(side, rank, cfg));
        }

        let p1 = composition.probability;
        info!(
            player_a = a,
            player_b = b,
            p1,
            confidence = confidence.score,
            warnings = warnings.len(),
            "analysis complete"
        );

        Ok(AnalysisResult {
            as_of,
            side_a: summary(&side_a, rank_a),
            side_b: summary(&side_b, rank_b),
            p1_probability: p1,
            p2_probability: 1.0 - p1,
            weighted_advantage: composition.weighted_advantage,
            raw_probability: composition.raw_probability,
            elo_probability: composition.elo_probability,
            confidence,
            factors,
            weights: composition.weights,
            context,
            warnings,
        })
    }
}

fn summary(side: &SideProfile, ranking: RankingInput) -> SideSummary {
    SideSummary {
        player: side.history.id,
        name: side.name.clone(),
        ranking,
        ranking_trajectory: side.ranking_trajectory,
        matches_on_record: side.history.recent.len(),
        breakout: side.breakout.signal,
    }
}

fn side_warnings(side: &SideProfile, rank: &RankingInput, cfg: &EngineConfig) -> Vec<String> {
    let name = &side.name;
    let mut out = Vec::new();

    if side.history.recent.is_empty() {
        out.push(format!("{name} has no recorded matches"));
    } else if let Some(days) = side.recent.days_since_last {
        if days > cfg.recent.idle_warning_days {
            out.push(format!("{name} has not played for {days} days"));
        }
    }

    match rank.source {
        RankSource::Official => {}
        RankSource::PriceImplied => out.push(format!(
            "{name} is unranked; using price-implied ranking {}",
            rank.rank
        )),
        RankSource::DefaultWorst => out.push(format!(
            "{name} is unranked and unpriced; using default ranking {}",
            rank.rank
        )),
    }

    if let Some(sig) = side.breakout.signal {
        out.push(format!(
            "{name} breakout: {} quality wins, effective ranking {} (actual {})",
            sig.quality_wins, sig.effective_ranking, sig.actual_ranking
        ));
    } else if side.breakout.is_near(&cfg.breakout) {
        out.push(format!("{name} is one quality win short of a breakout signal"));
    }
    out
}
