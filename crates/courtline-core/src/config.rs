// Configuration loading and parsing (engine.toml, staking.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub staking: StakingConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire engine.toml file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct EngineFile {
    database: DatabaseSection,
    #[serde(flatten)]
    engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct DatabaseSection {
    path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "courtline.db".into(),
        }
    }
}

/// All tunables of the analytical engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: FactorWeights,
    pub form: FormConfig,
    pub surface: SurfaceConfig,
    pub fatigue: FatigueConfig,
    pub head_to_head: HeadToHeadConfig,
    pub recent: RecentConfig,
    pub breakout: BreakoutConfig,
    pub context: ContextConfig,
    pub composer: ComposerConfig,
    pub confidence: ConfidenceConfig,
    pub rating: RatingConfig,
}

/// Static importance of each weighted factor before dynamic reweighting.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub form: f64,
    pub surface: f64,
    pub ranking: f64,
    pub head_to_head: f64,
    pub fatigue: f64,
    pub health: f64,
    pub opponent_quality: f64,
    pub recency: f64,
    pub recent_loss: f64,
    pub momentum: f64,
    pub performance_rating: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            form: 0.20,
            surface: 0.12,
            ranking: 0.22,
            head_to_head: 0.08,
            fatigue: 0.06,
            health: 0.04,
            opponent_quality: 0.07,
            recency: 0.04,
            recent_loss: 0.04,
            momentum: 0.05,
            performance_rating: 0.08,
        }
    }
}

impl FactorWeights {
    /// `(name, value)` pairs, in declaration order.
    pub fn entries(&self) -> [(&'static str, f64); 11] {
        [
            ("form", self.form),
            ("surface", self.surface),
            ("ranking", self.ranking),
            ("head_to_head", self.head_to_head),
            ("fatigue", self.fatigue),
            ("health", self.health),
            ("opponent_quality", self.opponent_quality),
            ("recency", self.recency),
            ("recent_loss", self.recent_loss),
            ("momentum", self.momentum),
            ("performance_rating", self.performance_rating),
        ]
    }

    pub fn total(&self) -> f64 {
        self.entries().iter().map(|(_, w)| w).sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub window: usize,
    pub position_decay: f64,
    pub date_decay_days: f64,
    pub undated_age_days: i64,
    pub min_matches: usize,
    /// Wins with an expected score below this count as upsets.
    pub upset_threshold: f64,
    pub confirmation_boost: f64,
    pub confirmation_cap: f64,
    /// Score-point scale for the tanh-bounded side difference.
    pub score_scale: f64,
    pub stability_weight: f64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            window: 15,
            position_decay: 0.93,
            date_decay_days: 120.0,
            undated_age_days: 90,
            min_matches: 3,
            upset_threshold: 0.40,
            confirmation_boost: 1.5,
            confirmation_cap: 2.0,
            score_scale: 25.0,
            stability_weight: 0.15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub recent_window_days: i64,
    pub career_reliable_matches: usize,
    pub recent_reliable_matches: usize,
    pub career_weight: f64,
    pub recent_weight: f64,
    pub min_matches: usize,
    pub career_limit: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 730,
            career_reliable_matches: 20,
            recent_reliable_matches: 10,
            career_weight: 0.6,
            recent_weight: 0.4,
            min_matches: 5,
            career_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    pub optimal_rest_min_days: i64,
    pub optimal_rest_max_days: i64,
    pub rust_decay_days: f64,
    pub load_7d_threshold: f64,
    pub load_7d_per_unit: f64,
    pub load_7d_cap: f64,
    pub count_14d_threshold: usize,
    pub count_14d_per_match: f64,
    pub count_14d_cap: f64,
    pub count_30d_threshold: usize,
    pub count_30d_per_match: f64,
    pub count_30d_cap: f64,
    pub base_fitness: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            optimal_rest_min_days: 2,
            optimal_rest_max_days: 14,
            rust_decay_days: 30.0,
            load_7d_threshold: 3.0,
            load_7d_per_unit: 3.0,
            load_7d_cap: 15.0,
            count_14d_threshold: 4,
            count_14d_per_match: 2.0,
            count_14d_cap: 10.0,
            count_30d_threshold: 8,
            count_30d_per_match: 1.0,
            count_30d_cap: 10.0,
            base_fitness: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeadToHeadConfig {
    /// Share of the overall record when the surface record is used too.
    pub overall_share: f64,
    pub surface_share: f64,
    pub min_surface_meetings: u32,
    /// Pseudo-meetings in the `n / (n + k)` sample shrink.
    pub shrink_prior: f64,
}

impl Default for HeadToHeadConfig {
    fn default() -> Self {
        Self {
            overall_share: 0.6,
            surface_share: 0.4,
            min_surface_meetings: 2,
            shrink_prior: 2.0,
        }
    }
}

/// Windows and tiers for the short-horizon scans: opponent quality,
/// recency, recent loss, momentum and health.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    pub opponent_window: usize,
    pub opponent_min_matches: usize,
    /// `(max_days, score)` pairs, ascending by days.
    pub recency_tiers: Vec<(i64, f64)>,
    pub recency_floor: f64,
    pub idle_warning_days: i64,
    /// `(max_days, penalty)` pairs, ascending by days.
    pub recent_loss_tiers: Vec<(i64, f64)>,
    pub five_set_loss_penalty: f64,
    pub momentum_window: usize,
    pub momentum_per_win: f64,
    pub momentum_cap: f64,
    /// `(max_days, penalty)` pairs for retirements/walkovers conceded.
    pub health_tiers: Vec<(i64, f64)>,
    /// Elo points for a full unit of opponent-quality advantage.
    pub quality_scale: f64,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            opponent_window: 10,
            opponent_min_matches: 3,
            recency_tiers: vec![(7, 1.0), (30, 0.8), (90, 0.5)],
            recency_floor: 0.2,
            idle_warning_days: 60,
            recent_loss_tiers: vec![(3, 0.15), (7, 0.10), (14, 0.06), (30, 0.03)],
            five_set_loss_penalty: 0.05,
            momentum_window: 10,
            momentum_per_win: 0.02,
            momentum_cap: 0.10,
            health_tiers: vec![(14, 1.0), (30, 0.6), (60, 0.3)],
            quality_scale: 200.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    pub window_days: i64,
    /// Own rank divided by beaten opponent's rank must reach this ratio.
    pub rank_ratio: f64,
    pub min_quality_wins: usize,
    pub implied_rank_buffer: f64,
    pub base_blend: f64,
    pub blend_per_extra_win: f64,
    pub max_blend: f64,
    /// `(max_age, factor)` pairs, ascending by age.
    pub age_factors: Vec<(u32, f64)>,
    pub senior_age_factor: f64,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            window_days: 60,
            rank_ratio: 3.0,
            min_quality_wins: 2,
            implied_rank_buffer: 1.2,
            base_blend: 0.35,
            blend_per_extra_win: 0.15,
            max_blend: 0.85,
            age_factors: vec![(21, 1.2), (25, 1.0), (29, 0.85)],
            senior_age_factor: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Ranks at or better than this are tour-level players.
    pub tour_rank_cutoff: u32,
    pub challenger_rank_cutoff: u32,
    pub discount_per_step: f64,
    pub max_discount: f64,
    pub history_window: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            tour_rank_cutoff: 100,
            challenger_rank_cutoff: 350,
            discount_per_step: 0.20,
            max_discount: 0.45,
            history_window: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub logistic_k: f64,
    pub gap_ranking_boost: f64,
    pub gap_ranking_cap: f64,
    pub min_weight: f64,
    pub large_gap_ranks: u32,
    pub top_player_rank: u32,
    pub top_player_gap_ranks: u32,
    /// Share of the factor-based probability when both signals agree.
    pub elo_blend_agree: f64,
    /// Share of the factor-based probability when they disagree.
    pub elo_blend_disagree: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
    pub default_rank_buffer: u32,
    pub empty_store_rank: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            logistic_k: 3.0,
            gap_ranking_boost: 0.25,
            gap_ranking_cap: 0.60,
            min_weight: 0.01,
            large_gap_ranks: 100,
            top_player_rank: 10,
            top_player_gap_ranks: 50,
            elo_blend_agree: 0.70,
            elo_blend_disagree: 0.10,
            probability_floor: 0.01,
            probability_ceiling: 0.99,
            default_rank_buffer: 100,
            empty_store_rank: 1500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub data_quality_share: f64,
    pub agreement_share: f64,
    pub clarity_share: f64,
    /// Distance from 50% treated as full clarity.
    pub clarity_ceiling: f64,
    /// Factors this close to zero count as half agreement.
    pub neutral_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            data_quality_share: 0.40,
            agreement_share: 0.30,
            clarity_share: 0.30,
            clarity_ceiling: 0.35,
            neutral_threshold: 0.02,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub window_days: i64,
    /// Seed rating for a player whose ranking at their first match in the
    /// window is unknown.
    pub base_rating: f64,
    pub k_factor: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            window_days: 365,
            base_rating: 1500.0,
            k_factor: 32.0,
        }
    }
}

// ---------------------------------------------------------------------------
// staking.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    pub calibration: CalibrationConfig,
    pub kelly: KellyConfig,
    pub disagreement: DisagreementConfig,
    pub sweet_spot: SweetSpotConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Fraction by which the model probability is pulled toward 50%.
    pub shrink: f64,
    /// Weight given to the market-implied probability.
    pub market_blend: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            shrink: 0.10,
            market_blend: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    pub fraction: f64,
    pub min_ev: f64,
    pub min_odds: f64,
    pub bankroll: f64,
    pub unit_size: f64,
    pub min_units: f64,
    pub max_units: f64,
    pub rounding: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            fraction: 0.40,
            min_ev: 0.02,
            min_odds: 1.30,
            bankroll: 100.0,
            unit_size: 1.0,
            min_units: 0.5,
            max_units: 5.0,
            rounding: 0.5,
        }
    }
}

/// One rung of the disagreement ladder.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DisagreementTierConfig {
    /// Upper bound (inclusive) of model/implied probability ratio.
    pub max_ratio: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisagreementConfig {
    pub tiers: Vec<DisagreementTierConfig>,
    /// Multiplier between the last tier and the extreme ratio.
    pub severe_multiplier: f64,
    /// Ratios above this reject the bet outright.
    pub extreme_ratio: f64,
    /// Tighter extreme ratios keyed by tier level name (`itf`, `challenger`, `tour`).
    pub tier_extreme_ratio: HashMap<String, f64>,
}

impl Default for DisagreementConfig {
    fn default() -> Self {
        let tier = |max_ratio, multiplier| DisagreementTierConfig {
            max_ratio,
            multiplier,
        };
        Self {
            tiers: vec![
                tier(1.15, 1.0),
                tier(1.30, 0.85),
                tier(1.50, 0.60),
                tier(1.80, 0.35),
            ],
            severe_multiplier: 0.15,
            extreme_ratio: 2.20,
            tier_extreme_ratio: HashMap::from([
                ("itf".to_string(), 1.70),
                ("challenger".to_string(), 1.90),
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweetSpotConfig {
    pub low: f64,
    pub high: f64,
    pub outside_multiplier: f64,
}

impl Default for SweetSpotConfig {
    fn default() -> Self {
        Self {
            low: 1.70,
            high: 2.60,
            outside_multiplier: 0.60,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/engine.toml` and
/// `config/staking.toml`, relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let engine_path = config_dir.join("engine.toml");
    let engine_text = read_file(&engine_path)?;
    let engine_file: EngineFile =
        toml::from_str(&engine_text).map_err(|e| ConfigError::ParseError {
            path: engine_path.clone(),
            source: e,
        })?;

    let staking_path = config_dir.join("staking.toml");
    let staking_text = read_file(&staking_path)?;
    let staking: StakingConfig =
        toml::from_str(&staking_text).map_err(|e| ConfigError::ParseError {
            path: staking_path.clone(),
            source: e,
        })?;

    let config = Config {
        engine: engine_file.engine,
        staking,
        db_path: engine_file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to `base_dir`, copying default
/// config files first.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let engine = &config.engine;

    for (name, val) in engine.weights.entries() {
        if !val.is_finite() || val < 0.0 {
            return Err(invalid(
                &format!("weights.{name}"),
                format!("must be >= 0, got {val}"),
            ));
        }
    }
    if engine.weights.total() <= 0.0 {
        return Err(invalid("weights", "at least one weight must be positive"));
    }

    let positive: &[(&str, f64)] = &[
        ("form.date_decay_days", engine.form.date_decay_days),
        ("form.score_scale", engine.form.score_scale),
        ("form.position_decay", engine.form.position_decay),
        ("fatigue.rust_decay_days", engine.fatigue.rust_decay_days),
        ("composer.logistic_k", engine.composer.logistic_k),
        ("rating.k_factor", engine.rating.k_factor),
        ("breakout.rank_ratio", engine.breakout.rank_ratio),
        ("recent.quality_scale", engine.recent.quality_scale),
        ("confidence.clarity_ceiling", engine.confidence.clarity_ceiling),
    ];
    for (name, val) in positive {
        if !(*val > 0.0) {
            return Err(invalid(name, format!("must be > 0, got {val}")));
        }
    }

    if engine.form.window == 0 {
        return Err(invalid("form.window", "must be > 0"));
    }
    if engine.fatigue.optimal_rest_min_days > engine.fatigue.optimal_rest_max_days {
        return Err(invalid(
            "fatigue.optimal_rest_min_days",
            "must not exceed optimal_rest_max_days",
        ));
    }
    if engine.context.tour_rank_cutoff >= engine.context.challenger_rank_cutoff {
        return Err(invalid(
            "context.tour_rank_cutoff",
            "must be better (lower) than challenger_rank_cutoff",
        ));
    }
    if !(0.0..=1.0).contains(&engine.breakout.max_blend) {
        return Err(invalid("breakout.max_blend", "must be between 0.0 and 1.0"));
    }
    let h = &engine.head_to_head;
    for (name, val) in [
        ("head_to_head.overall_share", h.overall_share),
        ("head_to_head.surface_share", h.surface_share),
    ] {
        if !(0.0..=1.0).contains(&val) {
            return Err(invalid(name, format!("must be between 0.0 and 1.0, got {val}")));
        }
    }
    if !(h.shrink_prior >= 0.0) {
        return Err(invalid(
            "head_to_head.shrink_prior",
            format!("must be >= 0, got {}", h.shrink_prior),
        ));
    }
    let conf = &engine.confidence;
    let shares = [
        ("confidence.data_quality_share", conf.data_quality_share),
        ("confidence.agreement_share", conf.agreement_share),
        ("confidence.clarity_share", conf.clarity_share),
    ];
    for (name, val) in shares {
        if !(val >= 0.0) {
            return Err(invalid(name, format!("must be >= 0, got {val}")));
        }
    }
    if shares.iter().map(|(_, v)| v).sum::<f64>() <= 0.0 {
        return Err(invalid("confidence", "at least one share must be positive"));
    }

    let c = &engine.composer;
    for (name, val) in [
        ("composer.elo_blend_agree", c.elo_blend_agree),
        ("composer.elo_blend_disagree", c.elo_blend_disagree),
    ] {
        if !(0.0..=1.0).contains(&val) {
            return Err(invalid(name, format!("must be between 0.0 and 1.0, got {val}")));
        }
    }
    if !(c.probability_floor > 0.0 && c.probability_floor < c.probability_ceiling && c.probability_ceiling < 1.0) {
        return Err(invalid(
            "composer.probability_floor",
            "requires 0 < floor < ceiling < 1",
        ));
    }

    let s = &config.staking;
    if !(0.0..1.0).contains(&s.calibration.shrink) {
        return Err(invalid(
            "calibration.shrink",
            format!("must be in [0.0, 1.0), got {}", s.calibration.shrink),
        ));
    }
    if !(0.0..=1.0).contains(&s.calibration.market_blend) {
        return Err(invalid(
            "calibration.market_blend",
            format!("must be between 0.0 and 1.0, got {}", s.calibration.market_blend),
        ));
    }
    if !(s.kelly.fraction > 0.0 && s.kelly.fraction <= 1.0) {
        return Err(invalid(
            "kelly.fraction",
            format!("must be in (0.0, 1.0], got {}", s.kelly.fraction),
        ));
    }
    if s.kelly.min_odds <= 1.0 {
        return Err(invalid("kelly.min_odds", "must be greater than 1.0"));
    }
    if s.kelly.bankroll <= 0.0 || s.kelly.unit_size <= 0.0 {
        return Err(invalid("kelly.bankroll", "bankroll and unit_size must be > 0"));
    }
    if s.kelly.min_units < 0.0 || s.kelly.min_units > s.kelly.max_units {
        return Err(invalid(
            "kelly.min_units",
            format!(
                "must satisfy 0 <= min_units <= max_units, got {} / {}",
                s.kelly.min_units, s.kelly.max_units
            ),
        ));
    }
    if s.kelly.rounding < 0.0 {
        return Err(invalid("kelly.rounding", "must be >= 0"));
    }

    let mut prev = 1.0;
    for (i, tier) in s.disagreement.tiers.iter().enumerate() {
        if tier.max_ratio <= prev {
            return Err(invalid(
                &format!("disagreement.tiers[{i}].max_ratio"),
                "tiers must be strictly ascending and above 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&tier.multiplier) {
            return Err(invalid(
                &format!("disagreement.tiers[{i}].multiplier"),
                "must be between 0.0 and 1.0",
            ));
        }
        prev = tier.max_ratio;
    }
    if s.disagreement.extreme_ratio <= prev {
        return Err(invalid(
            "disagreement.extreme_ratio",
            "must exceed the last tier's max_ratio",
        ));
    }
    if s.sweet_spot.low >= s.sweet_spot.high {
        return Err(invalid("sweet_spot.low", "must be below sweet_spot.high"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("courtline_{name}"));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        tmp
    }

    fn write_config(tmp: &Path, engine: &str, staking: &str) {
        fs::write(tmp.join("config/engine.toml"), engine).unwrap();
        fs::write(tmp.join("config/staking.toml"), staking).unwrap();
    }

    #[test]
    fn empty_files_yield_defaults() {
        let tmp = scratch_dir("empty_files");
        write_config(&tmp, "", "");

        let config = load_config_from(&tmp).expect("empty files should load");
        assert_eq!(config.db_path, "courtline.db");
        assert_eq!(config.engine.weights, FactorWeights::default());
        assert!((config.staking.kelly.fraction - 0.40).abs() < f64::EPSILON);
        assert_eq!(config.staking.disagreement.tiers.len(), 4);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let tmp = scratch_dir("partial_override");
        write_config(
            &tmp,
            "[database]\npath = \"x.db\"\n\n[weights]\nform = 0.3\n\n[form]\nwindow = 12\n",
            "[kelly]\nfraction = 0.25\n\n[sweet_spot]\nlow = 1.8\nhigh = 2.4\noutside_multiplier = 0.5\n",
        );

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.db_path, "x.db");
        assert!((config.engine.weights.form - 0.3).abs() < f64::EPSILON);
        assert!((config.engine.weights.ranking - 0.22).abs() < f64::EPSILON);
        assert_eq!(config.engine.form.window, 12);
        assert!((config.engine.form.position_decay - 0.93).abs() < f64::EPSILON);
        assert!((config.staking.kelly.fraction - 0.25).abs() < f64::EPSILON);
        assert!((config.staking.kelly.min_odds - 1.30).abs() < f64::EPSILON);
        assert!((config.staking.sweet_spot.low - 1.8).abs() < f64::EPSILON);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn disagreement_tiers_parse_from_array_of_tables() {
        let tmp = scratch_dir("tiers_parse");
        write_config(
            &tmp,
            "",
            r#"
[disagreement]
extreme_ratio = 2.0
severe_multiplier = 0.1

[[disagreement.tiers]]
max_ratio = 1.2
multiplier = 1.0

[[disagreement.tiers]]
max_ratio = 1.6
multiplier = 0.5

[disagreement.tier_extreme_ratio]
itf = 1.5
"#,
        );
        let config = load_config_from(&tmp).unwrap();
        let d = &config.staking.disagreement;
        assert_eq!(d.tiers.len(), 2);
        assert!((d.tiers[1].multiplier - 0.5).abs() < f64::EPSILON);
        assert_eq!(d.tier_extreme_ratio.get("itf"), Some(&1.5));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_negative_weight() {
        let tmp = scratch_dir("negative_weight");
        write_config(&tmp, "[weights]\nmomentum = -0.1\n", "");

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "weights.momentum"),
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn head_to_head_and_confidence_sections_override() {
        let tmp = scratch_dir("h2h_confidence");
        write_config(
            &tmp,
            "[head_to_head]\noverall_share = 0.5\nsurface_share = 0.5\n\n\
             [confidence]\nclarity_ceiling = 0.25\n\n[recent]\nquality_scale = 150.0\n",
            "",
        );

        let config = load_config_from(&tmp).unwrap();
        let e = &config.engine;
        assert!((e.head_to_head.overall_share - 0.5).abs() < f64::EPSILON);
        assert_eq!(e.head_to_head.min_surface_meetings, 2);
        assert!((e.confidence.clarity_ceiling - 0.25).abs() < f64::EPSILON);
        assert!((e.confidence.neutral_threshold - 0.02).abs() < f64::EPSILON);
        assert!((e.recent.quality_scale - 150.0).abs() < f64::EPSILON);
        assert_eq!(e.recent.opponent_window, 10);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_confidence_shares() {
        let tmp = scratch_dir("confidence_shares");
        write_config(
            &tmp,
            "[confidence]\ndata_quality_share = 0.0\nagreement_share = 0.0\nclarity_share = 0.0\n",
            "",
        );

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "confidence"),
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_kelly_fraction_out_of_range() {
        let tmp = scratch_dir("kelly_range");
        write_config(&tmp, "", "[kelly]\nfraction = 1.5\n");

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "kelly.fraction"),
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_unsorted_disagreement_tiers() {
        let tmp = scratch_dir("unsorted_tiers");
        write_config(
            &tmp,
            "",
            "[[disagreement.tiers]]\nmax_ratio = 1.5\nmultiplier = 1.0\n\n[[disagreement.tiers]]\nmax_ratio = 1.2\nmultiplier = 0.5\n",
        );

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "disagreement.tiers[1].max_ratio")
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_min_units_above_max() {
        let tmp = scratch_dir("min_above_max");
        write_config(&tmp, "", "[kelly]\nmin_units = 6.0\nmax_units = 5.0\n");

        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "kelly.min_units"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_staking_toml() {
        let tmp = scratch_dir("missing_staking");
        fs::write(tmp.join("config/engine.toml"), "").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("staking.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = scratch_dir("invalid_toml");
        write_config(&tmp, "this is not valid [[[ toml", "");

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("engine.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_and_skips_existing() {
        let tmp = std::env::temp_dir().join("courtline_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);
        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::write(defaults_dir.join("engine.toml"), "[form]\nwindow = 10\n").unwrap();
        fs::write(defaults_dir.join("staking.toml"), "").unwrap();
        fs::write(defaults_dir.join("staking.toml.example"), "").unwrap();

        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/engine.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(copied[0].ends_with("staking.toml"));
        assert!(!tmp.join("config/staking.toml.example").exists());
        let content = fs::read_to_string(tmp.join("config/engine.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("courtline_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
