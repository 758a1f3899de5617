// Value detection and fractional-Kelly stake sizing.

use std::fmt;
use std::sync::Arc;

use courtline_core::audit::{AuditSink, NullAuditSink, StakeAuditRecord};
use courtline_core::config::StakingConfig;
use courtline_core::model::TierLevel;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors and classifications
// ---------------------------------------------------------------------------

/// Caller input the engine cannot price. Rejected bets are not errors.
#[derive(Debug, Error, PartialEq)]
pub enum StakingError {
    #[error("model probability must be inside (0, 1), got {0}")]
    InvalidProbability(f64),
    #[error("decimal odds must be finite and greater than 1.0, got {0}")]
    InvalidOdds(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoEdge,
    EvBelowMinimum,
    OddsBelowMinimum,
    ExtremeDisagreement,
    BelowMinimumStake,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::NoEdge => "no_edge",
            RejectReason::EvBelowMinimum => "ev_below_minimum",
            RejectReason::OddsBelowMinimum => "odds_below_minimum",
            RejectReason::ExtremeDisagreement => "extreme_disagreement",
            RejectReason::BelowMinimumStake => "below_minimum_stake",
        }
    }

    /// Rejects that got far enough through the pipeline to be audited.
    pub fn is_near_accept(&self) -> bool {
        matches!(
            self,
            RejectReason::ExtremeDisagreement | RejectReason::BelowMinimumStake
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StakeOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Position on the disagreement ladder: ratio of calibrated to implied
/// probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisagreementTier {
    /// Below the market, no positive edge.
    None,
    /// Inside configured tier `n` (0-based).
    Tier(usize),
    /// Between the last tier and the extreme ratio.
    Severe,
    Extreme,
}

impl fmt::Display for DisagreementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisagreementTier::None => f.write_str("none"),
            DisagreementTier::Tier(n) => write!(f, "tier_{}", n + 1),
            DisagreementTier::Severe => f.write_str("severe"),
            DisagreementTier::Extreme => f.write_str("extreme"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsCategory {
    BelowSweetSpot,
    SweetSpot,
    AboveSweetSpot,
}

impl OddsCategory {
    pub fn label(&self) -> &'static str {
        match self {
            OddsCategory::BelowSweetSpot => "below_sweet_spot",
            OddsCategory::SweetSpot => "sweet_spot",
            OddsCategory::AboveSweetSpot => "above_sweet_spot",
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Optional context for one stake evaluation.
#[derive(Debug, Clone, Default)]
pub struct StakeContext {
    /// Competitive level of the event; may tighten the extreme ratio.
    pub tier: Option<TierLevel>,
    /// Label written to the audit trail.
    pub selection: Option<String>,
}

/// Full breakdown of one stake evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeDecision {
    pub model_probability: f64,
    pub calibrated_probability: f64,
    pub implied_probability: f64,
    pub decimal_odds: f64,
    pub edge: f64,
    pub expected_value: f64,
    pub disagreement_ratio: f64,
    pub disagreement_tier: DisagreementTier,
    pub disagreement_multiplier: f64,
    /// Full Kelly bankroll fraction before any multiplier.
    pub kelly_fraction: f64,
    /// Bankroll fraction after fractional Kelly and disagreement penalty.
    pub stake_fraction: f64,
    pub odds_category: OddsCategory,
    pub recommended_units: f64,
    pub outcome: StakeOutcome,
}

impl StakeDecision {
    pub fn is_value(&self) -> bool {
        self.outcome == StakeOutcome::Accepted
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.outcome {
            StakeOutcome::Rejected(r) => Some(r),
            StakeOutcome::Accepted => None,
        }
    }

    fn to_audit_record(&self, selection: &str) -> StakeAuditRecord {
        StakeAuditRecord {
            selection: selection.to_string(),
            model_probability: self.model_probability,
            calibrated_probability: self.calibrated_probability,
            implied_probability: self.implied_probability,
            decimal_odds: self.decimal_odds,
            edge: self.edge,
            expected_value: self.expected_value,
            disagreement_ratio: self.disagreement_ratio,
            disagreement_tier: self.disagreement_tier.to_string(),
            odds_category: self.odds_category.label().to_string(),
            recommended_units: self.recommended_units,
            outcome: match self.outcome {
                StakeOutcome::Accepted => "accepted".to_string(),
                StakeOutcome::Rejected(r) => format!("rejected:{r}"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Shrink toward 50%, then blend toward the market.
pub fn calibrate(p: f64, implied: f64, cfg: &StakingConfig) -> f64 {
    let shrunk = 0.5 + (p - 0.5) * (1.0 - cfg.calibration.shrink);
    let blend = cfg.calibration.market_blend;
    (1.0 - blend) * shrunk + blend * implied
}

fn odds_category(odds: f64, cfg: &StakingConfig) -> OddsCategory {
    if odds < cfg.sweet_spot.low {
        OddsCategory::BelowSweetSpot
    } else if odds > cfg.sweet_spot.high {
        OddsCategory::AboveSweetSpot
    } else {
        OddsCategory::SweetSpot
    }
}

/// Classify a disagreement ratio. Returns the tier and its stake multiplier;
/// an extreme ratio carries a multiplier of 0.
pub fn classify_disagreement(ratio: f64, tier: Option<TierLevel>, cfg: &StakingConfig) -> (DisagreementTier, f64) {
    let d = &cfg.disagreement;
    if ratio <= 1.0 {
        return (DisagreementTier::None, 1.0);
    }
    let extreme = tier
        .and_then(|t| d.tier_extreme_ratio.get(t.label()).copied())
        .unwrap_or(d.extreme_ratio);
    if ratio > extreme {
        return (DisagreementTier::Extreme, 0.0);
    }
    match d.tiers.iter().position(|t| ratio <= t.max_ratio) {
        Some(i) => (DisagreementTier::Tier(i), d.tiers[i].multiplier),
        None => (DisagreementTier::Severe, d.severe_multiplier),
    }
}

fn round_to(value: f64, step: f64) -> f64 {
    if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    }
}

/// Evaluate one bet. Pure: no logging, no audit.
///
/// Pipeline:
/// 1. Calibrate (shrink toward 50%, optional market blend).
/// 2. Edge = calibrated - implied; EV = p * (odds - 1) - (1 - p).
/// 3. Reject on edge <= 0, EV below minimum or odds below the floor.
/// 4. Kelly fraction = edge / (odds - 1), times the fractional multiplier.
/// 5. Disagreement penalty by calibrated / implied ratio; extreme rejects.
/// 6. Bankroll fraction to units, sweet-spot multiplier.
/// 7. Cap at max units, round, reject below min units.
pub fn evaluate_stake(
    model_probability: f64,
    decimal_odds: f64,
    ctx: &StakeContext,
    cfg: &StakingConfig,
) -> Result<StakeDecision, StakingError> {
    if !model_probability.is_finite() || model_probability <= 0.0 || model_probability >= 1.0 {
        return Err(StakingError::InvalidProbability(model_probability));
    }
    if !decimal_odds.is_finite() || decimal_odds <= 1.0 {
        return Err(StakingError::InvalidOdds(decimal_odds));
    }

    let implied = 1.0 / decimal_odds;
    let calibrated = calibrate(model_probability, implied, cfg);
    let edge = calibrated - implied;
    let expected_value = calibrated * (decimal_odds - 1.0) - (1.0 - calibrated);
    let ratio = calibrated / implied;
    let odds_category = odds_category(decimal_odds, cfg);

    let mut decision = StakeDecision {
        model_probability,
        calibrated_probability: calibrated,
        implied_probability: implied,
        decimal_odds,
        edge,
        expected_value,
        disagreement_ratio: ratio,
        disagreement_tier: DisagreementTier::None,
        disagreement_multiplier: 0.0,
        kelly_fraction: 0.0,
        stake_fraction: 0.0,
        odds_category,
        recommended_units: 0.0,
        outcome: StakeOutcome::Accepted,
    };
    let reject = |mut d: StakeDecision, reason| {
        d.recommended_units = 0.0;
        d.outcome = StakeOutcome::Rejected(reason);
        Ok(d)
    };

    if edge <= 0.0 {
        return reject(decision, RejectReason::NoEdge);
    }
    if expected_value < cfg.kelly.min_ev {
        return reject(decision, RejectReason::EvBelowMinimum);
    }
    if decimal_odds < cfg.kelly.min_odds {
        return reject(decision, RejectReason::OddsBelowMinimum);
    }

    decision.kelly_fraction = edge / (decimal_odds - 1.0);
    let (tier, multiplier) = classify_disagreement(ratio, ctx.tier, cfg);
    decision.disagreement_tier = tier;
    decision.disagreement_multiplier = multiplier;
    if tier == DisagreementTier::Extreme {
        return reject(decision, RejectReason::ExtremeDisagreement);
    }
    decision.stake_fraction = decision.kelly_fraction * cfg.kelly.fraction * multiplier;

    let mut units = decision.stake_fraction * cfg.kelly.bankroll / cfg.kelly.unit_size;
    if odds_category != OddsCategory::SweetSpot {
        units *= cfg.sweet_spot.outside_multiplier;
    }
    units = round_to(units.min(cfg.kelly.max_units), cfg.kelly.rounding);
    if units < cfg.kelly.min_units {
        return reject(decision, RejectReason::BelowMinimumStake);
    }

    decision.recommended_units = units;
    Ok(decision)
}

/// Stake evaluator with an audit trail.
pub struct StakingEngine {
    config: StakingConfig,
    audit: Arc<dyn AuditSink>,
}

impl StakingEngine {
    pub fn new(config: StakingConfig) -> Self {
        Self::with_audit(config, Arc::new(NullAuditSink))
    }

    pub fn with_audit(config: StakingConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self { config, audit }
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Evaluate a bet and hand accepted or near-accepted decisions to the
    /// audit sink. The sink never fails the evaluation.
    pub fn evaluate_stake(
        &self,
        model_probability: f64,
        decimal_odds: f64,
        ctx: &StakeContext,
    ) -> Result<StakeDecision, StakingError> {
        let decision = evaluate_stake(model_probability, decimal_odds, ctx, &self.config)?;
        let selection = ctx.selection.as_deref().unwrap_or("unlabelled");

        match decision.outcome {
            StakeOutcome::Accepted => info!(
                selection,
                odds = decimal_odds,
                edge = decision.edge,
                units = decision.recommended_units,
                tier = %decision.disagreement_tier,
                "stake accepted"
            ),
            StakeOutcome::Rejected(reason) => debug!(
                selection,
                odds = decimal_odds,
                edge = decision.edge,
                %reason,
                "stake rejected"
            ),
        }

        let audited = match decision.outcome {
            StakeOutcome::Accepted => true,
            StakeOutcome::Rejected(reason) => reason.is_near_accept(),
        };
        if audited {
            self.audit.record(decision.to_audit_record(selection));
        }
        Ok(decision)
    }
}
