// Stake-decision audit records and the sink they are written to.

use serde::{Deserialize, Serialize};

/// Flattened breakdown of one stake decision, kept for later review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeAuditRecord {
    /// Free-form label for the selection (e.g. player name and match).
    pub selection: String,
    pub model_probability: f64,
    pub calibrated_probability: f64,
    pub implied_probability: f64,
    pub decimal_odds: f64,
    pub edge: f64,
    pub expected_value: f64,
    pub disagreement_ratio: f64,
    pub disagreement_tier: String,
    pub odds_category: String,
    pub recommended_units: f64,
    /// `"accepted"` or `"rejected:<reason>"`.
    pub outcome: String,
}

/// Destination for audit records.
///
/// Recording is best-effort: implementations must not block the caller for
/// long and must swallow their own failures (logging them instead).
pub trait AuditSink: Send + Sync {
    fn record(&self, record: StakeAuditRecord);
}

/// Sink that discards everything. Used when no audit trail is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _record: StakeAuditRecord) {}
}
