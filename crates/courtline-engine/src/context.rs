// Match context: each player's home tier versus the tier of this match.

use std::collections::HashMap;

use courtline_core::config::ContextConfig;
use courtline_core::model::{MatchRecord, TierLevel, TournamentCategory};
use serde::Serialize;

use crate::factors::FactorResult;

/// Tier placement of one player for this match.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SideContext {
    pub home_tier: Option<TierLevel>,
    /// Tier steps the player is dropping down; 0 when at or above home.
    pub displacement: u8,
    /// Fraction removed from this player's positive tier-sensitive advantage.
    pub discount: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchContext {
    pub match_tier: Option<TierLevel>,
    pub side_a: SideContext,
    pub side_b: SideContext,
    pub warnings: Vec<String>,
}

impl MatchContext {
    pub fn max_displacement(&self) -> u8 {
        self.side_a.displacement.max(self.side_b.displacement)
    }

    /// Discount a tier-sensitive factor. Only the displaced player's own
    /// positive contribution shrinks: side A's when the advantage is
    /// positive, side B's when it is negative.
    pub fn apply_discount(&self, factor: &mut FactorResult) {
        if !factor.kind.is_tier_sensitive() {
            return;
        }
        let adv = factor.advantage();
        let discount = if adv > 0.0 {
            self.side_a.discount
        } else if adv < 0.0 {
            self.side_b.discount
        } else {
            0.0
        };
        if discount > 0.0 {
            factor.scale_advantage(1.0 - discount);
        }
    }
}

/// Home tier from ranking; from the most common level in recent matches
/// when unranked (ties go to the higher level).
pub fn home_tier(ranking: Option<u32>, recent: &[MatchRecord], cfg: &ContextConfig) -> Option<TierLevel> {
    if let Some(rank) = ranking {
        return Some(if rank <= cfg.tour_rank_cutoff {
            TierLevel::Tour
        } else if rank <= cfg.challenger_rank_cutoff {
            TierLevel::Challenger
        } else {
            TierLevel::Itf
        });
    }
    let mut counts: HashMap<TierLevel, usize> = HashMap::new();
    for m in recent.iter().take(cfg.history_window) {
        *counts.entry(m.category().level()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then(la.cmp(lb)))
        .map(|(level, _)| level)
}

fn side_context(home: Option<TierLevel>, match_tier: Option<TierLevel>, cfg: &ContextConfig) -> SideContext {
    let displacement = match (home, match_tier) {
        (Some(h), Some(m)) => h.rank().saturating_sub(m.rank()),
        _ => 0,
    };
    SideContext {
        home_tier: home,
        displacement,
        discount: (cfg.discount_per_step * f64::from(displacement)).min(cfg.max_discount),
    }
}

/// Resolve both players' tier placement for a match. `tournament` is the
/// descriptive event name; without it the match tier is unknown and no
/// discount applies.
pub fn resolve_context(
    tournament: Option<&str>,
    home_a: Option<TierLevel>,
    home_b: Option<TierLevel>,
    names: (&str, &str),
    cfg: &ContextConfig,
) -> MatchContext {
    let match_tier = tournament
        .filter(|t| !t.trim().is_empty())
        .map(|t| TournamentCategory::from_name(t).level());
    let side_a = side_context(home_a, match_tier, cfg);
    let side_b = side_context(home_b, match_tier, cfg);

    let mut warnings = Vec::new();
    for (name, side) in [(names.0, &side_a), (names.1, &side_b)] {
        if let (true, Some(home), Some(tier)) = (side.displacement > 0, side.home_tier, match_tier) {
            warnings.push(format!(
                "{name} is a {home}-level player competing at {tier} level; \
                 tier-sensitive factors discounted {:.0}%",
                side.discount * 100.0
            ));
        }
    }

    MatchContext {
        match_tier,
        side_a,
        side_b,
        warnings,
    }
}
