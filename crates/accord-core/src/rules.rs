use std::sync::Arc;

use serde::{Deserialize, Serialize};

use accord_assets::{AssayId, Units};

use crate::timer::TimerService;

/// Kind of one payout-rule leg.
///
/// `Offer` legs are exact: escrow deposits exactly the stated units, and a
/// refund reading returns exactly them. `Want` legs are at-least: a win
/// reading requires units that include the stated units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutRuleKind {
    Offer,
    Want,
}

/// One leg of a party's proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutRule {
    pub kind: PayoutRuleKind,
    pub units: Units,
}

impl PayoutRule {
    pub fn offer(units: Units) -> Self {
        Self {
            kind: PayoutRuleKind::Offer,
            units,
        }
    }

    pub fn want(units: Units) -> Self {
        Self {
            kind: PayoutRuleKind::Want,
            units,
        }
    }
}

/// Discriminant of an exit rule, recorded on the offer after the capability
/// parts (timer, cancel token) have been consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitRuleKind {
    NoExit,
    OnDemand,
    AfterDeadline,
}

/// How and when a party may exit unilaterally. Consumed once at escrow time:
/// `AfterDeadline` carries the timer the wakeup is registered with.
#[derive(Clone)]
pub enum ExitRule {
    NoExit,
    OnDemand,
    AfterDeadline {
        deadline: u64,
        timer: Arc<dyn TimerService>,
    },
}

impl ExitRule {
    pub fn kind(&self) -> ExitRuleKind {
        match self {
            Self::NoExit => ExitRuleKind::NoExit,
            Self::OnDemand => ExitRuleKind::OnDemand,
            Self::AfterDeadline { .. } => ExitRuleKind::AfterDeadline,
        }
    }
}

impl std::fmt::Debug for ExitRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoExit => write!(f, "NoExit"),
            Self::OnDemand => write!(f, "OnDemand"),
            Self::AfterDeadline { deadline, .. } => f
                .debug_struct("AfterDeadline")
                .field("deadline", deadline)
                .finish_non_exhaustive(),
        }
    }
}

/// A party's full proposal: payout legs plus the exit policy.
#[derive(Clone, Debug)]
pub struct OfferRules {
    pub payout_rules: Vec<PayoutRule>,
    pub exit_rule: ExitRule,
}

impl OfferRules {
    pub fn new(payout_rules: Vec<PayoutRule>, exit_rule: ExitRule) -> Self {
        Self {
            payout_rules,
            exit_rule,
        }
    }

    /// Per-leg assay ids, in leg order. This is the offer's assay ordering
    /// for all later batch operations.
    pub fn assay_ids(&self) -> Vec<AssayId> {
        self.payout_rules
            .iter()
            .map(|rule| rule.units.assay_id())
            .collect()
    }
}
