//! Pure invariant checks over unit matrices.
//!
//! Both checks run against committed registry state before any write; a
//! failing check means the proposed reallocation never touches the tables.

use std::sync::Arc;

use accord_assets::{UnitAlgebra, Units};

use crate::error::HostError;
use crate::rules::{PayoutRule, PayoutRuleKind};

fn check_shape(
    algebras: &[Arc<dyn UnitAlgebra>],
    matrix: &[Vec<Units>],
    rows: usize,
    name: &str,
) -> Result<(), HostError> {
    if matrix.len() != rows {
        return Err(HostError::structural(format!(
            "{} matrix has {} rows, expected {}",
            name,
            matrix.len(),
            rows
        )));
    }
    for row in matrix {
        if row.len() != algebras.len() {
            return Err(HostError::structural(format!(
                "{} matrix row has {} columns, expected {}",
                name,
                row.len(),
                algebras.len()
            )));
        }
    }
    Ok(())
}

/// Rights conservation: for every assay independently, the per-assay sum of
/// units is identical before and after. A reallocation that conserves the
/// grand total but shuffles between assays still fails.
pub fn rights_conserved(
    algebras: &[Arc<dyn UnitAlgebra>],
    previous: &[Vec<Units>],
    proposed: &[Vec<Units>],
) -> Result<bool, HostError> {
    check_shape(algebras, previous, previous.len(), "previous")?;
    check_shape(algebras, proposed, previous.len(), "proposed")?;

    for (column, algebra) in algebras.iter().enumerate() {
        let mut before = algebra.empty();
        let mut after = algebra.empty();
        for row in previous {
            before = algebra.with(&before, &row[column].extent)?;
        }
        for row in proposed {
            after = algebra.with(&after, &row[column].extent)?;
        }
        if !algebra.equals(&before, &after)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Offer safety for a single offer: the proposed units must read as a full
/// refund (every `Offer` leg gets back exactly what it put in) or as a full
/// win (every `Want` leg is at least satisfied). The OR is over whole
/// readings, never per leg.
///
/// `rules` is the offer's legs projected onto the column ordering; columns
/// the offer has no leg for are `None` and constrain nothing.
pub fn offer_safe_for_offer(
    algebras: &[Arc<dyn UnitAlgebra>],
    rules: &[Option<PayoutRule>],
    proposed: &[Units],
) -> Result<bool, HostError> {
    if rules.len() != algebras.len() || proposed.len() != algebras.len() {
        return Err(HostError::structural(
            "offer-safety row does not match the assay column count",
        ));
    }

    let mut refund_ok = true;
    let mut want_ok = true;
    for ((rule, units), algebra) in rules.iter().zip(proposed).zip(algebras) {
        let Some(rule) = rule else {
            continue;
        };
        match rule.kind {
            PayoutRuleKind::Offer => {
                if !algebra.equals(&units.extent, &rule.units.extent)? {
                    refund_ok = false;
                }
            }
            PayoutRuleKind::Want => {
                if !algebra.includes(&units.extent, &rule.units.extent)? {
                    want_ok = false;
                }
            }
        }
    }
    Ok(refund_ok || want_ok)
}

/// Offer safety across a whole proposed set: every offer must individually
/// pass [`offer_safe_for_offer`].
pub fn offer_safe_for_all(
    algebras: &[Arc<dyn UnitAlgebra>],
    rule_matrix: &[Vec<Option<PayoutRule>>],
    proposed: &[Vec<Units>],
) -> Result<bool, HostError> {
    if rule_matrix.len() != proposed.len() {
        return Err(HostError::structural(
            "offer-safety matrices have different row counts",
        ));
    }
    for (rules, row) in rule_matrix.iter().zip(proposed) {
        if !offer_safe_for_offer(algebras, rules, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}
