use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::entities::material_requirement::{self, RequirementPriority, RequirementStatus};
use crate::services::aggregator::ScopeAggregate;
use crate::services::depletion::DepletionEstimate;

/// What the stored row looked like before this run. Classification only
/// needs the previous status and required quantity, not the whole row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredSnapshot {
    pub status: RequirementStatus,
    pub total_required: Decimal,
}

impl From<&material_requirement::Model> for StoredSnapshot {
    fn from(row: &material_requirement::Model) -> Self {
        Self {
            status: row.status,
            total_required: row.total_required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: RequirementStatus,
    pub priority: RequirementPriority,
}

pub fn classify(
    stored: Option<StoredSnapshot>,
    aggregate: &ScopeAggregate,
    estimate: &DepletionEstimate,
    has_open_link: bool,
    today: NaiveDate,
) -> Classification {
    Classification {
        status: status_for(stored, aggregate, has_open_link),
        priority: priority_for(estimate, aggregate.to_order, today),
    }
}

/// Written-off rows stay written off until demand reappears on a row that
/// had none; everything else follows the computed quantities. An open order
/// line referencing the row keeps it in ordering even when stock already
/// covers the demand, so delivery tracking is not lost.
fn status_for(
    stored: Option<StoredSnapshot>,
    aggregate: &ScopeAggregate,
    has_open_link: bool,
) -> RequirementStatus {
    if let Some(snapshot) = stored {
        if snapshot.status == RequirementStatus::WrittenOff {
            let demand_returned = aggregate.total_required > Decimal::ZERO
                && snapshot.total_required.is_zero();
            if !demand_returned {
                return RequirementStatus::WrittenOff;
            }
        }
    }

    if has_open_link && aggregate.total_in_order > Decimal::ZERO {
        return RequirementStatus::InOrder;
    }
    if aggregate.to_order.is_zero() && aggregate.total_available >= aggregate.total_required {
        return RequirementStatus::Closed;
    }
    RequirementStatus::WaitingOrder
}

fn priority_for(
    estimate: &DepletionEstimate,
    to_order: Decimal,
    today: NaiveDate,
) -> RequirementPriority {
    let overdue = estimate.order_by_date.map_or(false, |due| due < today);
    match estimate.days_until_depletion {
        Some(days) if days <= 0 => RequirementPriority::Critical,
        _ if overdue => RequirementPriority::Critical,
        Some(days) if days <= 7 => RequirementPriority::High,
        Some(days) if days <= 14 => RequirementPriority::Normal,
        Some(_) => RequirementPriority::Low,
        None if to_order > Decimal::ZERO => RequirementPriority::Normal,
        None => RequirementPriority::Low,
    }
}
