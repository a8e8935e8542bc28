use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Urgency signals derived from a scope's earliest dated demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepletionEstimate {
    /// Days left until the earliest counted demand falls due. Negative when
    /// the date has already passed. `None` when nothing needs ordering or no
    /// counted line carries a date.
    pub days_until_depletion: Option<i32>,
    /// Earliest required-by date across counted demand, kept even for fully
    /// covered scopes so planners still see the deadline.
    pub order_by_date: Option<NaiveDate>,
}

pub fn estimate(
    to_order: Decimal,
    earliest_required_by: Option<NaiveDate>,
    today: NaiveDate,
) -> DepletionEstimate {
    let days_until_depletion = if to_order > Decimal::ZERO {
        earliest_required_by.map(|due| (due - today).num_days() as i32)
    } else {
        None
    };

    DepletionEstimate {
        days_until_depletion,
        order_by_date: earliest_required_by,
    }
}
