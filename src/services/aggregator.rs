use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::material_requirement::RequirementScope;
use crate::services::demand::DemandLine;
use crate::services::inventory::StockPosition;
use crate::services::order_ledger::OpenOrderLine;

/// Netted requirement quantities for one `(item, scope)` pair.
///
/// Stock and incoming supply have no project dimension, so every scope of an
/// item sees the same `total_available` and `total_in_order`; only demand is
/// scoped. A per-project row therefore answers "what is missing if this
/// project alone drew from org stock".
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeAggregate {
    pub scope: RequirementScope,
    pub total_required: Decimal,
    pub total_available: Decimal,
    pub total_reserved: Decimal,
    pub total_in_order: Decimal,
    pub to_order: Decimal,
    pub earliest_required_by: Option<NaiveDate>,
    pub source_item_id: Option<Uuid>,
}

/// Quantity that still has to be ordered after netting demand against
/// stock and open supply.
pub fn to_order(
    total_required: Decimal,
    total_available: Decimal,
    total_in_order: Decimal,
) -> Decimal {
    (total_required - total_available - total_in_order).max(Decimal::ZERO)
}

/// Usable stock across warehouses. Each warehouse floors at zero first so an
/// over-reserved warehouse cannot eat into another warehouse's surplus.
pub fn total_available(positions: &[StockPosition]) -> Decimal {
    positions.iter().map(StockPosition::available).sum()
}

pub fn total_reserved(positions: &[StockPosition]) -> Decimal {
    positions.iter().map(|p| p.reserved).sum()
}

/// Undelivered quantity across all open purchase-order lines of the item,
/// linked to a requirement or not.
pub fn total_in_order(open_lines: &[OpenOrderLine]) -> Decimal {
    open_lines.iter().map(OpenOrderLine::outstanding).sum()
}

/// Nets one item's demand against stock and open supply, producing one
/// aggregate per scope: the org-wide rollup plus one per project that
/// contributes counted demand. No counted demand means no aggregates; the
/// caller retires any leftover rows.
pub fn aggregate_item(
    lines: &[DemandLine],
    positions: &[StockPosition],
    open_lines: &[OpenOrderLine],
) -> Vec<ScopeAggregate> {
    let counted: Vec<&DemandLine> = lines.iter().filter(|l| l.counted()).collect();
    if counted.is_empty() {
        return Vec::new();
    }

    let available = total_available(positions);
    let reserved = total_reserved(positions);
    let in_order = total_in_order(open_lines);

    // BTreeMap keyed by the optional project id keeps output order stable.
    let mut per_project: BTreeMap<Uuid, Vec<&DemandLine>> = BTreeMap::new();
    for line in &counted {
        per_project.entry(line.project_id).or_default().push(line);
    }

    let mut aggregates = Vec::with_capacity(per_project.len() + 1);
    aggregates.push(aggregate_scope(
        RequirementScope::Global,
        &counted,
        available,
        reserved,
        in_order,
    ));
    for (project_id, project_lines) in &per_project {
        aggregates.push(aggregate_scope(
            RequirementScope::Project(*project_id),
            project_lines,
            available,
            reserved,
            in_order,
        ));
    }

    aggregates
}

fn aggregate_scope(
    scope: RequirementScope,
    lines: &[&DemandLine],
    available: Decimal,
    reserved: Decimal,
    in_order: Decimal,
) -> ScopeAggregate {
    let total_required = lines
        .iter()
        .map(|l| l.quantity)
        .sum::<Decimal>()
        .max(Decimal::ZERO);
    let earliest_required_by = lines.iter().filter_map(|l| l.required_by).min();
    let source_item_id = match lines {
        [only] => Some(only.id),
        _ => None,
    };

    ScopeAggregate {
        scope,
        total_required,
        total_available: available,
        total_reserved: reserved,
        total_in_order: in_order,
        to_order: to_order(total_required, available, in_order),
        earliest_required_by,
        source_item_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(project: Uuid, quantity: Decimal, required_by: Option<NaiveDate>) -> DemandLine {
        DemandLine {
            id: Uuid::new_v4(),
            nomenclature_item_id: Uuid::new_v4(),
            project_id: project,
            quantity,
            required_by,
            responsible_id: None,
            by_contractor: false,
            planning_stage: false,
        }
    }

    fn position(on_hand: Decimal, reserved: Decimal) -> StockPosition {
        StockPosition {
            warehouse_id: Uuid::new_v4(),
            on_hand,
            reserved,
        }
    }

    fn open_line(ordered: Decimal, delivered: Decimal) -> OpenOrderLine {
        OpenOrderLine {
            line_id: Uuid::new_v4(),
            purchase_order_id: Uuid::new_v4(),
            requirement_id: None,
            ordered,
            delivered,
        }
    }

    #[test]
    fn nets_demand_against_stock_and_open_supply() {
        let project = Uuid::new_v4();
        let lines = vec![line(project, dec!(100), None)];
        let positions = vec![position(dec!(50), dec!(10))];
        let open = vec![open_line(dec!(20), dec!(0))];

        let aggregates = aggregate_item(&lines, &positions, &open);

        // Global rollup plus one project scope
        assert_eq!(aggregates.len(), 2);
        let global = &aggregates[0];
        assert_eq!(global.scope, RequirementScope::Global);
        assert_eq!(global.total_required, dec!(100));
        assert_eq!(global.total_available, dec!(40));
        assert_eq!(global.total_reserved, dec!(10));
        assert_eq!(global.total_in_order, dec!(20));
        assert_eq!(global.to_order, dec!(40));
    }

    #[test]
    fn contractor_and_planning_lines_are_excluded() {
        let project = Uuid::new_v4();
        let mut contractor = line(project, dec!(30), None);
        contractor.by_contractor = true;
        let mut planning = line(project, dec!(25), None);
        planning.planning_stage = true;
        let lines = vec![line(project, dec!(10), None), contractor, planning];

        let aggregates = aggregate_item(&lines, &[], &[]);

        assert_eq!(aggregates[0].total_required, dec!(10));
        assert_eq!(aggregates[0].to_order, dec!(10));
    }

    #[test]
    fn no_counted_demand_yields_no_aggregates() {
        let project = Uuid::new_v4();
        let mut excluded = line(project, dec!(5), None);
        excluded.by_contractor = true;

        assert!(aggregate_item(&[excluded], &[position(dec!(7), dec!(0))], &[]).is_empty());
        assert!(aggregate_item(&[], &[], &[]).is_empty());
    }

    #[test]
    fn over_reserved_warehouse_does_not_offset_other_warehouses() {
        let lines = vec![line(Uuid::new_v4(), dec!(10), None)];
        // First warehouse is over-reserved by 5; the deficit must not reduce
        // the second warehouse's 8 available.
        let positions = vec![position(dec!(3), dec!(8)), position(dec!(8), dec!(0))];

        let aggregates = aggregate_item(&lines, &positions, &[]);

        assert_eq!(aggregates[0].total_available, dec!(8));
        assert_eq!(aggregates[0].to_order, dec!(2));
    }

    #[test]
    fn per_project_scopes_share_org_wide_availability() {
        let project_a = Uuid::new_v4();
        let project_b = Uuid::new_v4();
        let lines = vec![
            line(project_a, dec!(60), None),
            line(project_b, dec!(40), None),
        ];
        let positions = vec![position(dec!(50), dec!(0))];

        let aggregates = aggregate_item(&lines, &positions, &[]);

        assert_eq!(aggregates.len(), 3);
        let global = &aggregates[0];
        assert_eq!(global.total_required, dec!(100));
        assert_eq!(global.to_order, dec!(50));

        for scoped in &aggregates[1..] {
            assert_eq!(scoped.total_available, dec!(50));
            assert!(matches!(scoped.scope, RequirementScope::Project(_)));
        }
        let required: Vec<Decimal> = aggregates[1..].iter().map(|a| a.total_required).collect();
        assert!(required.contains(&dec!(60)));
        assert!(required.contains(&dec!(40)));
    }

    #[test]
    fn single_line_scope_carries_source_item_link() {
        let project = Uuid::new_v4();
        let only = line(project, dec!(12), None);
        let only_id = only.id;

        let aggregates = aggregate_item(&[only], &[], &[]);

        // One counted line: both scopes trace back to it
        assert_eq!(aggregates[0].source_item_id, Some(only_id));
        assert_eq!(aggregates[1].source_item_id, Some(only_id));

        let lines = vec![line(project, dec!(1), None), line(project, dec!(2), None)];
        let aggregates = aggregate_item(&lines, &[], &[]);
        assert_eq!(aggregates[0].source_item_id, None);
    }

    #[test]
    fn earliest_required_by_is_minimum_over_counted_lines() {
        let project = Uuid::new_v4();
        let near = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let far = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut excluded = line(project, dec!(9), Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        excluded.planning_stage = true;

        let lines = vec![
            line(project, dec!(5), Some(far)),
            line(project, dec!(5), Some(near)),
            line(project, dec!(5), None),
            excluded,
        ];

        let aggregates = aggregate_item(&lines, &[], &[]);

        assert_eq!(aggregates[0].earliest_required_by, Some(near));
    }

    #[test]
    fn fully_covered_demand_orders_nothing() {
        let lines = vec![line(Uuid::new_v4(), dec!(30), None)];
        let positions = vec![position(dec!(25), dec!(0))];
        let open = vec![open_line(dec!(10), dec!(2))];

        let aggregates = aggregate_item(&lines, &positions, &open);

        // 30 required, 25 available, 8 outstanding in order
        assert_eq!(aggregates[0].to_order, Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn to_order_is_never_negative(
            required in 0i64..100_000,
            available in 0i64..100_000,
            in_order in 0i64..100_000,
        ) {
            let result = to_order(
                Decimal::from(required),
                Decimal::from(available),
                Decimal::from(in_order),
            );
            prop_assert!(result >= Decimal::ZERO);
        }

        #[test]
        fn covered_demand_never_produces_an_order(
            required in 0i64..50_000,
            extra in 0i64..50_000,
            split in 0i64..50_000,
        ) {
            // available + in_order >= required by construction
            let available = Decimal::from(split.min(required + extra));
            let in_order = Decimal::from(required + extra) - available;
            let result = to_order(Decimal::from(required), available, in_order);
            prop_assert_eq!(result, Decimal::ZERO);
        }

        #[test]
        fn global_required_equals_sum_of_project_scopes(
            quantities in proptest::collection::vec(1i64..10_000, 1..8),
        ) {
            let lines: Vec<DemandLine> = quantities
                .iter()
                .map(|q| line(Uuid::new_v4(), Decimal::from(*q), None))
                .collect();

            let aggregates = aggregate_item(&lines, &[], &[]);

            let global = aggregates
                .iter()
                .find(|a| a.scope == RequirementScope::Global)
                .unwrap();
            let scoped_sum: Decimal = aggregates
                .iter()
                .filter(|a| a.scope != RequirementScope::Global)
                .map(|a| a.total_required)
                .sum();
            prop_assert_eq!(global.total_required, scoped_sum);
        }
    }
}
