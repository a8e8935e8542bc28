use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::material_requirement::{self, RequirementScope, RequirementStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::aggregator::{self, ScopeAggregate};
use crate::services::catalog::{CatalogView, ItemSummary};
use crate::services::classifier::{self, Classification, StoredSnapshot};
use crate::services::demand::DemandSource;
use crate::services::depletion::{self, DepletionEstimate};
use crate::services::inventory::InventoryView;
use crate::services::order_ledger::OrderLedgerView;
use crate::services::requirements::{
    materially_changed, ComputedRequirement, RequirementService,
};

lazy_static! {
    pub(crate) static ref RECALC_RUNS: IntCounter = IntCounter::new(
        "requirement_recalc_runs_total",
        "Total recalculation runs executed"
    )
    .expect("metric can be created");
    pub(crate) static ref RECALC_BUSY_REJECTIONS: IntCounter = IntCounter::new(
        "requirement_recalc_busy_rejections_total",
        "Recalculation requests rejected because a run was already in flight"
    )
    .expect("metric can be created");
    pub(crate) static ref REQUIREMENTS_CALCULATED: IntCounter = IntCounter::new(
        "requirements_calculated_total",
        "Requirement rows written by recalculation"
    )
    .expect("metric can be created");
    pub(crate) static ref REQUIREMENTS_UNCHANGED: IntCounter = IntCounter::new(
        "requirements_unchanged_total",
        "Requirement rows recomputed to an identical snapshot"
    )
    .expect("metric can be created");
    pub(crate) static ref REQUIREMENT_CONFLICTS: IntCounter = IntCounter::new(
        "requirement_version_conflicts_total",
        "Optimistic version conflicts hit during recalculation"
    )
    .expect("metric can be created");
    pub(crate) static ref REQUIREMENT_INVARIANT_VIOLATIONS: IntCounter = IntCounter::new(
        "requirement_invariant_violations_total",
        "Computed snapshots rejected by invariant checks"
    )
    .expect("metric can be created");
    pub(crate) static ref REQUIREMENTS_SKIPPED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "requirements_skipped_total",
            "Items skipped during recalculation by reason"
        ),
        &["reason"]
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone)]
pub enum RecalcScope {
    /// Every item with demand plus every item that already has rows.
    All,
    Items(Vec<Uuid>),
}

/// Outcome of one recalculation run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Rows inserted or rewritten.
    pub calculated: u64,
    /// Rows whose recomputed snapshot matched the stored one.
    pub unchanged: u64,
    /// Items skipped (upstream failures, missing catalog entries, errors).
    pub skipped: u64,
    /// Rows lost to a concurrent writer even after the in-run retry.
    pub conflicts: u64,
    /// Snapshots rejected by the invariant check and never committed.
    pub invariant_violations: u64,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            calculated: 0,
            unchanged: 0,
            skipped: 0,
            conflicts: 0,
            invariant_violations: 0,
        }
    }
}

enum RetryOutcome {
    Written,
    Unchanged,
    Lost,
}

/// Shared per-item inputs for scope reconciliation.
struct ScopeContext<'a> {
    item_id: Uuid,
    open_links: &'a HashSet<Uuid>,
    catalog: Option<&'a ItemSummary>,
    today: NaiveDate,
    run_id: Uuid,
}

/// Last line of defense before a commit. The aggregation itself cannot
/// produce these states, but a snapshot that somehow does must never land
/// in the store.
fn check_invariants(computed: &ComputedRequirement) -> Result<(), ServiceError> {
    if computed.total_required < Decimal::ZERO
        || computed.total_available < Decimal::ZERO
        || computed.total_reserved < Decimal::ZERO
        || computed.total_in_order < Decimal::ZERO
        || computed.to_order < Decimal::ZERO
    {
        return Err(ServiceError::InvariantViolation(format!(
            "negative quantity computed for item {} scope {}",
            computed.nomenclature_item_id, computed.scope
        )));
    }

    let expected = (computed.total_required - computed.total_available - computed.total_in_order)
        .max(Decimal::ZERO);
    if computed.to_order != expected {
        return Err(ServiceError::InvariantViolation(format!(
            "to_order {} does not match netting result {} for item {} scope {}",
            computed.to_order, expected, computed.nomenclature_item_id, computed.scope
        )));
    }

    if computed.status == RequirementStatus::Closed && !computed.to_order.is_zero() {
        return Err(ServiceError::InvariantViolation(format!(
            "closed requirement for item {} scope {} still has to_order {}",
            computed.nomenclature_item_id, computed.scope, computed.to_order
        )));
    }

    Ok(())
}

/// Owns the recompute run: one run at a time, a fresh UUID per run, per-item
/// failure isolation and a pending scope that absorbs requests arriving
/// while a run is in flight.
pub struct RecalculationCoordinator {
    requirements: RequirementService,
    demand: Arc<dyn DemandSource>,
    inventory: Arc<dyn InventoryView>,
    orders: Arc<dyn OrderLedgerView>,
    catalog: Arc<dyn CatalogView>,
    event_sender: Option<EventSender>,
    shutdown: watch::Receiver<bool>,
    run_lock: tokio::sync::Mutex<()>,
    pending: Mutex<HashSet<Uuid>>,
    pending_full: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl RecalculationCoordinator {
    pub fn new(
        requirements: RequirementService,
        demand: Arc<dyn DemandSource>,
        inventory: Arc<dyn InventoryView>,
        orders: Arc<dyn OrderLedgerView>,
        catalog: Arc<dyn CatalogView>,
        event_sender: Option<EventSender>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            requirements,
            demand,
            inventory,
            orders,
            catalog,
            event_sender,
            shutdown,
            run_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(HashSet::new()),
            pending_full: AtomicBool::new(false),
            last_sync: Mutex::new(None),
        }
    }

    /// Remembers items for the next run. Called by services whose writes
    /// invalidate current numbers, and internally when a request loses the
    /// run lock.
    pub fn queue_items(&self, items: impl IntoIterator<Item = Uuid>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.extend(items);
    }

    fn drain_pending(&self) -> (Vec<Uuid>, bool) {
        let drained: Vec<Uuid> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain().collect()
        };
        let full = self.pending_full.swap(false, Ordering::SeqCst);
        (drained, full)
    }

    /// Runs a recompute over the given scope. At most one run executes at a
    /// time; a request arriving during a run is rejected busy and its scope
    /// folded into the next run instead of being dropped.
    #[instrument(skip(self))]
    pub async fn recalculate(&self, scope: RecalcScope) -> Result<RunReport, ServiceError> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                RECALC_BUSY_REJECTIONS.inc();
                match &scope {
                    RecalcScope::All => self.pending_full.store(true, Ordering::SeqCst),
                    RecalcScope::Items(items) => self.queue_items(items.iter().copied()),
                }
                info!("Recalculation already running; scope queued for the next run");
                return Err(ServiceError::RecalculationBusy);
            }
        };

        self.run(scope).await
    }

    /// Incremental recompute covering items whose demand lines changed since
    /// the last completed run. Falls back to a full run when no run has
    /// completed yet.
    #[instrument(skip(self))]
    pub async fn sync_from_projects(&self) -> Result<RunReport, ServiceError> {
        let since = *self
            .last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let scope = match since {
            Some(since) => {
                let changed = self.demand.changed_item_ids(since).await?;
                info!(
                    "Demand sync: {} item(s) changed since {}",
                    changed.len(),
                    since
                );
                if let Some(sender) = &self.event_sender {
                    sender
                        .send(Event::DemandSyncRequested {
                            item_count: changed.len(),
                        })
                        .await
                        .map_err(ServiceError::EventError)?;
                }
                RecalcScope::Items(changed)
            }
            None => {
                info!("Demand sync with no prior run; running a full recalculation");
                RecalcScope::All
            }
        };

        self.recalculate(scope).await
    }

    /// Periodic full recompute driving the board without external triggers.
    /// Returns when the shutdown flag flips.
    pub async fn run_background(self: Arc<Self>, interval_secs: u64) {
        if interval_secs == 0 {
            info!("Background recalculation disabled");
            return;
        }

        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Background recalculation worker started (every {}s)",
            interval_secs
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.recalculate(RecalcScope::All).await {
                        Ok(report) => debug!(
                            "Background run {} finished: {} calculated, {} unchanged",
                            report.run_id, report.calculated, report.unchanged
                        ),
                        Err(ServiceError::RecalculationBusy) => {
                            debug!("Background run skipped; another run is in flight")
                        }
                        Err(e) => error!("Background recalculation failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Background recalculation worker stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn run(&self, scope: RecalcScope) -> Result<RunReport, ServiceError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let started_at = Utc::now();
        RECALC_RUNS.inc();

        let (pending_items, pending_full) = self.drain_pending();
        let full = matches!(scope, RecalcScope::All) || pending_full;

        let item_ids = match self.resolve_scope(scope, &pending_items, full).await {
            Ok(ids) => ids,
            Err(e) => {
                // scope discovery failed; put the queued work back
                self.queue_items(pending_items);
                if full {
                    self.pending_full.store(true, Ordering::SeqCst);
                }
                error!("Run {} aborted during scope discovery: {}", run_id, e);
                return Err(e);
            }
        };

        info!(
            "Recalculation run {} covering {} item(s)",
            run_id,
            item_ids.len()
        );
        let today = started_at.date_naive();
        let mut report = RunReport::new(run_id);

        for item_id in item_ids {
            if *self.shutdown.borrow() {
                warn!("Shutdown requested; aborting recalculation run {}", run_id);
                break;
            }
            if let Err(e) = self
                .recalculate_item(item_id, run_id, today, &mut report)
                .await
            {
                error!("Item {} failed in run {}: {}", item_id, run_id, e);
                REQUIREMENTS_SKIPPED.with_label_values(&["error"]).inc();
                report.skipped += 1;
            }
        }

        *self
            .last_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(started_at);

        info!(
            "Recalculation run {} finished in {:?}: {} calculated, {} unchanged, {} skipped, {} conflicts, {} invariant violations",
            run_id,
            started.elapsed(),
            report.calculated,
            report.unchanged,
            report.skipped,
            report.conflicts,
            report.invariant_violations
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::RecalculationCompleted {
                    run_id,
                    calculated: report.calculated,
                    unchanged: report.unchanged,
                    skipped: report.skipped,
                    conflicts: report.conflicts,
                    invariant_violations: report.invariant_violations,
                })
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok(report)
    }

    async fn resolve_scope(
        &self,
        scope: RecalcScope,
        pending: &[Uuid],
        full: bool,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let mut set: HashSet<Uuid> = pending.iter().copied().collect();
        if let RecalcScope::Items(items) = scope {
            set.extend(items);
        }
        if full {
            set.extend(self.demand.demand_item_ids().await?);
            set.extend(self.requirements.item_ids_with_requirements().await?);
        }

        let mut ids: Vec<Uuid> = set.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn recalculate_item(
        &self,
        item_id: Uuid,
        run_id: Uuid,
        today: NaiveDate,
        report: &mut RunReport,
    ) -> Result<(), ServiceError> {
        let (lines, positions, open_lines, catalog) = match self.read_views(item_id).await {
            Ok(views) => views,
            Err(ServiceError::UpstreamUnavailable(reason)) => {
                warn!("Skipping item {} in run {}: {}", item_id, run_id, reason);
                self.requirements.mark_stale(item_id, run_id).await?;
                REQUIREMENTS_SKIPPED
                    .with_label_values(&["upstream_unavailable"])
                    .inc();
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let aggregates = aggregator::aggregate_item(&lines, &positions, &open_lines);
        let existing = self.requirements.rows_for_item(item_id).await?;
        let open_links: HashSet<Uuid> =
            open_lines.iter().filter_map(|l| l.requirement_id).collect();

        let ctx = ScopeContext {
            item_id,
            open_links: &open_links,
            catalog: catalog.as_ref(),
            today,
            run_id,
        };

        let mut by_scope: HashMap<RequirementScope, material_requirement::Model> =
            existing.into_iter().map(|r| (r.scope(), r)).collect();

        for aggregate in aggregates {
            let stored = by_scope.remove(&aggregate.scope);
            self.reconcile_scope(&ctx, aggregate, stored, report).await?;
        }

        // Rows whose scope no longer has demand get re-evaluated against
        // zero demand; stock and open supply are still real.
        if !by_scope.is_empty() {
            let available = aggregator::total_available(&positions);
            let reserved = aggregator::total_reserved(&positions);
            let in_order = aggregator::total_in_order(&open_lines);
            for current in by_scope.into_values() {
                let aggregate = ScopeAggregate {
                    scope: current.scope(),
                    total_required: Decimal::ZERO,
                    total_available: available,
                    total_reserved: reserved,
                    total_in_order: in_order,
                    to_order: Decimal::ZERO,
                    earliest_required_by: None,
                    source_item_id: None,
                };
                self.reconcile_scope(&ctx, aggregate, Some(current), report)
                    .await?;
            }
        }

        Ok(())
    }

    async fn read_views(
        &self,
        item_id: Uuid,
    ) -> Result<
        (
            Vec<crate::services::demand::DemandLine>,
            Vec<crate::services::inventory::StockPosition>,
            Vec<crate::services::order_ledger::OpenOrderLine>,
            Option<ItemSummary>,
        ),
        ServiceError,
    > {
        let lines = self.demand.demand_lines(item_id).await?;
        let positions = self.inventory.stock_positions(item_id).await?;
        let open_lines = self.orders.open_lines(item_id).await?;
        let catalog = self.catalog.item_summary(item_id).await?;
        Ok((lines, positions, open_lines, catalog))
    }

    async fn reconcile_scope(
        &self,
        ctx: &ScopeContext<'_>,
        aggregate: ScopeAggregate,
        stored: Option<material_requirement::Model>,
        report: &mut RunReport,
    ) -> Result<(), ServiceError> {
        let estimate =
            depletion::estimate(aggregate.to_order, aggregate.earliest_required_by, ctx.today);
        let has_open_link = stored
            .as_ref()
            .map_or(false, |r| ctx.open_links.contains(&r.id));
        let classification = classifier::classify(
            stored.as_ref().map(StoredSnapshot::from),
            &aggregate,
            &estimate,
            has_open_link,
            ctx.today,
        );

        let computed =
            match build_computed(ctx, &aggregate, stored.as_ref(), classification, &estimate) {
                Some(computed) => computed,
                None => {
                    warn!(
                        "No catalog entry for item {}; cannot create requirement row",
                        ctx.item_id
                    );
                    REQUIREMENTS_SKIPPED
                        .with_label_values(&["catalog_missing"])
                        .inc();
                    report.skipped += 1;
                    return Ok(());
                }
            };

        if let Err(e) = check_invariants(&computed) {
            error!("Run {}: {}", ctx.run_id, e);
            REQUIREMENT_INVARIANT_VIOLATIONS.inc();
            report.invariant_violations += 1;
            return Ok(());
        }

        match stored {
            None => {
                let row = self.requirements.insert_computed(&computed, ctx.run_id).await?;
                report.calculated += 1;
                REQUIREMENTS_CALCULATED.inc();
                self.notify_recalculated(row.id, ctx.item_id).await?;
            }
            Some(current) => {
                if !materially_changed(&current, &computed) {
                    report.unchanged += 1;
                    REQUIREMENTS_UNCHANGED.inc();
                    return Ok(());
                }
                match self
                    .requirements
                    .apply_computed(&current, &computed, ctx.run_id)
                    .await
                {
                    Ok(()) => {
                        report.calculated += 1;
                        REQUIREMENTS_CALCULATED.inc();
                        self.notify_recalculated(current.id, ctx.item_id).await?;
                    }
                    Err(ServiceError::ConcurrentModification(_)) => {
                        REQUIREMENT_CONFLICTS.inc();
                        match self.retry_scope(ctx, &aggregate, &estimate, current.id).await? {
                            RetryOutcome::Written => {
                                report.calculated += 1;
                                REQUIREMENTS_CALCULATED.inc();
                                self.notify_recalculated(current.id, ctx.item_id).await?;
                            }
                            RetryOutcome::Unchanged => {
                                report.unchanged += 1;
                                REQUIREMENTS_UNCHANGED.inc();
                            }
                            RetryOutcome::Lost => {
                                warn!(
                                    "Requirement {} lost its version race twice in run {}",
                                    current.id, ctx.run_id
                                );
                                report.conflicts += 1;
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    /// One in-run retry after a version conflict: reload the row, refresh
    /// the link state, re-classify and try the commit once more.
    async fn retry_scope(
        &self,
        ctx: &ScopeContext<'_>,
        aggregate: &ScopeAggregate,
        estimate: &DepletionEstimate,
        row_id: Uuid,
    ) -> Result<RetryOutcome, ServiceError> {
        let current = match self.requirements.find(row_id).await? {
            Some(row) => row,
            // deleted under us; nothing left to write
            None => return Ok(RetryOutcome::Lost),
        };

        let has_open_link = !self
            .orders
            .open_lines_for_requirement(row_id)
            .await?
            .is_empty();
        let classification = classifier::classify(
            Some(StoredSnapshot::from(&current)),
            aggregate,
            estimate,
            has_open_link,
            ctx.today,
        );
        let computed =
            match build_computed(ctx, aggregate, Some(&current), classification, estimate) {
                Some(computed) => computed,
                None => return Ok(RetryOutcome::Lost),
            };
        check_invariants(&computed)?;

        if !materially_changed(&current, &computed) {
            return Ok(RetryOutcome::Unchanged);
        }
        match self
            .requirements
            .apply_computed(&current, &computed, ctx.run_id)
            .await
        {
            Ok(()) => Ok(RetryOutcome::Written),
            Err(ServiceError::ConcurrentModification(_)) => Ok(RetryOutcome::Lost),
            Err(e) => Err(e),
        }
    }

    async fn notify_recalculated(
        &self,
        requirement_id: Uuid,
        nomenclature_item_id: Uuid,
    ) -> Result<(), ServiceError> {
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::RequirementRecalculated {
                    requirement_id,
                    nomenclature_item_id,
                })
                .await
                .map_err(ServiceError::EventError)?;
        }
        Ok(())
    }
}

/// Descriptive fields come from the catalog when it answered, else from the
/// stored row. A brand-new scope without a catalog entry cannot be created.
fn build_computed(
    ctx: &ScopeContext<'_>,
    aggregate: &ScopeAggregate,
    stored: Option<&material_requirement::Model>,
    classification: Classification,
    estimate: &DepletionEstimate,
) -> Option<ComputedRequirement> {
    let (item_code, item_name, category, unit) = match (ctx.catalog, stored) {
        (Some(item), _) => (
            item.item_code.clone(),
            item.name.clone(),
            item.category.clone(),
            item.unit.clone(),
        ),
        (None, Some(row)) => (
            row.item_code.clone(),
            row.item_name.clone(),
            row.category.clone(),
            row.unit.clone(),
        ),
        (None, None) => return None,
    };

    Some(ComputedRequirement {
        nomenclature_item_id: ctx.item_id,
        scope: aggregate.scope,
        item_code,
        item_name,
        category,
        unit,
        total_required: aggregate.total_required,
        total_available: aggregate.total_available,
        total_reserved: aggregate.total_reserved,
        total_in_order: aggregate.total_in_order,
        to_order: aggregate.to_order,
        status: classification.status,
        priority: classification.priority,
        days_until_depletion: estimate.days_until_depletion,
        order_by_date: estimate.order_by_date,
        source_item_id: aggregate.source_item_id,
    })
}
