use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::material_requirement::{
    self, RequirementPriority, RequirementScope, RequirementStatus,
};
use crate::entities::purchase_order_line::{self, OrderLineStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Filters accepted by the requirement list endpoint.
#[derive(Debug, Clone, Default)]
pub struct RequirementFilter {
    pub status: Option<RequirementStatus>,
    pub priority: Option<RequirementPriority>,
    pub critical_only: bool,
    pub category: Option<String>,
    pub project_id: Option<Uuid>,
    pub search: Option<String>,
}

/// Dashboard counts across the whole requirement board.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequirementSummary {
    pub total_items: u64,
    pub critical_items: u64,
    pub high_priority_items: u64,
    /// Rows with something left to order.
    pub items_to_order: u64,
    pub stale_items: u64,
    pub status_breakdown: StatusBreakdown,
    pub priority_breakdown: PriorityBreakdown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StatusBreakdown {
    pub waiting_order: u64,
    pub in_order: u64,
    pub closed: u64,
    pub written_off: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PriorityBreakdown {
    pub low: u64,
    pub normal: u64,
    pub high: u64,
    pub critical: u64,
}

/// One recomputed `(item, scope)` result, ready to be written to its row.
/// Order links are not part of this; recalculation never touches them.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedRequirement {
    pub nomenclature_item_id: Uuid,
    pub scope: RequirementScope,
    pub item_code: String,
    pub item_name: String,
    pub category: Option<String>,
    pub unit: String,
    pub total_required: Decimal,
    pub total_available: Decimal,
    pub total_reserved: Decimal,
    pub total_in_order: Decimal,
    pub to_order: Decimal,
    pub status: RequirementStatus,
    pub priority: RequirementPriority,
    pub days_until_depletion: Option<i32>,
    pub order_by_date: Option<NaiveDate>,
    pub source_item_id: Option<Uuid>,
}

/// True when writing `computed` to the row would change anything a reader
/// can observe. Stale rows always count as changed so the flag clears.
pub fn materially_changed(
    current: &material_requirement::Model,
    computed: &ComputedRequirement,
) -> bool {
    current.stale
        || current.item_code != computed.item_code
        || current.item_name != computed.item_name
        || current.category != computed.category
        || current.unit != computed.unit
        || current.total_required != computed.total_required
        || current.total_available != computed.total_available
        || current.total_reserved != computed.total_reserved
        || current.total_in_order != computed.total_in_order
        || current.to_order != computed.to_order
        || current.status != computed.status
        || current.priority != computed.priority
        || current.days_until_depletion != computed.days_until_depletion
        || current.order_by_date != computed.order_by_date
        || current.source_item_id != computed.source_item_id
}

/// Optimistic update: the write only lands if the row still carries
/// `expected_version`. Zero rows affected means someone else won the race.
pub async fn commit_versioned<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    expected_version: i32,
    update: material_requirement::ActiveModel,
) -> Result<(), ServiceError> {
    let result = material_requirement::Entity::update_many()
        .set(update)
        .filter(material_requirement::Column::Id.eq(id))
        .filter(material_requirement::Column::Version.eq(expected_version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(id));
    }
    Ok(())
}

#[derive(FromQueryResult)]
struct StatusCount {
    status: RequirementStatus,
    count: i64,
}

#[derive(FromQueryResult)]
struct PriorityCount {
    priority: RequirementPriority,
    count: i64,
}

/// Read and write access to the requirement board itself. Recalculation,
/// ordering and the HTTP layer all go through this service so versioning
/// rules live in one place.
#[derive(Clone)]
pub struct RequirementService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl RequirementService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: RequirementFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<material_requirement::Model>, u64), ServiceError> {
        let mut query = material_requirement::Entity::find();

        if let Some(status) = filter.status {
            query = query.filter(material_requirement::Column::Status.eq(status));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(material_requirement::Column::Priority.eq(priority));
        }
        if filter.critical_only {
            query = query
                .filter(material_requirement::Column::Priority.eq(RequirementPriority::Critical));
        }
        if let Some(category) = &filter.category {
            query = query.filter(material_requirement::Column::Category.eq(category.clone()));
        }
        if let Some(project_id) = filter.project_id {
            query = query.filter(material_requirement::Column::ProjectId.eq(project_id));
        }
        if let Some(search) = &filter.search {
            query = query.filter(
                Condition::any()
                    .add(material_requirement::Column::ItemCode.contains(search))
                    .add(material_requirement::Column::ItemName.contains(search)),
            );
        }

        let paginator = query
            .order_by_asc(material_requirement::Column::ItemCode)
            .order_by_asc(material_requirement::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((rows, total))
    }

    pub async fn find(
        &self,
        id: Uuid,
    ) -> Result<Option<material_requirement::Model>, ServiceError> {
        Ok(material_requirement::Entity::find_by_id(id)
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<material_requirement::Model, ServiceError> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Requirement {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<RequirementSummary, ServiceError> {
        let status_counts = material_requirement::Entity::find()
            .select_only()
            .column(material_requirement::Column::Status)
            .column_as(material_requirement::Column::Id.count(), "count")
            .group_by(material_requirement::Column::Status)
            .into_model::<StatusCount>()
            .all(&*self.db)
            .await?;

        let priority_counts = material_requirement::Entity::find()
            .select_only()
            .column(material_requirement::Column::Priority)
            .column_as(material_requirement::Column::Id.count(), "count")
            .group_by(material_requirement::Column::Priority)
            .into_model::<PriorityCount>()
            .all(&*self.db)
            .await?;

        let stale_items = material_requirement::Entity::find()
            .filter(material_requirement::Column::Stale.eq(true))
            .count(&*self.db)
            .await?;
        let items_to_order = material_requirement::Entity::find()
            .filter(material_requirement::Column::ToOrder.gt(Decimal::ZERO))
            .count(&*self.db)
            .await?;

        let mut status_breakdown = StatusBreakdown::default();
        let mut total_items = 0;
        for entry in status_counts {
            let count = entry.count as u64;
            total_items += count;
            match entry.status {
                RequirementStatus::WaitingOrder => status_breakdown.waiting_order = count,
                RequirementStatus::InOrder => status_breakdown.in_order = count,
                RequirementStatus::Closed => status_breakdown.closed = count,
                RequirementStatus::WrittenOff => status_breakdown.written_off = count,
            }
        }

        let mut priority_breakdown = PriorityBreakdown::default();
        for entry in priority_counts {
            let count = entry.count as u64;
            match entry.priority {
                RequirementPriority::Low => priority_breakdown.low = count,
                RequirementPriority::Normal => priority_breakdown.normal = count,
                RequirementPriority::High => priority_breakdown.high = count,
                RequirementPriority::Critical => priority_breakdown.critical = count,
            }
        }

        Ok(RequirementSummary {
            total_items,
            critical_items: priority_breakdown.critical,
            high_priority_items: priority_breakdown.high,
            items_to_order,
            stale_items,
            status_breakdown,
            priority_breakdown,
        })
    }

    /// All requirement rows of one item, every scope included.
    pub async fn rows_for_item(
        &self,
        item_id: Uuid,
    ) -> Result<Vec<material_requirement::Model>, ServiceError> {
        Ok(material_requirement::Entity::find()
            .filter(material_requirement::Column::NomenclatureItemId.eq(item_id))
            .all(&*self.db)
            .await?)
    }

    /// Distinct item ids that already have requirement rows. A full
    /// recalculation unions these with the demand side so rows whose demand
    /// disappeared still get re-evaluated.
    pub async fn item_ids_with_requirements(&self) -> Result<Vec<Uuid>, ServiceError> {
        Ok(material_requirement::Entity::find()
            .select_only()
            .column(material_requirement::Column::NomenclatureItemId)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await?)
    }

    pub async fn insert_computed(
        &self,
        computed: &ComputedRequirement,
        run_id: Uuid,
    ) -> Result<material_requirement::Model, ServiceError> {
        let now = Utc::now();
        let row = material_requirement::ActiveModel {
            id: Set(Uuid::new_v4()),
            nomenclature_item_id: Set(computed.nomenclature_item_id),
            project_id: Set(computed.scope.project_id()),
            item_code: Set(computed.item_code.clone()),
            item_name: Set(computed.item_name.clone()),
            category: Set(computed.category.clone()),
            unit: Set(computed.unit.clone()),
            total_required: Set(computed.total_required),
            total_available: Set(computed.total_available),
            total_reserved: Set(computed.total_reserved),
            total_in_order: Set(computed.total_in_order),
            to_order: Set(computed.to_order),
            status: Set(computed.status),
            priority: Set(computed.priority),
            days_until_depletion: Set(computed.days_until_depletion),
            order_by_date: Set(computed.order_by_date),
            delivery_date: Set(None),
            supplier_id: Set(None),
            purchase_order_id: Set(None),
            source_item_id: Set(computed.source_item_id),
            stale: Set(false),
            last_run_id: Set(Some(run_id)),
            recalculated_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };

        row.insert(&*self.db).await.map_err(|e| {
            error!("Failed to insert requirement row: {}", e);
            ServiceError::DatabaseError(e)
        })
    }

    /// Writes a recompute result over an existing row. Order links are left
    /// alone. Fails with a conflict if the row moved since it was read.
    pub async fn apply_computed(
        &self,
        current: &material_requirement::Model,
        computed: &ComputedRequirement,
        run_id: Uuid,
    ) -> Result<(), ServiceError> {
        let update = material_requirement::ActiveModel {
            item_code: Set(computed.item_code.clone()),
            item_name: Set(computed.item_name.clone()),
            category: Set(computed.category.clone()),
            unit: Set(computed.unit.clone()),
            total_required: Set(computed.total_required),
            total_available: Set(computed.total_available),
            total_reserved: Set(computed.total_reserved),
            total_in_order: Set(computed.total_in_order),
            to_order: Set(computed.to_order),
            status: Set(computed.status),
            priority: Set(computed.priority),
            days_until_depletion: Set(computed.days_until_depletion),
            order_by_date: Set(computed.order_by_date),
            source_item_id: Set(computed.source_item_id),
            stale: Set(false),
            last_run_id: Set(Some(run_id)),
            recalculated_at: Set(Some(Utc::now())),
            updated_at: Set(Utc::now()),
            version: Set(current.version + 1),
            ..Default::default()
        };

        commit_versioned(&*self.db, current.id, current.version, update).await
    }

    /// Flags every row of an item as possibly outdated. Used when an
    /// upstream view fails mid-run so readers know the numbers are old.
    /// Does not bump versions; the next successful recompute clears it.
    pub async fn mark_stale(&self, item_id: Uuid, run_id: Uuid) -> Result<u64, ServiceError> {
        let update = material_requirement::ActiveModel {
            stale: Set(true),
            last_run_id: Set(Some(run_id)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        let result = material_requirement::Entity::update_many()
            .set(update)
            .filter(material_requirement::Column::NomenclatureItemId.eq(item_id))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let row = self.get(id).await?;
        if !row.deletable_status() {
            return Err(ServiceError::ValidationError(format!(
                "Requirement {} is {} and cannot be deleted",
                id, row.status
            )));
        }

        let open_links = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::RequirementId.eq(id))
            .filter(purchase_order_line::Column::Status.eq(OrderLineStatus::Open))
            .count(&*self.db)
            .await?;
        if open_links > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Requirement {} still has {} open order line(s)",
                id, open_links
            )));
        }

        let result = material_requirement::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Requirement {} not found",
                id
            )));
        }

        info!("Deleted requirement {}", id);
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::RequirementDeleted(id))
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn write_off(
        &self,
        id: Uuid,
    ) -> Result<material_requirement::Model, ServiceError> {
        let mut row = self.get(id).await?;
        let expected_version = row.version;
        row.write_off()?;

        let update = material_requirement::ActiveModel {
            status: Set(row.status),
            updated_at: Set(row.updated_at),
            version: Set(row.version),
            ..Default::default()
        };
        commit_versioned(&*self.db, id, expected_version, update).await?;

        info!("Wrote off requirement {}", id);
        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::RequirementWrittenOff(id))
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok(row)
    }
}
