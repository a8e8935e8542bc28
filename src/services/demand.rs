use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    entities::project_demand_line::{self, Entity as ProjectDemandLineEntity},
    errors::ServiceError,
};

/// One outstanding purchasable quantity contributed by one project item.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandLine {
    pub id: Uuid,
    pub nomenclature_item_id: Uuid,
    pub project_id: Uuid,
    pub quantity: Decimal,
    pub required_by: Option<NaiveDate>,
    pub responsible_id: Option<Uuid>,
    pub by_contractor: bool,
    pub planning_stage: bool,
}

impl DemandLine {
    /// Lines bought by the contractor or still at planning stage exist in the
    /// source but never count towards aggregated demand.
    pub fn counted(&self) -> bool {
        !self.by_contractor && !self.planning_stage
    }
}

impl From<project_demand_line::Model> for DemandLine {
    fn from(model: project_demand_line::Model) -> Self {
        Self {
            id: model.id,
            nomenclature_item_id: model.nomenclature_item_id,
            project_id: model.project_id,
            quantity: model.quantity,
            required_by: model.required_by,
            responsible_id: model.responsible_id,
            by_contractor: model.by_contractor,
            planning_stage: model.planning_stage,
        }
    }
}

/// Read-only view over project demand. Failures surface as
/// `UpstreamUnavailable` so the coordinator can mark affected rows stale
/// instead of failing the whole run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DemandSource: Send + Sync {
    /// All demand lines for one item, counted or not.
    async fn demand_lines(&self, item_id: Uuid) -> Result<Vec<DemandLine>, ServiceError>;

    /// Distinct item ids that currently appear in any demand line.
    async fn demand_item_ids(&self) -> Result<Vec<Uuid>, ServiceError>;

    /// Distinct item ids whose demand lines changed since the given moment.
    async fn changed_item_ids(&self, since: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError>;
}

/// Demand source backed by the local projection of project demand lines.
#[derive(Clone)]
pub struct SqlDemandSource {
    db: Arc<DatabaseConnection>,
}

impl SqlDemandSource {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DemandSource for SqlDemandSource {
    #[instrument(skip(self))]
    async fn demand_lines(&self, item_id: Uuid) -> Result<Vec<DemandLine>, ServiceError> {
        let lines = ProjectDemandLineEntity::find()
            .filter(project_demand_line::Column::NomenclatureItemId.eq(item_id))
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to read demand lines for item {}: {}", item_id, e);
                ServiceError::UpstreamUnavailable(format!("demand source: {}", e))
            })?;

        Ok(lines.into_iter().map(DemandLine::from).collect())
    }

    #[instrument(skip(self))]
    async fn demand_item_ids(&self) -> Result<Vec<Uuid>, ServiceError> {
        let ids: Vec<Uuid> = ProjectDemandLineEntity::find()
            .select_only()
            .column(project_demand_line::Column::NomenclatureItemId)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list demand item ids: {}", e);
                ServiceError::UpstreamUnavailable(format!("demand source: {}", e))
            })?;

        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn changed_item_ids(&self, since: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        let ids: Vec<Uuid> = ProjectDemandLineEntity::find()
            .select_only()
            .column(project_demand_line::Column::NomenclatureItemId)
            .filter(project_demand_line::Column::UpdatedAt.gte(since))
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list changed demand item ids: {}", e);
                ServiceError::UpstreamUnavailable(format!("demand source: {}", e))
            })?;

        Ok(ids)
    }
}
