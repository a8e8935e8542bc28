use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Procurement status of an aggregated material requirement.
///
/// `closed` and `written_off` are terminal for the classifier; `written_off`
/// is only ever set by an explicit external action and survives recomputes
/// until demand for the item reappears.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    #[sea_orm(string_value = "waiting_order")]
    WaitingOrder,

    #[sea_orm(string_value = "in_order")]
    InOrder,

    #[sea_orm(string_value = "closed")]
    Closed,

    #[sea_orm(string_value = "written_off")]
    WrittenOff,
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementStatus::WaitingOrder => write!(f, "waiting_order"),
            RequirementStatus::InOrder => write!(f, "in_order"),
            RequirementStatus::Closed => write!(f, "closed"),
            RequirementStatus::WrittenOff => write!(f, "written_off"),
        }
    }
}

/// Urgency band derived from depletion forecast and required-by dates.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum RequirementPriority {
    #[sea_orm(string_value = "low")]
    Low,

    #[sea_orm(string_value = "normal")]
    Normal,

    #[sea_orm(string_value = "high")]
    High,

    #[sea_orm(string_value = "critical")]
    Critical,
}

impl RequirementPriority {
    /// Numeric rank for ordering; higher means more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            RequirementPriority::Low => 0,
            RequirementPriority::Normal => 1,
            RequirementPriority::High => 2,
            RequirementPriority::Critical => 3,
        }
    }
}

impl fmt::Display for RequirementPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementPriority::Low => write!(f, "low"),
            RequirementPriority::Normal => write!(f, "normal"),
            RequirementPriority::High => write!(f, "high"),
            RequirementPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Aggregation scope of a requirement row.
///
/// The same nomenclature item may carry one org-wide rollup row and any
/// number of per-project rows at the same time; the scope is part of the
/// logical key `(nomenclature_item_id, scope)`. Stored as a nullable
/// `project_id` column, surfaced in code as a tagged variant so aggregation
/// never branches on a bare `Option`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequirementScope {
    Global,
    Project(Uuid),
}

impl RequirementScope {
    pub fn from_project_column(project_id: Option<Uuid>) -> Self {
        match project_id {
            Some(id) => RequirementScope::Project(id),
            None => RequirementScope::Global,
        }
    }

    pub fn project_id(&self) -> Option<Uuid> {
        match self {
            RequirementScope::Global => None,
            RequirementScope::Project(id) => Some(*id),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RequirementScope::Global)
    }
}

impl fmt::Display for RequirementScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementScope::Global => write!(f, "global"),
            RequirementScope::Project(id) => write!(f, "project:{}", id),
        }
    }
}

/// Aggregated material requirement row, one per `(item, scope)` pair.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate, ToSchema)]
#[sea_orm(table_name = "material_requirements")]
#[schema(as = MaterialRequirement)]
pub struct Model {
    #[sea_orm(primary_key, column_type = "Uuid")]
    pub id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub nomenclature_item_id: Uuid,

    /// Null for the org-wide rollup row, set for per-project rows.
    pub project_id: Option<Uuid>,

    #[validate(length(min = 1, max = 64, message = "item code must be 1-64 characters"))]
    pub item_code: String,

    #[validate(length(min = 1, max = 255, message = "item name must be 1-255 characters"))]
    pub item_name: String,

    pub category: Option<String>,

    pub unit: String,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_required: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_available: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_reserved: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_in_order: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub to_order: Decimal,

    pub status: RequirementStatus,

    pub priority: RequirementPriority,

    /// Days until stock runs out against the nearest demand date; null means
    /// no forecast (nothing to order, or no dated demand).
    pub days_until_depletion: Option<i32>,

    pub order_by_date: Option<NaiveDate>,

    pub delivery_date: Option<NaiveDate>,

    pub supplier_id: Option<Uuid>,

    pub purchase_order_id: Option<Uuid>,

    pub source_item_id: Option<Uuid>,

    /// Set when the last recompute could not reach an upstream view; the
    /// stored quantities may lag reality until the next successful run.
    pub stale: bool,

    pub last_run_id: Option<Uuid>,

    pub recalculated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::nomenclature_item::Entity",
        from = "Column::NomenclatureItemId",
        to = "super::nomenclature_item::Column::Id"
    )]
    NomenclatureItem,
}

impl Related<super::nomenclature_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NomenclatureItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn scope(&self) -> RequirementScope {
        RequirementScope::from_project_column(self.project_id)
    }

    /// True when an order may be created for this requirement right now.
    pub fn orderable(&self) -> bool {
        self.status == RequirementStatus::WaitingOrder
            && self.to_order > Decimal::ZERO
            && self.purchase_order_id.is_none()
    }

    /// True when the status alone permits deletion; the caller must still
    /// verify that no open order line references this requirement.
    pub fn deletable_status(&self) -> bool {
        matches!(
            self.status,
            RequirementStatus::WaitingOrder
                | RequirementStatus::Closed
                | RequirementStatus::WrittenOff
        )
    }

    /// Attaches a newly created purchase order and moves the requirement
    /// into `in_order`.
    pub fn link_to_order(
        &mut self,
        purchase_order_id: Uuid,
        supplier_id: Uuid,
        delivery_date: Option<NaiveDate>,
    ) -> Result<(), ValidationError> {
        if self.status != RequirementStatus::WaitingOrder {
            return Err(ValidationError::new(
                "requirement must be in waiting_order status to link an order",
            ));
        }
        if self.to_order <= Decimal::ZERO {
            return Err(ValidationError::new(
                "requirement has nothing left to order",
            ));
        }
        if self.purchase_order_id.is_some() {
            return Err(ValidationError::new(
                "requirement is already linked to a purchase order",
            ));
        }

        self.status = RequirementStatus::InOrder;
        self.purchase_order_id = Some(purchase_order_id);
        self.supplier_id = Some(supplier_id);
        self.delivery_date = delivery_date;
        self.updated_at = Utc::now();
        self.version += 1;

        Ok(())
    }

    /// Detaches a cancelled purchase order. An `in_order` requirement drops
    /// back to `waiting_order`; a written-off one keeps its status.
    pub fn release_order_link(&mut self) -> Result<(), ValidationError> {
        if self.purchase_order_id.is_none() {
            return Err(ValidationError::new(
                "requirement is not linked to a purchase order",
            ));
        }

        self.purchase_order_id = None;
        self.supplier_id = None;
        self.delivery_date = None;
        if self.status == RequirementStatus::InOrder {
            self.status = RequirementStatus::WaitingOrder;
        }
        self.updated_at = Utc::now();
        self.version += 1;

        Ok(())
    }

    /// Marks the requirement as no longer needed. Terminal until demand for
    /// the item reappears in a later recompute.
    pub fn write_off(&mut self) -> Result<(), ValidationError> {
        if self.status == RequirementStatus::WrittenOff {
            return Err(ValidationError::new("requirement is already written off"));
        }

        self.status = RequirementStatus::WrittenOff;
        self.updated_at = Utc::now();
        self.version += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn requirement(status: RequirementStatus, to_order: Decimal) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            nomenclature_item_id: Uuid::new_v4(),
            project_id: None,
            item_code: "ST-100".to_string(),
            item_name: "Steel angle 100x100".to_string(),
            category: Some("metal".to_string()),
            unit: "kg".to_string(),
            total_required: dec!(100),
            total_available: dec!(40),
            total_reserved: dec!(10),
            total_in_order: dec!(20),
            to_order,
            status,
            priority: RequirementPriority::Normal,
            days_until_depletion: Some(10),
            order_by_date: None,
            delivery_date: None,
            supplier_id: None,
            purchase_order_id: None,
            source_item_id: None,
            stale: false,
            last_run_id: None,
            recalculated_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn link_to_order_moves_waiting_requirement_to_in_order() {
        let mut req = requirement(RequirementStatus::WaitingOrder, dec!(40));
        let order_id = Uuid::new_v4();
        let supplier_id = Uuid::new_v4();

        req.link_to_order(order_id, supplier_id, None).unwrap();

        assert_eq!(req.status, RequirementStatus::InOrder);
        assert_eq!(req.purchase_order_id, Some(order_id));
        assert_eq!(req.supplier_id, Some(supplier_id));
        assert_eq!(req.version, 2);
    }

    #[test]
    fn link_to_order_rejects_non_waiting_status() {
        let mut req = requirement(RequirementStatus::Closed, dec!(40));
        let result = req.link_to_order(Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(result.is_err());
        assert_eq!(req.status, RequirementStatus::Closed);
        assert_eq!(req.version, 1);
    }

    #[test]
    fn link_to_order_rejects_zero_to_order() {
        let mut req = requirement(RequirementStatus::WaitingOrder, Decimal::ZERO);
        assert!(req.link_to_order(Uuid::new_v4(), Uuid::new_v4(), None).is_err());
    }

    #[test]
    fn release_order_link_reverts_to_waiting() {
        let mut req = requirement(RequirementStatus::WaitingOrder, dec!(40));
        req.link_to_order(Uuid::new_v4(), Uuid::new_v4(), None).unwrap();

        req.release_order_link().unwrap();

        assert_eq!(req.status, RequirementStatus::WaitingOrder);
        assert_eq!(req.purchase_order_id, None);
        assert_eq!(req.supplier_id, None);
        assert_eq!(req.version, 3);
    }

    #[test]
    fn release_order_link_keeps_written_off_status() {
        let mut req = requirement(RequirementStatus::WaitingOrder, dec!(40));
        req.link_to_order(Uuid::new_v4(), Uuid::new_v4(), None).unwrap();
        req.write_off().unwrap();

        req.release_order_link().unwrap();

        assert_eq!(req.status, RequirementStatus::WrittenOff);
        assert_eq!(req.purchase_order_id, None);
    }

    #[test]
    fn write_off_is_not_repeatable() {
        let mut req = requirement(RequirementStatus::WaitingOrder, dec!(40));
        req.write_off().unwrap();
        assert!(req.write_off().is_err());
        assert_eq!(req.version, 2);
    }

    #[test]
    fn deletable_status_excludes_in_order() {
        assert!(requirement(RequirementStatus::WaitingOrder, dec!(1)).deletable_status());
        assert!(requirement(RequirementStatus::Closed, dec!(0)).deletable_status());
        assert!(requirement(RequirementStatus::WrittenOff, dec!(0)).deletable_status());
        assert!(!requirement(RequirementStatus::InOrder, dec!(0)).deletable_status());
    }

    #[test]
    fn scope_round_trips_through_project_column() {
        let project = Uuid::new_v4();
        assert_eq!(
            RequirementScope::from_project_column(Some(project)),
            RequirementScope::Project(project)
        );
        assert_eq!(
            RequirementScope::from_project_column(None),
            RequirementScope::Global
        );
        assert_eq!(RequirementScope::Project(project).project_id(), Some(project));
        assert!(RequirementScope::Global.is_global());
    }
}
