use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_material_requirements_table::Migration),
            Box::new(m20240301_000002_create_demand_and_stock_tables::Migration),
            Box::new(m20240301_000003_create_purchase_order_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_material_requirements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_material_requirements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create material_requirements table aligned with entities::material_requirement Model
            manager
                .create_table(
                    Table::create()
                        .table(MaterialRequirements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MaterialRequirements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::NomenclatureItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MaterialRequirements::ProjectId).uuid().null())
                        .col(
                            ColumnDef::new(MaterialRequirements::ItemCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::ItemName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MaterialRequirements::Category).string().null())
                        .col(ColumnDef::new(MaterialRequirements::Unit).string().not_null())
                        .col(
                            ColumnDef::new(MaterialRequirements::TotalRequired)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::TotalAvailable)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::TotalReserved)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::TotalInOrder)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::ToOrder)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::Priority)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::DaysUntilDepletion)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::OrderByDate)
                                .date()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::DeliveryDate)
                                .date()
                                .null(),
                        )
                        .col(ColumnDef::new(MaterialRequirements::SupplierId).uuid().null())
                        .col(
                            ColumnDef::new(MaterialRequirements::PurchaseOrderId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::SourceItemId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::Stale)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(MaterialRequirements::LastRunId).uuid().null())
                        .col(
                            ColumnDef::new(MaterialRequirements::RecalculatedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialRequirements::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            // Useful indexes
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_requirements_item")
                        .table(MaterialRequirements::Table)
                        .col(MaterialRequirements::NomenclatureItemId)
                        .to_owned(),
                )
                .await?;

            // Logical key (item, scope); uniqueness of the null-project row is
            // enforced by the store, not the database.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_requirements_item_scope")
                        .table(MaterialRequirements::Table)
                        .col(MaterialRequirements::NomenclatureItemId)
                        .col(MaterialRequirements::ProjectId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_requirements_status")
                        .table(MaterialRequirements::Table)
                        .col(MaterialRequirements::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_requirements_priority")
                        .table(MaterialRequirements::Table)
                        .col(MaterialRequirements::Priority)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_requirements_purchase_order")
                        .table(MaterialRequirements::Table)
                        .col(MaterialRequirements::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MaterialRequirements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum MaterialRequirements {
        Table,
        Id,
        NomenclatureItemId,
        ProjectId,
        ItemCode,
        ItemName,
        Category,
        Unit,
        TotalRequired,
        TotalAvailable,
        TotalReserved,
        TotalInOrder,
        ToOrder,
        Status,
        Priority,
        DaysUntilDepletion,
        OrderByDate,
        DeliveryDate,
        SupplierId,
        PurchaseOrderId,
        SourceItemId,
        Stale,
        LastRunId,
        RecalculatedAt,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20240301_000002_create_demand_and_stock_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_demand_and_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Catalog projection, maintained by the upstream catalog sync
            manager
                .create_table(
                    Table::create()
                        .table(NomenclatureItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NomenclatureItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NomenclatureItems::ItemCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(NomenclatureItems::Name).string().not_null())
                        .col(ColumnDef::new(NomenclatureItems::Unit).string().not_null())
                        .col(ColumnDef::new(NomenclatureItems::Category).string().null())
                        .col(
                            ColumnDef::new(NomenclatureItems::Purchasable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(NomenclatureItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NomenclatureItems::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_nomenclature_items_item_code")
                        .table(NomenclatureItems::Table)
                        .col(NomenclatureItems::ItemCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Demand projection, one row per outstanding project item quantity
            manager
                .create_table(
                    Table::create()
                        .table(ProjectDemandLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectDemandLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::NomenclatureItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::ProjectId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::Quantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::RequiredBy)
                                .date()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::ResponsibleId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::ByContractor)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::PlanningStage)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectDemandLines::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_project_demand_lines_item")
                        .table(ProjectDemandLines::Table)
                        .col(ProjectDemandLines::NomenclatureItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_project_demand_lines_project")
                        .table(ProjectDemandLines::Table)
                        .col(ProjectDemandLines::ProjectId)
                        .to_owned(),
                )
                .await?;

            // Incremental sync scans by modification time
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_project_demand_lines_updated_at")
                        .table(ProjectDemandLines::Table)
                        .col(ProjectDemandLines::UpdatedAt)
                        .to_owned(),
                )
                .await?;

            // Warehouse stock projection
            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLevels::NomenclatureItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLevels::WarehouseId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLevels::OnHand)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::Reserved)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_levels_item_warehouse")
                        .table(StockLevels::Table)
                        .col(StockLevels::NomenclatureItemId)
                        .col(StockLevels::WarehouseId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProjectDemandLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(NomenclatureItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum NomenclatureItems {
        Table,
        Id,
        ItemCode,
        Name,
        Unit,
        Category,
        Purchasable,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ProjectDemandLines {
        Table,
        Id,
        NomenclatureItemId,
        ProjectId,
        Quantity,
        RequiredBy,
        ResponsibleId,
        ByContractor,
        PlanningStage,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum StockLevels {
        Table,
        Id,
        NomenclatureItemId,
        WarehouseId,
        OnHand,
        Reserved,
        UpdatedAt,
    }
}

mod m20240301_000003_create_purchase_order_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_purchase_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::OrderNumber)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::DeliveryDate).date().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_order_number")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::NomenclatureItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::RequirementId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Ordered)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Delivered)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderLines::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_lines_order")
                        .table(PurchaseOrderLines::Table)
                        .col(PurchaseOrderLines::PurchaseOrderId)
                        .to_owned(),
                )
                .await?;

            // Order ledger scans open lines per item
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_lines_item_status")
                        .table(PurchaseOrderLines::Table)
                        .col(PurchaseOrderLines::NomenclatureItemId)
                        .col(PurchaseOrderLines::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_lines_requirement")
                        .table(PurchaseOrderLines::Table)
                        .col(PurchaseOrderLines::RequirementId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrders {
        Table,
        Id,
        OrderNumber,
        SupplierId,
        Status,
        DeliveryDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrderLines {
        Table,
        Id,
        PurchaseOrderId,
        NomenclatureItemId,
        RequirementId,
        Ordered,
        Delivered,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    let result = Migrator::up(&db, None).await;

    match result {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
