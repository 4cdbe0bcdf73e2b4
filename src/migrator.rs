use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_orders_table::Migration),
            Box::new(m20240301_000003_create_order_lines_table::Migration),
            Box::new(m20240301_000004_create_supply_tables::Migration),
            Box::new(m20240301_000005_create_cart_items_table::Migration),
            Box::new(m20240315_000006_create_favorites_table::Migration),
        ]
    }
}

mod schema {
    use sea_orm_migration::prelude::*;

    pub fn uuid_pk<T: IntoIden>(col: T) -> ColumnDef {
        ColumnDef::new(col).uuid().primary_key().not_null().to_owned()
    }

    pub fn timestamp<T: IntoIden>(col: T) -> ColumnDef {
        ColumnDef::new(col)
            .timestamp_with_time_zone()
            .not_null()
            .to_owned()
    }

    pub async fn index<T, C>(
        manager: &SchemaManager<'_>,
        name: &str,
        table: T,
        col: C,
    ) -> Result<(), DbErr>
    where
        T: IntoTableRef,
        C: IntoIndexColumn,
    {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(name)
                    .table(table)
                    .col(col)
                    .to_owned(),
            )
            .await
    }
}

mod m20240301_000001_create_catalog_tables {
    use super::schema::{index, timestamp, uuid_pk};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(Categories::Id))
                        .col(ColumnDef::new(Categories::Name).string().not_null())
                        .col(ColumnDef::new(Categories::Description).string().null())
                        .col(
                            ColumnDef::new(Categories::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut timestamp(Categories::CreatedAt))
                        .col(&mut timestamp(Categories::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(Products::Id))
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).string().null())
                        .col(ColumnDef::new(Products::Price).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(ColumnDef::new(Products::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(&mut timestamp(Products::CreatedAt))
                        .col(&mut timestamp(Products::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_category_id")
                                .from(Products::Table, Products::CategoryId)
                                .to(Categories::Table, Categories::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_products_category_id",
                Products::Table,
                Products::CategoryId,
            )
            .await?;

            index(manager, "idx_products_name", Products::Table, Products::Name).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Categories {
        Table,
        Id,
        Name,
        Description,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Description,
        Price,
        Stock,
        CategoryId,
        ImageUrl,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_orders_table {
    use super::schema::{index, timestamp, uuid_pk};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(Orders::Id))
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::Total)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::PaymentMethod)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PaymentProof).string().null())
                        .col(ColumnDef::new(Orders::DeliveryAddress).string().not_null())
                        .col(ColumnDef::new(Orders::ContactPhone).string().not_null())
                        .col(ColumnDef::new(Orders::DeliveryDate).date().not_null())
                        .col(ColumnDef::new(Orders::DeliveryTime).time().not_null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(&mut timestamp(Orders::CreatedAt))
                        .col(&mut timestamp(Orders::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            index(manager, "idx_orders_user_id", Orders::Table, Orders::UserId).await?;

            index(manager, "idx_orders_status", Orders::Table, Orders::Status).await?;

            index(manager, "idx_orders_created_at", Orders::Table, Orders::CreatedAt).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        Status,
        Total,
        PaymentMethod,
        PaymentProof,
        DeliveryAddress,
        ContactPhone,
        DeliveryDate,
        DeliveryTime,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_order_lines_table {
    use super::m20240301_000001_create_catalog_tables::Products;
    use super::m20240301_000002_create_orders_table::Orders;
    use super::schema::{index, timestamp, uuid_pk};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_order_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(OrderLines::Id))
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderLines::UnitPrice).decimal_len(12, 2).not_null())
                        .col(&mut timestamp(OrderLines::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_product_id")
                                .from(OrderLines::Table, OrderLines::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_order_lines_order_id",
                OrderLines::Table,
                OrderLines::OrderId,
            )
            .await?;

            index(
                manager,
                "idx_order_lines_product_id",
                OrderLines::Table,
                OrderLines::ProductId,
            )
            .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductName,
        Quantity,
        UnitPrice,
        CreatedAt,
    }
}

mod m20240301_000004_create_supply_tables {
    use super::schema::{index, timestamp, uuid_pk};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_supply_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplyItems::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(SupplyItems::Id))
                        .col(ColumnDef::new(SupplyItems::Name).string().not_null())
                        .col(ColumnDef::new(SupplyItems::Description).string().null())
                        .col(
                            ColumnDef::new(SupplyItems::CurrentQuantity)
                                .decimal_len(12, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplyItems::MinimumQuantity)
                                .decimal_len(12, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplyItems::Unit)
                                .string_len(20)
                                .not_null()
                                .default("kg"),
                        )
                        .col(ColumnDef::new(SupplyItems::PurchasePrice).decimal_len(12, 2).null())
                        .col(ColumnDef::new(SupplyItems::Supplier).string().null())
                        .col(&mut timestamp(SupplyItems::CreatedAt))
                        .col(&mut timestamp(SupplyItems::UpdatedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryMovements::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(InventoryMovements::Id))
                        .col(
                            ColumnDef::new(InventoryMovements::SupplyItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::Direction)
                                .string_len(10)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::Quantity)
                                .decimal_len(12, 3)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryMovements::ResultingQuantity)
                                .decimal_len(12, 3)
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryMovements::Reason).string().not_null())
                        .col(ColumnDef::new(InventoryMovements::ActorId).uuid().not_null())
                        .col(&mut timestamp(InventoryMovements::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_movements_supply_item_id")
                                .from(InventoryMovements::Table, InventoryMovements::SupplyItemId)
                                .to(SupplyItems::Table, SupplyItems::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            index(
                manager,
                "idx_inventory_movements_supply_item_id",
                InventoryMovements::Table,
                InventoryMovements::SupplyItemId,
            )
            .await?;

            index(
                manager,
                "idx_inventory_movements_created_at",
                InventoryMovements::Table,
                InventoryMovements::CreatedAt,
            )
            .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SupplyItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SupplyItems {
        Table,
        Id,
        Name,
        Description,
        CurrentQuantity,
        MinimumQuantity,
        Unit,
        PurchasePrice,
        Supplier,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum InventoryMovements {
        Table,
        Id,
        SupplyItemId,
        Direction,
        Quantity,
        ResultingQuantity,
        Reason,
        ActorId,
        CreatedAt,
    }
}

mod m20240301_000005_create_cart_items_table {
    use super::m20240301_000001_create_catalog_tables::Products;
    use super::schema::{timestamp, uuid_pk};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_cart_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(CartItems::Id))
                        .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(&mut timestamp(CartItems::AddedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One row per (user, product)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_product")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .col(CartItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        ProductId,
        Quantity,
        AddedAt,
    }
}

mod m20240315_000006_create_favorites_table {
    use super::m20240301_000001_create_catalog_tables::Products;
    use super::schema::{timestamp, uuid_pk};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240315_000006_create_favorites_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Favorites::Table)
                        .if_not_exists()
                        .col(&mut uuid_pk(Favorites::Id))
                        .col(ColumnDef::new(Favorites::UserId).uuid().not_null())
                        .col(ColumnDef::new(Favorites::ProductId).uuid().not_null())
                        .col(&mut timestamp(Favorites::CreatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_favorites_product_id")
                                .from(Favorites::Table, Favorites::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_favorites_user_product")
                        .table(Favorites::Table)
                        .col(Favorites::UserId)
                        .col(Favorites::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Favorites::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Favorites {
        Table,
        Id,
        UserId,
        ProductId,
        CreatedAt,
    }
}
