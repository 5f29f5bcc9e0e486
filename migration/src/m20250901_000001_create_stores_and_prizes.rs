use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

/// Stores (活动门店)
#[derive(DeriveIden)]
enum Stores {
    Table,
    Id,
    CampaignId,
    Name,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

/// Prizes (门店奖品与库存)
#[derive(DeriveIden)]
enum Prizes {
    Table,
    Id,
    StoreId,
    Name,
    InitialStock,
    AvailableStock,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 门店表
        manager
            .create_table(
                Table::create()
                    .table(Stores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Stores::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Stores::CampaignId).string_len(64).not_null())
                    .col(ColumnDef::new(Stores::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Stores::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Stores::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Stores::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stores_campaign")
                    .table(Stores::Table)
                    .col(Stores::CampaignId)
                    .to_owned(),
            )
            .await?;

        // 奖品表
        manager
            .create_table(
                Table::create()
                    .table(Prizes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Prizes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Prizes::StoreId).big_integer().not_null())
                    .col(ColumnDef::new(Prizes::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Prizes::InitialStock)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Prizes::AvailableStock)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Prizes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Prizes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prizes_store")
                            .from(Prizes::Table, Prizes::StoreId)
                            .to(Stores::Table, Stores::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_prizes_store")
                    .table(Prizes::Table)
                    .col(Prizes::StoreId)
                    .to_owned(),
            )
            .await?;

        // 库存永远在 [0, initial_stock] 之间
        let conn = manager.get_connection();
        conn.execute(Statement::from_string(
            manager.get_database_backend(),
            r#"
ALTER TABLE prizes
    ADD CONSTRAINT chk_prizes_stock_range
    CHECK (available_stock >= 0 AND available_stock <= initial_stock);
"#
            .to_string(),
        ))
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Prizes::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().if_exists().table(Stores::Table).to_owned())
            .await?;

        Ok(())
    }
}
