use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

/// Claim Records (领奖台账)
#[derive(DeriveIden)]
enum ClaimRecords {
    Table,
    Id,
    ClaimCode,
    CampaignId,
    StoreId,
    PrizeId,
    PrizeName,
    NationalId,
    PhoneNumber,
    VoucherNumber,
    DisplayName,
    DedupKey,
    ClaimSeq,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Stores {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Prizes {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// 台账只追加不修改:
/// - (campaign_id, dedup_key, claim_seq) 唯一，防止同一身份并发重复领取
/// - 同一活动内券号唯一
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("claim_status"))
                    .values(vec![Alias::new("claimed"), Alias::new("registered")])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClaimRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClaimRecords::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClaimRecords::ClaimCode)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ClaimRecords::CampaignId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClaimRecords::StoreId).big_integer().null())
                    .col(ColumnDef::new(ClaimRecords::PrizeId).big_integer().null())
                    .col(ColumnDef::new(ClaimRecords::PrizeName).string_len(255).null())
                    .col(ColumnDef::new(ClaimRecords::NationalId).string_len(64).null())
                    .col(ColumnDef::new(ClaimRecords::PhoneNumber).string_len(32).null())
                    .col(
                        ColumnDef::new(ClaimRecords::VoucherNumber)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClaimRecords::DisplayName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClaimRecords::DedupKey)
                            .string_len(320)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClaimRecords::ClaimSeq).integer().not_null())
                    .col(
                        ColumnDef::new(ClaimRecords::Status)
                            .custom(Alias::new("claim_status"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClaimRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claim_records_store")
                            .from(ClaimRecords::Table, ClaimRecords::StoreId)
                            .to(Stores::Table, Stores::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claim_records_prize")
                            .from(ClaimRecords::Table, ClaimRecords::PrizeId)
                            .to(Prizes::Table, Prizes::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_claim_records_dedup_unique")
                    .table(ClaimRecords::Table)
                    .col(ClaimRecords::CampaignId)
                    .col(ClaimRecords::DedupKey)
                    .col(ClaimRecords::ClaimSeq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 身份字段查询索引
        for (name, col) in [
            ("idx_claim_records_national_id", ClaimRecords::NationalId),
            ("idx_claim_records_phone_number", ClaimRecords::PhoneNumber),
            ("idx_claim_records_display_name", ClaimRecords::DisplayName),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(ClaimRecords::Table)
                        .col(ClaimRecords::CampaignId)
                        .col(col)
                        .to_owned(),
                )
                .await?;
        }

        // 部分唯一索引与身份字段非空约束 (SchemaManager 不支持，直接执行 SQL)
        let conn = manager.get_connection();
        for sql in [
            r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_claim_records_voucher_unique
    ON claim_records (campaign_id, voucher_number)
    WHERE voucher_number IS NOT NULL
"#,
            r#"
ALTER TABLE claim_records
    ADD CONSTRAINT chk_claim_records_identity
    CHECK (national_id IS NOT NULL OR phone_number IS NOT NULL
           OR voucher_number IS NOT NULL OR display_name IS NOT NULL)
"#,
        ] {
            conn.execute(Statement::from_string(
                manager.get_database_backend(),
                sql.to_string(),
            ))
            .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(ClaimRecords::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_type(Type::drop().if_exists().name(Alias::new("claim_status")).to_owned())
            .await?;

        Ok(())
    }
}
