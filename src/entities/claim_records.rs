use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::IdentityField;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "claim_status")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// 已领取奖品
    #[sea_orm(string_value = "claimed")]
    Claimed,
    /// 仅登记参与，未抽奖
    #[sea_orm(string_value = "registered")]
    Registered,
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStatus::Claimed => write!(f, "CLAIMED"),
            ClaimStatus::Registered => write!(f, "REGISTERED"),
        }
    }
}

/// 领奖台账实体
/// 说明:
/// - 记录一旦写入不再修改或删除，是"该身份已参与"的永久凭证
/// - store_id / prize_id 在纯登记 (REGISTERED) 时为 NULL
/// - dedup_key = 最高优先级身份字段 "<field>:<value>"，claim_seq 为该身份在活动内的第几次领取
/// - (campaign_id, dedup_key, claim_seq) 唯一，并发的同一身份最多一条写入成功
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "claim_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 对外展示的领奖凭证号
    pub claim_code: Uuid,
    pub campaign_id: String,
    pub store_id: Option<i64>,
    pub prize_id: Option<i64>,
    /// 奖品名称 (历史快照)
    pub prize_name: Option<String>,
    pub national_id: Option<String>,
    pub phone_number: Option<String>,
    pub voucher_number: Option<String>,
    pub display_name: Option<String>,
    pub dedup_key: String,
    pub claim_seq: i32,
    pub status: ClaimStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl Model {
    /// 读取记录上的某个身份字段
    pub fn identity_value(&self, field: IdentityField) -> Option<&str> {
        match field {
            IdentityField::NationalId => self.national_id.as_deref(),
            IdentityField::PhoneNumber => self.phone_number.as_deref(),
            IdentityField::VoucherNumber => self.voucher_number.as_deref(),
            IdentityField::DisplayName => self.display_name.as_deref(),
        }
    }
}

impl Column {
    /// 身份字段对应的列
    pub fn for_identity(field: IdentityField) -> Self {
        match field {
            IdentityField::NationalId => Column::NationalId,
            IdentityField::PhoneNumber => Column::PhoneNumber,
            IdentityField::VoucherNumber => Column::VoucherNumber,
            IdentityField::DisplayName => Column::DisplayName,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::prizes::Entity",
        from = "Column::PrizeId",
        to = "super::prizes::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Prize,
}

impl Related<super::prizes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prize.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
