use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{IdentityField, PaginatedResponse};
use crate::entities::{ClaimStatus, claim_record_entity as records, prize_entity as prizes};

/// 已有领取记录摘要 (重复参与时返回)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClaimSummary {
    /// 首次登记时的姓名
    pub display_name: Option<String>,
    /// 曾经获得的奖品名称
    pub prize_name: Option<String>,
    /// 该身份在活动内的领取次数
    pub claim_count: i64,
}

/// 资格检查结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EligibilityResult {
    pub eligible: bool,
    /// 用于匹配的身份字段
    pub matched_on: IdentityField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<ClaimSummary>,
}

/// 可抽取的奖品快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrizeSnapshot {
    pub id: i64,
    pub name: String,
    pub available_stock: i64,
}

impl From<prizes::Model> for PrizeSnapshot {
    fn from(m: prizes::Model) -> Self {
        PrizeSnapshot {
            id: m.id,
            name: m.name,
            available_stock: m.available_stock,
        }
    }
}

/// 领奖成功结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AllocationResult {
    /// 获得的奖品 (available_stock 为扣减后的剩余库存)
    pub prize: PrizeSnapshot,
    /// 台账记录ID
    pub claim_id: i64,
    /// 领奖凭证号
    pub claim_code: Uuid,
}

/// 台账记录响应
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClaimRecordResponse {
    pub id: i64,
    pub claim_code: Uuid,
    pub campaign_id: String,
    pub store_id: Option<i64>,
    pub prize_id: Option<i64>,
    pub prize_name: Option<String>,
    pub display_name: Option<String>,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

impl From<records::Model> for ClaimRecordResponse {
    fn from(m: records::Model) -> Self {
        ClaimRecordResponse {
            id: m.id,
            claim_code: m.claim_code,
            campaign_id: m.campaign_id,
            store_id: m.store_id,
            prize_id: m.prize_id,
            prize_name: m.prize_name,
            display_name: m.display_name,
            status: m.status,
            created_at: m.created_at.unwrap_or_else(Utc::now),
        }
    }
}

/// 台账查询参数
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ClaimRecordQuery {
    /// 页码 (默认 1)
    pub page: Option<u32>,
    /// 每页数量 (默认 20)
    pub per_page: Option<u32>,
}

/// 台账分页响应
pub type ClaimRecordPageResponse = PaginatedResponse<ClaimRecordResponse>;
