//! 领奖引擎依赖的事务型存储接口

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{
    ClaimStatus, claim_record_entity as records, prize_entity as prizes, store_entity as stores,
};
use crate::error::{AppError, AppResult};
use crate::models::{Identity, IdentityField, IdentityKey, PaginationParams, PrizeSnapshot};

/// 台账匹配条件
///
/// 按 key 字段精确匹配；exclude_rows_with 中任一字段在记录上非空时，该记录不参与匹配
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMatcher {
    pub key: IdentityKey,
    pub exclude_rows_with: Vec<IdentityField>,
}

impl ClaimMatcher {
    pub fn matches(&self, campaign_id: &str, record: &records::Model) -> bool {
        record.campaign_id == campaign_id
            && record.identity_value(self.key.field) == Some(self.key.value.as_str())
            && self
                .exclude_rows_with
                .iter()
                .all(|f| record.identity_value(*f).is_none())
    }
}

/// 待写入的台账记录
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub claim_code: Uuid,
    pub campaign_id: String,
    pub store_id: Option<i64>,
    pub prize: Option<PrizeSnapshot>,
    pub identity: Identity,
    pub dedup_key: String,
    pub claim_seq: i32,
    pub status: ClaimStatus,
}

/// 非事务读取 + 开启事务
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn find_store(&self, store_id: i64) -> AppResult<Option<stores::Model>>;

    async fn find_prize(&self, prize_id: i64) -> AppResult<Option<prizes::Model>>;

    /// 门店内 available_stock > 0 的奖品
    async fn list_available_prizes(&self, store_id: i64) -> AppResult<Vec<prizes::Model>>;

    /// 匹配的台账记录，按创建顺序升序
    async fn find_matching_claims(
        &self,
        campaign_id: &str,
        matcher: &ClaimMatcher,
    ) -> AppResult<Vec<records::Model>>;

    /// 活动台账分页 (新 -> 旧)，返回 (当前页, 总数)
    async fn list_claims(
        &self,
        campaign_id: &str,
        params: PaginationParams,
    ) -> AppResult<(Vec<records::Model>, u64)>;

    async fn begin(&self) -> AppResult<Box<dyn ClaimTx>>;

    /// 门店存在、启用且 (指定活动时) 属于该活动
    async fn find_active_store(
        &self,
        store_id: i64,
        campaign_id: Option<&str>,
    ) -> AppResult<stores::Model> {
        let store = self
            .find_store(store_id)
            .await?
            .filter(|s| campaign_id.is_none_or(|c| s.campaign_id == c))
            .ok_or_else(|| AppError::NotFound(format!("Store {store_id} not found")))?;
        if !store.is_active {
            return Err(AppError::ValidationError(format!(
                "Store {store_id} is not active"
            )));
        }
        Ok(store)
    }
}

/// 领奖事务
///
/// 未提交即丢弃时必须等同于回滚
#[async_trait]
pub trait ClaimTx: Send {
    /// 以排他行锁读取奖品，仅当 available_stock > 0 时返回
    async fn lock_available_prize(&mut self, prize_id: i64) -> AppResult<Option<prizes::Model>>;

    /// available_stock 减 1
    async fn decrement_stock(&mut self, prize_id: i64) -> AppResult<()>;

    async fn find_matching_claims(
        &mut self,
        campaign_id: &str,
        matcher: &ClaimMatcher,
    ) -> AppResult<Vec<records::Model>>;

    /// 同一去重键已有的记录数
    async fn count_by_dedup_key(&mut self, campaign_id: &str, dedup_key: &str) -> AppResult<i64>;

    /// 写入台账；去重唯一约束冲突返回 DuplicateIdentity
    async fn insert_claim(&mut self, claim: NewClaim) -> AppResult<records::Model>;

    async fn commit(self: Box<Self>) -> AppResult<()>;

    async fn rollback(self: Box<Self>) -> AppResult<()>;
}
