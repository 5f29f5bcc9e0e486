use std::sync::Arc;
use uuid::Uuid;

use super::identity_policy::{IdentityPolicy, ResolvedIdentity};
use crate::database::{ClaimStore, ClaimTx, NewClaim};
use crate::entities::{ClaimStatus, claim_record_entity as records};
use crate::error::{AppError, AppResult};
use crate::models::{
    ClaimRecordPageResponse, ClaimRecordQuery, ClaimRecordResponse, ClaimSummary,
    EligibilityResult, Identity, PaginatedResponse, PaginationParams, PrizeSnapshot,
};

/// 身份台账: 领奖前判定资格，领奖后留存永久记录
#[derive(Clone)]
pub struct IdentityLedger {
    store: Arc<dyn ClaimStore>,
    policy: IdentityPolicy,
}

fn summarize(matches: &[records::Model]) -> Option<ClaimSummary> {
    let first = matches.first()?;
    Some(ClaimSummary {
        display_name: first.display_name.clone(),
        prize_name: matches.iter().rev().find_map(|m| m.prize_name.clone()),
        claim_count: matches.len() as i64,
    })
}

impl IdentityLedger {
    pub fn new(store: Arc<dyn ClaimStore>, policy: IdentityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    /// 检查身份在活动内是否还可以参与
    pub async fn check_eligibility(
        &self,
        campaign_id: &str,
        identity: &Identity,
    ) -> AppResult<EligibilityResult> {
        let resolved = self.policy.resolve(identity)?;
        self.check_resolved(campaign_id, &resolved).await
    }

    pub(crate) async fn check_resolved(
        &self,
        campaign_id: &str,
        resolved: &ResolvedIdentity,
    ) -> AppResult<EligibilityResult> {
        let matches = self
            .store
            .find_matching_claims(campaign_id, &resolved.matcher)
            .await?;
        let eligible = (matches.len() as u64) < u64::from(self.policy.claim_limit());
        Ok(EligibilityResult {
            eligible,
            matched_on: resolved.matcher.key.field,
            existing: summarize(&matches),
        })
    }

    /// 独立事务写入一条台账记录
    pub async fn record_claim(
        &self,
        campaign_id: &str,
        identity: &Identity,
        store_id: Option<i64>,
        prize: Option<PrizeSnapshot>,
        status: ClaimStatus,
    ) -> AppResult<records::Model> {
        let resolved = self.policy.resolve(identity)?;
        let mut tx = self.store.begin().await?;
        match self
            .record_claim_in(tx.as_mut(), campaign_id, &resolved, store_id, prize, status)
            .await
        {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    log::error!("Failed to roll back ledger insert: {rb}");
                }
                Err(e)
            }
        }
    }

    /// 仅登记参与 (不抽奖)
    pub async fn register(
        &self,
        campaign_id: &str,
        identity: &Identity,
        store_id: Option<i64>,
    ) -> AppResult<ClaimRecordResponse> {
        if let Some(store_id) = store_id {
            self.store
                .find_active_store(store_id, Some(campaign_id))
                .await?;
        }
        let record = self
            .record_claim(
                campaign_id,
                identity,
                store_id,
                None,
                ClaimStatus::Registered,
            )
            .await?;
        log::info!(
            "Registered claim {} in campaign {campaign_id}",
            record.claim_code
        );
        Ok(record.into())
    }

    /// 在调用方事务内重新校验上限并写入台账
    ///
    /// claim_seq 取同一去重键的已有记录数 + 1，配合唯一索引使并发的同一身份最多成功一次
    pub(crate) async fn record_claim_in(
        &self,
        tx: &mut dyn ClaimTx,
        campaign_id: &str,
        resolved: &ResolvedIdentity,
        store_id: Option<i64>,
        prize: Option<PrizeSnapshot>,
        status: ClaimStatus,
    ) -> AppResult<records::Model> {
        let matches = tx.find_matching_claims(campaign_id, &resolved.matcher).await?;
        if (matches.len() as u64) >= u64::from(self.policy.claim_limit()) {
            return Err(AppError::DuplicateIdentity(summarize(&matches)));
        }

        let dedup_key = resolved.dedup_key();
        let existing = tx.count_by_dedup_key(campaign_id, &dedup_key).await?;
        let claim_seq = i32::try_from(existing + 1)
            .map_err(|_| AppError::InternalError("claim sequence overflow".into()))?;

        tx.insert_claim(NewClaim {
            claim_code: Uuid::new_v4(),
            campaign_id: campaign_id.to_string(),
            store_id,
            prize,
            identity: resolved.identity.clone(),
            dedup_key,
            claim_seq,
            status,
        })
        .await
    }

    /// 活动台账分页 (新 -> 旧)
    pub async fn list_claims(
        &self,
        campaign_id: &str,
        query: &ClaimRecordQuery,
    ) -> AppResult<ClaimRecordPageResponse> {
        let params = PaginationParams::new(query.page, query.per_page);
        let (items, total) = self.store.list_claims(campaign_id, params).await?;
        Ok(PaginatedResponse::new(
            items.into_iter().map(Into::into).collect(),
            params,
            total,
        ))
    }
}
