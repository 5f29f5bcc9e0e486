use std::sync::Arc;

use super::{AllocationEngine, IdentityLedger, IdentityPolicy};
use crate::config::EngineConfig;
use crate::database::ClaimStore;
use crate::error::AppResult;
use crate::models::{
    AllocationResult, ClaimRecordPageResponse, ClaimRecordQuery, ClaimRecordResponse,
    EligibilityResult, Identity, PrizeSnapshot,
};
use crate::utils::RandomSource;

/// 对外的领奖服务 (供 HTTP 层调用)
///
/// 引擎单次尝试不循环；StockLost 时由这里重新发起完整的一次尝试
#[derive(Clone)]
pub struct ClaimService {
    ledger: IdentityLedger,
    engine: AllocationEngine,
    retry_attempts: u32,
}

impl ClaimService {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        random: Arc<dyn RandomSource>,
        config: &EngineConfig,
    ) -> AppResult<Self> {
        let policy = IdentityPolicy::from_config(config)?;
        let ledger = IdentityLedger::new(store.clone(), policy);
        let engine = AllocationEngine::new(store, ledger.clone(), random);
        Ok(Self {
            ledger,
            engine,
            retry_attempts: config.retry_attempts,
        })
    }

    pub async fn check_eligibility(
        &self,
        campaign_id: &str,
        identity: &Identity,
    ) -> AppResult<EligibilityResult> {
        self.ledger.check_eligibility(campaign_id, identity).await
    }

    /// 随机领奖，库存竞争失败时重试
    pub async fn claim(
        &self,
        campaign_id: &str,
        store_id: i64,
        identity: &Identity,
    ) -> AppResult<AllocationResult> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.engine.allocate(store_id, campaign_id, identity).await {
                Err(e) if e.is_retryable() && attempts <= self.retry_attempts => {
                    log::warn!(
                        "Claim attempt {attempts} in store {store_id} lost stock race, retrying"
                    );
                    continue;
                }
                other => return other,
            }
        }
    }

    /// 指定奖品领取
    pub async fn claim_fixed(
        &self,
        campaign_id: &str,
        store_id: i64,
        prize_id: i64,
        identity: &Identity,
    ) -> AppResult<AllocationResult> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .engine
                .allocate_fixed(store_id, prize_id, campaign_id, identity)
                .await
            {
                Err(e) if e.is_retryable() && attempts <= self.retry_attempts => continue,
                other => return other,
            }
        }
    }

    pub async fn register(
        &self,
        campaign_id: &str,
        identity: &Identity,
        store_id: Option<i64>,
    ) -> AppResult<ClaimRecordResponse> {
        self.ledger.register(campaign_id, identity, store_id).await
    }

    pub async fn list_available_prizes(&self, store_id: i64) -> AppResult<Vec<PrizeSnapshot>> {
        self.engine.list_available_prizes(store_id).await
    }

    pub async fn list_claims(
        &self,
        campaign_id: &str,
        query: &ClaimRecordQuery,
    ) -> AppResult<ClaimRecordPageResponse> {
        self.ledger.list_claims(campaign_id, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::error::AppError;
    use crate::utils::SequenceRandom;
    use std::time::Duration;

    fn service(store: &MemoryStore, retry_attempts: u32) -> ClaimService {
        ClaimService::new(
            Arc::new(store.clone()),
            Arc::new(SequenceRandom::new(vec![0.1, 0.5, 0.9, 0.3, 0.7])),
            &EngineConfig {
                retry_attempts,
                ..EngineConfig::default()
            },
        )
        .unwrap()
    }

    fn phone(n: usize) -> Identity {
        Identity {
            phone_number: Some(format!("555{n:04}")),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_engine_config_is_rejected() {
        let store = MemoryStore::new(Duration::from_millis(100));
        let result = ClaimService::new(
            Arc::new(store),
            Arc::new(SequenceRandom::new(vec![0.0])),
            &EngineConfig {
                claim_limit: 0,
                ..EngineConfig::default()
            },
        );
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retrying_claimants_drain_every_prize() {
        let store = MemoryStore::new(Duration::from_secs(2));
        let shop = store.add_store("spring", "Main St", true).unwrap();
        let prizes = [
            store.add_prize(shop, "Mug", 2).unwrap(),
            store.add_prize(shop, "Cap", 3).unwrap(),
            store.add_prize(shop, "Pin", 1).unwrap(),
        ];
        let svc = service(&store, 100);

        let mut handles = Vec::new();
        for n in 0..24 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.claim("spring", shop, &phone(n)).await
            }));
        }

        let mut won = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::NoStockAvailable) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(won, 6);
        assert_eq!(store.claims().len(), 6);
        for id in prizes {
            let p = store.prize(id).unwrap();
            assert_eq!(p.available_stock, 0);
            let claimed = store
                .claims()
                .iter()
                .filter(|c| c.prize_id == Some(id))
                .count() as i64;
            assert_eq!(claimed, p.initial_stock);
        }
    }

    #[tokio::test]
    async fn test_service_flow() {
        let store = MemoryStore::new(Duration::from_millis(200));
        let shop = store.add_store("spring", "Main St", true).unwrap();
        let mug = store.add_prize(shop, "Mug", 2).unwrap();
        let svc = service(&store, 3);

        let prizes = svc.list_available_prizes(shop).await.unwrap();
        assert_eq!(prizes.len(), 1);
        assert_eq!(prizes[0].available_stock, 2);

        assert!(svc.check_eligibility("spring", &phone(1)).await.unwrap().eligible);
        let won = svc.claim("spring", shop, &phone(1)).await.unwrap();
        assert_eq!(won.prize.id, mug);
        assert!(!svc.check_eligibility("spring", &phone(1)).await.unwrap().eligible);

        let fixed = svc.claim_fixed("spring", shop, mug, &phone(2)).await.unwrap();
        assert_eq!(fixed.prize.available_stock, 0);

        let registered = svc.register("spring", &phone(3), Some(shop)).await.unwrap();
        assert_eq!(registered.prize_id, None);
        assert!(matches!(
            svc.claim("spring", shop, &phone(3)).await,
            Err(AppError::DuplicateIdentity(_))
        ));

        let page = svc
            .list_claims(
                "spring",
                &ClaimRecordQuery {
                    page: None,
                    per_page: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
    }
}
