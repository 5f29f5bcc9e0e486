use futures_util::future::join;
use std::sync::Arc;

use super::identity_ledger::IdentityLedger;
use super::identity_policy::ResolvedIdentity;
use crate::database::{ClaimStore, ClaimTx};
use crate::entities::ClaimStatus;
use crate::error::{AppError, AppResult};
use crate::models::{AllocationResult, Identity, PrizeSnapshot};
use crate::utils::{RandomSource, draw_weighted};

/// 奖品分配引擎
///
/// 单次领奖流程:
/// 1. 校验门店属于该活动且处于启用状态
/// 2. 并发执行资格检查与可用奖品列表读取
/// 3. 按剩余库存加权随机抽取
/// 4. 事务内排他锁重读奖品、扣减库存、写入台账，全部成功才提交
///
/// 提交阶段抽中的奖品已被领完时返回 StockLost，是否重新发起由调用方决定
#[derive(Clone)]
pub struct AllocationEngine {
    store: Arc<dyn ClaimStore>,
    ledger: IdentityLedger,
    random: Arc<dyn RandomSource>,
}

impl AllocationEngine {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        ledger: IdentityLedger,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            store,
            ledger,
            random,
        }
    }

    /// 门店内有库存的奖品快照 (按ID升序)，门店须存在且启用
    pub async fn list_available_prizes(&self, store_id: i64) -> AppResult<Vec<PrizeSnapshot>> {
        self.store.find_active_store(store_id, None).await?;
        self.snapshot_prizes(store_id).await
    }

    async fn snapshot_prizes(&self, store_id: i64) -> AppResult<Vec<PrizeSnapshot>> {
        let prizes: Vec<PrizeSnapshot> = self
            .store
            .list_available_prizes(store_id)
            .await?
            .into_iter()
            .filter(|p| p.is_available())
            .map(Into::into)
            .collect();
        if prizes.is_empty() {
            return Err(AppError::NoStockAvailable);
        }
        Ok(prizes)
    }

    /// 加权抽取，不修改库存
    pub fn draw(&self, prizes: &[PrizeSnapshot]) -> AppResult<PrizeSnapshot> {
        draw_weighted(prizes, &*self.random)
    }

    /// 随机领奖
    pub async fn allocate(
        &self,
        store_id: i64,
        campaign_id: &str,
        identity: &Identity,
    ) -> AppResult<AllocationResult> {
        let resolved = self.ledger.policy().resolve(identity)?;
        self.store.find_active_store(store_id, Some(campaign_id)).await?;

        // 两个读取并发执行，但重复参与的判定优先于无库存
        let (eligibility, prizes) = join(
            self.ledger.check_resolved(campaign_id, &resolved),
            self.snapshot_prizes(store_id),
        )
        .await;

        let eligibility = eligibility?;
        if !eligibility.eligible {
            log::info!(
                "Duplicate claim rejected in campaign {campaign_id} (matched on {})",
                eligibility.matched_on
            );
            return Err(AppError::DuplicateIdentity(eligibility.existing));
        }

        let winner = self.draw(&prizes?)?;
        self.commit_allocation(winner.id, &resolved, campaign_id, store_id)
            .await
    }

    /// 指定奖品领取 (跳过抽取，只执行加锁提交)
    pub async fn allocate_fixed(
        &self,
        store_id: i64,
        prize_id: i64,
        campaign_id: &str,
        identity: &Identity,
    ) -> AppResult<AllocationResult> {
        let resolved = self.ledger.policy().resolve(identity)?;
        self.store.find_active_store(store_id, Some(campaign_id)).await?;

        let prize = self
            .store
            .find_prize(prize_id)
            .await?
            .filter(|p| p.store_id == store_id)
            .ok_or_else(|| AppError::NotFound(format!("Prize {prize_id} not found in store")))?;

        let eligibility = self.ledger.check_resolved(campaign_id, &resolved).await?;
        if !eligibility.eligible {
            return Err(AppError::DuplicateIdentity(eligibility.existing));
        }
        if !prize.is_available() {
            return Err(AppError::NoStockAvailable);
        }

        self.commit_allocation(prize.id, &resolved, campaign_id, store_id)
            .await
    }

    /// 事务提交: 排他锁重读 -> 扣减库存 -> 写台账 -> 提交
    ///
    /// 任一步失败都会完整回滚后再返回错误
    pub async fn commit_allocation(
        &self,
        prize_id: i64,
        resolved: &ResolvedIdentity,
        campaign_id: &str,
        store_id: i64,
    ) -> AppResult<AllocationResult> {
        let mut tx = self.store.begin().await?;

        match self
            .commit_in(tx.as_mut(), prize_id, resolved, campaign_id, store_id)
            .await
        {
            Ok(result) => {
                tx.commit().await?;
                log::info!(
                    "Claim {} committed: prize {} in store {store_id}, {} left",
                    result.claim_code,
                    result.prize.id,
                    result.prize.available_stock
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    log::error!("Failed to roll back allocation for prize {prize_id}: {rb}");
                }
                match &e {
                    AppError::StockLost => {
                        log::warn!("Stock of prize {prize_id} lost to a concurrent claim")
                    }
                    e if !e.is_business_rule() => {
                        log::error!("Allocation for prize {prize_id} rolled back: {e}")
                    }
                    _ => {}
                }
                Err(e)
            }
        }
    }

    async fn commit_in(
        &self,
        tx: &mut dyn ClaimTx,
        prize_id: i64,
        resolved: &ResolvedIdentity,
        campaign_id: &str,
        store_id: i64,
    ) -> AppResult<AllocationResult> {
        // 锁内没有读到行 = 快照之后被其他请求领完
        let prize = tx
            .lock_available_prize(prize_id)
            .await?
            .ok_or(AppError::StockLost)?;
        if prize.store_id != store_id {
            return Err(AppError::ValidationError(format!(
                "Prize {prize_id} does not belong to store {store_id}"
            )));
        }

        tx.decrement_stock(prize_id).await?;

        let won = PrizeSnapshot {
            id: prize.id,
            name: prize.name,
            available_stock: prize.available_stock - 1,
        };
        let record = self
            .ledger
            .record_claim_in(
                tx,
                campaign_id,
                resolved,
                Some(store_id),
                Some(won.clone()),
                ClaimStatus::Claimed,
            )
            .await?;

        Ok(AllocationResult {
            prize: won,
            claim_id: record.id,
            claim_code: record.claim_code,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::services::IdentityPolicy;
    use crate::utils::SequenceRandom;
    use std::sync::Barrier;
    use std::time::Duration;

    /// 所有参与者都完成列表读取后才开始抽取
    struct BarrierRandom {
        barrier: Barrier,
        inner: SequenceRandom,
    }

    impl BarrierRandom {
        fn new(parties: usize, values: Vec<f64>) -> Self {
            Self {
                barrier: Barrier::new(parties),
                inner: SequenceRandom::new(values),
            }
        }
    }

    impl RandomSource for BarrierRandom {
        fn next_unit(&self) -> f64 {
            tokio::task::block_in_place(|| self.barrier.wait());
            self.inner.next_unit()
        }
    }

    struct Fixture {
        store: MemoryStore,
        engine: AllocationEngine,
        store_id: i64,
        prize_ids: Vec<i64>,
    }

    fn fixture(stocks: &[i64], random: Arc<dyn RandomSource>) -> Fixture {
        let store = MemoryStore::new(Duration::from_millis(300));
        let store_id = store.add_store("spring", "Main St", true).unwrap();
        let prize_ids = stocks
            .iter()
            .enumerate()
            .map(|(i, stock)| store.add_prize(store_id, &format!("prize-{i}"), *stock).unwrap())
            .collect();
        let shared: Arc<dyn ClaimStore> = Arc::new(store.clone());
        let ledger = IdentityLedger::new(shared.clone(), IdentityPolicy::default());
        Fixture {
            engine: AllocationEngine::new(shared, ledger, random),
            store,
            store_id,
            prize_ids,
        }
    }

    fn phone(n: usize) -> Identity {
        Identity {
            phone_number: Some(format!("555{n:04}")),
            ..Default::default()
        }
    }

    fn assert_stock_invariant(store: &MemoryStore, prize_ids: &[i64]) {
        for id in prize_ids {
            let p = store.prize(*id).unwrap();
            assert!(p.available_stock >= 0 && p.available_stock <= p.initial_stock);
        }
    }

    #[tokio::test]
    async fn test_allocate_decrements_and_records() {
        let f = fixture(&[3], Arc::new(SequenceRandom::new(vec![0.5])));
        let result = f.engine.allocate(f.store_id, "spring", &phone(1)).await.unwrap();

        assert_eq!(result.prize.id, f.prize_ids[0]);
        assert_eq!(result.prize.available_stock, 2);
        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 2);

        let claims = f.store.claims();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].id, result.claim_id);
        assert_eq!(claims[0].status, ClaimStatus::Claimed);
        assert_eq!(claims[0].prize_id, Some(f.prize_ids[0]));
        assert_eq!(claims[0].store_id, Some(f.store_id));
    }

    #[tokio::test]
    async fn test_same_national_id_is_rejected() {
        let f = fixture(&[10], Arc::new(SequenceRandom::new(vec![0.1])));
        let first = Identity {
            national_id: Some("12345678".into()),
            phone_number: Some("5550001".into()),
            display_name: Some("Ana".into()),
            ..Default::default()
        };
        f.engine.allocate(f.store_id, "spring", &first).await.unwrap();

        let second = Identity {
            national_id: Some("12345678".into()),
            phone_number: Some("5559999".into()),
            display_name: Some("Bea".into()),
            ..Default::default()
        };
        let err = f.engine.allocate(f.store_id, "spring", &second).await.unwrap_err();
        match err {
            AppError::DuplicateIdentity(Some(summary)) => {
                assert_eq!(summary.display_name.as_deref(), Some("Ana"));
                assert_eq!(summary.prize_name.as_deref(), Some("prize-0"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 9);
        assert_eq!(f.store.claims().len(), 1);
    }

    #[tokio::test]
    async fn test_no_stock_and_duplicate_precedence() {
        let f = fixture(&[1, 0], Arc::new(SequenceRandom::new(vec![0.0])));
        f.engine.allocate(f.store_id, "spring", &phone(1)).await.unwrap();

        assert!(matches!(
            f.engine.allocate(f.store_id, "spring", &phone(2)).await,
            Err(AppError::NoStockAvailable)
        ));
        // 已参与的身份即使库存为空也报告重复参与
        assert!(matches!(
            f.engine.allocate(f.store_id, "spring", &phone(1)).await,
            Err(AppError::DuplicateIdentity(_))
        ));
        assert!(matches!(
            f.engine.list_available_prizes(f.store_id).await,
            Err(AppError::NoStockAvailable)
        ));
    }

    #[tokio::test]
    async fn test_store_preconditions() {
        let f = fixture(&[5], Arc::new(SequenceRandom::new(vec![0.0])));
        let closed = f.store.add_store("spring", "Closed", false).unwrap();
        f.store.add_prize(closed, "Cap", 5).unwrap();

        assert!(matches!(
            f.engine.allocate(closed, "spring", &phone(1)).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            f.engine.allocate(f.store_id, "autumn", &phone(1)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.allocate(f.store_id, "spring", &Identity::default()).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(f.store.claims().is_empty());

        assert!(matches!(
            f.engine.list_available_prizes(closed).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            f.engine.list_available_prizes(999_999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_decrement() {
        let f = fixture(&[2], Arc::new(SequenceRandom::new(vec![0.0])));
        f.store.fail_next_insert();

        let err = f.engine.allocate(f.store_id, "spring", &phone(1)).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
        assert!(!err.is_retryable());
        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 2);
        assert!(f.store.claims().is_empty());

        // 行锁已释放，同一身份可以再次领取
        let ok = f.engine.allocate(f.store_id, "spring", &phone(1)).await.unwrap();
        assert_eq!(ok.prize.available_stock, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_unit_race_has_one_winner() {
        let f = fixture(&[1], Arc::new(BarrierRandom::new(2, vec![0.0])));
        let mut handles = Vec::new();
        for n in 0..2 {
            let engine = f.engine.clone();
            let store_id = f.store_id;
            handles.push(tokio::spawn(async move {
                engine.allocate(store_id, "spring", &phone(n)).await
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(result) => {
                    assert_eq!(result.prize.id, f.prize_ids[0]);
                    won += 1;
                }
                Err(AppError::StockLost) => lost += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((won, lost), (1, 1));
        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 0);
        let claims = f.store.claims();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].prize_id, Some(f.prize_ids[0]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_exceed_stock() {
        // 单一奖品: 只要还有库存，锁内重读一定成功
        let f = fixture(&[5], Arc::new(SequenceRandom::new(vec![0.1, 0.5, 0.9, 0.3])));
        let claimants = 20;
        let mut handles = Vec::new();
        for n in 0..claimants {
            let engine = f.engine.clone();
            let store_id = f.store_id;
            handles.push(tokio::spawn(async move {
                engine.allocate(store_id, "spring", &phone(n)).await
            }));
        }

        let mut won = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::StockLost) | Err(AppError::NoStockAvailable) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(won, 5);
        assert_eq!(f.store.claims().len(), 5);
        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 0);
        assert_stock_invariant(&f.store, &f.prize_ids);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_identity_claims_once() {
        // 两个请求抽中不同奖品，互不阻塞，由台账唯一约束拦下第二个
        let f = fixture(&[5, 5], Arc::new(BarrierRandom::new(2, vec![0.0, 0.99])));
        let who = Identity {
            national_id: Some("12345678".into()),
            ..Default::default()
        };
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = f.engine.clone();
            let store_id = f.store_id;
            let who = who.clone();
            handles.push(tokio::spawn(async move {
                engine.allocate(store_id, "spring", &who).await
            }));
        }

        let mut won = 0;
        let mut duplicate = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::DuplicateIdentity(_)) => duplicate += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((won, duplicate), (1, 1));
        assert_eq!(f.store.claims().len(), 1);
        let remaining: i64 = f
            .prize_ids
            .iter()
            .map(|id| f.store.prize(*id).unwrap().available_stock)
            .sum();
        assert_eq!(remaining, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_commit_after_stale_snapshot_is_stock_lost() {
        let f = fixture(&[1], Arc::new(SequenceRandom::new(vec![0.0])));
        let snapshot = f.engine.list_available_prizes(f.store_id).await.unwrap();
        let winner = f.engine.draw(&snapshot).unwrap();

        let policy = IdentityPolicy::default();
        let a = policy.resolve(&phone(1)).unwrap();
        let b = policy.resolve(&phone(2)).unwrap();
        let (ra, rb) = tokio::join!(
            f.engine.commit_allocation(winner.id, &a, "spring", f.store_id),
            f.engine.commit_allocation(winner.id, &b, "spring", f.store_id),
        );

        let results = [ra, rb];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(loser, AppError::StockLost));
        assert!(loser.is_retryable());
        assert_eq!(f.store.prize(winner.id).unwrap().available_stock, 0);
    }

    #[tokio::test]
    async fn test_lock_timeout_rolls_back() {
        let f = fixture(&[3], Arc::new(SequenceRandom::new(vec![0.0])));
        let mut holder = f.store.begin().await.unwrap();
        holder.lock_available_prize(f.prize_ids[0]).await.unwrap();

        let err = f.engine.allocate(f.store_id, "spring", &phone(1)).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
        holder.rollback().await.unwrap();

        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 3);
        assert!(f.store.claims().is_empty());
        assert!(f.engine.allocate(f.store_id, "spring", &phone(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_allocate_fixed() {
        let f = fixture(&[1, 4], Arc::new(SequenceRandom::new(vec![0.0])));
        let target = f.prize_ids[1];

        let result = f
            .engine
            .allocate_fixed(f.store_id, target, "spring", &phone(1))
            .await
            .unwrap();
        assert_eq!(result.prize.id, target);
        assert_eq!(f.store.prize(target).unwrap().available_stock, 3);
        assert_eq!(f.store.prize(f.prize_ids[0]).unwrap().available_stock, 1);

        let other_store = f.store.add_store("spring", "Elsewhere", true).unwrap();
        assert!(matches!(
            f.engine
                .allocate_fixed(other_store, target, "spring", &phone(2))
                .await,
            Err(AppError::NotFound(_))
        ));

        f.engine
            .allocate_fixed(f.store_id, f.prize_ids[0], "spring", &phone(3))
            .await
            .unwrap();
        assert!(matches!(
            f.engine
                .allocate_fixed(f.store_id, f.prize_ids[0], "spring", &phone(4))
                .await,
            Err(AppError::NoStockAvailable)
        ));
        assert!(matches!(
            f.engine
                .allocate_fixed(f.store_id, target, "spring", &phone(1))
                .await,
            Err(AppError::DuplicateIdentity(_))
        ));
    }
}
