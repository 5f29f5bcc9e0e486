//! 进程内存储实现
//!
//! 语义与 PostgreSQL 实现保持一致:
//! - 每个奖品行一把排他锁，事务持有到提交/回滚
//! - 事务内写入先暂存，提交时一次性生效，丢弃事务等同回滚
//! - 台账唯一约束 (campaign_id, dedup_key, claim_seq) 与 (campaign_id, voucher_number)

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DbErr;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use super::store::{ClaimMatcher, ClaimStore, ClaimTx, NewClaim};
use crate::entities::{
    claim_record_entity as records, prize_entity as prizes, store_entity as stores,
};
use crate::error::{AppError, AppResult};
use crate::models::PaginationParams;

#[derive(Default)]
struct Tables {
    stores: BTreeMap<i64, stores::Model>,
    prizes: BTreeMap<i64, prizes::Model>,
    claims: Vec<records::Model>,
}

struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<i64, Arc<RowLock<()>>>>,
    next_id: AtomicI64,
    lock_timeout: Duration,
    fail_next_insert: AtomicBool,
}

impl Inner {
    fn tables(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalError("memory store poisoned".into()))
    }

    fn row_lock(&self, prize_id: i64) -> AppResult<Arc<RowLock<()>>> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| AppError::InternalError("memory store poisoned".into()))?;
        Ok(locks.entry(prize_id).or_default().clone())
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// 内存存储，克隆后共享同一份数据
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                lock_timeout,
                fail_next_insert: AtomicBool::new(false),
            }),
        }
    }

    pub fn add_store(&self, campaign_id: &str, name: &str, is_active: bool) -> AppResult<i64> {
        let id = self.inner.next_id();
        let now = Some(Utc::now());
        self.inner.tables()?.stores.insert(
            id,
            stores::Model {
                id,
                campaign_id: campaign_id.to_string(),
                name: name.to_string(),
                is_active,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    pub fn add_prize(&self, store_id: i64, name: &str, stock: i64) -> AppResult<i64> {
        if stock < 0 {
            return Err(AppError::ValidationError("stock must not be negative".into()));
        }
        let id = self.inner.next_id();
        let now = Some(Utc::now());
        self.inner.tables()?.prizes.insert(
            id,
            prizes::Model {
                id,
                store_id,
                name: name.to_string(),
                initial_stock: stock,
                available_stock: stock,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    /// 已提交的奖品状态
    pub fn prize(&self, prize_id: i64) -> Option<prizes::Model> {
        self.inner
            .tables()
            .ok()
            .and_then(|t| t.prizes.get(&prize_id).cloned())
    }

    /// 已提交的全部台账记录
    pub fn claims(&self) -> Vec<records::Model> {
        self.inner
            .tables()
            .map(|t| t.claims.clone())
            .unwrap_or_default()
    }

    /// 下一次 insert_claim 失败 (用于验证回滚)
    pub fn fail_next_insert(&self) {
        self.inner.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

fn unique_violation(existing: &[records::Model], claim: &records::Model) -> Option<&'static str> {
    for row in existing {
        if row.campaign_id != claim.campaign_id {
            continue;
        }
        if row.dedup_key == claim.dedup_key && row.claim_seq == claim.claim_seq {
            return Some("idx_claim_records_dedup_unique");
        }
        if claim.voucher_number.is_some() && row.voucher_number == claim.voucher_number {
            return Some("idx_claim_records_voucher_unique");
        }
    }
    None
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn find_store(&self, store_id: i64) -> AppResult<Option<stores::Model>> {
        Ok(self.inner.tables()?.stores.get(&store_id).cloned())
    }

    async fn find_prize(&self, prize_id: i64) -> AppResult<Option<prizes::Model>> {
        Ok(self.inner.tables()?.prizes.get(&prize_id).cloned())
    }

    async fn list_available_prizes(&self, store_id: i64) -> AppResult<Vec<prizes::Model>> {
        Ok(self
            .inner
            .tables()?
            .prizes
            .values()
            .filter(|p| p.store_id == store_id && p.is_available())
            .cloned()
            .collect())
    }

    async fn find_matching_claims(
        &self,
        campaign_id: &str,
        matcher: &ClaimMatcher,
    ) -> AppResult<Vec<records::Model>> {
        Ok(self
            .inner
            .tables()?
            .claims
            .iter()
            .filter(|c| matcher.matches(campaign_id, c))
            .cloned()
            .collect())
    }

    async fn list_claims(
        &self,
        campaign_id: &str,
        params: PaginationParams,
    ) -> AppResult<(Vec<records::Model>, u64)> {
        let tables = self.inner.tables()?;
        let matching: Vec<&records::Model> = tables
            .claims
            .iter()
            .rev()
            .filter(|c| c.campaign_id == campaign_id)
            .collect();
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn begin(&self) -> AppResult<Box<dyn ClaimTx>> {
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            held: HashMap::new(),
            decrements: HashMap::new(),
            inserts: Vec::new(),
        }))
    }
}

pub struct MemoryTx {
    inner: Arc<Inner>,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    decrements: HashMap<i64, i64>,
    inserts: Vec<records::Model>,
}

impl MemoryTx {
    async fn acquire(&mut self, prize_id: i64) -> AppResult<()> {
        if self.held.contains_key(&prize_id) {
            return Ok(());
        }
        let lock = self.inner.row_lock(prize_id)?;
        let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                AppError::DatabaseError(DbErr::Custom(format!(
                    "lock timeout waiting for prize {prize_id}"
                )))
            })?;
        self.held.insert(prize_id, guard);
        Ok(())
    }

    fn staged_stock(&self, prize: &prizes::Model) -> i64 {
        prize.available_stock - self.decrements.get(&prize.id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ClaimTx for MemoryTx {
    async fn lock_available_prize(&mut self, prize_id: i64) -> AppResult<Option<prizes::Model>> {
        self.acquire(prize_id).await?;
        let prize = self.inner.tables()?.prizes.get(&prize_id).cloned();
        Ok(prize.and_then(|mut p| {
            p.available_stock = self.staged_stock(&p);
            p.is_available().then_some(p)
        }))
    }

    async fn decrement_stock(&mut self, prize_id: i64) -> AppResult<()> {
        self.acquire(prize_id).await?;
        let prize = self.inner.tables()?.prizes.get(&prize_id).cloned();
        match prize {
            Some(p) if self.staged_stock(&p) > 0 => {
                *self.decrements.entry(prize_id).or_insert(0) += 1;
                Ok(())
            }
            _ => Err(AppError::StockLost),
        }
    }

    async fn find_matching_claims(
        &mut self,
        campaign_id: &str,
        matcher: &ClaimMatcher,
    ) -> AppResult<Vec<records::Model>> {
        let tables = self.inner.tables()?;
        Ok(tables
            .claims
            .iter()
            .chain(self.inserts.iter())
            .filter(|c| matcher.matches(campaign_id, c))
            .cloned()
            .collect())
    }

    async fn count_by_dedup_key(&mut self, campaign_id: &str, dedup_key: &str) -> AppResult<i64> {
        let tables = self.inner.tables()?;
        Ok(tables
            .claims
            .iter()
            .chain(self.inserts.iter())
            .filter(|c| c.campaign_id == campaign_id && c.dedup_key == dedup_key)
            .count() as i64)
    }

    async fn insert_claim(&mut self, claim: NewClaim) -> AppResult<records::Model> {
        if self.inner.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(AppError::DatabaseError(DbErr::Custom(
                "injected insert failure".into(),
            )));
        }

        let (prize_id, prize_name) = match claim.prize {
            Some(p) => (Some(p.id), Some(p.name)),
            None => (None, None),
        };
        let model = records::Model {
            id: self.inner.next_id(),
            claim_code: claim.claim_code,
            campaign_id: claim.campaign_id,
            store_id: claim.store_id,
            prize_id,
            prize_name,
            national_id: claim.identity.national_id,
            phone_number: claim.identity.phone_number,
            voucher_number: claim.identity.voucher_number,
            display_name: claim.identity.display_name,
            dedup_key: claim.dedup_key,
            claim_seq: claim.claim_seq,
            status: claim.status,
            created_at: Some(Utc::now()),
        };

        {
            let tables = self.inner.tables()?;
            if let Some(index) = unique_violation(&tables.claims, &model)
                .or_else(|| unique_violation(&self.inserts, &model))
            {
                log::info!("Claim insert rejected by unique constraint: {index}");
                return Err(AppError::DuplicateIdentity(None));
            }
        }

        self.inserts.push(model.clone());
        Ok(model)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx {
            inner,
            held,
            decrements,
            inserts,
        } = *self;

        {
            let mut tables = inner.tables()?;

            // 其他事务可能在本事务写入后提交了相同的去重键
            for claim in &inserts {
                if let Some(index) = unique_violation(&tables.claims, claim) {
                    log::info!("Claim commit rejected by unique constraint: {index}");
                    return Err(AppError::DuplicateIdentity(None));
                }
            }
            for (prize_id, count) in &decrements {
                match tables.prizes.get(prize_id) {
                    Some(p) if p.available_stock >= *count => {}
                    _ => {
                        return Err(AppError::DatabaseError(DbErr::Custom(format!(
                            "available_stock check violated for prize {prize_id}"
                        ))));
                    }
                }
            }

            let now = Some(Utc::now());
            for (prize_id, count) in decrements {
                if let Some(p) = tables.prizes.get_mut(&prize_id) {
                    p.available_stock -= count;
                    p.updated_at = now;
                }
            }
            tables.claims.extend(inserts);
        }

        // 数据生效后才释放行锁
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}
