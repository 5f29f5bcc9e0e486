use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select, Set, Statement, TransactionTrait, UpdateMany,
};

use super::store::{ClaimMatcher, ClaimStore, ClaimTx, NewClaim};
use crate::entities::{
    claim_record_entity as records, prize_entity as prizes, store_entity as stores,
};
use crate::error::{AppError, AppResult};
use crate::models::PaginationParams;

/// 基于 sea-orm 的 PostgreSQL 存储
#[derive(Clone)]
pub struct PgStore {
    pool: DatabaseConnection,
    lock_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: DatabaseConnection, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }
}

fn matching_condition(campaign_id: &str, matcher: &ClaimMatcher) -> Condition {
    let mut cond = Condition::all()
        .add(records::Column::CampaignId.eq(campaign_id))
        .add(records::Column::for_identity(matcher.key.field).eq(matcher.key.value.clone()));
    for field in &matcher.exclude_rows_with {
        cond = cond.add(records::Column::for_identity(*field).is_null());
    }
    cond
}

fn matching_query(campaign_id: &str, matcher: &ClaimMatcher) -> Select<records::Entity> {
    records::Entity::find()
        .filter(matching_condition(campaign_id, matcher))
        .order_by_asc(records::Column::Id)
}

/// SELECT ... FOR UPDATE: 并发请求在此排队，锁持有者提交后再读到最新库存
fn lock_prize_query(prize_id: i64) -> Select<prizes::Entity> {
    prizes::Entity::find_by_id(prize_id)
        .filter(prizes::Column::AvailableStock.gt(0))
        .lock_exclusive()
}

/// 条件扣减，库存已为 0 时影响行数为 0
fn decrement_stock_query(prize_id: i64) -> UpdateMany<prizes::Entity> {
    prizes::Entity::update_many()
        .col_expr(
            prizes::Column::AvailableStock,
            Expr::col(prizes::Column::AvailableStock).sub(1),
        )
        .col_expr(prizes::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(prizes::Column::Id.eq(prize_id))
        .filter(prizes::Column::AvailableStock.gt(0))
}

fn lock_timeout_statement(lock_timeout_ms: u64) -> Statement {
    Statement::from_string(
        DbBackend::Postgres,
        format!("SET LOCAL lock_timeout = '{lock_timeout_ms}ms'"),
    )
}

async fn find_matching<C: ConnectionTrait>(
    conn: &C,
    campaign_id: &str,
    matcher: &ClaimMatcher,
) -> AppResult<Vec<records::Model>> {
    Ok(matching_query(campaign_id, matcher).all(conn).await?)
}

#[async_trait]
impl ClaimStore for PgStore {
    async fn find_store(&self, store_id: i64) -> AppResult<Option<stores::Model>> {
        Ok(stores::Entity::find_by_id(store_id).one(&self.pool).await?)
    }

    async fn find_prize(&self, prize_id: i64) -> AppResult<Option<prizes::Model>> {
        Ok(prizes::Entity::find_by_id(prize_id).one(&self.pool).await?)
    }

    async fn list_available_prizes(&self, store_id: i64) -> AppResult<Vec<prizes::Model>> {
        let list = prizes::Entity::find()
            .filter(prizes::Column::StoreId.eq(store_id))
            .filter(prizes::Column::AvailableStock.gt(0))
            .order_by_asc(prizes::Column::Id)
            .all(&self.pool)
            .await?;
        Ok(list)
    }

    async fn find_matching_claims(
        &self,
        campaign_id: &str,
        matcher: &ClaimMatcher,
    ) -> AppResult<Vec<records::Model>> {
        find_matching(&self.pool, campaign_id, matcher).await
    }

    async fn list_claims(
        &self,
        campaign_id: &str,
        params: PaginationParams,
    ) -> AppResult<(Vec<records::Model>, u64)> {
        let base_query =
            records::Entity::find().filter(records::Column::CampaignId.eq(campaign_id));

        let total = base_query.clone().count(&self.pool).await?;

        let items = base_query
            .order_by_desc(records::Column::CreatedAt)
            .order_by_desc(records::Column::Id)
            .limit(params.limit())
            .offset(params.offset())
            .all(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn begin(&self) -> AppResult<Box<dyn ClaimTx>> {
        let txn = self.pool.begin().await?;
        // 等锁超时后语句报错，由调用方回滚整个事务
        txn.execute(lock_timeout_statement(self.lock_timeout_ms))
            .await?;
        Ok(Box::new(PgTx { txn }))
    }
}

pub struct PgTx {
    txn: DatabaseTransaction,
}

#[async_trait]
impl ClaimTx for PgTx {
    async fn lock_available_prize(&mut self, prize_id: i64) -> AppResult<Option<prizes::Model>> {
        let prize = lock_prize_query(prize_id).one(&self.txn).await?;
        Ok(prize)
    }

    async fn decrement_stock(&mut self, prize_id: i64) -> AppResult<()> {
        let result = decrement_stock_query(prize_id).exec(&self.txn).await?;

        if result.rows_affected != 1 {
            return Err(AppError::StockLost);
        }
        Ok(())
    }

    async fn find_matching_claims(
        &mut self,
        campaign_id: &str,
        matcher: &ClaimMatcher,
    ) -> AppResult<Vec<records::Model>> {
        find_matching(&self.txn, campaign_id, matcher).await
    }

    async fn count_by_dedup_key(&mut self, campaign_id: &str, dedup_key: &str) -> AppResult<i64> {
        let count = records::Entity::find()
            .filter(records::Column::CampaignId.eq(campaign_id))
            .filter(records::Column::DedupKey.eq(dedup_key))
            .count(&self.txn)
            .await?;
        Ok(count as i64)
    }

    async fn insert_claim(&mut self, claim: NewClaim) -> AppResult<records::Model> {
        let (prize_id, prize_name) = match claim.prize {
            Some(p) => (Some(p.id), Some(p.name)),
            None => (None, None),
        };
        records::ActiveModel {
            claim_code: Set(claim.claim_code),
            campaign_id: Set(claim.campaign_id),
            store_id: Set(claim.store_id),
            prize_id: Set(prize_id),
            prize_name: Set(prize_name),
            national_id: Set(claim.identity.national_id),
            phone_number: Set(claim.identity.phone_number),
            voucher_number: Set(claim.identity.voucher_number),
            display_name: Set(claim.identity.display_name),
            dedup_key: Set(claim.dedup_key),
            claim_seq: Set(claim.claim_seq),
            status: Set(claim.status),
            created_at: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(&self.txn)
        .await
        .map_err(AppError::from_insert_error)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgTx { txn } = *self;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let PgTx { txn } = *self;
        txn.rollback().await?;
        Ok(())
    }
}
