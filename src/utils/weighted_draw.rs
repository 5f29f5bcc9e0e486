//! 按剩余库存加权的随机抽取

use rand::Rng;

use crate::error::{AppError, AppResult};
use crate::models::PrizeSnapshot;

/// [0, 1) 均匀分布随机数来源
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// 线程本地随机数生成器
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// 按剩余库存加权抽取一个奖品
///
/// 逻辑:
/// 1. 总权重 = 所有奖品剩余库存之和，为 0 时返回 NoStockAvailable
/// 2. 取 [0, 总权重) 内的随机数 r
/// 3. 按奖品ID升序依次从 r 中减去库存，剩余值首次 <= 0 的奖品中奖
///
/// 恰好落在区间边界上的 r 归前一个奖品
///
/// 每个奖品被抽中的概率恰好为 available_stock / 总权重。
/// 纯计算，不触碰持久化库存。
pub fn draw_weighted(prizes: &[PrizeSnapshot], random: &dyn RandomSource) -> AppResult<PrizeSnapshot> {
    let mut candidates: Vec<&PrizeSnapshot> =
        prizes.iter().filter(|p| p.available_stock > 0).collect();
    candidates.sort_by_key(|p| p.id);

    let total_weight: i64 = candidates.iter().map(|p| p.available_stock).sum();
    if total_weight <= 0 {
        return Err(AppError::NoStockAvailable);
    }

    let mut remaining = random.next_unit().clamp(0.0, 1.0) * total_weight as f64;
    for prize in &candidates {
        remaining -= prize.available_stock as f64;
        if remaining <= 0.0 {
            return Ok((*prize).clone());
        }
    }

    // 浮点误差导致未命中时归最后一个奖品
    candidates
        .last()
        .map(|p| (*p).clone())
        .ok_or(AppError::NoStockAvailable)
}

/// 按顺序返回预设随机数 (循环使用)
#[cfg(test)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl RandomSource for SequenceRandom {
    fn next_unit(&self) -> f64 {
        let i = self
            .cursor
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.values[i % self.values.len()]
    }
}
