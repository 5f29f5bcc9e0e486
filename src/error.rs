use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::models::{ApiError, ApiResponse, ClaimSummary};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// 该身份已达到领取上限
    #[error("Identity has already participated in this campaign")]
    DuplicateIdentity(Option<ClaimSummary>),

    /// 门店内没有任何有库存的奖品
    #[error("No prize with available stock")]
    NoStockAvailable,

    /// 抽中的奖品在提交前被其他请求领完，可重试
    #[error("Drawn prize stock was consumed concurrently")]
    StockLost,

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// 只有库存竞争失败允许调用方重新发起
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StockLost)
    }

    /// 业务规则错误 (区别于基础设施错误)
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            AppError::DuplicateIdentity(_) | AppError::NoStockAvailable | AppError::StockLost
        )
    }

    /// 写入台账时的唯一约束冲突视为重复参与，其余保持数据库错误
    pub fn from_insert_error(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                log::info!("Claim insert rejected by unique constraint: {detail}");
                AppError::DuplicateIdentity(None)
            }
            _ => AppError::DatabaseError(err),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::DuplicateIdentity(_) => "ALREADY_PARTICIPATED",
            AppError::NoStockAvailable => "PRIZES_EXHAUSTED",
            AppError::StockLost => "STOCK_LOST",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ConfigError(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DuplicateIdentity(_) | AppError::NoStockAvailable | AppError::StockLost => {
                StatusCode::CONFLICT
            }
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::DuplicateIdentity(_) => {
                log::info!("Duplicate participation rejected");
                "Already participated".to_string()
            }
            AppError::NoStockAvailable => {
                log::info!("Claim rejected: prizes exhausted");
                "Prizes exhausted".to_string()
            }
            AppError::StockLost => {
                log::warn!("Claim lost stock race");
                "Prize was just taken, please try again".to_string()
            }
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                msg.clone()
            }
            AppError::NotFound(msg) => msg.clone(),
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                "Database error".to_string()
            }
            _ => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        };

        let existing = match self {
            AppError::DuplicateIdentity(summary) => summary.clone(),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(ApiError {
            code: self.code().to_string(),
            message,
            retryable: self.is_retryable(),
            existing,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_only_for_stock_lost() {
        assert!(AppError::StockLost.is_retryable());
        assert!(!AppError::NoStockAvailable.is_retryable());
        assert!(!AppError::DuplicateIdentity(None).is_retryable());
        assert!(!AppError::DatabaseError(DbErr::Custom("boom".into())).is_retryable());
    }

    #[test]
    fn test_business_rules_are_distinguished_from_infrastructure() {
        assert!(AppError::StockLost.is_business_rule());
        assert!(AppError::NoStockAvailable.is_business_rule());
        assert!(AppError::DuplicateIdentity(None).is_business_rule());
        assert!(!AppError::DatabaseError(DbErr::Custom("boom".into())).is_business_rule());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::DuplicateIdentity(None).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::StockLost.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::DatabaseError(DbErr::Custom("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_non_unique_insert_error_stays_database_error() {
        let err = AppError::from_insert_error(DbErr::Custom("connection reset".into()));
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
