use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ClaimSummary;

/// 统一响应包装
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// 调用方是否可以重新发起一次领奖
    #[serde(default)]
    pub retryable: bool,
    /// 重复参与时附带的既有记录摘要
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<ClaimSummary>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ApiError) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}
