use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::utils::{
    normalize_display_name, normalize_national_id, normalize_phone, normalize_voucher,
};

/// 身份字段 (用于识别重复参与者)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    /// 身份证号
    NationalId,
    /// 手机号
    PhoneNumber,
    /// 券号
    VoucherNumber,
    /// 姓名
    DisplayName,
}

impl IdentityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::NationalId => "national_id",
            IdentityField::PhoneNumber => "phone_number",
            IdentityField::VoucherNumber => "voucher_number",
            IdentityField::DisplayName => "display_name",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "national_id" => Ok(IdentityField::NationalId),
            "phone_number" => Ok(IdentityField::PhoneNumber),
            "voucher_number" => Ok(IdentityField::VoucherNumber),
            "display_name" => Ok(IdentityField::DisplayName),
            other => Err(format!("unknown identity field: {other}")),
        }
    }
}

/// 参与者身份信息，至少需要一个字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    /// 身份证号
    #[serde(default)]
    pub national_id: Option<String>,
    /// 手机号
    #[serde(default)]
    pub phone_number: Option<String>,
    /// 券号
    #[serde(default)]
    pub voucher_number: Option<String>,
    /// 姓名
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    /// 规范化所有字段，空字符串视为未提供
    pub fn normalized(&self) -> Identity {
        Identity {
            national_id: self.national_id.as_deref().and_then(normalize_national_id),
            phone_number: self.phone_number.as_deref().and_then(normalize_phone),
            voucher_number: self.voucher_number.as_deref().and_then(normalize_voucher),
            display_name: self.display_name.as_deref().and_then(normalize_display_name),
        }
    }

    pub fn get(&self, field: IdentityField) -> Option<&str> {
        match field {
            IdentityField::NationalId => self.national_id.as_deref(),
            IdentityField::PhoneNumber => self.phone_number.as_deref(),
            IdentityField::VoucherNumber => self.voucher_number.as_deref(),
            IdentityField::DisplayName => self.display_name.as_deref(),
        }
    }
}

/// 用于台账匹配的身份键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey {
    pub field: IdentityField,
    pub value: String,
}

impl IdentityKey {
    /// 台账中的去重键 "<field>:<value>"
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.field, self.value)
    }
}

/// 登记请求 (不抽奖)
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RegistrationRequest {
    #[serde(flatten)]
    pub identity: Identity,
    /// 登记所在门店 (可选)
    #[serde(default)]
    pub store_id: Option<i64>,
}
