use crate::config::EngineConfig;
use crate::database::ClaimMatcher;
use crate::error::{AppError, AppResult};
use crate::models::{Identity, IdentityField, IdentityKey};

/// 单个身份匹配规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRule {
    pub field: IdentityField,
    /// 台账记录含有这些字段时不参与本规则匹配
    pub exclude_rows_with: Vec<IdentityField>,
}

/// 身份匹配策略: 按优先级取请求中第一个存在的字段作为匹配键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPolicy {
    rules: Vec<IdentityRule>,
    claim_limit: u32,
}

/// 规范化后的身份以及用于台账匹配的条件
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    pub matcher: ClaimMatcher,
}

impl ResolvedIdentity {
    pub fn dedup_key(&self) -> String {
        self.matcher.key.dedup_key()
    }
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        // EngineConfig 默认值总是合法的
        Self::build(&EngineConfig::default())
    }
}

impl IdentityPolicy {
    pub fn from_config(config: &EngineConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &EngineConfig) -> Self {
        let rules = config
            .identity_priority
            .iter()
            .map(|&field| IdentityRule {
                field,
                // 姓名兜底只匹配没有强身份字段的旧记录
                exclude_rows_with: if field == IdentityField::DisplayName {
                    config
                        .weak_match_excludes
                        .iter()
                        .copied()
                        .filter(|f| *f != IdentityField::DisplayName)
                        .collect()
                } else {
                    Vec::new()
                },
            })
            .collect();
        Self {
            rules,
            claim_limit: config.claim_limit,
        }
    }

    pub fn claim_limit(&self) -> u32 {
        self.claim_limit
    }

    /// 规范化身份并按优先级选出匹配键；不会退而匹配更低优先级的字段
    pub fn resolve(&self, identity: &Identity) -> AppResult<ResolvedIdentity> {
        let identity = identity.normalized();
        let rule = self
            .rules
            .iter()
            .find(|r| identity.get(r.field).is_some())
            .ok_or_else(|| {
                AppError::ValidationError(
                    "At least one identity field (national_id, phone_number, voucher_number, display_name) is required".into(),
                )
            })?;

        let value = identity.get(rule.field).unwrap_or_default().to_string();
        let matcher = ClaimMatcher {
            key: IdentityKey {
                field: rule.field,
                value,
            },
            exclude_rows_with: rule.exclude_rows_with.clone(),
        };
        Ok(ResolvedIdentity { identity, matcher })
    }
}
