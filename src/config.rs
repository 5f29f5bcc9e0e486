use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;

use crate::error::{AppError, AppResult};
use crate::models::IdentityField;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// 领奖事务等待行锁的超时时间 (毫秒)
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 每个身份在同一活动内的领取上限
    #[serde(default = "default_claim_limit")]
    pub claim_limit: u32,
    /// 身份字段匹配优先级 (高 -> 低)
    #[serde(default = "default_identity_priority")]
    pub identity_priority: Vec<IdentityField>,
    /// 台账记录含有这些字段时，不参与姓名兜底匹配
    #[serde(default = "default_weak_match_excludes")]
    pub weak_match_excludes: Vec<IdentityField>,
    /// StockLost 后调用方重新发起的次数
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            claim_limit: default_claim_limit(),
            identity_priority: default_identity_priority(),
            weak_match_excludes: default_weak_match_excludes(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_claim_limit() -> u32 {
    1
}

fn default_identity_priority() -> Vec<IdentityField> {
    vec![
        IdentityField::NationalId,
        IdentityField::PhoneNumber,
        IdentityField::VoucherNumber,
        IdentityField::DisplayName,
    ]
}

fn default_weak_match_excludes() -> Vec<IdentityField> {
    vec![IdentityField::NationalId, IdentityField::PhoneNumber]
}

fn default_retry_attempts() -> u32 {
    3
}

fn parse_field_list(raw: &str) -> AppResult<Vec<IdentityField>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<IdentityField>().map_err(AppError::ConfigError))
        .collect()
}

impl EngineConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.claim_limit == 0 {
            return Err(AppError::ConfigError("claim_limit must be at least 1".into()));
        }
        if self.identity_priority.is_empty() {
            return Err(AppError::ConfigError(
                "identity_priority must name at least one field".into(),
            ));
        }
        let mut seen = HashSet::new();
        for field in &self.identity_priority {
            if !seen.insert(field) {
                return Err(AppError::ConfigError(format!(
                    "identity_priority lists {field} more than once"
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 数据库 URL 在无配置文件时必须提供
                let database_url = env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(
                        "DATABASE_URL is not set and config.toml was not found".into(),
                    )
                })?;

                Config {
                    server: ServerConfig {
                        host: "0.0.0.0".to_string(),
                        port: 8080,
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: 10,
                        lock_timeout_ms: default_lock_timeout_ms(),
                    },
                    engine: EngineConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "failed to read config file {config_path}: {e}"
                )));
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        config.apply_env_overrides()?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn parse(config_str: &str) -> AppResult<Self> {
        toml::from_str(config_str)
            .map_err(|e| AppError::ConfigError(format!("failed to parse config file: {e}")))
    }

    fn apply_env_overrides(&mut self) -> AppResult<()> {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("DB_LOCK_TIMEOUT_MS")
            && let Ok(ms) = v.parse()
        {
            self.database.lock_timeout_ms = ms;
        }
        if let Ok(v) = env::var("ENGINE_CLAIM_LIMIT")
            && let Ok(n) = v.parse()
        {
            self.engine.claim_limit = n;
        }
        if let Ok(v) = env::var("ENGINE_IDENTITY_PRIORITY") {
            self.engine.identity_priority = parse_field_list(&v)?;
        }
        if let Ok(v) = env::var("ENGINE_RETRY_ATTEMPTS")
            && let Ok(n) = v.parse()
        {
            self.engine.retry_attempts = n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_engine_defaults() {
        let config = Config::parse(
            r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "postgres://localhost/prizes"
max_connections = 4
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.lock_timeout_ms, 5000);
        assert_eq!(config.engine.claim_limit, 1);
        assert_eq!(config.engine.identity_priority, default_identity_priority());
        assert_eq!(config.engine.retry_attempts, 3);
        assert!(config.engine.validate().is_ok());
    }

    #[test]
    fn test_parse_engine_section() {
        let config = Config::parse(
            r#"
[server]
host = "0.0.0.0"
port = 8080

[database]
url = "postgres://localhost/prizes"
max_connections = 10

[engine]
claim_limit = 2
identity_priority = ["phone_number", "display_name"]
weak_match_excludes = ["phone_number"]
"#,
        )
        .unwrap();
        assert_eq!(config.engine.claim_limit, 2);
        assert_eq!(
            config.engine.identity_priority,
            vec![IdentityField::PhoneNumber, IdentityField::DisplayName]
        );
        assert_eq!(
            config.engine.weak_match_excludes,
            vec![IdentityField::PhoneNumber]
        );
    }

    #[test]
    fn test_validate_rejects_bad_engine_config() {
        let zero_limit = EngineConfig {
            claim_limit: 0,
            ..EngineConfig::default()
        };
        assert!(zero_limit.validate().is_err());

        let empty = EngineConfig {
            identity_priority: vec![],
            ..EngineConfig::default()
        };
        assert!(empty.validate().is_err());

        let duplicated = EngineConfig {
            identity_priority: vec![IdentityField::PhoneNumber, IdentityField::PhoneNumber],
            ..EngineConfig::default()
        };
        assert!(duplicated.validate().is_err());
    }

    #[test]
    fn test_parse_field_list() {
        assert_eq!(
            parse_field_list("national_id, display_name").unwrap(),
            vec![IdentityField::NationalId, IdentityField::DisplayName]
        );
        assert!(parse_field_list("national_id,email").is_err());
    }
}
