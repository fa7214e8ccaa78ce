//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 单条链的 RPC 端点描述
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChainEndpoint {
    pub rpc_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// 链配置
///
/// `endpoints` 以十进制链 ID 字符串为键（TOML 表的键只能是字符串），
/// `native_coin_chain_ids` 列出原生币余额检查时需要聚合的链。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChainConfig {
    #[serde(default)]
    pub endpoints: HashMap<String, ChainEndpoint>,
    #[serde(default)]
    pub native_coin_chain_ids: Vec<u64>,
}

impl ChainConfig {
    /// 按链 ID 查找端点
    pub fn endpoint(&self, chain_id: u64) -> Option<&ChainEndpoint> {
        self.endpoints.get(&chain_id.to_string())
    }

    /// 已配置的链 ID（解析失败的键会被忽略）
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .endpoints
            .keys()
            .filter_map(|k| k.parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// 权限结果缓存配置
///
/// 正向（有权限）结果与负向（无权限）结果分别设置容量和 TTL。
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EntitlementCacheConfig {
    pub positive_size: usize,
    pub positive_ttl_seconds: u64,
    pub negative_size: usize,
    pub negative_ttl_seconds: u64,
}

impl Default for EntitlementCacheConfig {
    fn default() -> Self {
        Self {
            positive_size: 10_000,
            positive_ttl_seconds: 15 * 60,
            negative_size: 10_000,
            negative_ttl_seconds: 2,
        }
    }
}

impl EntitlementCacheConfig {
    /// 为零的容量或 TTL 回退到默认值
    pub fn or_defaults(&self) -> Self {
        fn non_zero<T: Default + PartialEq>(value: T, default: T) -> T {
            if value == T::default() { default } else { value }
        }

        let defaults = Self::default();
        Self {
            positive_size: non_zero(self.positive_size, defaults.positive_size),
            positive_ttl_seconds: non_zero(self.positive_ttl_seconds, defaults.positive_ttl_seconds),
            negative_size: non_zero(self.negative_size, defaults.negative_size),
            negative_ttl_seconds: non_zero(self.negative_ttl_seconds, defaults.negative_ttl_seconds),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub chains: ChainConfig,
    #[serde(default)]
    pub cache: EntitlementCacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（ENTITLEMENT_ 前缀，如 ENTITLEMENT_CACHE__NEGATIVE_TTL_SECONDS -> cache.negative_ttl_seconds）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("ENTITLEMENT_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(&config_dir, service_name, &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: &str, service_name: &str, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(Path::new(config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            // 字段名本身包含下划线，层级分隔符使用双下划线
            .add_source(
                Environment::with_prefix("ENTITLEMENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
