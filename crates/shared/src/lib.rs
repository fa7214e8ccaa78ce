//! 共享库
//!
//! 包含权限引擎及其宿主进程共用的配置加载与可观测性基础设施代码。

pub mod config;
pub mod observability;

pub use config::{AppConfig, ChainConfig, ChainEndpoint, EntitlementCacheConfig};
pub use observability::ObservabilityConfig;
