//! 可观测性模块集成测试
//!
//! 测试指标记录与配置加载的核心功能。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use entitlement_shared::observability::metrics::{
        describe, record_cache_lookup, record_check, record_evaluation,
    };

    #[test]
    fn test_record_evaluation() {
        describe();
        record_evaluation("entitled", 0.01);
        record_evaluation("not_entitled", 0.2);
        record_evaluation("error", 0.001);
    }

    #[test]
    fn test_record_check_kinds() {
        for kind in ["mock", "erc20", "erc721", "erc1155", "native_balance", "cross_chain"] {
            record_check(kind, 0.05);
        }
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        // 极端持续时间
        record_check("erc20", 999.99);
        record_evaluation("entitled", 0.000001);
        record_cache_lookup("positive", true);
        record_cache_lookup("negative", true);
        record_cache_lookup("negative", false);
    }
}

// ============================================================================
// 配置测试
// ============================================================================

mod config_tests {
    use entitlement_shared::{AppConfig, ObservabilityConfig};

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = std::env::temp_dir().join("entitlement-config-missing-dir");
        let config =
            AppConfig::load_from(dir.to_str().unwrap(), "entitlement-engine", "development")
                .unwrap();

        assert_eq!(config.service_name, "entitlement-engine");
        assert!(!config.is_production());
        assert_eq!(config.cache.negative_ttl_seconds, 2);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_observability_from_env_defaults() {
        let config = ObservabilityConfig::from_env("entitlement-engine");
        assert_eq!(config.service_name, "entitlement-engine");
    }
}
