//! 指标模块
//!
//! 基于 metrics 门面记录权限评估相关指标。未安装 recorder 时所有调用都是空操作。

/// 权限评估总次数，标签 result = entitled | not_entitled | error
pub const EVALUATIONS_TOTAL: &str = "entitlement_evaluations_total";
/// 权限评估耗时
pub const EVALUATION_DURATION_SECONDS: &str = "entitlement_evaluation_duration_seconds";
/// 单个链上检查耗时，标签 kind
pub const CHECK_DURATION_SECONDS: &str = "entitlement_check_duration_seconds";
/// 缓存查询次数，标签 cache = positive | negative，result = hit | miss
pub const CACHE_LOOKUPS_TOTAL: &str = "entitlement_cache_lookups_total";

/// 注册指标描述
pub fn describe() {
    metrics::describe_counter!(EVALUATIONS_TOTAL, "Total number of entitlement evaluations");
    metrics::describe_histogram!(
        EVALUATION_DURATION_SECONDS,
        "Entitlement evaluation duration in seconds"
    );
    metrics::describe_histogram!(
        CHECK_DURATION_SECONDS,
        "On-chain check duration in seconds"
    );
    metrics::describe_counter!(
        CACHE_LOOKUPS_TOTAL,
        "Total number of entitlement cache lookups"
    );
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次权限评估
#[inline]
pub fn record_evaluation(result: &'static str, duration_secs: f64) {
    metrics::counter!(EVALUATIONS_TOTAL, "result" => result).increment(1);
    metrics::histogram!(EVALUATION_DURATION_SECONDS).record(duration_secs);
}

/// 记录一次链上检查
#[inline]
pub fn record_check(kind: &'static str, duration_secs: f64) {
    metrics::histogram!(CHECK_DURATION_SECONDS, "kind" => kind).record(duration_secs);
}

/// 记录一次缓存查询
#[inline]
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!(CACHE_LOOKUPS_TOTAL, "cache" => cache, "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder() {
        describe();
        record_evaluation("entitled", 0.01);
        record_evaluation("not_entitled", 0.5);
        record_check("erc20", 0.02);
        record_cache_lookup("positive", true);
        record_cache_lookup("none", false);
    }
}
