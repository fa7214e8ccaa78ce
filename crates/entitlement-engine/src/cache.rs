//! 权限结果缓存
//!
//! 正向（有权限）和负向（无权限）结果分别存放在两个独立的 LRU 中，各自拥有容量与 TTL。
//! 负向结果通常只缓存几秒，使链上状态变化能尽快生效。

use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

use entitlement_shared::config::EntitlementCacheConfig;
use entitlement_shared::observability::metrics::record_cache_lookup;

use crate::models::Address;

/// 判断缓存值应进入哪个分区
pub trait CacheResult {
    fn is_positive(&self) -> bool;
}

impl CacheResult for bool {
    fn is_positive(&self) -> bool {
        *self
    }
}

impl CacheResult for Address {
    fn is_positive(&self) -> bool {
        !self.is_zero()
    }
}

struct TtlStore<V> {
    entries: LruCache<String, (V, Instant)>,
    ttl: Duration,
}

impl<V: Clone> TtlStore<V> {
    fn new(size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// 命中且未过期时返回值，过期条目顺带移除
    fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some((value, inserted_at)) if inserted_at.elapsed() < self.ttl => {
                return Some(value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.pop(key);
        }
        None
    }

    fn put(&mut self, key: String, value: V) {
        self.entries.put(key, (value, Instant::now()));
    }
}

/// 分区 TTL 缓存
pub struct EntitlementCache<V> {
    positive: Mutex<TtlStore<V>>,
    negative: Mutex<TtlStore<V>>,
}

impl<V: Clone + CacheResult> EntitlementCache<V> {
    pub fn new(config: &EntitlementCacheConfig) -> Self {
        let config = config.or_defaults();
        Self {
            positive: Mutex::new(TtlStore::new(
                config.positive_size,
                Duration::from_secs(config.positive_ttl_seconds),
            )),
            negative: Mutex::new(TtlStore::new(
                config.negative_size,
                Duration::from_secs(config.negative_ttl_seconds),
            )),
        }
    }

    /// 以任意精度的 TTL 构建，主要用于测试
    pub fn with_ttls(
        positive_size: usize,
        positive_ttl: Duration,
        negative_size: usize,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            positive: Mutex::new(TtlStore::new(positive_size, positive_ttl)),
            negative: Mutex::new(TtlStore::new(negative_size, negative_ttl)),
        }
    }

    /// 先查缓存，未命中时调用 `on_miss` 计算并按结果写入对应分区
    ///
    /// 返回 `(值, 是否命中)`。`on_miss` 的错误原样返回且不缓存。
    /// 同一个 key 的并发未命中会各自计算一次。
    pub async fn execute_using_cache<F, Fut, E>(&self, key: &str, on_miss: F) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(key) {
            return Ok((value, true));
        }

        let value = on_miss().await?;
        if value.is_positive() {
            self.positive.lock().put(key.to_string(), value.clone());
        } else {
            self.negative.lock().put(key.to_string(), value.clone());
        }
        debug!(key, positive = value.is_positive(), "权限结果已写入缓存");
        Ok((value, false))
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let positive = self.positive.lock().get(key);
        record_cache_lookup("positive", positive.is_some());
        if positive.is_some() {
            return positive;
        }

        let negative = self.negative.lock().get(key);
        record_cache_lookup("negative", negative.is_some());
        negative
    }

    /// 从两个分区同时移除
    pub fn bust(&self, key: &str) {
        self.positive.lock().entries.pop(key);
        self.negative.lock().entries.pop(key);
    }

    /// 当前条目数（含尚未被清理的过期条目）
    pub fn len(&self) -> usize {
        self.positive.lock().entries.len() + self.negative.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + CacheResult> Default for EntitlementCache<V> {
    fn default() -> Self {
        Self::new(&EntitlementCacheConfig::default())
    }
}
