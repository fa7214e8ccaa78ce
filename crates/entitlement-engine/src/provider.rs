//! 链上查询接口
//!
//! 引擎只依赖 [`ChainProvider`] 抽象：按地址查询余额、持有量或自定义谓词。
//! 具体实现（JSON-RPC、测试桩）通过 [`ProviderRegistry`] 按链 ID 注入。

use async_trait::async_trait;
use primitive_types::U256;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::Address;

/// 单次链上查询错误
///
/// 在检查执行器中按"该钱包余额为零"处理，不会中断整个评估。
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("RPC 传输失败: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC 响应无法解析: {0}")]
    InvalidResponse(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// 单条链的查询能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// ERC20 `balanceOf(address)`
    async fn erc20_balance(&self, contract: Address, wallet: Address) -> ProviderResult<U256>;

    /// ERC721 `balanceOf(address)`
    async fn erc721_balance(&self, contract: Address, wallet: Address) -> ProviderResult<U256>;

    /// ERC1155 `balanceOf(address,uint256)`
    async fn erc1155_balance(
        &self,
        contract: Address,
        wallet: Address,
        token_id: U256,
    ) -> ProviderResult<U256>;

    /// 原生币余额
    async fn native_balance(&self, wallet: Address) -> ProviderResult<U256>;

    /// 自定义合约谓词 `isEntitled(address[])`，`params` 原样透传给实现
    async fn is_entitled(
        &self,
        contract: Address,
        wallet: Address,
        params: Vec<u8>,
    ) -> ProviderResult<bool>;
}

/// 按链 ID 解析 provider
pub trait ProviderRegistry: Send + Sync {
    fn provider(&self, chain_id: u64) -> Option<Arc<dyn ChainProvider>>;
}

/// 固定映射的 provider 注册表
#[derive(Default, Clone)]
pub struct StaticProviderRegistry {
    providers: HashMap<u64, Arc<dyn ChainProvider>>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, chain_id: u64, provider: Arc<dyn ChainProvider>) -> Self {
        self.providers.insert(chain_id, provider);
        self
    }

    pub fn insert(&mut self, chain_id: u64, provider: Arc<dyn ChainProvider>) {
        self.providers.insert(chain_id, provider);
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.providers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn provider(&self, chain_id: u64) -> Option<Arc<dyn ChainProvider>> {
        self.providers.get(&chain_id).cloned()
    }
}
