//! 测试工具模块
//!
//! 提供不依赖真实链节点的内存 provider，以及集成测试与基准测试常用的数据生成器。

use async_trait::async_trait;
use primitive_types::U256;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Address, CheckOperation};
use crate::provider::{ChainProvider, ProviderError, ProviderResult, StaticProviderRegistry};

// ==================== 内存 Provider ====================

/// 预设余额的内存 provider
///
/// 未预设的查询返回零余额；`failing` 中的钱包所有查询都返回传输错误。
#[derive(Debug, Default)]
pub struct StaticChainProvider {
    token_balances: HashMap<(Address, Address), U256>,
    erc1155_balances: HashMap<(Address, Address, U256), U256>,
    native_balances: HashMap<Address, U256>,
    entitled: HashSet<(Address, Address)>,
    failing: HashSet<Address>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticChainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// ERC20 与 ERC721 共用同一张余额表
    pub fn with_token_balance(mut self, contract: Address, wallet: Address, balance: u64) -> Self {
        self.token_balances
            .insert((contract, wallet), U256::from(balance));
        self
    }

    pub fn with_erc1155_balance(
        mut self,
        contract: Address,
        wallet: Address,
        token_id: u64,
        balance: u64,
    ) -> Self {
        self.erc1155_balances
            .insert((contract, wallet, U256::from(token_id)), U256::from(balance));
        self
    }

    pub fn with_native_balance(mut self, wallet: Address, balance: u64) -> Self {
        self.native_balances.insert(wallet, U256::from(balance));
        self
    }

    pub fn with_entitled(mut self, contract: Address, wallet: Address) -> Self {
        self.entitled.insert((contract, wallet));
        self
    }

    pub fn with_failing_wallet(mut self, wallet: Address) -> Self {
        self.failing.insert(wallet);
        self
    }

    /// 每次查询前固定等待
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 已收到的查询次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn before_query(&self, wallet: Address) -> ProviderResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&wallet) {
            return Err(ProviderError::Transport(format!(
                "simulated failure for {:?}",
                wallet
            )));
        }
        Ok(())
    }

    fn token_balance(&self, contract: Address, wallet: Address) -> U256 {
        self.token_balances
            .get(&(contract, wallet))
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChainProvider for StaticChainProvider {
    async fn erc20_balance(&self, contract: Address, wallet: Address) -> ProviderResult<U256> {
        self.before_query(wallet).await?;
        Ok(self.token_balance(contract, wallet))
    }

    async fn erc721_balance(&self, contract: Address, wallet: Address) -> ProviderResult<U256> {
        self.before_query(wallet).await?;
        Ok(self.token_balance(contract, wallet))
    }

    async fn erc1155_balance(
        &self,
        contract: Address,
        wallet: Address,
        token_id: U256,
    ) -> ProviderResult<U256> {
        self.before_query(wallet).await?;
        Ok(self
            .erc1155_balances
            .get(&(contract, wallet, token_id))
            .copied()
            .unwrap_or_default())
    }

    async fn native_balance(&self, wallet: Address) -> ProviderResult<U256> {
        self.before_query(wallet).await?;
        Ok(self
            .native_balances
            .get(&wallet)
            .copied()
            .unwrap_or_default())
    }

    async fn is_entitled(
        &self,
        contract: Address,
        wallet: Address,
        _params: Vec<u8>,
    ) -> ProviderResult<bool> {
        self.before_query(wallet).await?;
        Ok(self.entitled.contains(&(contract, wallet)))
    }
}

/// 单链注册表
pub fn single_chain_registry(
    chain_id: u64,
    provider: Arc<StaticChainProvider>,
) -> StaticProviderRegistry {
    StaticProviderRegistry::new().with_provider(chain_id, provider)
}

// ==================== 测试数据生成器 ====================

/// 生成 `count` 个互不相同的非零钱包地址
pub fn test_wallets(count: usize) -> Vec<Address> {
    (1..=count)
        .map(|i| Address::from_low_u64_be(0x1000 + i as u64))
        .collect()
}

/// 生成 `count` 个 mock 检查，下标为偶数的成功（链 ID 1），其余失败
pub fn mock_checks(count: usize, delay_ms: u64) -> Vec<CheckOperation> {
    (0..count)
        .map(|i| CheckOperation::mock(if i % 2 == 0 { 1 } else { 2 }, delay_ms))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_balances() {
        let contract = Address::repeat_byte(9);
        let wallets = test_wallets(2);
        let provider = StaticChainProvider::new()
            .with_token_balance(contract, wallets[0], 5)
            .with_failing_wallet(wallets[1]);

        assert_eq!(
            provider.erc20_balance(contract, wallets[0]).await.unwrap(),
            U256::from(5u64)
        );
        assert!(provider.erc721_balance(contract, wallets[1]).await.is_err());
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn test_generators() {
        let wallets = test_wallets(3);
        assert_eq!(wallets.len(), 3);
        assert!(wallets.iter().all(|w| !w.is_zero()));

        let checks = mock_checks(3, 0);
        assert_eq!(checks[0].chain_id, 1);
        assert_eq!(checks[1].chain_id, 2);
    }
}
