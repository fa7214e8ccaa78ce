//! ERC20 / ERC721 / ERC1155 持有量检查

use futures::future::join_all;
use primitive_types::U256;
use tracing::warn;

use super::first_entitled_wallet;
use crate::models::Address;
use crate::provider::{ChainProvider, ProviderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TokenQuery {
    Erc20 { contract: Address },
    Erc721 { contract: Address },
    Erc1155 { contract: Address, token_id: U256 },
}

impl TokenQuery {
    fn label(&self) -> &'static str {
        match self {
            Self::Erc20 { .. } => "ERC20",
            Self::Erc721 { .. } => "ERC721",
            Self::Erc1155 { .. } => "ERC1155",
        }
    }

    async fn balance(&self, provider: &dyn ChainProvider, wallet: Address) -> ProviderResult<U256> {
        match *self {
            Self::Erc20 { contract } => provider.erc20_balance(contract, wallet).await,
            Self::Erc721 { contract } => provider.erc721_balance(contract, wallet).await,
            Self::Erc1155 { contract, token_id } => {
                provider.erc1155_balance(contract, wallet, token_id).await
            }
        }
    }
}

/// 并发查询所有钱包，累计余额后与阈值比较
pub(super) async fn evaluate(
    provider: &dyn ChainProvider,
    query: TokenQuery,
    wallets: &[Address],
    threshold: U256,
) -> Address {
    let balances = join_all(wallets.iter().map(|wallet| async move {
        match query.balance(provider, *wallet).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(
                    kind = query.label(),
                    wallet = ?wallet,
                    error = %e,
                    "查询钱包余额失败，按零余额处理"
                );
                U256::zero()
            }
        }
    }))
    .await;

    first_entitled_wallet(wallets, &balances, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockChainProvider, ProviderError};

    #[tokio::test]
    async fn test_balances_accumulate_across_wallets() {
        let mut provider = MockChainProvider::new();
        provider.expect_erc20_balance().returning(|_, wallet| {
            if wallet == Address::repeat_byte(1) {
                Ok(U256::from(15u64))
            } else {
                Ok(U256::from(10u64))
            }
        });

        let wallets = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let query = TokenQuery::Erc20 {
            contract: Address::repeat_byte(9),
        };

        assert_eq!(
            evaluate(&provider, query, &wallets, U256::from(25u64)).await,
            Address::repeat_byte(1)
        );
        assert!(evaluate(&provider, query, &wallets, U256::from(26u64))
            .await
            .is_zero());
    }

    #[tokio::test]
    async fn test_failed_wallet_counts_as_zero() {
        let mut provider = MockChainProvider::new();
        provider.expect_erc721_balance().returning(|_, wallet| {
            if wallet == Address::repeat_byte(1) {
                Err(ProviderError::Transport("connection reset".to_string()))
            } else {
                Ok(U256::one())
            }
        });

        let wallets = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let query = TokenQuery::Erc721 {
            contract: Address::repeat_byte(9),
        };

        // 第一个钱包查询失败不影响第二个钱包
        assert_eq!(
            evaluate(&provider, query, &wallets, U256::one()).await,
            Address::repeat_byte(2)
        );
        assert!(evaluate(&provider, query, &wallets, U256::from(2u64))
            .await
            .is_zero());
    }
}
