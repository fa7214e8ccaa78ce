//! 跨链自定义谓词检查
//!
//! 每个钱包独立调用谓词，第一个返回 true 的钱包胜出，其余查询随之丢弃。
//! 查询失败与谓词返回 false 在这一层不做区分。

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::warn;

use crate::models::Address;
use crate::provider::ChainProvider;

pub(super) async fn evaluate(
    provider: &dyn ChainProvider,
    contract: Address,
    wallets: &[Address],
    params: Vec<u8>,
) -> Address {
    let mut pending: FuturesUnordered<_> = wallets
        .iter()
        .map(|wallet| {
            let params = params.clone();
            async move {
                let entitled = provider.is_entitled(contract, *wallet, params).await;
                (*wallet, entitled)
            }
        })
        .collect();

    while let Some((wallet, entitled)) = pending.next().await {
        match entitled {
            Ok(true) => return wallet,
            Ok(false) => {}
            Err(e) => {
                warn!(wallet = ?wallet, contract = ?contract, error = %e, "谓词查询失败，视为无权限");
            }
        }
    }

    Address::zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockChainProvider, ProviderError};

    #[tokio::test]
    async fn test_first_true_wins() {
        let mut provider = MockChainProvider::new();
        provider
            .expect_is_entitled()
            .withf(|_, _, params| params == &vec![0xaa])
            .returning(|_, wallet, _| Ok(wallet == Address::repeat_byte(2)));

        let wallets = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let result = evaluate(&provider, Address::repeat_byte(9), &wallets, vec![0xaa]).await;
        assert_eq!(result, Address::repeat_byte(2));
    }

    #[tokio::test]
    async fn test_errors_and_false_resolve_to_zero() {
        let mut provider = MockChainProvider::new();
        provider.expect_is_entitled().returning(|_, wallet, _| {
            if wallet == Address::repeat_byte(1) {
                Err(ProviderError::InvalidResponse("0x".to_string()))
            } else {
                Ok(false)
            }
        });

        let wallets = [Address::repeat_byte(1), Address::repeat_byte(2)];
        let result = evaluate(&provider, Address::repeat_byte(9), &wallets, vec![]).await;
        assert!(result.is_zero());
    }
}
