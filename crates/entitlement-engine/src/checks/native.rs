//! 原生币余额检查
//!
//! 每个钱包的余额是其在所有配置链上余额之和，再按常规规则跨钱包累加。

use futures::future::join_all;
use primitive_types::U256;
use std::sync::Arc;
use tracing::warn;

use super::first_entitled_wallet;
use crate::models::Address;
use crate::provider::ChainProvider;

pub(super) async fn evaluate(
    providers: &[(u64, Arc<dyn ChainProvider>)],
    wallets: &[Address],
    threshold: U256,
) -> Address {
    let queries = wallets.iter().flat_map(|wallet| {
        providers.iter().map(move |(chain_id, provider)| async move {
            match provider.native_balance(*wallet).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!(
                        chain_id = *chain_id,
                        wallet = ?wallet,
                        error = %e,
                        "查询原生币余额失败，按零余额处理"
                    );
                    U256::zero()
                }
            }
        })
    });
    let results = join_all(queries).await;

    // 结果按 (钱包, 链) 顺序排列
    let balances: Vec<U256> = if providers.is_empty() {
        vec![U256::zero(); wallets.len()]
    } else {
        results
            .chunks(providers.len())
            .map(|per_chain| {
                per_chain
                    .iter()
                    .fold(U256::zero(), |acc, b| acc.saturating_add(*b))
            })
            .collect()
    };

    first_entitled_wallet(wallets, &balances, threshold)
}
