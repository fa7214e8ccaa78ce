//! 链上检查执行器
//!
//! 每种检查在发起任何网络请求之前先校验参数，校验失败直接返回错误，
//! 绝不当作"无权限"。通过校验后对所有钱包并发查询，单个钱包查询失败按零余额处理。

mod mock;
mod native;
mod predicate;
mod token;

use primitive_types::U256;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use entitlement_shared::observability::metrics::record_check;

use crate::cancel::CancellationToken;
use crate::error::{EntitlementError, Result};
use crate::models::{Address, CheckOperation};
use crate::operators::CheckKind;
use crate::provider::{ChainProvider, ProviderRegistry};

use token::TokenQuery;

/// 校验通过后的检查参数
#[derive(Debug, Clone, PartialEq, Eq)]
enum ValidatedCheck {
    Mock {
        chain_id: u64,
        delay_ms: u64,
    },
    Token {
        chain_id: u64,
        query: TokenQuery,
        threshold: U256,
    },
    NativeBalance {
        threshold: U256,
    },
    CrossChainPredicate {
        chain_id: u64,
        contract: Address,
        params: Vec<u8>,
    },
}

fn validate(op: &CheckOperation) -> Result<ValidatedCheck> {
    let kind = op.kind;
    if kind != CheckKind::NativeBalance && op.chain_id < 0 {
        return Err(EntitlementError::invalid_check(kind, "chain id"));
    }
    if kind.requires_contract() && op.contract_address.is_zero() {
        return Err(EntitlementError::invalid_check(kind, "contract address"));
    }
    let chain_id = op.chain_id.max(0) as u64;

    let positive_threshold = |threshold: U256| {
        if threshold.is_zero() {
            Err(EntitlementError::invalid_check(kind, "threshold"))
        } else {
            Ok(threshold)
        }
    };

    let validated = match kind {
        CheckKind::Mock => {
            let delay = op.threshold_params()?.threshold;
            ValidatedCheck::Mock {
                chain_id,
                delay_ms: if delay > U256::from(u64::MAX) {
                    u64::MAX
                } else {
                    delay.low_u64()
                },
            }
        }
        CheckKind::Erc20 => ValidatedCheck::Token {
            chain_id,
            query: TokenQuery::Erc20 {
                contract: op.contract_address,
            },
            threshold: positive_threshold(op.threshold_params()?.threshold)?,
        },
        CheckKind::Erc721 => ValidatedCheck::Token {
            chain_id,
            query: TokenQuery::Erc721 {
                contract: op.contract_address,
            },
            threshold: positive_threshold(op.threshold_params()?.threshold)?,
        },
        CheckKind::Erc1155 => {
            let params = op.erc1155_params()?;
            ValidatedCheck::Token {
                chain_id,
                query: TokenQuery::Erc1155 {
                    contract: op.contract_address,
                    token_id: params.token_id,
                },
                threshold: positive_threshold(params.threshold)?,
            }
        }
        CheckKind::NativeBalance => ValidatedCheck::NativeBalance {
            threshold: positive_threshold(op.threshold_params()?.threshold)?,
        },
        CheckKind::CrossChainPredicate => ValidatedCheck::CrossChainPredicate {
            chain_id,
            contract: op.contract_address,
            params: op.params.clone(),
        },
    };
    Ok(validated)
}

/// 检查执行器
///
/// 持有按链 ID 解析 provider 的注册表，以及原生币余额需要聚合的链列表。
#[derive(Clone)]
pub struct CheckExecutor {
    registry: Arc<dyn ProviderRegistry>,
    native_coin_chain_ids: Vec<u64>,
}

impl CheckExecutor {
    pub fn new(registry: Arc<dyn ProviderRegistry>, native_coin_chain_ids: Vec<u64>) -> Self {
        Self {
            registry,
            native_coin_chain_ids,
        }
    }

    pub fn native_coin_chain_ids(&self) -> &[u64] {
        &self.native_coin_chain_ids
    }

    fn provider(&self, chain_id: u64) -> Result<Arc<dyn ChainProvider>> {
        self.registry
            .provider(chain_id)
            .ok_or(EntitlementError::UnknownChain(chain_id))
    }

    /// 执行单个检查，返回满足条件的钱包或零地址
    ///
    /// 令牌被取消时立即返回零地址，未完成的链上查询随 future 一起丢弃。
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        wallets: &[Address],
        op: &CheckOperation,
    ) -> Result<Address> {
        let check = validate(op)?;
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Address::zero()),
            result = self.dispatch(cancel, wallets, check) => result,
        };

        record_check(op.kind.as_label(), start.elapsed().as_secs_f64());
        debug!(
            kind = %op.kind,
            chain_id = op.chain_id,
            entitled = matches!(&result, Ok(wallet) if !wallet.is_zero()),
            "链上检查完成"
        );
        result
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        wallets: &[Address],
        check: ValidatedCheck,
    ) -> Result<Address> {
        match check {
            ValidatedCheck::Mock { chain_id, delay_ms } => {
                Ok(mock::evaluate(cancel, chain_id, delay_ms).await)
            }
            ValidatedCheck::Token {
                chain_id,
                query,
                threshold,
            } => {
                let provider = self.provider(chain_id)?;
                Ok(token::evaluate(provider.as_ref(), query, wallets, threshold).await)
            }
            ValidatedCheck::NativeBalance { threshold } => {
                let providers = self
                    .native_coin_chain_ids
                    .iter()
                    .map(|chain_id| Ok((*chain_id, self.provider(*chain_id)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(native::evaluate(&providers, wallets, threshold).await)
            }
            ValidatedCheck::CrossChainPredicate {
                chain_id,
                contract,
                params,
            } => {
                let provider = self.provider(chain_id)?;
                Ok(predicate::evaluate(provider.as_ref(), contract, wallets, params).await)
            }
        }
    }
}

/// 汇总各钱包余额
///
/// 只累加大于零的余额；总和达到阈值时返回输入顺序中第一个持有非零余额的钱包，
/// 不一定是使总和越过阈值的那个。
pub(crate) fn first_entitled_wallet(
    wallets: &[Address],
    balances: &[U256],
    threshold: U256,
) -> Address {
    let mut total = U256::zero();
    let mut first = None;
    for (wallet, balance) in wallets.iter().zip(balances) {
        if balance.is_zero() {
            continue;
        }
        total = total.saturating_add(*balance);
        first.get_or_insert(*wallet);
    }

    match first {
        Some(wallet) if total >= threshold => wallet,
        _ => Address::zero(),
    }
}
