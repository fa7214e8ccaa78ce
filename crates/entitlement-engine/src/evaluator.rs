//! 规则评估器
//!
//! 并发评估 AND/OR 的两个子节点并尽早短路：
//! - AND：任一子节点为零地址即取消另一侧并返回零地址；两侧都成功时返回左侧钱包
//! - OR：任一子节点返回非零钱包即取消另一侧并返回该钱包；两侧都为零才返回零地址
//!
//! 每层递归都从调用方令牌派生子令牌。AND/OR 另外创建一个独立的中断信号，
//! 用于放弃落败的一侧，而不必触发调用方自己的取消。被中断的分支返回零地址，不报错。

use futures::future::{BoxFuture, FutureExt, try_join};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use entitlement_shared::ChainConfig;
use entitlement_shared::observability::metrics::record_evaluation;

use crate::cancel::CancellationToken;
use crate::checks::CheckExecutor;
use crate::error::{EntitlementError, Result};
use crate::models::{Address, LogicalOperation, Operation};
use crate::operators::LogicalKind;
use crate::provider::ProviderRegistry;
use crate::rpc::JsonRpcProviderRegistry;

/// 规则评估器
#[derive(Clone)]
pub struct Evaluator {
    executor: CheckExecutor,
}

impl Evaluator {
    pub fn new(registry: Arc<dyn ProviderRegistry>, native_coin_chain_ids: Vec<u64>) -> Self {
        Self {
            executor: CheckExecutor::new(registry, native_coin_chain_ids),
        }
    }

    /// 按链配置创建基于 JSON-RPC 的评估器
    pub fn from_chain_config(config: &ChainConfig) -> Result<Self> {
        let registry = JsonRpcProviderRegistry::from_config(config)?;
        Ok(Self::new(
            Arc::new(registry),
            config.native_coin_chain_ids.clone(),
        ))
    }

    /// 评估规则树，返回满足规则的钱包或零地址
    #[instrument(skip(self, cancel, wallets, root), fields(wallets = wallets.len(), nodes = root.node_count()))]
    pub async fn evaluate(
        &self,
        cancel: &CancellationToken,
        wallets: &[Address],
        root: &Operation,
    ) -> Result<Address> {
        let start = Instant::now();
        let scope = cancel.child_token();

        let result = self.evaluate_node(&scope, wallets, root).await;
        // 返回前确保没有遗留的链上查询
        scope.cancel();

        let elapsed = start.elapsed();
        match &result {
            Ok(wallet) if !wallet.is_zero() => {
                record_evaluation("entitled", elapsed.as_secs_f64());
                info!(wallet = ?wallet, elapsed_ms = elapsed.as_millis() as u64, "权限评估通过");
            }
            Ok(_) => {
                record_evaluation("not_entitled", elapsed.as_secs_f64());
                info!(elapsed_ms = elapsed.as_millis() as u64, "权限评估未通过");
            }
            Err(e) => {
                record_evaluation("error", elapsed.as_secs_f64());
                warn!(error = %e, "权限评估失败");
            }
        }
        result
    }

    /// 评估按后序排列的操作列表，最后一个元素为根；空列表视为未定义的根
    pub async fn evaluate_operations(
        &self,
        cancel: &CancellationToken,
        wallets: &[Address],
        operations: &[Operation],
    ) -> Result<Address> {
        match operations.last() {
            Some(root) => self.evaluate(cancel, wallets, root).await,
            None => Ok(Address::zero()),
        }
    }

    /// 并发评估多个候选规则（如新旧两种编码），第一个非零钱包胜出并取消其余评估
    ///
    /// 所有候选都只是"无权限"时返回零地址；没有候选成功且存在运行时错误时返回错误。
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn evaluate_candidates(
        &self,
        cancel: &CancellationToken,
        wallets: &[Address],
        candidates: &[Operation],
    ) -> Result<Address> {
        let scope = cancel.child_token();
        let scope_ref = &scope;

        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .map(|candidate| async move { self.evaluate(scope_ref, wallets, candidate).await })
            .collect();

        let mut errors = Vec::new();
        while let Some(result) = pending.next().await {
            match result {
                Ok(wallet) if !wallet.is_zero() => {
                    scope.cancel();
                    return Ok(wallet);
                }
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
        drop(pending);
        scope.cancel();

        match errors.len() {
            0 => Ok(Address::zero()),
            1 => Err(errors.remove(0)),
            _ => Err(EntitlementError::Aggregate(errors)),
        }
    }

    fn evaluate_node<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        wallets: &'a [Address],
        op: &'a Operation,
    ) -> BoxFuture<'a, Result<Address>> {
        async move {
            let scope = cancel.child_token();
            match op {
                Operation::Noop => {
                    scope.cancel();
                    Ok(Address::zero())
                }
                Operation::Check(check) => self.executor.execute(&scope, wallets, check).await,
                Operation::And(logical) => {
                    self.evaluate_logical(&scope, wallets, LogicalKind::And, logical)
                        .await
                }
                Operation::Or(logical) => {
                    self.evaluate_logical(&scope, wallets, LogicalKind::Or, logical)
                        .await
                }
            }
        }
        .boxed()
    }

    async fn evaluate_logical(
        &self,
        scope: &CancellationToken,
        wallets: &[Address],
        kind: LogicalKind,
        op: &LogicalOperation,
    ) -> Result<Address> {
        let interrupt = CancellationToken::new();

        let (left, right) = try_join(
            self.race(scope, &interrupt, wallets, kind, &op.left),
            self.race(scope, &interrupt, wallets, kind, &op.right),
        )
        .await?;

        Ok(match kind {
            LogicalKind::And if left.is_zero() || right.is_zero() => Address::zero(),
            LogicalKind::And => left,
            LogicalKind::Or if !left.is_zero() => left,
            LogicalKind::Or => right,
        })
    }

    /// 评估一侧子节点，同时监听中断信号
    ///
    /// 本侧结果已能决定整个组合的结果（AND 为零、OR 非零）或出错时，
    /// 取消作用域并中断另一侧。
    async fn race(
        &self,
        scope: &CancellationToken,
        interrupt: &CancellationToken,
        wallets: &[Address],
        kind: LogicalKind,
        child: &Operation,
    ) -> Result<Address> {
        let outcome = tokio::select! {
            biased;
            _ = interrupt.cancelled() => return Ok(Address::zero()),
            outcome = self.evaluate_node(scope, wallets, child) => outcome,
        };

        let decisive = match (&outcome, kind) {
            (Err(_), _) => true,
            (Ok(wallet), LogicalKind::And) => wallet.is_zero(),
            (Ok(wallet), LogicalKind::Or) => !wallet.is_zero(),
        };
        if decisive {
            scope.cancel();
            interrupt.cancel();
        }
        outcome
    }
}
