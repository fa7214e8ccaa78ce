//! 测试用检查：延迟后按链 ID 给出确定结果，用于验证并发与短路行为

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::models::{Address, MOCK_ADDRESS};

/// 成功的链 ID
pub(super) const MOCK_SUCCESS_CHAIN_ID: u64 = 1;

pub(super) async fn evaluate(cancel: &CancellationToken, chain_id: u64, delay_ms: u64) -> Address {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Address::zero(),
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
            if chain_id == MOCK_SUCCESS_CHAIN_ID {
                MOCK_ADDRESS
            } else {
                Address::zero()
            }
        }
    }
}
