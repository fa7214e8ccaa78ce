//! 权限引擎集成测试
//!
//! 覆盖编码、解码、评估、缓存的完整工作流。

use entitlement_engine::test_utils::{mock_checks, single_chain_registry, test_wallets, StaticChainProvider};
use entitlement_engine::{
    build_balanced_tree, decode, encode, flatten_checks, Address, CancellationToken,
    CheckOperation, EntitlementCache, EntitlementError, Evaluator, LogicalKind, Operation,
    RuleData, StaticProviderRegistry, MOCK_ADDRESS,
};
use primitive_types::U256;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CHAIN_ID: u64 = 8453;

fn mock_evaluator() -> Evaluator {
    Evaluator::new(Arc::new(StaticProviderRegistry::new()), vec![])
}

fn mock(success: bool, delay_ms: u64) -> Operation {
    CheckOperation::mock(if success { 1 } else { 2 }, delay_ms).into()
}

async fn timed(evaluator: &Evaluator, root: &Operation) -> (Address, Duration) {
    let start = Instant::now();
    let result = evaluator
        .evaluate(&CancellationToken::new(), &test_wallets(1), root)
        .await
        .unwrap();
    (result, start.elapsed())
}

// ==================== 编解码 ====================

#[test]
fn test_balanced_tree_survives_encoding() {
    for count in [1usize, 2, 3, 5, 8, 13] {
        let leaves = mock_checks(count, 0);
        let root = build_balanced_tree(leaves.clone(), LogicalKind::Or);

        let bytes = encode(&root).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, root, "{} 个叶子的树编解码不一致", count);
        assert_eq!(flatten_checks(&decoded), leaves);
    }
}

#[test]
fn test_flat_layout_is_postorder() {
    let root = Operation::and(mock(true, 0), Operation::or(mock(false, 0), mock(true, 0)));
    let data = RuleData::from_tree(&root).unwrap();

    assert_eq!(data.operations.len(), 5);
    assert_eq!(data.check_operations.len(), 3);
    assert_eq!(data.logical_operations.len(), 2);
    assert_eq!(data.to_tree().unwrap(), root);
}

#[test]
fn test_empty_rule_data() {
    assert_eq!(encode(&Operation::Noop).unwrap(), Vec::<u8>::new());
    assert_eq!(decode(&[]).unwrap(), Operation::Noop);
}

#[test]
fn test_malformed_rule_data_is_rejected() {
    let bytes = encode(&Operation::or(mock(true, 0), mock(false, 0))).unwrap();

    assert!(decode(&bytes[..bytes.len() - 7]).is_err());
    assert!(decode(&[0xffu8; 31]).is_err());
}

// ==================== 短路与并发 ====================

#[tokio::test]
async fn test_or_returns_with_fast_success() {
    let evaluator = mock_evaluator();
    let root = Operation::or(mock(true, 10), mock(true, 500));

    let (result, elapsed) = timed(&evaluator, &root).await;
    assert_eq!(result, MOCK_ADDRESS);
    assert!(elapsed < Duration::from_millis(250), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_or_waits_for_slow_success_after_fast_failure() {
    let evaluator = mock_evaluator();
    let root = Operation::or(mock(false, 10), mock(true, 300));

    let (result, elapsed) = timed(&evaluator, &root).await;
    assert_eq!(result, MOCK_ADDRESS);
    assert!(elapsed >= Duration::from_millis(280), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_and_returns_with_fast_failure() {
    let evaluator = mock_evaluator();
    let root = Operation::and(mock(true, 500), mock(false, 10));

    let (result, elapsed) = timed(&evaluator, &root).await;
    assert!(result.is_zero());
    assert!(elapsed < Duration::from_millis(250), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_and_waits_for_both_successes() {
    let evaluator = mock_evaluator();
    let root = Operation::and(mock(true, 10), mock(true, 500));

    let (result, elapsed) = timed(&evaluator, &root).await;
    assert_eq!(result, MOCK_ADDRESS);
    assert!(elapsed >= Duration::from_millis(480), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_children_run_concurrently() {
    let evaluator = mock_evaluator();
    let leaves: Vec<CheckOperation> = (0..8).map(|_| CheckOperation::mock(1, 100)).collect();
    let root = build_balanced_tree(leaves, LogicalKind::And);

    let (result, elapsed) = timed(&evaluator, &root).await;
    assert_eq!(result, MOCK_ADDRESS);
    assert!(elapsed < Duration::from_millis(400), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_external_timeout_cancels_evaluation() {
    let evaluator = mock_evaluator();
    let root = Operation::and(mock(true, 5_000), mock(true, 5_000));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let result = evaluator
        .evaluate(&cancel, &test_wallets(1), &root)
        .await
        .unwrap();
    assert!(result.is_zero());
    assert!(start.elapsed() < Duration::from_secs(1));
}

// ==================== 链上检查 ====================

#[tokio::test]
async fn test_erc20_threshold_boundary() {
    let contract = Address::repeat_byte(0xcc);
    let wallets = test_wallets(2);
    let provider = Arc::new(
        StaticChainProvider::new()
            .with_token_balance(contract, wallets[0], 40)
            .with_token_balance(contract, wallets[1], 60),
    );
    let evaluator = Evaluator::new(Arc::new(single_chain_registry(CHAIN_ID, provider)), vec![]);
    let cancel = CancellationToken::new();

    let exact: Operation = CheckOperation::erc20(CHAIN_ID as i64, contract, U256::from(100u64)).into();
    let above: Operation = CheckOperation::erc20(CHAIN_ID as i64, contract, U256::from(101u64)).into();

    // 累计余额恰好达到阈值时，返回第一个持有余额的钱包
    assert_eq!(
        evaluator.evaluate(&cancel, &wallets, &exact).await.unwrap(),
        wallets[0]
    );
    assert!(evaluator
        .evaluate(&cancel, &wallets, &above)
        .await
        .unwrap()
        .is_zero());
}

#[tokio::test]
async fn test_failed_wallet_does_not_abort_rule() {
    let contract = Address::repeat_byte(0xcc);
    let wallets = test_wallets(2);
    let provider = Arc::new(
        StaticChainProvider::new()
            .with_failing_wallet(wallets[0])
            .with_erc1155_balance(contract, wallets[1], 7, 1),
    );
    let evaluator = Evaluator::new(Arc::new(single_chain_registry(CHAIN_ID, provider)), vec![]);

    let root: Operation = CheckOperation::erc1155(CHAIN_ID as i64, contract, U256::from(7u64), U256::one()).into();
    let result = evaluator
        .evaluate(&CancellationToken::new(), &wallets, &root)
        .await
        .unwrap();
    assert_eq!(result, wallets[1]);
}

#[tokio::test]
async fn test_cross_chain_predicate_and_native_balance() {
    let contract = Address::repeat_byte(0xdd);
    let wallets = test_wallets(3);
    let provider = Arc::new(
        StaticChainProvider::new()
            .with_entitled(contract, wallets[2])
            .with_native_balance(wallets[1], 1_000),
    );
    let evaluator = Evaluator::new(
        Arc::new(single_chain_registry(CHAIN_ID, provider)),
        vec![CHAIN_ID],
    );

    let root = Operation::and(
        CheckOperation::cross_chain_predicate(CHAIN_ID as i64, contract, vec![1, 2, 3]).into(),
        CheckOperation::native_balance(U256::from(1_000u64)).into(),
    );
    let result = evaluator
        .evaluate(&CancellationToken::new(), &wallets, &root)
        .await
        .unwrap();
    assert_eq!(result, wallets[2]);
}

#[tokio::test]
async fn test_noop_root_makes_no_queries() {
    let provider = Arc::new(StaticChainProvider::new());
    let evaluator = Evaluator::new(
        Arc::new(single_chain_registry(CHAIN_ID, provider.clone())),
        vec![CHAIN_ID],
    );

    let result = evaluator
        .evaluate(&CancellationToken::new(), &test_wallets(2), &Operation::Noop)
        .await
        .unwrap();
    assert!(result.is_zero());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_structural_errors_are_not_denials() {
    let evaluator = mock_evaluator();
    let cancel = CancellationToken::new();
    let wallets = test_wallets(1);

    let zero_threshold = CheckOperation::erc20(CHAIN_ID as i64, Address::repeat_byte(1), U256::zero());
    let err = evaluator
        .evaluate(&cancel, &wallets, &Operation::or(mock(true, 50), zero_threshold.into()))
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::InvalidCheck { .. }));
    assert!(err.is_structural());

    let unknown_chain = CheckOperation::erc721(5, Address::repeat_byte(1), U256::one());
    let err = evaluator
        .evaluate(&cancel, &wallets, &unknown_chain.into())
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::UnknownChain(5)));
}

// ==================== 缓存 ====================

#[tokio::test]
async fn test_cached_evaluation() {
    let evaluator = mock_evaluator();
    let cache: EntitlementCache<Address> = EntitlementCache::with_ttls(
        8,
        Duration::from_secs(60),
        8,
        Duration::from_millis(50),
    );
    let wallets = test_wallets(1);
    let cancel = CancellationToken::new();
    let granted = mock(true, 20);
    let denied = mock(false, 20);

    let (first, hit) = cache
        .execute_using_cache("space:granted", || evaluator.evaluate(&cancel, &wallets, &granted))
        .await
        .unwrap();
    assert_eq!(first, MOCK_ADDRESS);
    assert!(!hit);

    let (second, hit) = cache
        .execute_using_cache("space:granted", || evaluator.evaluate(&cancel, &wallets, &granted))
        .await
        .unwrap();
    assert_eq!(second, MOCK_ADDRESS);
    assert!(hit);

    let (_, hit) = cache
        .execute_using_cache("space:denied", || evaluator.evaluate(&cancel, &wallets, &denied))
        .await
        .unwrap();
    assert!(!hit);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // 负向结果已过期，正向结果仍然有效
    let (_, hit) = cache
        .execute_using_cache("space:denied", || evaluator.evaluate(&cancel, &wallets, &denied))
        .await
        .unwrap();
    assert!(!hit);
    let (_, hit) = cache
        .execute_using_cache("space:granted", || evaluator.evaluate(&cancel, &wallets, &granted))
        .await
        .unwrap();
    assert!(hit);
}
