//! 权限规则数据模型
//!
//! 规则是一棵严格的二叉表达式树：叶子为链上检查，内部节点为 AND/OR。
//! 子节点以 `Box` 独占持有，天然排除了节点共享（DAG）的可能。

use primitive_types::{H160, U256};
use serde::{Deserialize, Serialize};

use crate::abi;
use crate::error::{EntitlementError, Result};
use crate::operators::{CheckKind, LogicalKind};

/// 20 字节账户地址，零地址表示"无权限"
pub type Address = H160;

/// 测试检查成功时返回的固定地址
pub const MOCK_ADDRESS: Address = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
]);

/// 链上检查（叶子节点）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOperation {
    pub kind: CheckKind,
    pub chain_id: i64,
    pub contract_address: Address,
    /// 参数编码由 `kind` 决定，见 [`ThresholdParams`] 与 [`Erc1155Params`]
    pub params: Vec<u8>,
}

impl CheckOperation {
    pub fn new(kind: CheckKind, chain_id: i64, contract_address: Address, params: Vec<u8>) -> Self {
        Self {
            kind,
            chain_id,
            contract_address,
            params,
        }
    }

    /// 测试检查：延迟 `delay_ms` 毫秒，`chain_id == 1` 时成功
    pub fn mock(chain_id: i64, delay_ms: u64) -> Self {
        Self::new(
            CheckKind::Mock,
            chain_id,
            Address::zero(),
            ThresholdParams::new(U256::from(delay_ms)).encode(),
        )
    }

    pub fn erc20(chain_id: i64, contract_address: Address, threshold: U256) -> Self {
        Self::new(
            CheckKind::Erc20,
            chain_id,
            contract_address,
            ThresholdParams::new(threshold).encode(),
        )
    }

    pub fn erc721(chain_id: i64, contract_address: Address, threshold: U256) -> Self {
        Self::new(
            CheckKind::Erc721,
            chain_id,
            contract_address,
            ThresholdParams::new(threshold).encode(),
        )
    }

    pub fn erc1155(
        chain_id: i64,
        contract_address: Address,
        token_id: U256,
        threshold: U256,
    ) -> Self {
        Self::new(
            CheckKind::Erc1155,
            chain_id,
            contract_address,
            Erc1155Params { token_id, threshold }.encode(),
        )
    }

    /// 原生币余额检查，链 ID 不参与计算
    pub fn native_balance(threshold: U256) -> Self {
        Self::new(
            CheckKind::NativeBalance,
            0,
            Address::zero(),
            ThresholdParams::new(threshold).encode(),
        )
    }

    pub fn cross_chain_predicate(
        chain_id: i64,
        contract_address: Address,
        params: Vec<u8>,
    ) -> Self {
        Self::new(
            CheckKind::CrossChainPredicate,
            chain_id,
            contract_address,
            params,
        )
    }

    /// 解码阈值参数（MOCK / ERC20 / ERC721 / NATIVE_BALANCE）
    pub fn threshold_params(&self) -> Result<ThresholdParams> {
        ThresholdParams::decode(&self.params)
    }

    pub fn erc1155_params(&self) -> Result<Erc1155Params> {
        Erc1155Params::decode(&self.params)
    }

    /// 按检查类型校验参数布局
    pub fn validate_params(&self) -> Result<()> {
        match self.kind {
            CheckKind::Mock | CheckKind::Erc20 | CheckKind::Erc721 | CheckKind::NativeBalance => {
                self.threshold_params().map(|_| ())
            }
            CheckKind::Erc1155 => self.erc1155_params().map(|_| ()),
            CheckKind::CrossChainPredicate => Ok(()),
        }
    }
}

/// 逻辑组合节点，两个子节点都必须存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalOperation {
    pub left: Box<Operation>,
    pub right: Box<Operation>,
}

/// 规则表达式树
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Check(CheckOperation),
    And(LogicalOperation),
    Or(LogicalOperation),
    /// 空规则，恒为"无权限"
    Noop,
}

impl Operation {
    pub fn and(left: Operation, right: Operation) -> Self {
        Self::And(LogicalOperation {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn or(left: Operation, right: Operation) -> Self {
        Self::Or(LogicalOperation {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn combine(kind: LogicalKind, left: Operation, right: Operation) -> Self {
        match kind {
            LogicalKind::And => Self::and(left, right),
            LogicalKind::Or => Self::or(left, right),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }

    /// 节点总数
    pub fn node_count(&self) -> usize {
        match self {
            Self::Check(_) | Self::Noop => 1,
            Self::And(op) | Self::Or(op) => 1 + op.left.node_count() + op.right.node_count(),
        }
    }
}

impl From<CheckOperation> for Operation {
    fn from(op: CheckOperation) -> Self {
        Self::Check(op)
    }
}

/// 单阈值参数：`abi.encode(uint256 threshold)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdParams {
    pub threshold: U256,
}

impl ThresholdParams {
    pub fn new(threshold: U256) -> Self {
        Self { threshold }
    }

    pub fn encode(&self) -> Vec<u8> {
        abi::encode_u256(self.threshold).to_vec()
    }

    pub fn decode(params: &[u8]) -> Result<Self> {
        if params.len() != abi::WORD {
            return Err(EntitlementError::Decode(format!(
                "threshold params must be {} bytes, got {}",
                abi::WORD,
                params.len()
            )));
        }
        Ok(Self {
            threshold: U256::from_big_endian(params),
        })
    }
}

/// ERC1155 参数：`abi.encode(uint256 tokenId, uint256 threshold)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erc1155Params {
    pub token_id: U256,
    pub threshold: U256,
}

impl Erc1155Params {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(abi::WORD * 2);
        out.extend_from_slice(&abi::encode_u256(self.token_id));
        out.extend_from_slice(&abi::encode_u256(self.threshold));
        out
    }

    pub fn decode(params: &[u8]) -> Result<Self> {
        if params.len() != abi::WORD * 2 {
            return Err(EntitlementError::Decode(format!(
                "erc1155 params must be {} bytes, got {}",
                abi::WORD * 2,
                params.len()
            )));
        }
        Ok(Self {
            token_id: U256::from_big_endian(&params[..abi::WORD]),
            threshold: U256::from_big_endian(&params[abi::WORD..]),
        })
    }
}
