//! 操作类型定义
//!
//! 数值与链上 `uint8` 编码保持一致，0 均表示 NONE。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EntitlementError, Result};

/// 扁平数组中单个操作的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    None,
    Check,
    Logical,
}

impl OperationType {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Check => 1,
            Self::Logical => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Check),
            2 => Ok(Self::Logical),
            other => Err(EntitlementError::UnknownOperationType(other)),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Check => "CHECK",
            Self::Logical => "LOGICAL",
        };
        write!(f, "{}", s)
    }
}

/// 链上检查类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckKind {
    /// 测试用：按阈值延迟，链 ID 为 1 时成功
    Mock,
    Erc20,
    Erc721,
    Erc1155,
    /// 跨合约自定义谓词，参数原样透传
    CrossChainPredicate,
    /// 原生币余额，跨配置的多条链聚合
    NativeBalance,
}

impl CheckKind {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Mock => 1,
            Self::Erc20 => 2,
            Self::Erc721 => 3,
            Self::Erc1155 => 4,
            Self::CrossChainPredicate => 5,
            Self::NativeBalance => 6,
        }
    }

    /// NONE(0) 与超出范围的值都视为未知类型
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Mock),
            2 => Ok(Self::Erc20),
            3 => Ok(Self::Erc721),
            4 => Ok(Self::Erc1155),
            5 => Ok(Self::CrossChainPredicate),
            6 => Ok(Self::NativeBalance),
            other => Err(EntitlementError::UnknownCheckKind(other)),
        }
    }

    /// 指标标签
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Erc20 => "erc20",
            Self::Erc721 => "erc721",
            Self::Erc1155 => "erc1155",
            Self::CrossChainPredicate => "cross_chain_predicate",
            Self::NativeBalance => "native_balance",
        }
    }

    /// 是否需要非零合约地址
    pub fn requires_contract(self) -> bool {
        match self {
            Self::Erc20 | Self::Erc721 | Self::Erc1155 | Self::CrossChainPredicate => true,
            Self::Mock | Self::NativeBalance => false,
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mock => "MOCK",
            Self::Erc20 => "ERC20",
            Self::Erc721 => "ERC721",
            Self::Erc1155 => "ERC1155",
            Self::CrossChainPredicate => "CROSS_CHAIN_PREDICATE",
            Self::NativeBalance => "NATIVE_BALANCE",
        };
        write!(f, "{}", s)
    }
}

/// 逻辑组合类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalKind {
    And,
    Or,
}

impl LogicalKind {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::And => 1,
            Self::Or => 2,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::And),
            2 => Ok(Self::Or),
            other => Err(EntitlementError::UnknownLogicalKind(other)),
        }
    }
}

impl fmt::Display for LogicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_kind_wire_values() {
        let kinds = [
            CheckKind::Mock,
            CheckKind::Erc20,
            CheckKind::Erc721,
            CheckKind::Erc1155,
            CheckKind::CrossChainPredicate,
            CheckKind::NativeBalance,
        ];
        for (i, kind) in kinds.iter().enumerate() {
            assert_eq!(kind.as_u8() as usize, i + 1);
            assert_eq!(CheckKind::from_u8(kind.as_u8()).unwrap(), *kind);
        }
    }

    #[test]
    fn test_none_kinds_are_rejected() {
        assert!(matches!(
            CheckKind::from_u8(0),
            Err(EntitlementError::UnknownCheckKind(0))
        ));
        assert!(matches!(
            LogicalKind::from_u8(0),
            Err(EntitlementError::UnknownLogicalKind(0))
        ));
        assert!(matches!(
            OperationType::from_u8(3),
            Err(EntitlementError::UnknownOperationType(3))
        ));
        assert_eq!(OperationType::from_u8(0).unwrap(), OperationType::None);
    }

    #[test]
    fn test_requires_contract() {
        assert!(CheckKind::Erc20.requires_contract());
        assert!(CheckKind::CrossChainPredicate.requires_contract());
        assert!(!CheckKind::NativeBalance.requires_contract());
        assert!(!CheckKind::Mock.requires_contract());
    }

    #[test]
    fn test_display() {
        assert_eq!(CheckKind::Erc721.to_string(), "ERC721");
        assert_eq!(LogicalKind::Or.to_string(), "OR");
        assert_eq!(OperationType::Logical.to_string(), "LOGICAL");
    }
}
