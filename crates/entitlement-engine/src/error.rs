//! 权限引擎错误类型
//!
//! 这里的错误全部是结构性/配置性错误，调用方必须当作缺陷或非法输入处理，
//! 绝不能与"无权限"（零地址）混为一谈。单个钱包的查询失败在检查执行器内部被吸收，
//! 不会出现在这里。

use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("规则数据解码失败: {0}")]
    Decode(String),

    #[error("规则数据结构非法: {0}")]
    MalformedRuleData(String),

    #[error("未知的操作类型: {0}")]
    UnknownOperationType(u8),

    #[error("Unknown check operation type: {0}")]
    UnknownCheckKind(u8),

    #[error("Unknown logical operation type: {0}")]
    UnknownLogicalKind(u8),

    #[error("逻辑操作缺少操作数")]
    MissingOperand,

    #[error("Invalid {field} for check operation {kind}")]
    InvalidCheck { kind: String, field: &'static str },

    #[error("链 {0} 未配置 RPC 端点")]
    UnknownChain(u64),

    #[error("规则过大，无法编码: {0}")]
    RuleTooLarge(String),

    #[error("链上查询失败: {0}")]
    Provider(#[from] ProviderError),

    #[error("多个候选规则评估失败: {}", format_errors(.0))]
    Aggregate(Vec<EntitlementError>),
}

fn format_errors(errors: &[EntitlementError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EntitlementError {
    pub(crate) fn invalid_check(kind: impl ToString, field: &'static str) -> Self {
        Self::InvalidCheck {
            kind: kind.to_string(),
            field,
        }
    }

    /// 是否为规则数据本身的问题（解码/结构/参数校验）
    pub fn is_structural(&self) -> bool {
        match self {
            Self::Decode(_)
            | Self::MalformedRuleData(_)
            | Self::UnknownOperationType(_)
            | Self::UnknownCheckKind(_)
            | Self::UnknownLogicalKind(_)
            | Self::MissingOperand
            | Self::InvalidCheck { .. }
            | Self::RuleTooLarge(_) => true,
            Self::Aggregate(errors) => errors.iter().all(Self::is_structural),
            Self::UnknownChain(_) | Self::Provider(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EntitlementError>;
