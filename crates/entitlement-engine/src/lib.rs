//! 链上权限规则引擎
//!
//! 提供权限规则的表示、编解码与并发评估能力：
//! - Check / And / Or / Noop 规则树与扁平后序数组之间的互转（含 ABI 编解码）
//! - ERC20、ERC721、ERC1155、原生币余额、跨链谓词等链上检查
//! - AND/OR 子树并发评估，结果确定后立即短路并取消其余查询
//! - 正负结果分区的 TTL 缓存

pub mod abi;
pub mod cache;
pub mod cancel;
pub mod checks;
pub mod codec;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;
pub mod provider;
pub mod rpc;
pub mod test_utils;

pub use cache::{CacheResult, EntitlementCache};
pub use cancel::CancellationToken;
pub use checks::CheckExecutor;
pub use codec::{build_balanced_tree, decode, decode_v1, encode, flatten_checks, RuleData, RuleDataV1};
pub use error::{EntitlementError, Result};
pub use evaluator::Evaluator;
pub use models::{
    Address, CheckOperation, Erc1155Params, LogicalOperation, Operation, ThresholdParams,
    MOCK_ADDRESS,
};
pub use operators::{CheckKind, LogicalKind, OperationType};
pub use provider::{ChainProvider, ProviderError, ProviderRegistry, StaticProviderRegistry};
pub use rpc::{JsonRpcProvider, JsonRpcProviderRegistry};
