//! 规则树与扁平数组之间的编解码
//!
//! 链上存储的规则数据是三个互相引用的数组：
//! - `operations`：后序排列，最后一个元素为根
//! - `check_operations`：叶子检查
//! - `logical_operations`：AND/OR，左右下标只能指向自身之前的位置
//!
//! 重建使用显式栈：遇到叶子入栈，遇到逻辑节点弹出两个操作数，
//! 扫描结束时栈中必须恰好剩下一个根节点。

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{self, AbiReader, Token, WORD};
use crate::error::{EntitlementError, Result};
use crate::models::{Address, CheckOperation, Operation, ThresholdParams};
use crate::operators::{CheckKind, LogicalKind, OperationType};

/// 操作下标为 `uint8`，规则最多 256 个操作
pub const MAX_OPERATIONS: usize = u8::MAX as usize + 1;

/// `operations` 数组中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatOperation {
    pub op_type: OperationType,
    pub index: u8,
}

/// `logical_operations` 数组中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatLogicalOperation {
    pub kind: LogicalKind,
    pub left_operation_index: u8,
    pub right_operation_index: u8,
}

/// 扁平（存储）形式的规则数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleData {
    pub operations: Vec<FlatOperation>,
    pub check_operations: Vec<CheckOperation>,
    pub logical_operations: Vec<FlatLogicalOperation>,
}

/// 解码字节流为规则树，空字节流即空规则
pub fn decode(bytes: &[u8]) -> Result<Operation> {
    if bytes.is_empty() {
        return Ok(Operation::Noop);
    }
    RuleData::abi_decode(bytes)?.to_tree()
}

/// 编码规则树，空规则编码为空字节流
pub fn encode(root: &Operation) -> Result<Vec<u8>> {
    if root.is_noop() {
        return Ok(Vec::new());
    }
    RuleData::from_tree(root)?.abi_encode()
}

impl RuleData {
    /// 后序遍历展开规则树
    pub fn from_tree(root: &Operation) -> Result<Self> {
        let mut data = Self::default();
        if !root.is_noop() {
            data.append(root)?;
        }
        Ok(data)
    }

    /// 追加子树，返回其根在 `operations` 中的位置
    fn append(&mut self, op: &Operation) -> Result<u8> {
        if self.operations.len() >= MAX_OPERATIONS {
            return Err(too_many_operations());
        }

        let flat = match op {
            Operation::Noop => FlatOperation {
                op_type: OperationType::None,
                index: 0,
            },
            Operation::Check(check) => {
                if check.chain_id < 0 {
                    return Err(EntitlementError::invalid_check(check.kind, "chain id"));
                }
                let index = to_index(self.check_operations.len(), "check operations")?;
                self.check_operations.push(check.clone());
                FlatOperation {
                    op_type: OperationType::Check,
                    index,
                }
            }
            Operation::And(logical) | Operation::Or(logical) => {
                let kind = if matches!(op, Operation::And(_)) {
                    LogicalKind::And
                } else {
                    LogicalKind::Or
                };
                let left = self.append(&logical.left)?;
                let right = self.append(&logical.right)?;
                let index = to_index(self.logical_operations.len(), "logical operations")?;
                self.logical_operations.push(FlatLogicalOperation {
                    kind,
                    left_operation_index: left,
                    right_operation_index: right,
                });
                FlatOperation {
                    op_type: OperationType::Logical,
                    index,
                }
            }
        };

        let position = to_index(self.operations.len(), "operations")?;
        self.operations.push(flat);
        Ok(position)
    }

    /// 栈式重建规则树
    pub fn to_tree(&self) -> Result<Operation> {
        if self.operations.len() > MAX_OPERATIONS {
            return Err(too_many_operations());
        }
        let mut stack: Vec<Operation> = Vec::with_capacity(self.operations.len());

        for (position, flat) in self.operations.iter().enumerate() {
            match flat.op_type {
                OperationType::None => stack.push(Operation::Noop),
                OperationType::Check => {
                    let check = self
                        .check_operations
                        .get(flat.index as usize)
                        .ok_or_else(|| {
                            EntitlementError::MalformedRuleData(format!(
                                "operation {} references missing check operation {}",
                                position, flat.index
                            ))
                        })?;
                    stack.push(Operation::Check(check.clone()));
                }
                OperationType::Logical => {
                    let logical = self
                        .logical_operations
                        .get(flat.index as usize)
                        .ok_or_else(|| {
                            EntitlementError::MalformedRuleData(format!(
                                "operation {} references missing logical operation {}",
                                position, flat.index
                            ))
                        })?;
                    if logical.left_operation_index as usize >= position
                        || logical.right_operation_index as usize >= position
                    {
                        return Err(EntitlementError::MalformedRuleData(format!(
                            "logical operation at {} references a later position ({}, {})",
                            position, logical.left_operation_index, logical.right_operation_index
                        )));
                    }
                    let right = stack.pop().ok_or(EntitlementError::MissingOperand)?;
                    let left = stack.pop().ok_or(EntitlementError::MissingOperand)?;
                    stack.push(Operation::combine(logical.kind, left, right));
                }
            }
        }

        match stack.len() {
            0 => Ok(Operation::Noop),
            1 => Ok(stack.pop().unwrap_or(Operation::Noop)),
            n => Err(EntitlementError::MalformedRuleData(format!(
                "{} operations left on stack after reconstruction",
                n
            ))),
        }
    }

    /// `abi.encode(RuleDataV2)`
    pub fn abi_encode(&self) -> Result<Vec<u8>> {
        let checks: Vec<Vec<u8>> = self
            .check_operations
            .iter()
            .map(|check| {
                Ok(abi::encode_tuple(&[
                    Token::word(abi::encode_u64(check.kind.as_u8() as u64)),
                    Token::word(encode_chain_id(check.kind, check.chain_id)?),
                    Token::word(abi::encode_address(&check.contract_address)),
                    Token::Dynamic(abi::encode_bytes(&check.params)),
                ]))
            })
            .collect::<Result<_>>()?;

        let tuple = abi::encode_tuple(&[
            Token::Dynamic(encode_operations(&self.operations)),
            Token::Dynamic(abi::encode_dynamic_array(&checks)),
            Token::Dynamic(encode_logical_operations(&self.logical_operations)),
        ]);
        Ok(abi::encode_tuple(&[Token::Dynamic(tuple)]))
    }

    /// 解析 `abi.encode(RuleDataV2)`，同时校验各检查类型的参数布局
    pub fn abi_decode(bytes: &[u8]) -> Result<Self> {
        let tuple = AbiReader::new(bytes).follow(0)?;

        let operations = decode_operations(&tuple)?;

        let check_operations = tuple
            .follow(WORD)?
            .dynamic_array()?
            .into_iter()
            .map(|element| {
                let check = CheckOperation::new(
                    CheckKind::from_u8(element.read_u8(0)?)?,
                    decode_chain_id(element.read_u256(WORD)?)?,
                    element.read_address(WORD * 2)?,
                    element.follow(WORD * 3)?.read_bytes()?,
                );
                check.validate_params()?;
                Ok(check)
            })
            .collect::<Result<Vec<_>>>()?;

        let logical_operations = decode_logical_operations(&tuple, WORD * 2)?;

        debug!(
            operations = operations.len(),
            checks = check_operations.len(),
            logicals = logical_operations.len(),
            "规则数据解码完成"
        );

        Ok(Self {
            operations,
            check_operations,
            logical_operations,
        })
    }
}

/// 旧版（V1）规则数据中的检查项：阈值直接内嵌，没有 params
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOperationV1 {
    pub kind: CheckKind,
    pub chain_id: i64,
    pub contract_address: Address,
    pub threshold: U256,
}

/// 旧版（V1）规则数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDataV1 {
    pub operations: Vec<FlatOperation>,
    pub check_operations: Vec<CheckOperationV1>,
    pub logical_operations: Vec<FlatLogicalOperation>,
}

impl RuleDataV1 {
    /// 解析 `abi.encode(RuleData)`，检查项为四个字的静态 tuple
    pub fn abi_decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let tuple = AbiReader::new(bytes).follow(0)?;

        let operations = decode_operations(&tuple)?;

        let check_operations = tuple
            .follow(WORD)?
            .static_array(WORD * 4)?
            .into_iter()
            .map(|element| {
                Ok(CheckOperationV1 {
                    kind: CheckKind::from_u8(element.read_u8(0)?)?,
                    chain_id: decode_chain_id(element.read_u256(WORD)?)?,
                    contract_address: element.read_address(WORD * 2)?,
                    threshold: element.read_u256(WORD * 3)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let logical_operations = decode_logical_operations(&tuple, WORD * 2)?;

        Ok(Self {
            operations,
            check_operations,
            logical_operations,
        })
    }

    pub fn abi_encode(&self) -> Result<Vec<u8>> {
        if self.operations.is_empty() {
            return Ok(Vec::new());
        }
        let checks: Vec<Vec<u8>> = self
            .check_operations
            .iter()
            .map(|check| {
                let mut element = abi::encode_u64(check.kind.as_u8() as u64).to_vec();
                element.extend_from_slice(&encode_chain_id(check.kind, check.chain_id)?);
                element.extend_from_slice(&abi::encode_address(&check.contract_address));
                element.extend_from_slice(&abi::encode_u256(check.threshold));
                Ok(element)
            })
            .collect::<Result<_>>()?;
        let tuple = abi::encode_tuple(&[
            Token::Dynamic(encode_operations(&self.operations)),
            Token::Dynamic(abi::encode_static_array(&checks)),
            Token::Dynamic(encode_logical_operations(&self.logical_operations)),
        ]);
        Ok(abi::encode_tuple(&[Token::Dynamic(tuple)]))
    }

    /// 转换为 V2：需要阈值的检查改写为阈值参数，V1 不支持 ERC1155
    pub fn into_v2(self) -> Result<RuleData> {
        let check_operations = self
            .check_operations
            .into_iter()
            .map(|check| {
                let params = match check.kind {
                    CheckKind::Mock
                    | CheckKind::Erc20
                    | CheckKind::Erc721
                    | CheckKind::NativeBalance => ThresholdParams::new(check.threshold).encode(),
                    CheckKind::CrossChainPredicate => Vec::new(),
                    CheckKind::Erc1155 => {
                        return Err(EntitlementError::Decode(
                            "ERC1155 not supported by V1 rule data".to_string(),
                        ));
                    }
                };
                Ok(CheckOperation::new(
                    check.kind,
                    check.chain_id,
                    check.contract_address,
                    params,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RuleData {
            operations: self.operations,
            check_operations,
            logical_operations: self.logical_operations,
        })
    }
}

/// 解码旧版字节流为规则树
pub fn decode_v1(bytes: &[u8]) -> Result<Operation> {
    RuleDataV1::abi_decode(bytes)?.into_v2()?.to_tree()
}

fn encode_operations(operations: &[FlatOperation]) -> Vec<u8> {
    let elements: Vec<Vec<u8>> = operations
        .iter()
        .map(|op| {
            let mut element = abi::encode_u64(op.op_type.as_u8() as u64).to_vec();
            element.extend_from_slice(&abi::encode_u64(op.index as u64));
            element
        })
        .collect();
    abi::encode_static_array(&elements)
}

fn encode_logical_operations(operations: &[FlatLogicalOperation]) -> Vec<u8> {
    let elements: Vec<Vec<u8>> = operations
        .iter()
        .map(|op| {
            let mut element = abi::encode_u64(op.kind.as_u8() as u64).to_vec();
            element.extend_from_slice(&abi::encode_u64(op.left_operation_index as u64));
            element.extend_from_slice(&abi::encode_u64(op.right_operation_index as u64));
            element
        })
        .collect();
    abi::encode_static_array(&elements)
}

fn decode_operations(tuple: &AbiReader<'_>) -> Result<Vec<FlatOperation>> {
    let elements = tuple.follow(0)?.static_array(WORD * 2)?;
    if elements.len() > MAX_OPERATIONS {
        return Err(too_many_operations());
    }
    elements
        .into_iter()
        .map(|element| {
            Ok(FlatOperation {
                op_type: OperationType::from_u8(element.read_u8(0)?)?,
                index: element.read_u8(WORD)?,
            })
        })
        .collect()
}

fn decode_logical_operations(
    tuple: &AbiReader<'_>,
    head: usize,
) -> Result<Vec<FlatLogicalOperation>> {
    tuple
        .follow(head)?
        .static_array(WORD * 3)?
        .into_iter()
        .map(|element| {
            Ok(FlatLogicalOperation {
                kind: LogicalKind::from_u8(element.read_u8(0)?)?,
                left_operation_index: element.read_u8(WORD)?,
                right_operation_index: element.read_u8(WORD * 2)?,
            })
        })
        .collect()
}

fn to_index(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len).map_err(|_| {
        EntitlementError::RuleTooLarge(format!("more than {} {}", u8::MAX as usize + 1, what))
    })
}

/// 负数链 ID 无法表示为 uint256
fn encode_chain_id(kind: CheckKind, chain_id: i64) -> Result<[u8; WORD]> {
    u64::try_from(chain_id)
        .map(abi::encode_u64)
        .map_err(|_| EntitlementError::invalid_check(kind, "chain id"))
}

fn too_many_operations() -> EntitlementError {
    EntitlementError::RuleTooLarge(format!("more than {} operations", MAX_OPERATIONS))
}

fn decode_chain_id(value: U256) -> Result<i64> {
    if value > U256::from(i64::MAX as u64) {
        return Err(EntitlementError::Decode(format!(
            "chain id {} out of range",
            value
        )));
    }
    Ok(value.low_u64() as i64)
}

/// 两两配对构建平衡树，奇数个时末尾节点直接进入下一层
pub fn build_balanced_tree(leaves: Vec<CheckOperation>, combinator: LogicalKind) -> Operation {
    let mut level: Vec<Operation> = leaves.into_iter().map(Operation::Check).collect();
    if level.is_empty() {
        return Operation::Noop;
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.into_iter();
        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => next.push(Operation::combine(combinator, left, right)),
                None => next.push(left),
            }
        }
        level = next;
    }

    level.pop().unwrap_or(Operation::Noop)
}

/// 后序列出所有叶子检查
pub fn flatten_checks(root: &Operation) -> Vec<CheckOperation> {
    fn walk(op: &Operation, out: &mut Vec<CheckOperation>) {
        match op {
            Operation::Check(check) => out.push(check.clone()),
            Operation::And(logical) | Operation::Or(logical) => {
                walk(&logical.left, out);
                walk(&logical.right, out);
            }
            Operation::Noop => {}
        }
    }

    let mut out = Vec::new();
    walk(root, &mut out);
    out
}
