//! 最小化的 Solidity ABI 编解码
//!
//! 只覆盖规则数据用到的类型：`uint8`、`uint256`、`address`、`bytes`、
//! 静态/动态 tuple 以及它们的动态数组。所有读取都做越界检查。

use primitive_types::{H160, U256};

use crate::error::{EntitlementError, Result};

/// ABI 字长
pub const WORD: usize = 32;

pub fn encode_u256(value: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

pub fn encode_u64(value: u64) -> [u8; WORD] {
    encode_u256(U256::from(value))
}

pub fn encode_address(address: &H160) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// tuple 中的一个字段
#[derive(Debug, Clone)]
pub enum Token {
    /// 静态值，占一个或多个字（静态 tuple 的各字段按顺序拼接）
    Static(Vec<u8>),
    /// 已编码的动态值，头部写入偏移
    Dynamic(Vec<u8>),
}

impl Token {
    pub fn word(word: [u8; WORD]) -> Self {
        Self::Static(word.to_vec())
    }

    fn head_len(&self) -> usize {
        match self {
            Self::Static(bytes) => bytes.len(),
            Self::Dynamic(_) => WORD,
        }
    }
}

/// 按 head/tail 规则编码 tuple
pub fn encode_tuple(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens.iter().map(Token::head_len).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Static(bytes) => head.extend_from_slice(bytes),
            Token::Dynamic(bytes) => {
                head.extend_from_slice(&encode_u64((head_len + tail.len()) as u64));
                tail.extend_from_slice(bytes);
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// `bytes`：长度字 + 右侧补零到整字
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let padded = data.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&encode_u64(data.len() as u64));
    out.extend_from_slice(data);
    out.resize(WORD + padded, 0);
    out
}

/// 元素为静态类型的动态数组
pub fn encode_static_array(elements: &[Vec<u8>]) -> Vec<u8> {
    let mut out = encode_u64(elements.len() as u64).to_vec();
    for element in elements {
        out.extend_from_slice(element);
    }
    out
}

/// 元素为动态类型的动态数组：长度字 + 偏移表 + 元素
pub fn encode_dynamic_array(elements: &[Vec<u8>]) -> Vec<u8> {
    let tokens: Vec<Token> = elements.iter().cloned().map(Token::Dynamic).collect();
    let mut out = encode_u64(elements.len() as u64).to_vec();
    out.extend_from_slice(&encode_tuple(&tokens));
    out
}

/// 带越界检查的只读游标，偏移均相对于 `data` 起点
#[derive(Debug, Clone, Copy)]
pub struct AbiReader<'a> {
    data: &'a [u8],
}

impl<'a> AbiReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn word(&self, offset: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(WORD)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                EntitlementError::Decode(format!(
                    "read word at {} out of bounds (len {})",
                    offset,
                    self.data.len()
                ))
            })
    }

    pub fn read_u256(&self, offset: usize) -> Result<U256> {
        Ok(U256::from_big_endian(self.word(offset)?))
    }

    /// `uint8` 槽位，高位必须为零
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        let word = self.word(offset)?;
        if word[..WORD - 1].iter().any(|b| *b != 0) {
            return Err(EntitlementError::Decode(format!(
                "uint8 value at {} out of range",
                offset
            )));
        }
        Ok(word[WORD - 1])
    }

    /// 读取可放入 usize 的整数（长度、偏移）
    pub fn read_usize(&self, offset: usize) -> Result<usize> {
        let value = self.read_u256(offset)?;
        if value > U256::from(self.data.len() as u64) {
            return Err(EntitlementError::Decode(format!(
                "length/offset {} at {} exceeds data length {}",
                value,
                offset,
                self.data.len()
            )));
        }
        Ok(value.low_u64() as usize)
    }

    pub fn read_address(&self, offset: usize) -> Result<H160> {
        let word = self.word(offset)?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(EntitlementError::Decode(format!(
                "address at {} has dirty high bytes",
                offset
            )));
        }
        Ok(H160::from_slice(&word[12..]))
    }

    /// 以 `offset` 为起点的子游标
    pub fn sub(&self, offset: usize) -> Result<AbiReader<'a>> {
        self.data
            .get(offset..)
            .map(AbiReader::new)
            .ok_or_else(|| EntitlementError::Decode(format!("offset {} out of bounds", offset)))
    }

    /// 跟随 `head` 处的偏移字
    pub fn follow(&self, head: usize) -> Result<AbiReader<'a>> {
        let offset = self.read_usize(head)?;
        self.sub(offset)
    }

    /// `bytes`：当前游标起点即长度字
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let len = self.read_usize(0)?;
        self.data
            .get(WORD..WORD + len)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| {
                EntitlementError::Decode(format!("bytes of length {} truncated", len))
            })
    }

    /// 静态元素数组，返回每个元素的子游标
    pub fn static_array(&self, element_size: usize) -> Result<Vec<AbiReader<'a>>> {
        let len = self.read_usize(0)?;
        let fits = len
            .checked_mul(element_size)
            .and_then(|n| n.checked_add(WORD))
            .is_some_and(|n| n <= self.data.len());
        if !fits {
            return Err(EntitlementError::Decode(format!(
                "static array of {} elements truncated",
                len
            )));
        }
        (0..len)
            .map(|i| self.sub(WORD + i * element_size))
            .collect()
    }

    /// 动态元素数组，偏移相对于长度字之后的位置
    pub fn dynamic_array(&self) -> Result<Vec<AbiReader<'a>>> {
        let len = self.read_usize(0)?;
        let body = self.sub(WORD)?;
        if len.saturating_mul(WORD) > body.len() {
            return Err(EntitlementError::Decode(format!(
                "dynamic array of {} elements truncated",
                len
            )));
        }
        (0..len).map(|i| body.follow(i * WORD)).collect()
    }
}
