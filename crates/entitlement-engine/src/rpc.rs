//! 基于以太坊 JSON-RPC 的链上查询实现
//!
//! 余额与谓词查询都走 `eth_call`，原生币余额走 `eth_getBalance`，统一在 `latest` 区块上执行。

use async_trait::async_trait;
use primitive_types::U256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use entitlement_shared::config::ChainConfig;

use crate::abi::{encode_address, encode_bytes, encode_static_array, encode_tuple, encode_u256, Token, WORD};
use crate::models::Address;
use crate::provider::{ChainProvider, ProviderError, ProviderRegistry, ProviderResult};

const BALANCE_OF: &str = "balanceOf(address)";
const BALANCE_OF_BATCH_ID: &str = "balanceOf(address,uint256)";
const IS_ENTITLED: &str = "isEntitled(address[])";
const IS_ENTITLED_WITH_PARAMS: &str = "isEntitled(address[],bytes)";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// 单条链的 JSON-RPC 客户端
pub struct JsonRpcProvider {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<P: Serialize + Send, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> ProviderResult<R> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let rpc_response: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = rpc_response.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response
            .result
            .ok_or_else(|| ProviderError::InvalidResponse("RPC response missing result".to_string()))
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> ProviderResult<Vec<u8>> {
        debug!(rpc_url = %self.rpc_url, to = ?to, "eth_call");
        let result: String = self
            .call(
                "eth_call",
                json!([{ "to": hex_address(&to), "data": hex_bytes(&data) }, "latest"]),
            )
            .await?;
        decode_hex_bytes(&result)
    }
}

#[async_trait]
impl ChainProvider for JsonRpcProvider {
    async fn erc20_balance(&self, contract: Address, wallet: Address) -> ProviderResult<U256> {
        let output = self.eth_call(contract, balance_of_call(wallet)).await?;
        decode_uint_output(&output)
    }

    async fn erc721_balance(&self, contract: Address, wallet: Address) -> ProviderResult<U256> {
        let output = self.eth_call(contract, balance_of_call(wallet)).await?;
        decode_uint_output(&output)
    }

    async fn erc1155_balance(
        &self,
        contract: Address,
        wallet: Address,
        token_id: U256,
    ) -> ProviderResult<U256> {
        let output = self
            .eth_call(contract, balance_of_token_call(wallet, token_id))
            .await?;
        decode_uint_output(&output)
    }

    async fn native_balance(&self, wallet: Address) -> ProviderResult<U256> {
        let result: String = self
            .call("eth_getBalance", json!([hex_address(&wallet), "latest"]))
            .await?;
        parse_hex_quantity(&result)
    }

    async fn is_entitled(
        &self,
        contract: Address,
        wallet: Address,
        params: Vec<u8>,
    ) -> ProviderResult<bool> {
        let output = self
            .eth_call(contract, is_entitled_call(wallet, &params))
            .await?;
        Ok(!decode_uint_output(&output)?.is_zero())
    }
}

/// 按链配置构建的 JSON-RPC provider 集合
#[derive(Default)]
pub struct JsonRpcProviderRegistry {
    providers: HashMap<u64, Arc<dyn ChainProvider>>,
}

impl JsonRpcProviderRegistry {
    pub fn from_config(config: &ChainConfig) -> ProviderResult<Self> {
        let mut providers: HashMap<u64, Arc<dyn ChainProvider>> = HashMap::new();
        for chain_id in config.chain_ids() {
            if let Some(endpoint) = config.endpoint(chain_id) {
                let provider = JsonRpcProvider::new(
                    endpoint.rpc_url.clone(),
                    Duration::from_millis(endpoint.request_timeout_ms),
                )?;
                providers.insert(chain_id, Arc::new(provider));
            }
        }

        info!(chains = ?config.chain_ids(), "链上查询客户端已初始化");
        Ok(Self { providers })
    }
}

impl ProviderRegistry for JsonRpcProviderRegistry {
    fn provider(&self, chain_id: u64) -> Option<Arc<dyn ChainProvider>> {
        self.providers.get(&chain_id).cloned()
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn balance_of_call(wallet: Address) -> Vec<u8> {
    let mut data = selector(BALANCE_OF).to_vec();
    data.extend_from_slice(&encode_address(&wallet));
    data
}

fn balance_of_token_call(wallet: Address, token_id: U256) -> Vec<u8> {
    let mut data = selector(BALANCE_OF_BATCH_ID).to_vec();
    data.extend_from_slice(&encode_address(&wallet));
    data.extend_from_slice(&encode_u256(token_id));
    data
}

/// 无参数时调用旧版 `isEntitled(address[])`，否则带上参数调用跨链版本
fn is_entitled_call(wallet: Address, params: &[u8]) -> Vec<u8> {
    let users = Token::Dynamic(encode_static_array(&[encode_address(&wallet).to_vec()]));
    if params.is_empty() {
        let mut data = selector(IS_ENTITLED).to_vec();
        data.extend_from_slice(&encode_tuple(&[users]));
        return data;
    }

    let mut data = selector(IS_ENTITLED_WITH_PARAMS).to_vec();
    data.extend_from_slice(&encode_tuple(&[users, Token::Dynamic(encode_bytes(params))]));
    data
}

fn hex_address(address: &Address) -> String {
    hex_bytes(address.as_bytes())
}

fn hex_bytes(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn decode_hex_bytes(value: &str) -> ProviderResult<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", value, e)))
}

/// 返回值的第一个字按 uint256 解读；空返回视为 0
fn decode_uint_output(output: &[u8]) -> ProviderResult<U256> {
    if output.is_empty() {
        return Ok(U256::zero());
    }
    if output.len() < WORD {
        return Err(ProviderError::InvalidResponse(format!(
            "返回数据长度不足: {} 字节",
            output.len()
        )));
    }
    Ok(U256::from_big_endian(&output[..WORD]))
}

fn parse_hex_quantity(value: &str) -> ProviderResult<U256> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("{}: {:?}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitlement_shared::config::ChainEndpoint;

    #[test]
    fn test_well_known_selectors() {
        assert_eq!(hex::encode(selector(BALANCE_OF)), "70a08231");
        assert_eq!(hex::encode(selector(BALANCE_OF_BATCH_ID)), "00fdd58e");
    }

    #[test]
    fn test_balance_of_call_layout() {
        let wallet = Address::repeat_byte(0xab);
        let data = balance_of_call(wallet);

        assert_eq!(data.len(), 4 + WORD);
        assert!(data[4..16].iter().all(|b| *b == 0));
        assert_eq!(&data[16..], wallet.as_bytes());

        let data = balance_of_token_call(wallet, U256::from(7u64));
        assert_eq!(data.len(), 4 + 2 * WORD);
        assert_eq!(data[data.len() - 1], 7);
    }

    #[test]
    fn test_is_entitled_call_layout() {
        let wallet = Address::repeat_byte(0x11);
        let data = is_entitled_call(wallet, &[0xde, 0xad]);
        assert_eq!(&data[..4], &selector(IS_ENTITLED_WITH_PARAMS));
        let body = &data[4..];

        // head: 两个偏移；tail: address[] (长度 + 1 个元素) 与 bytes (长度 + 1 个补零字)
        assert_eq!(body.len(), 2 * WORD + 2 * WORD + 2 * WORD);
        assert_eq!(U256::from_big_endian(&body[..WORD]), U256::from(64u64));
        assert_eq!(U256::from_big_endian(&body[WORD..2 * WORD]), U256::from(128u64));
        assert_eq!(U256::from_big_endian(&body[64..96]), U256::one());
        assert_eq!(&body[96 + 12..128], wallet.as_bytes());
        assert_eq!(U256::from_big_endian(&body[128..160]), U256::from(2u64));
        assert_eq!(&body[160..162], &[0xde, 0xad]);
    }

    #[test]
    fn test_is_entitled_without_params_uses_legacy_signature() {
        let wallet = Address::repeat_byte(0x11);
        let data = is_entitled_call(wallet, &[]);

        assert_eq!(&data[..4], &selector(IS_ENTITLED));
        // 一个偏移 + 数组长度 + 一个元素
        assert_eq!(data.len(), 4 + 3 * WORD);
        assert_eq!(&data[4 + 2 * WORD + 12..], wallet.as_bytes());
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), U256::zero());
        assert_eq!(parse_hex_quantity("0x").unwrap(), U256::zero());
        assert_eq!(
            parse_hex_quantity("0xde0b6b3a7640000").unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn test_decode_uint_output() {
        assert_eq!(decode_uint_output(&[]).unwrap(), U256::zero());
        assert!(decode_uint_output(&[1, 2, 3]).is_err());

        let mut word = vec![0u8; WORD];
        word[WORD - 1] = 5;
        assert_eq!(decode_uint_output(&word).unwrap(), U256::from(5u64));
        assert_eq!(
            decode_hex_bytes(&hex_bytes(&word)).unwrap(),
            word
        );
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = ChainConfig::default();
        config.endpoints.insert(
            "8453".to_string(),
            ChainEndpoint {
                rpc_url: "http://localhost:8545".to_string(),
                request_timeout_ms: 500,
            },
        );

        let registry = JsonRpcProviderRegistry::from_config(&config).unwrap();
        assert!(registry.provider(8453).is_some());
        assert!(registry.provider(1).is_none());
    }
}
