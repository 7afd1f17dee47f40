//! JSON-RPC envelopes and the bundler method names the proxy dispatches on.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const SUPPORTED_ENTRY_POINTS: &str = "eth_supportedEntryPoints";
pub const CHAIN_ID: &str = "eth_chainId";
pub const SEND_USER_OPERATION: &str = "eth_sendUserOperation";
pub const ESTIMATE_USER_OPERATION_GAS: &str = "eth_estimateUserOperationGas";
pub const GET_USER_OPERATION_BY_HASH: &str = "eth_getUserOperationByHash";
pub const GET_USER_OPERATION_RECEIPT: &str = "eth_getUserOperationReceipt";
pub const DUMP_MEMPOOL: &str = "debug_bundler_dumpMempool";
pub const DUMP_REPUTATION: &str = "debug_bundler_dumpReputation";
pub const SET_REPUTATION: &str = "debug_bundler_setReputation";
pub const CLEAR_STATE: &str = "debug_bundler_clearState";
pub const SEND_BUNDLE_NOW: &str = "debug_bundler_sendBundleNow";
pub const SET_BUNDLING_MODE: &str = "debug_bundler_setBundlingMode";

/// Inbound request envelope. Only the fields the proxy routes on are typed;
/// the original bytes are what gets forwarded.
///
/// `id`, `jsonrpc` and `params` default when absent or `null`, but a present
/// `id` must be an integer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: i64, method: &str, params: Vec<Value>) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }

    /// String parameter at `index`, if present and a string.
    pub fn string_param(&self, index: usize) -> Option<&str> {
        self.params.get(index).and_then(Value::as_str)
    }
}

/// Response envelope. `result` is `None` for both an absent field and an
/// explicit `null`, which bundlers use to mean "not known here". The other
/// fields are carried loosely so that only `result` decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<T = Value> {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

/// Answer to `eth_supportedEntryPoints`. Always carries `result`, even when
/// the list is empty.
#[derive(Debug, Clone, Serialize)]
pub struct EntryPointsResponse<'a> {
    pub id: i64,
    pub jsonrpc: &'a str,
    pub result: Vec<&'a str>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
