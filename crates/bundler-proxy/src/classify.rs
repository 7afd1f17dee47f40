//! Method classification: which backend(s) handle a call and how their
//! responses become the client's response.

use crate::backend::BackendVersion;
use crate::error::ProxyError;
use crate::routing::RoutingTable;
use crate::rpc::{self, RpcRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Answered locally from the discovered entry points.
    Aggregate,
    /// Always one backend.
    Fixed(BackendVersion),
    /// Backend chosen by the entry point at `params[index]`.
    ByEntryPoint { index: usize },
    /// Ask `primary`; if it has no result, ask `secondary`.
    Fallback {
        primary: BackendVersion,
        secondary: BackendVersion,
    },
    /// Send to `secondary` and ignore its answer, then answer from `primary`.
    Fanout {
        secondary: BackendVersion,
        primary: BackendVersion,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Aggregate => "aggregate",
            Strategy::Fixed(_) => "fixed",
            Strategy::ByEntryPoint { .. } => "entry_point",
            Strategy::Fallback { .. } => "fallback",
            Strategy::Fanout { .. } => "fanout",
        }
    }
}

pub fn classify(method: &str) -> Strategy {
    match method {
        rpc::SUPPORTED_ENTRY_POINTS => Strategy::Aggregate,
        rpc::CHAIN_ID => Strategy::Fixed(BackendVersion::V07),
        rpc::DUMP_MEMPOOL | rpc::DUMP_REPUTATION => Strategy::ByEntryPoint { index: 0 },
        rpc::SEND_USER_OPERATION | rpc::ESTIMATE_USER_OPERATION_GAS | rpc::SET_REPUTATION => {
            Strategy::ByEntryPoint { index: 1 }
        }
        rpc::GET_USER_OPERATION_BY_HASH | rpc::GET_USER_OPERATION_RECEIPT => Strategy::Fallback {
            primary: BackendVersion::V06,
            secondary: BackendVersion::V07,
        },
        rpc::CLEAR_STATE | rpc::SEND_BUNDLE_NOW | rpc::SET_BUNDLING_MODE => Strategy::Fanout {
            secondary: BackendVersion::V06,
            primary: BackendVersion::V07,
        },
        _ => Strategy::Fixed(BackendVersion::V07),
    }
}

/// Backend owning the entry point at `params[index]`.
///
/// A missing or non-string parameter, or an address neither backend reported,
/// is [`ProxyError::UnsupportedEntryPoint`].
pub fn select_by_entry_point(
    request: &RpcRequest,
    index: usize,
    routes: &RoutingTable,
) -> Result<BackendVersion, ProxyError> {
    let unsupported = |entry_point: Option<&str>| ProxyError::UnsupportedEntryPoint {
        method: request.method.clone(),
        entry_point: entry_point.map(str::to_string),
    };

    let entry_point = request.string_param(index).ok_or_else(|| unsupported(None))?;
    if !routes.is_supported(entry_point) {
        return Err(unsupported(Some(entry_point)));
    }
    match routes.resolve(entry_point) {
        Some(BackendVersion::V06) => Ok(BackendVersion::V06),
        _ => Ok(BackendVersion::V07),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::tests::{route, EP_V06, EP_V07};
    use serde_json::json;

    fn routes() -> RoutingTable {
        RoutingTable::new(
            route(BackendVersion::V06, "http://v06.invalid", &[EP_V06]),
            route(BackendVersion::V07, "http://v07.invalid", &[EP_V07]),
        )
    }

    #[test]
    fn test_method_table() {
        use BackendVersion::*;
        let cases = [
            ("eth_supportedEntryPoints", Strategy::Aggregate),
            ("eth_chainId", Strategy::Fixed(V07)),
            ("debug_bundler_dumpMempool", Strategy::ByEntryPoint { index: 0 }),
            ("debug_bundler_dumpReputation", Strategy::ByEntryPoint { index: 0 }),
            ("eth_sendUserOperation", Strategy::ByEntryPoint { index: 1 }),
            ("eth_estimateUserOperationGas", Strategy::ByEntryPoint { index: 1 }),
            ("debug_bundler_setReputation", Strategy::ByEntryPoint { index: 1 }),
            (
                "eth_getUserOperationByHash",
                Strategy::Fallback { primary: V06, secondary: V07 },
            ),
            (
                "eth_getUserOperationReceipt",
                Strategy::Fallback { primary: V06, secondary: V07 },
            ),
            (
                "debug_bundler_clearState",
                Strategy::Fanout { secondary: V06, primary: V07 },
            ),
            (
                "debug_bundler_sendBundleNow",
                Strategy::Fanout { secondary: V06, primary: V07 },
            ),
            (
                "debug_bundler_setBundlingMode",
                Strategy::Fanout { secondary: V06, primary: V07 },
            ),
        ];
        for (method, expected) in cases {
            assert_eq!(classify(method), expected, "{method}");
        }
    }

    #[test]
    fn test_unknown_methods_default_to_v07() {
        assert_eq!(classify("eth_blockNumber"), Strategy::Fixed(BackendVersion::V07));
        assert_eq!(classify(""), Strategy::Fixed(BackendVersion::V07));
    }

    #[test]
    fn test_select_by_entry_point() {
        let routes = routes();
        let op = json!({"sender": "0x01"});

        let req = RpcRequest::new(1, rpc::SEND_USER_OPERATION, vec![op.clone(), json!(EP_V06)]);
        assert_eq!(select_by_entry_point(&req, 1, &routes).unwrap(), BackendVersion::V06);

        let req = RpcRequest::new(1, rpc::SEND_USER_OPERATION, vec![op, json!(EP_V07)]);
        assert_eq!(select_by_entry_point(&req, 1, &routes).unwrap(), BackendVersion::V07);
    }

    #[test]
    fn test_select_rejects_unusable_params() {
        let routes = routes();
        let cases = [
            vec![],
            vec![json!(null)],
            vec![json!({"address": EP_V06})],
            vec![json!("0x0000000000000000000000000000000000000001")],
        ];
        for params in cases {
            let req = RpcRequest::new(1, rpc::DUMP_MEMPOOL, params.clone());
            let err = select_by_entry_point(&req, 0, &routes).unwrap_err();
            assert!(
                matches!(err, ProxyError::UnsupportedEntryPoint { .. }),
                "accepted {params:?}"
            );
        }
    }
}
