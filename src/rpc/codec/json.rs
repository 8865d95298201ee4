//! JSON-RPC 1.0/2.0 codec
//!
//! The version is negotiated per request: `"jsonrpc":"2.0"` selects 2.0 framing,
//! anything else gets a 1.0 reply carrying both `result` and `error`.

use serde::Serialize;
use serde_json::Value;

use crate::rpc::{
    codec::{Codec, Protocol},
    fault::Fault,
    request::{Batch, CallRequest, CallResult, Params, ProtocolVersion},
};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize)]
struct ResponseV2<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a Fault>,
    id: &'a Value,
}

#[derive(Serialize)]
struct ResponseV1<'a> {
    result: Option<&'a Value>,
    error: Option<&'a Fault>,
    id: &'a Value,
}

impl Codec for JsonCodec {
    fn protocol(&self) -> Protocol {
        Protocol::JsonRpc
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode(&self, body: &[u8]) -> Result<Batch, Fault> {
        let payload: Value = serde_json::from_slice(body).map_err(|_| Fault::parse_error())?;

        match payload {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(Fault::invalid_request());
                }
                let requests = items
                    .into_iter()
                    .map(decode_request)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Batch {
                    requests,
                    is_batch: true,
                })
            }
            single => Ok(Batch {
                requests: vec![decode_request(single)?],
                is_batch: false,
            }),
        }
    }

    fn encode(&self, pairs: Vec<(CallRequest, CallResult)>, is_batch: bool) -> String {
        let replies: Vec<&(CallRequest, CallResult)> = pairs
            .iter()
            .filter(|(request, _)| !request.is_notification)
            .collect();

        // A single fault replaces the whole response, batch or not.
        if let Some((request, result)) = replies.iter().find(|(_, result)| result.is_err()) {
            return encode_reply(request, result);
        }

        let entries: Vec<String> = replies
            .iter()
            .map(|(request, result)| encode_reply(request, result))
            .collect();

        if !is_batch {
            return entries.into_iter().next().unwrap_or_default();
        }
        format!("[ {} ]", entries.join(", "))
    }

    fn encode_fault(&self, fault: &Fault) -> String {
        to_json(&ResponseV2 {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(fault),
            id: &Value::Null,
        })
    }
}

fn decode_request(value: Value) -> Result<CallRequest, Fault> {
    let Value::Object(mut object) = value else {
        return Err(Fault::parse_error());
    };

    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(Fault::parse_error()),
    };

    let version = match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => ProtocolVersion::JsonRpc2,
        _ => ProtocolVersion::JsonRpc1,
    };

    let id = object.remove("id");
    let is_notification = matches!(id, None | Some(Value::Null));
    let params = object
        .remove("params")
        .map(Params::from_value)
        .unwrap_or_else(Params::empty);

    Ok(CallRequest {
        method,
        params,
        id,
        is_notification,
        version,
    })
}

fn encode_reply(request: &CallRequest, result: &CallResult) -> String {
    let id = request.id.as_ref().unwrap_or(&Value::Null);
    let (result, error) = match result {
        Ok(value) => (Some(value), None),
        Err(fault) => (None, Some(fault)),
    };

    match request.version {
        ProtocolVersion::JsonRpc1 => to_json(&ResponseV1 { result, error, id }),
        ProtocolVersion::JsonRpc2 | ProtocolVersion::XmlRpc => to_json(&ResponseV2 {
            jsonrpc: JSONRPC_VERSION,
            result,
            error,
            id,
        }),
    }
}

fn to_json<T: Serialize>(response: &T) -> String {
    serde_json::to_string(response).expect("jsonrpc response serialization")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rpc::fault::FaultKind;

    fn decode(body: &str) -> Result<Batch, Fault> {
        JsonCodec.decode(body.as_bytes())
    }

    fn parse(body: &str) -> Value {
        serde_json::from_str(body).expect("valid json output")
    }

    #[test]
    fn single_request_is_not_a_batch() {
        let batch = decode(r#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":7}"#)
            .expect("decodes");
        assert!(!batch.is_batch);
        let request = &batch.requests[0];
        assert_eq!(request.method, "add");
        assert_eq!(request.params, Params::Positional(vec![json!(2), json!(3)]));
        assert_eq!(request.id, Some(json!(7)));
        assert_eq!(request.version, ProtocolVersion::JsonRpc2);
        assert!(!request.is_notification);
    }

    #[test]
    fn missing_id_marks_notification_and_missing_marker_selects_v1() {
        let batch = decode(r#"{"method":"ping"}"#).expect("decodes");
        let request = &batch.requests[0];
        assert!(request.is_notification);
        assert_eq!(request.version, ProtocolVersion::JsonRpc1);
        assert_eq!(request.params, Params::empty());
    }

    #[test]
    fn malformed_json_and_missing_method_are_parse_errors() {
        for body in [
            "{not json",
            r#"{"params":[1]}"#,
            r#"[{"method":"a","id":1},{"id":2}]"#,
            r#"[{"method":"a","id":1}, 5]"#,
        ] {
            let fault = decode(body).expect_err("parse error");
            assert_eq!(fault.kind, FaultKind::ParseError, "body: {body}");
        }
    }

    #[test]
    fn empty_batch_is_invalid_request() {
        let fault = decode("[]").expect_err("empty batch");
        assert_eq!(fault.kind, FaultKind::InvalidRequest);
    }

    #[test]
    fn encodes_v2_success_in_wire_order() {
        let batch = decode(r#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":7}"#)
            .expect("decodes");
        let pairs = vec![(batch.requests[0].clone(), Ok(json!(5)))];
        assert_eq!(
            JsonCodec.encode(pairs, false),
            r#"{"jsonrpc":"2.0","result":5,"id":7}"#
        );
    }

    #[test]
    fn encodes_v1_with_both_result_and_error() {
        let batch = decode(r#"{"method":"add","params":[2,3],"id":"a"}"#).expect("decodes");
        let pairs = vec![(batch.requests[0].clone(), Ok(json!(5)))];
        assert_eq!(
            JsonCodec.encode(pairs, false),
            r#"{"result":5,"error":null,"id":"a"}"#
        );
    }

    #[test]
    fn batch_preserves_order_and_skips_notifications() {
        let batch = decode(
            r#"[{"jsonrpc":"2.0","method":"a","id":1},
                {"jsonrpc":"2.0","method":"b"},
                {"jsonrpc":"2.0","method":"c","id":3}]"#,
        )
        .expect("decodes");
        let pairs = batch
            .requests
            .iter()
            .cloned()
            .zip([Ok(json!("a")), Ok(json!("b")), Ok(json!("c"))])
            .collect();

        let encoded = JsonCodec.encode(pairs, batch.is_batch);
        assert!(encoded.starts_with("[ ") && encoded.ends_with(" ]"));
        assert_eq!(
            parse(&encoded),
            json!([
                {"jsonrpc": "2.0", "result": "a", "id": 1},
                {"jsonrpc": "2.0", "result": "c", "id": 3}
            ])
        );
    }

    #[test]
    fn notification_only_single_request_encodes_empty_body() {
        let batch = decode(r#"{"jsonrpc":"2.0","method":"a"}"#).expect("decodes");
        let pairs = vec![(batch.requests[0].clone(), Ok(json!(1)))];
        assert_eq!(JsonCodec.encode(pairs, false), "");
    }

    #[test]
    fn a_fault_replaces_the_whole_batch() {
        let batch = decode(
            r#"[{"jsonrpc":"2.0","method":"a","id":1},{"jsonrpc":"2.0","method":"b","id":2}]"#,
        )
        .expect("decodes");
        let pairs = batch
            .requests
            .iter()
            .cloned()
            .zip([Ok(json!(1)), Err(Fault::method_not_found())])
            .collect();

        assert_eq!(
            parse(&JsonCodec.encode(pairs, true)),
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "Method Not Found"},
                "id": 2
            })
        );
    }

    #[test]
    fn faults_of_notifications_stay_silent() {
        let batch = decode(r#"[{"method":"a","params":[1,1]},{"method":"bogus","params":[]}]"#)
            .expect("decodes");
        let pairs = batch
            .requests
            .iter()
            .cloned()
            .zip([Ok(json!(2)), Err(Fault::method_not_found())])
            .collect();

        assert_eq!(parse(&JsonCodec.encode(pairs, true)), json!([]));
    }

    #[test]
    fn decode_fault_has_null_id() {
        assert_eq!(
            JsonCodec.encode_fault(&Fault::parse_error()),
            r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse Error"},"id":null}"#
        );
    }
}
