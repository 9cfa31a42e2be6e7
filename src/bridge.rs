//! Synchronously translates a JSON-RPC-shaped command into a host-app
//! response, with a hard timeout and request/id correlation.

use serde_json::{json, Value};

use crate::host::{HostBridge, COMMAND_TIMEOUT};

/// Dispatch `cmd` to `bridge` and wait up to [`COMMAND_TIMEOUT`] for a
/// reply, producing the `{ok:false, error:"Command timed out"}` envelope
/// on expiry.
pub async fn dispatch(bridge: &dyn HostBridge, cmd: Value) -> Value {
    match tokio::time::timeout(COMMAND_TIMEOUT, bridge.handle_command(cmd)).await {
        Ok(Ok(reply)) => decode_reply(reply),
        Ok(Err(_)) | Err(_) => timeout_envelope(),
    }
}

pub fn timeout_envelope() -> Value {
    json!({"ok": false, "error": "Command timed out"})
}

/// If the reply parses as a JSON object return it as-is; if it is
/// effectively empty (`null`) wrap `{ok:true}`; otherwise wrap
/// `{ok:true, result:<reply>}`.
fn decode_reply(reply: Value) -> Value {
    match reply {
        Value::Object(_) => reply,
        Value::Null => json!({"ok": true}),
        other => json!({"ok": true, "result": other}),
    }
}

/// Merge `id` into `reply` so a WebSocket caller can correlate
/// responses. Always uses structured JSON construction; concatenating
/// strings to splice an id in would reopen a JSON-injection bug class.
pub fn correlate_id(reply: Value, id: Option<Value>) -> Value {
    let Some(id) = id else { return reply };
    match reply {
        Value::Object(mut map) => {
            map.insert("id".to_string(), id);
            Value::Object(map)
        }
        other => json!({"id": id, "result": other}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHostBridge;

    #[tokio::test]
    async fn dispatch_returns_host_reply() {
        let bridge = StaticHostBridge::demo();
        let reply = dispatch(&bridge, json!({"method": "noop"})).await;
        assert_eq!(reply, json!({"ok": true}));
    }

    #[test]
    fn decode_reply_wraps_non_object_values() {
        assert_eq!(decode_reply(json!("plain")), json!({"ok": true, "result": "plain"}));
        assert_eq!(decode_reply(Value::Null), json!({"ok": true}));
        assert_eq!(decode_reply(json!({"ok": true})), json!({"ok": true}));
    }

    #[test]
    fn correlate_id_merges_into_object_reply() {
        let reply = json!({"ok": true});
        let correlated = correlate_id(reply, Some(json!(42)));
        assert_eq!(correlated, json!({"ok": true, "id": 42}));
    }

    #[test]
    fn correlate_id_handles_reply_strings_with_quotes_and_newlines() {
        // A reply string containing `"`, `\`, and newline must round-trip
        // through serde, never through string concatenation.
        let reply = json!("he said \"hi\\there\"\nline2");
        let correlated = correlate_id(reply.clone(), Some(json!("req-1")));
        let expected = json!({"id": "req-1", "result": reply});
        assert_eq!(correlated, expected);
        // Must still be valid JSON when serialized.
        let text = serde_json::to_string(&correlated).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, correlated);
    }

    #[test]
    fn correlate_id_is_noop_without_an_id() {
        let reply = json!({"ok": true});
        assert_eq!(correlate_id(reply.clone(), None), reply);
    }
}
