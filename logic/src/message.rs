use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single RPC envelope. `command` is present on requests and absent on
/// responses — the receiving end tells them apart by its presence, not by a
/// separate frame type. See `examples/original_source/dht/protocol.py`'s
/// `Message` class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub command: Option<Command>,
}

/// The four RPCs the protocol defines. Serializes to its lower-case name,
/// matching the wire strings `"identify"`, `"find_node"`, `"find_value"`,
/// `"store"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Identify,
    FindNode,
    FindValue,
    Store,
}

impl Message {
    pub fn request(id: u64, command: Command, data: Value) -> Self {
        Self { id, data, command: Some(command) }
    }

    pub fn response(id: u64, data: Value) -> Self {
        Self { id, data, command: None }
    }

    pub fn is_request(&self) -> bool {
        self.command.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_roundtrip() {
        let msg = Message::request(3, Command::FindNode, json!("abcd"));
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.id, 3);
        assert_eq!(back.command, Some(Command::FindNode));
        assert_eq!(back.data, json!("abcd"));
    }

    #[test]
    fn response_omits_command_field() {
        let msg = Message::response(3, json!({"ok": true}));
        let bytes = serde_json::to_vec(&msg).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains("command"));
    }

    #[test]
    fn response_without_command_key_parses() {
        let raw = r#"{"id": 7, "data": null}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert!(!msg.is_request());
    }
}
