//! Line-delimited JSON command/response surface for the external wireless transport (spec §6).
//! The transport itself (Bluetooth/Wi-Fi framing, pairing, file chunking for SNAP/LOG_EXPORT) is
//! out of scope here; this module only translates protocol lines into [`crate::service::Command`]
//! and serializes [`crate::service::Response`] back into the wire's JSON-per-line shape.

use crate::service::{Command, Response};
use serde_json::{json, Value};

/// Parses one inbound protocol line into a service command. Unrecognized or out-of-core commands
/// (`INFO`, `NET`, `BT`, `AUTH_IMAGE`, `SNAP`, `REFRESH`, `CAM_RESTART`, `LOG_EXPORT`,
/// `BT_RESTART`) map to [`Command::Unsupported`] — their handling lives entirely in the transport
/// layer, which the core never needs to know about.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest = parts.next().unwrap_or("").trim();

    match verb.as_str() {
        "AUTH" => Command::Auth,
        "USERS" => Command::Users,
        "OPEN" => Command::Open,
        "LOCK" => Command::Lock,
        "RET_RECOG" => Command::RetRecog,
        "REGISTER" if !rest.is_empty() => Command::Register { name: rest.to_string() },
        "CANCEL_REGISTER" => Command::CancelRegister,
        _ => Command::Unsupported,
    }
}

/// Serializes a [`Response`] into the JSON-per-line shape the protocol expects, tagging each
/// with the `type` field matching its command domain.
pub fn encode_response(response: &Response) -> String {
    let value: Value = match response {
        Response::Auth { state, streak, allow_entry } => json!({
            "type": "auth",
            "state": state,
            "streak": streak,
            "allow_entry": allow_entry,
        }),
        Response::Users { items } => json!({
            "type": "users",
            "items": items.iter().map(|(id, name)| json!({"id": id, "name": name})).collect::<Vec<_>>(),
        }),
        Response::Ack => json!({"type": "cmd", "ok": true}),
        Response::RetRecog(snapshot) => match snapshot {
            Some(s) => json!({
                "type": "auth_img",
                "name": s.name,
                "similarity": s.similarity,
                "decision": format!("{:?}", s.decision),
            }),
            None => json!({"type": "auth_img", "name": Value::Null}),
        },
        Response::Unsupported => json!({"type": "cmd", "ok": false, "error": "unsupported"}),
        Response::Error(message) => json!({"type": "cmd", "ok": false, "error": message}),
    };

    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Decision;

    #[test]
    fn parses_known_verbs_case_insensitively() {
        assert!(matches!(parse_command("auth"), Command::Auth));
        assert!(matches!(parse_command("OPEN"), Command::Open));
        assert!(matches!(parse_command("register alice"), Command::Register { .. }));
    }

    #[test]
    fn out_of_core_verbs_are_unsupported() {
        assert!(matches!(parse_command("INFO"), Command::Unsupported));
        assert!(matches!(parse_command("SNAP"), Command::Unsupported));
        assert!(matches!(parse_command("AUTH_IMAGE 7"), Command::Unsupported));
    }

    #[test]
    fn ack_encodes_as_cmd_type() {
        let line = encode_response(&Response::Ack);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "cmd");
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn ret_recog_carries_decision() {
        let snapshot = crate::service::RecognitionSnapshot {
            name: Some("alice".into()),
            similarity: 0.98,
            decision: Decision::StrongAccept,
        };
        let line = encode_response(&Response::RetRecog(Some(snapshot)));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "auth_img");
        assert_eq!(value["name"], "alice");
    }
}
