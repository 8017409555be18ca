//! Console chat handling
//!
//! Private chat with the console pseudo-player doubles as a command shell:
//! the typed text (or a canned command behind an emoji icon) runs through
//! the `CommandExecutor`, the player's message is echoed back, and the
//! command output arrives as a chat message from the console.

use serde_json::{json, Value};
use tracing::debug;

use crate::inject::{now_secs, Injections};
use crate::net::{PendingInteraction, Session};

pub const PRIVATE_CHAT_REQ: &str = "PrivateChatReq";
pub const PRIVATE_CHAT_RSP: &str = "PrivateChatRsp";
pub const PRIVATE_CHAT_NOTIFY: &str = "PrivateChatNotify";
pub const PULL_PRIVATE_CHAT_REQ: &str = "PullPrivateChatReq";
pub const PULL_PRIVATE_CHAT_RSP: &str = "PullPrivateChatRsp";
pub const PULL_RECENT_CHAT_RSP: &str = "PullRecentChatRsp";

/// Canned commands behind icon-only messages
fn icon_command(icon: u64) -> Option<&'static str> {
    match icon {
        1 => Some("point 3 all"),
        2 => Some("point 5 all"),
        _ => None,
    }
}

/// Chat entry in intermediate form
pub(crate) fn text_entry(time: u32, uid: u32, to_uid: u32, text: &str) -> Value {
    json!({ "time": time, "uid": uid, "to_uid": to_uid, "text": text })
}

fn icon_entry(time: u32, uid: u32, to_uid: u32, icon: u64) -> Value {
    json!({ "time": time, "uid": uid, "to_uid": to_uid, "icon": icon })
}

pub(crate) fn observe_private_chat(inj: &Injections, session: &mut Session, value: &Value) {
    let target = value.get("target_uid").and_then(Value::as_u64).unwrap_or(0) as u32;
    if target != inj.profile().uid {
        return;
    }

    session.set_pending(PendingInteraction::AwaitingCommandReply);
    let now = now_secs();
    let player = session.uid();

    let (command, echo) = if let Some(text) = value.get("text").and_then(Value::as_str) {
        (Some(text.to_string()), text_entry(now, player, target, text))
    } else if let Some(icon) = value.get("icon").and_then(Value::as_u64) {
        (
            icon_command(icon).map(String::from),
            icon_entry(now, player, target, icon),
        )
    } else {
        return;
    };

    // Echo the player's own message so it shows up in their chat window
    inj.send_to_client(session, PRIVATE_CHAT_NOTIFY, &json!({ "chat_info": echo }));

    let Some(command) = command else {
        debug!(session_id = session.id, "Icon message with no mapped command");
        return;
    };
    debug!(session_id = session.id, uid = player, command = %command, "Console command");
    let reply = inj.run_command(player, &command);
    inj.send_to_client(
        session,
        PRIVATE_CHAT_NOTIFY,
        &json!({ "chat_info": text_entry(now, target, player, &reply) }),
    );
}

pub(crate) fn observe_pull_private_chat(inj: &Injections, session: &mut Session, value: &Value) {
    let target = value.get("target_uid").and_then(Value::as_u64).unwrap_or(0) as u32;
    if target == inj.profile().uid {
        session.set_pending(PendingInteraction::AwaitingConsoleHistory);
    }
}

/// The upstream server knows nothing about the console conversation; answer
/// with a plain success instead of its error
pub(crate) fn rewrite_private_chat(
    _inj: &Injections,
    session: &mut Session,
    value: &mut Value,
) -> bool {
    if session.pending() != PendingInteraction::AwaitingCommandReply {
        return false;
    }
    session.take_pending();
    *value = json!({});
    true
}

/// Chat history with the console is a single welcome message
pub(crate) fn rewrite_pull_private_chat(
    inj: &Injections,
    session: &mut Session,
    value: &mut Value,
) -> bool {
    if session.pending() != PendingInteraction::AwaitingConsoleHistory {
        return false;
    }
    session.take_pending();
    let profile = inj.profile();
    *value = json!({
        "chat_info": [text_entry(
            now_secs(),
            profile.uid,
            session.uid(),
            &profile.welcome_text,
        )]
    });
    true
}

/// Surface the console conversation in the recent-chats list
pub(crate) fn rewrite_pull_recent_chat(
    inj: &Injections,
    session: &mut Session,
    value: &mut Value,
) -> bool {
    let profile = inj.profile();
    let entry = text_entry(now_secs(), profile.uid, session.uid(), &profile.welcome_text);
    match value.get_mut("chat_info") {
        Some(Value::Array(list)) => list.push(entry),
        _ => {
            value["chat_info"] = json!([entry]);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::crypto::derive_session_key;
    use crate::inject::{ConsoleProfile, EchoExecutor};
    use crate::net::{EncryptMode, OutboundPacket};
    use crate::proto::{decode_message, SchemaCatalog};

    fn new_catalog() -> Arc<SchemaCatalog> {
        Arc::new(
            SchemaCatalog::from_json(
                r#"{
                    "revision": "new",
                    "messages": [
                        {
                            "name": "ChatInfo",
                            "fields": [
                                { "number": 1, "name": "time", "kind": "uint32" },
                                { "number": 2, "name": "uid", "kind": "uint32" },
                                { "number": 3, "name": "to_uid", "kind": "uint32" },
                                { "number": 4, "name": "text", "kind": "string" },
                                { "number": 5, "name": "icon", "kind": "uint32" }
                            ]
                        },
                        {
                            "name": "PrivateChatNotify",
                            "opcode": 5042,
                            "fields": [
                                { "number": 1, "name": "chat_info", "kind": { "message": "ChatInfo" } }
                            ]
                        }
                    ]
                }"#,
            )
            .unwrap(),
        )
    }

    fn injections() -> Injections {
        Injections::new(
            ConsoleProfile::default(),
            Arc::new(EchoExecutor),
            new_catalog(),
        )
    }

    fn active_session() -> (Session, mpsc::Receiver<OutboundPacket>) {
        let (tx, rx) = mpsc::channel(8);
        let mut session = Session::with_channel(1, tx);
        session.establish(700, derive_session_key(1)).unwrap();
        (session, rx)
    }

    #[test]
    fn test_chat_command_echo_and_reply() {
        let inj = injections();
        let (mut session, mut rx) = active_session();
        let console_uid = inj.profile().uid;

        observe_private_chat(
            &inj,
            &mut session,
            &json!({ "target_uid": console_uid, "text": "help" }),
        );

        assert_eq!(session.pending(), PendingInteraction::AwaitingCommandReply);

        let echo = rx.try_recv().unwrap();
        assert_eq!(echo.opcode, 5042);
        assert_eq!(echo.encrypt, EncryptMode::SessionKey);
        let echo = decode_message(&new_catalog(), PRIVATE_CHAT_NOTIFY, &echo.payload).unwrap();
        assert_eq!(echo["chat_info"]["uid"], json!(700));
        assert_eq!(echo["chat_info"]["text"], json!("help"));

        let reply = rx.try_recv().unwrap();
        let reply = decode_message(&new_catalog(), PRIVATE_CHAT_NOTIFY, &reply.payload).unwrap();
        assert_eq!(reply["chat_info"]["uid"], json!(console_uid as u64));
        assert_eq!(reply["chat_info"]["text"], json!("echo: help"));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_icon_maps_to_canned_command() {
        let inj = injections();
        let (mut session, mut rx) = active_session();

        observe_private_chat(
            &inj,
            &mut session,
            &json!({ "target_uid": inj.profile().uid, "icon": 1 }),
        );

        let echo = rx.try_recv().unwrap();
        let echo = decode_message(&new_catalog(), PRIVATE_CHAT_NOTIFY, &echo.payload).unwrap();
        assert_eq!(echo["chat_info"]["icon"], json!(1));

        let reply = rx.try_recv().unwrap();
        let reply = decode_message(&new_catalog(), PRIVATE_CHAT_NOTIFY, &reply.payload).unwrap();
        assert_eq!(reply["chat_info"]["text"], json!("echo: point 3 all"));
    }

    #[test]
    fn test_chat_to_other_player_ignored() {
        let inj = injections();
        let (mut session, mut rx) = active_session();

        observe_private_chat(
            &inj,
            &mut session,
            &json!({ "target_uid": 1234, "text": "hi" }),
        );

        assert_eq!(session.pending(), PendingInteraction::None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_private_chat_rsp_rewrite_gated_on_pending() {
        let inj = injections();
        let (mut session, _rx) = active_session();

        let mut value = json!({ "retcode": 1 });
        assert!(!rewrite_private_chat(&inj, &mut session, &mut value));
        assert_eq!(value, json!({ "retcode": 1 }));

        session.set_pending(PendingInteraction::AwaitingCommandReply);
        assert!(rewrite_private_chat(&inj, &mut session, &mut value));
        assert_eq!(value, json!({}));
        assert_eq!(session.pending(), PendingInteraction::None);
    }

    #[test]
    fn test_console_history_rewrite() {
        let inj = injections();
        let (mut session, _rx) = active_session();
        session.set_pending(PendingInteraction::AwaitingConsoleHistory);

        let mut value = json!({ "chat_info": [{ "uid": 5, "text": "old" }] });
        assert!(rewrite_pull_private_chat(&inj, &mut session, &mut value));

        let list = value["chat_info"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["uid"], json!(inj.profile().uid as u64));
        assert_eq!(list[0]["text"], json!(inj.profile().welcome_text.clone()));
        assert_eq!(session.pending(), PendingInteraction::None);
    }

    #[test]
    fn test_recent_chat_appends_console_entry() {
        let inj = injections();
        let (mut session, _rx) = active_session();

        let mut value = json!({ "chat_info": [{ "uid": 5, "text": "hello" }] });
        assert!(rewrite_pull_recent_chat(&inj, &mut session, &mut value));
        let list = value["chat_info"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1]["uid"], json!(inj.profile().uid as u64));

        // Also works when the list decoded as absent
        let mut value = json!({});
        assert!(rewrite_pull_recent_chat(&inj, &mut session, &mut value));
        assert_eq!(value["chat_info"].as_array().unwrap().len(), 1);
    }
}
