//! Feature injections
//!
//! When the administrative console is enabled, a handful of messages get
//! intercepted around the generic transcoding path: requests toward the
//! console pseudo-player are observed for side effects, and the matching
//! responses are rewritten so the console shows up in the client's social
//! surfaces. At most one injection fires per message and direction, and the
//! request/response pairs coordinate only through `Session::pending`.

pub mod chat;
pub mod friends;
pub mod map;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::net::{EncryptMode, Session};
use crate::proto::{encode_message, SchemaCatalog};

/// Executes console commands on behalf of a player. The shim itself has no
/// command semantics; a transport host supplies the real implementation.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` as `uid` and return the reply text shown in chat
    fn execute(&self, uid: u32, command: &str) -> String;
}

/// Default executor: echoes the command back. Useful for wiring tests and
/// deployments without a command backend.
#[derive(Debug, Default)]
pub struct EchoExecutor;

impl CommandExecutor for EchoExecutor {
    fn execute(&self, _uid: u32, command: &str) -> String {
        format!("echo: {command}")
    }
}

fn default_console_uid() -> u32 {
    99
}

fn default_nickname() -> String {
    "Server Console".to_string()
}

fn default_level() -> u32 {
    60
}

fn default_world_level() -> u32 {
    8
}

fn default_signature() -> String {
    "Type a command in chat to run it".to_string()
}

fn default_name_card_id() -> u32 {
    210_001
}

fn default_avatar_id() -> u32 {
    10_000_007
}

fn default_welcome_text() -> String {
    "Welcome! Send me a command and I will run it for you.".to_string()
}

/// Identity the console presents to clients
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleProfile {
    #[serde(default = "default_console_uid")]
    pub uid: u32,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_world_level")]
    pub world_level: u32,
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_name_card_id")]
    pub name_card_id: u32,
    #[serde(default = "default_avatar_id")]
    pub avatar_id: u32,
    #[serde(default)]
    pub costume_id: u32,
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
}

impl Default for ConsoleProfile {
    fn default() -> Self {
        Self {
            uid: default_console_uid(),
            nickname: default_nickname(),
            level: default_level(),
            world_level: default_world_level(),
            signature: default_signature(),
            name_card_id: default_name_card_id(),
            avatar_id: default_avatar_id(),
            costume_id: 0,
            welcome_text: default_welcome_text(),
        }
    }
}

/// Console injection dispatch. Holds the console identity, the command
/// backend and the NEW catalog used to encode packets sent directly to the
/// client.
pub struct Injections {
    profile: ConsoleProfile,
    executor: Arc<dyn CommandExecutor>,
    new_catalog: Arc<SchemaCatalog>,
}

impl Injections {
    pub fn new(
        profile: ConsoleProfile,
        executor: Arc<dyn CommandExecutor>,
        new_catalog: Arc<SchemaCatalog>,
    ) -> Self {
        Self {
            profile,
            executor,
            new_catalog,
        }
    }

    pub fn profile(&self) -> &ConsoleProfile {
        &self.profile
    }

    /// Client-to-server leg: side effects only, the request is forwarded
    /// unmodified afterwards
    pub fn observe(&self, session: &mut Session, name: &str, value: &Value) {
        match name {
            chat::PRIVATE_CHAT_REQ => chat::observe_private_chat(self, session, value),
            chat::PULL_PRIVATE_CHAT_REQ => chat::observe_pull_private_chat(self, session, value),
            friends::SOCIAL_DETAIL_REQ => friends::observe_social_detail(self, session, value),
            map::MARK_MAP_REQ => map::observe_mark_map(self, session, value),
            _ => {}
        }
    }

    /// Server-to-client leg: may replace or amend the decoded response
    /// before it is re-encoded under the NEW revision. Returns whether an
    /// injection fired.
    pub fn rewrite(&self, session: &mut Session, name: &str, value: &mut Value) -> bool {
        match name {
            chat::PRIVATE_CHAT_RSP => chat::rewrite_private_chat(self, session, value),
            chat::PULL_PRIVATE_CHAT_RSP => chat::rewrite_pull_private_chat(self, session, value),
            chat::PULL_RECENT_CHAT_RSP => chat::rewrite_pull_recent_chat(self, session, value),
            friends::FRIEND_LIST_RSP => friends::rewrite_friend_list(self, session, value),
            friends::SOCIAL_DETAIL_RSP => friends::rewrite_social_detail(self, session, value),
            _ => false,
        }
    }

    pub(crate) fn run_command(&self, uid: u32, command: &str) -> String {
        self.executor.execute(uid, command)
    }

    /// Encode a message under the NEW revision and queue it to the client
    /// with session-key encryption
    pub(crate) fn send_to_client(&self, session: &Session, name: &str, value: &Value) {
        let opcode = match self.new_catalog.opcode_of(name) {
            Some(opcode) => opcode,
            None => {
                warn!(message = name, "No opcode for injected message");
                return;
            }
        };
        let payload = match encode_message(&self.new_catalog, name, value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(message = name, error = %e, "Failed to encode injected message");
                return;
            }
        };
        if let Err(e) = session.send(opcode, payload, EncryptMode::SessionKey) {
            warn!(session_id = session.id, message = name, error = %e, "Injected send failed");
        }
    }
}

impl std::fmt::Debug for Injections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injections")
            .field("profile", &self.profile)
            .finish()
    }
}

/// Wall-clock seconds, the timestamp format chat entries use
pub(crate) fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
