//! Console social surfaces
//!
//! The console pseudo-player is appended to the friend list and answers
//! social-detail lookups with a synthesized profile, so it is reachable
//! through the normal chat UI.

use serde_json::{json, Value};

use crate::inject::Injections;
use crate::net::{PendingInteraction, Session};

pub const FRIEND_LIST_RSP: &str = "GetPlayerFriendListRsp";
pub const SOCIAL_DETAIL_REQ: &str = "GetPlayerSocialDetailReq";
pub const SOCIAL_DETAIL_RSP: &str = "GetPlayerSocialDetailRsp";

/// Online-state ordinal for an online friend
const ONLINE_STATE_ONLINE: u32 = 1;

/// Friend-list entry for the console, in intermediate form
fn console_brief(inj: &Injections) -> Value {
    let profile = inj.profile();
    json!({
        "uid": profile.uid,
        "nickname": profile.nickname,
        "level": profile.level,
        "world_level": profile.world_level,
        "signature": profile.signature,
        "name_card_id": profile.name_card_id,
        "online_state": ONLINE_STATE_ONLINE,
        "is_game_source": true,
        "profile_picture": {
            "avatar_id": profile.avatar_id,
            "costume_id": profile.costume_id
        }
    })
}

pub(crate) fn observe_social_detail(inj: &Injections, session: &mut Session, value: &Value) {
    let uid = value.get("uid").and_then(Value::as_u64).unwrap_or(0) as u32;
    if uid == inj.profile().uid {
        session.set_pending(PendingInteraction::AwaitingSocialDetail);
    }
}

/// Append the console pseudo-friend to the real friend list
pub(crate) fn rewrite_friend_list(
    inj: &Injections,
    _session: &mut Session,
    value: &mut Value,
) -> bool {
    let entry = console_brief(inj);
    match value.get_mut("friend_list") {
        Some(Value::Array(list)) => list.push(entry),
        _ => {
            value["friend_list"] = json!([entry]);
        }
    }
    true
}

/// The upstream server has no player behind the console uid; synthesize the
/// profile instead of forwarding its error
pub(crate) fn rewrite_social_detail(
    inj: &Injections,
    session: &mut Session,
    value: &mut Value,
) -> bool {
    if session.pending() != PendingInteraction::AwaitingSocialDetail {
        return false;
    }
    session.take_pending();

    let mut detail = console_brief(inj);
    detail["is_friend"] = json!(true);
    *value = json!({ "detail_data": detail });
    true
}
