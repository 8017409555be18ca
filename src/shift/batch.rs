//! Recursive batch re-dispatch
//!
//! The union-command envelope carries independently serialized packets as
//! `{ message_id, body }` entries. Each entry re-enters the pipeline as if
//! it had arrived on its own, and both the id and the body are rewritten in
//! place with the shifted result. Entry count and order never change; a
//! failing entry is forwarded exactly as it arrived.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::warn;

use crate::net::Session;
use crate::shift::pipeline::Pipeline;
use crate::shift::registry::{Direction, Opcode};

/// Re-dispatch every entry of a decoded batch envelope, in place
pub fn reshift_batch(
    pipeline: &Pipeline,
    session: &mut Session,
    direction: Direction,
    envelope: &mut Value,
    depth: usize,
) {
    let table = &pipeline.tables().batch;
    let entries = match envelope
        .get_mut(&table.list_field)
        .and_then(Value::as_array_mut)
    {
        Some(entries) => entries,
        None => return,
    };

    for entry in entries.iter_mut() {
        let Some(fields) = entry.as_object_mut() else {
            warn!(session_id = session.id, "Batched entry is not an object, forwarded as is");
            continue;
        };
        let id = fields.get(&table.id_field).and_then(Value::as_u64).unwrap_or(0);
        let opcode = match u16::try_from(id) {
            Ok(value) => Opcode::new(value, direction),
            Err(_) => {
                warn!(message_id = id, "Batched opcode out of range, entry forwarded as is");
                continue;
            }
        };

        let body = match fields.get(&table.body_field).and_then(Value::as_str) {
            Some(text) => match BASE64.decode(text) {
                Ok(bytes) => bytes,
                Err(_) => {
                    warn!(opcode = opcode.value, "Batched body is not valid base64");
                    continue;
                }
            },
            // Absent body is an empty payload
            None => Vec::new(),
        };

        match pipeline.pre_handle(session, opcode, &body, depth + 1) {
            Ok(shifted) => {
                fields.insert(table.id_field.clone(), json!(shifted.opcode));
                fields.insert(
                    table.body_field.clone(),
                    Value::String(BASE64.encode(shifted.payload)),
                );
            }
            Err(e) => {
                warn!(
                    session_id = session.id,
                    opcode = opcode.value,
                    error = %e,
                    "Batched entry shift failed, forwarded as is"
                );
            }
        }
    }
}
