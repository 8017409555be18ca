//! Invoke-argument re-encoding
//!
//! Ability and combat traffic travels as envelope messages whose entries
//! carry an integer type tag plus opaque argument bytes; the argument schema
//! depends on the tag. Which messages are envelopes, which fields hold the
//! list/tag/bytes, and the tag-to-message tables are all data, loaded from a
//! JSON file next to the schema catalogs.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::proto::schema::{FieldKind, SchemaCatalog};
use crate::shift::registry::Direction;
use crate::shift::transcoder::Transcoder;

/// Shape of the batched union-command envelope
#[derive(Debug, Clone, Deserialize)]
pub struct BatchTable {
    /// Envelope message name
    pub message: String,
    /// Repeated entry field
    pub list_field: String,
    /// Per-entry opcode field
    pub id_field: String,
    /// Per-entry serialized body field
    pub body_field: String,
}

/// Shape of one invoke envelope plus its argument dispatch table
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeTable {
    /// Envelope message name
    pub message: String,
    /// Repeated entry field
    pub list_field: String,
    /// Per-entry argument type tag field
    pub type_field: String,
    /// Per-entry opaque argument bytes field
    pub data_field: String,
    /// Tag ordinal to argument message name
    pub table: HashMap<u32, String>,
}

/// All structural-message descriptions for one deployment
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchTables {
    pub batch: BatchTable,
    #[serde(default)]
    pub invokes: Vec<InvokeTable>,
}

impl DispatchTables {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse dispatch tables")
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read dispatch tables: {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid dispatch tables: {}", path.display()))
    }

    pub fn is_batch(&self, name: &str) -> bool {
        self.batch.message == name
    }

    pub fn invoke_for(&self, name: &str) -> Option<&InvokeTable> {
        self.invokes.iter().find(|t| t.message == name)
    }

    /// Check the table shapes against a catalog: every envelope message must
    /// exist, its list field must be a repeated message field, and the entry
    /// message must carry the named per-entry fields. Tables are data files;
    /// a shape mismatch is a deployment error, caught here rather than at
    /// rewrite time.
    pub fn validate(&self, catalog: &SchemaCatalog) -> anyhow::Result<()> {
        validate_envelope(
            catalog,
            &self.batch.message,
            &self.batch.list_field,
            &[&self.batch.id_field, &self.batch.body_field],
        )?;
        for invoke in &self.invokes {
            validate_envelope(
                catalog,
                &invoke.message,
                &invoke.list_field,
                &[&invoke.type_field, &invoke.data_field],
            )?;
        }
        Ok(())
    }
}

fn validate_envelope(
    catalog: &SchemaCatalog,
    message: &str,
    list_field: &str,
    entry_fields: &[&str],
) -> anyhow::Result<()> {
    let schema = catalog.message(message).with_context(|| {
        format!(
            "envelope '{message}' missing from catalog '{}'",
            catalog.revision()
        )
    })?;
    let field = schema
        .field_by_name(list_field)
        .with_context(|| format!("envelope '{message}' has no field '{list_field}'"))?;
    if !field.repeated {
        bail!("envelope '{message}': field '{list_field}' is not repeated");
    }
    let FieldKind::Message(entry_name) = &field.kind else {
        bail!("envelope '{message}': field '{list_field}' does not hold messages");
    };
    let entry = catalog.message(entry_name).with_context(|| {
        format!(
            "entry message '{entry_name}' missing from catalog '{}'",
            catalog.revision()
        )
    })?;
    for name in entry_fields {
        if entry.field_by_name(name).is_none() {
            bail!("entry message '{entry_name}' has no field '{name}'");
        }
    }
    Ok(())
}

/// Re-encode every recognized invoke argument in a decoded envelope, in
/// place. Entries with an unknown tag or an undecodable argument are logged
/// and left untouched; entry count and order never change.
pub fn reshift_invoke_args(
    table: &InvokeTable,
    transcoder: &Transcoder,
    direction: Direction,
    envelope: &mut Value,
) {
    let entries = match envelope
        .get_mut(&table.list_field)
        .and_then(Value::as_array_mut)
    {
        Some(entries) => entries,
        // Empty list decodes as an absent field
        None => return,
    };

    for entry in entries.iter_mut() {
        let Some(fields) = entry.as_object_mut() else {
            warn!(envelope = %table.message, "Invoke entry is not an object, forwarded untouched");
            continue;
        };
        let tag = fields
            .get(&table.type_field)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let arg_name = match u32::try_from(tag).ok().and_then(|t| table.table.get(&t)) {
            Some(name) => name,
            None => {
                warn!(
                    envelope = %table.message,
                    tag,
                    "Unknown invoke argument tag, entry forwarded untouched"
                );
                continue;
            }
        };

        let encoded = fields.get(&table.data_field).and_then(Value::as_str);
        let bytes = match encoded {
            Some(text) => match BASE64.decode(text) {
                Ok(bytes) => bytes,
                Err(_) => {
                    warn!(envelope = %table.message, tag, "Invoke argument is not valid base64");
                    continue;
                }
            },
            // Absent argument bytes are legal; nothing to re-encode
            None => continue,
        };

        match transcoder.transcode(arg_name, direction, &bytes) {
            Ok(shifted) => {
                fields.insert(
                    table.data_field.clone(),
                    Value::String(BASE64.encode(shifted)),
                );
            }
            Err(e) => {
                warn!(
                    envelope = %table.message,
                    argument = %arg_name,
                    error = %e,
                    "Invoke argument re-encode failed, entry forwarded untouched"
                );
            }
        }
    }
}
