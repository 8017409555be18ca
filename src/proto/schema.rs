//! Dynamic message schema model
//!
//! One protocol revision is described by a `SchemaCatalog`: a set of named
//! message schemas plus the opcode assignment for the top-level messages.
//! Catalogs are plain data deserialized from JSON descriptor files produced
//! by an external toolchain; the shim itself has no generated message types.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

/// Field value kind. Enums are carried as their integer ordinal only; the
/// symbolic names may differ between revisions even when ordinals are stable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Enum,
    Float,
    String,
    Bytes,
    /// Nested message, referenced by catalog name
    Message(std::string::String),
}

/// One field of a message schema
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescriptor {
    /// Wire field number
    pub number: u32,
    /// Field name; the join key between revisions
    pub name: String,
    /// Value kind
    pub kind: FieldKind,
    /// Whether the field is repeated
    #[serde(default)]
    pub repeated: bool,
}

/// Schema of one logical message
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSchema {
    pub name: String,
    /// Opcode value for top-level messages; absent for nested-only types
    #[serde(default)]
    pub opcode: Option<u16>,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageSchema {
    /// Look up a field by wire number
    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Look up a field by name
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Raw descriptor file shape
#[derive(Debug, Deserialize)]
struct CatalogFile {
    /// Human-readable revision label, used only in logs
    #[serde(default)]
    revision: String,
    messages: Vec<MessageSchema>,
}

/// All message schemas of one protocol revision, indexed by name and opcode
#[derive(Debug)]
pub struct SchemaCatalog {
    revision: String,
    messages: HashMap<String, MessageSchema>,
    opcode_to_name: HashMap<u16, String>,
}

impl SchemaCatalog {
    /// Build a catalog from parsed schemas, rejecting duplicates
    pub fn new(
        revision: impl Into<String>,
        schemas: Vec<MessageSchema>,
    ) -> anyhow::Result<Self> {
        let revision = revision.into();
        let mut messages = HashMap::with_capacity(schemas.len());
        let mut opcode_to_name = HashMap::new();

        for schema in schemas {
            let mut seen = HashMap::new();
            let mut seen_names = HashMap::new();
            for field in &schema.fields {
                if let Some(prev) = seen.insert(field.number, &field.name) {
                    bail!(
                        "message '{}': field number {} used by both '{}' and '{}'",
                        schema.name,
                        field.number,
                        prev,
                        field.name
                    );
                }
                if seen_names.insert(&field.name, field.number).is_some() {
                    bail!(
                        "message '{}': duplicate field name '{}'",
                        schema.name,
                        field.name
                    );
                }
            }

            if let Some(opcode) = schema.opcode {
                if let Some(prev) = opcode_to_name.insert(opcode, schema.name.clone()) {
                    bail!(
                        "opcode {} assigned to both '{}' and '{}'",
                        opcode,
                        prev,
                        schema.name
                    );
                }
            }
            if messages.insert(schema.name.clone(), schema).is_some() {
                bail!("duplicate message name in catalog");
            }
        }

        Ok(Self {
            revision,
            messages,
            opcode_to_name,
        })
    }

    /// Parse a catalog from JSON descriptor text
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).context("Failed to parse schema catalog")?;
        Self::new(file.revision, file.messages)
    }

    /// Load a catalog from a JSON descriptor file
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema catalog: {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid schema catalog: {}", path.display()))
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn message(&self, name: &str) -> Option<&MessageSchema> {
        self.messages.get(name)
    }

    pub fn opcode_of(&self, name: &str) -> Option<u16> {
        self.messages.get(name).and_then(|m| m.opcode)
    }

    pub fn name_of_opcode(&self, opcode: u16) -> Option<&str> {
        self.opcode_to_name.get(&opcode).map(String::as_str)
    }

    /// Iterate over message names that carry an opcode
    pub fn dispatchable_names(&self) -> impl Iterator<Item = &str> {
        self.messages
            .values()
            .filter(|m| m.opcode.is_some())
            .map(|m| m.name.as_str())
    }

    /// Total number of message schemas
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
