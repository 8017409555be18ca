//! Generic schema transcoder
//!
//! Re-encodes a payload from one revision's schema to the other's by going
//! through the codec's self-describing intermediate form. There is no
//! per-message mapping code; the two catalogs and the shared field names do
//! all the work. Fields the target revision does not know are dropped, and
//! fields it added since are left at their defaults.

use std::sync::Arc;

use serde_json::Value;

use crate::error::DecodeError;
use crate::proto::{decode_message, encode_message, SchemaCatalog};
use crate::shift::registry::Direction;

/// Revision-to-revision payload converter
#[derive(Debug, Clone)]
pub struct Transcoder {
    new_catalog: Arc<SchemaCatalog>,
    old_catalog: Arc<SchemaCatalog>,
}

impl Transcoder {
    pub fn new(new_catalog: Arc<SchemaCatalog>, old_catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            new_catalog,
            old_catalog,
        }
    }

    /// Catalog a payload travelling in `direction` was encoded under
    pub fn source(&self, direction: Direction) -> &SchemaCatalog {
        match direction {
            Direction::ClientToServer => &self.new_catalog,
            Direction::ServerToClient => &self.old_catalog,
        }
    }

    /// Catalog the payload must be re-encoded under
    pub fn target(&self, direction: Direction) -> &SchemaCatalog {
        match direction {
            Direction::ClientToServer => &self.old_catalog,
            Direction::ServerToClient => &self.new_catalog,
        }
    }

    /// Decode under the source revision into the intermediate form
    pub fn decode(
        &self,
        name: &str,
        direction: Direction,
        payload: &[u8],
    ) -> Result<Value, DecodeError> {
        decode_message(self.source(direction), name, payload)
    }

    /// Encode the intermediate form under the target revision
    pub fn encode(
        &self,
        name: &str,
        direction: Direction,
        value: &Value,
    ) -> Result<Vec<u8>, DecodeError> {
        encode_message(self.target(direction), name, value)
    }

    /// Full conversion: decode under the source schema, re-encode under the
    /// target schema
    pub fn transcode(
        &self,
        name: &str,
        direction: Direction,
        payload: &[u8],
    ) -> Result<Vec<u8>, DecodeError> {
        let value = self.decode(name, direction, payload)?;
        self.encode(name, direction, &value)
    }
}
