//! Dynamic protocol schema support
//!
//! The shim never links generated message types. Each revision's catalog is
//! loaded as data (`schema`), payloads are decoded and re-encoded against
//! those catalogs (`codec`) over shared wire primitives (`wire`).

pub mod codec;
pub mod schema;
pub mod wire;

pub use codec::{decode_message, encode_message};
pub use schema::{FieldDescriptor, FieldKind, MessageSchema, SchemaCatalog};
