//! Schema-driven payload codec
//!
//! Decodes a binary payload into a self-describing intermediate form (a
//! `serde_json::Value` keyed by field name) and encodes that form back under
//! any schema. The intermediate form deliberately renders enums as their
//! integer ordinal — enum value names may differ between revisions even when
//! the ordinals are stable — and bytes fields as base64 strings. Encoding
//! walks the *target* schema, so fields the target does not recognize are
//! dropped and fields missing from the intermediate form keep the target's
//! default by omission.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::DecodeError;
use crate::proto::schema::{FieldDescriptor, FieldKind, MessageSchema, SchemaCatalog};
use crate::proto::wire::{
    WireReader, WireWriter, WIRE_FIXED32, WIRE_LEN, WIRE_VARINT,
};

/// Decode a payload under the named schema into the intermediate form
pub fn decode_message(
    catalog: &SchemaCatalog,
    name: &str,
    payload: &[u8],
) -> Result<Value, DecodeError> {
    let schema = catalog
        .message(name)
        .ok_or_else(|| DecodeError::UnknownMessage(name.to_string()))?;
    decode_fields(catalog, schema, payload)
}

fn decode_fields(
    catalog: &SchemaCatalog,
    schema: &MessageSchema,
    payload: &[u8],
) -> Result<Value, DecodeError> {
    let mut reader = WireReader::new(payload);
    let mut object = Map::new();

    while reader.has_remaining() {
        let (number, wire_type) = reader.read_tag()?;
        let field = match schema.field_by_number(number) {
            Some(field) => field,
            None => {
                // Unknown to this schema; valid, skip by wire type
                reader.skip(wire_type, number)?;
                continue;
            }
        };

        if field.repeated && wire_type == WIRE_LEN && is_varint_kind(&field.kind) {
            // Packed repeated scalars
            let chunk = reader.read_len_delimited()?;
            let mut packed = WireReader::new(chunk);
            let list = list_entry(&mut object, &field.name)?;
            while packed.has_remaining() {
                let raw = packed.read_varint()?;
                list.push(varint_to_value(&field.kind, raw));
            }
            continue;
        }

        let value = decode_single(catalog, field, wire_type, &mut reader)?;
        if field.repeated {
            list_entry(&mut object, &field.name)?.push(value);
        } else {
            object.insert(field.name.clone(), value);
        }
    }

    Ok(Value::Object(object))
}

fn decode_single(
    catalog: &SchemaCatalog,
    field: &FieldDescriptor,
    wire_type: u8,
    reader: &mut WireReader<'_>,
) -> Result<Value, DecodeError> {
    match &field.kind {
        FieldKind::Bool
        | FieldKind::Uint32
        | FieldKind::Int32
        | FieldKind::Uint64
        | FieldKind::Int64
        | FieldKind::Enum => {
            expect_wire(field, WIRE_VARINT, wire_type)?;
            Ok(varint_to_value(&field.kind, reader.read_varint()?))
        }
        FieldKind::Float => {
            expect_wire(field, WIRE_FIXED32, wire_type)?;
            let bits = reader.read_fixed32()?;
            let float = f64::from(f32::from_bits(bits));
            match serde_json::Number::from_f64(float) {
                Some(number) => Ok(Value::Number(number)),
                None => {
                    // NaN/infinity has no JSON form; carry 0 so the field
                    // survives re-encoding instead of vanishing silently.
                    warn!(field = %field.name, "Non-finite float decoded as 0");
                    Ok(json!(0.0))
                }
            }
        }
        FieldKind::String => {
            expect_wire(field, WIRE_LEN, wire_type)?;
            let bytes = reader.read_len_delimited()?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| DecodeError::InvalidUtf8(field.name.clone()))?;
            Ok(Value::String(text.to_string()))
        }
        FieldKind::Bytes => {
            expect_wire(field, WIRE_LEN, wire_type)?;
            let bytes = reader.read_len_delimited()?;
            Ok(Value::String(BASE64.encode(bytes)))
        }
        FieldKind::Message(nested) => {
            expect_wire(field, WIRE_LEN, wire_type)?;
            let bytes = reader.read_len_delimited()?;
            let schema = catalog
                .message(nested)
                .ok_or_else(|| DecodeError::UnknownMessage(nested.clone()))?;
            decode_fields(catalog, schema, bytes)
        }
    }
}

/// Encode the intermediate form under the named schema
pub fn encode_message(
    catalog: &SchemaCatalog,
    name: &str,
    value: &Value,
) -> Result<Vec<u8>, DecodeError> {
    let schema = catalog
        .message(name)
        .ok_or_else(|| DecodeError::UnknownMessage(name.to_string()))?;
    let mut writer = WireWriter::new();
    encode_fields(catalog, schema, value, &mut writer)?;
    Ok(writer.into_bytes())
}

fn encode_fields(
    catalog: &SchemaCatalog,
    schema: &MessageSchema,
    value: &Value,
    writer: &mut WireWriter,
) -> Result<(), DecodeError> {
    let object = value.as_object().ok_or_else(|| DecodeError::ValueType {
        field: schema.name.clone(),
        expected: "object",
    })?;

    for field in &schema.fields {
        let entry = match object.get(&field.name) {
            Some(Value::Null) | None => continue,
            Some(entry) => entry,
        };

        if field.repeated {
            let items = entry.as_array().ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "array",
            })?;
            for item in items {
                encode_single(catalog, field, item, writer)?;
            }
        } else {
            encode_single(catalog, field, entry, writer)?;
        }
    }

    Ok(())
}

fn encode_single(
    catalog: &SchemaCatalog,
    field: &FieldDescriptor,
    value: &Value,
    writer: &mut WireWriter,
) -> Result<(), DecodeError> {
    match &field.kind {
        FieldKind::Bool
        | FieldKind::Uint32
        | FieldKind::Int32
        | FieldKind::Uint64
        | FieldKind::Int64
        | FieldKind::Enum => {
            writer.write_tag(field.number, WIRE_VARINT);
            writer.write_varint(value_to_varint(&field.kind, field, value)?);
        }
        FieldKind::Float => {
            let float = value.as_f64().ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "number",
            })?;
            writer.write_tag(field.number, WIRE_FIXED32);
            writer.write_fixed32((float as f32).to_bits());
        }
        FieldKind::String => {
            let text = value.as_str().ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "string",
            })?;
            writer.write_tag(field.number, WIRE_LEN);
            writer.write_len_delimited(text.as_bytes());
        }
        FieldKind::Bytes => {
            let text = value.as_str().ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "string",
            })?;
            let bytes = BASE64
                .decode(text)
                .map_err(|_| DecodeError::InvalidBase64(field.name.clone()))?;
            writer.write_tag(field.number, WIRE_LEN);
            writer.write_len_delimited(&bytes);
        }
        FieldKind::Message(nested) => {
            let schema = catalog
                .message(nested)
                .ok_or_else(|| DecodeError::UnknownMessage(nested.clone()))?;
            let mut inner = WireWriter::new();
            encode_fields(catalog, schema, value, &mut inner)?;
            writer.write_tag(field.number, WIRE_LEN);
            writer.write_len_delimited(&inner.into_bytes());
        }
    }
    Ok(())
}

fn expect_wire(field: &FieldDescriptor, expected: u8, got: u8) -> Result<(), DecodeError> {
    if got == expected {
        Ok(())
    } else {
        Err(DecodeError::WireType {
            field: field.name.clone(),
            expected,
            got,
        })
    }
}

/// Fetch (or create) the array slot for a repeated field. Catalog validation
/// keeps field names unique, so a non-array slot cannot arise from a valid
/// catalog; it is still reported as a decode error, never a panic.
fn list_entry<'a>(
    object: &'a mut Map<String, Value>,
    name: &str,
) -> Result<&'a mut Vec<Value>, DecodeError> {
    let slot = object
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(list) => Ok(list),
        _ => Err(DecodeError::ValueType {
            field: name.to_string(),
            expected: "array",
        }),
    }
}

fn is_varint_kind(kind: &FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Bool
            | FieldKind::Uint32
            | FieldKind::Int32
            | FieldKind::Uint64
            | FieldKind::Int64
            | FieldKind::Enum
    )
}

fn varint_to_value(kind: &FieldKind, raw: u64) -> Value {
    match kind {
        FieldKind::Bool => Value::Bool(raw != 0),
        FieldKind::Uint32 | FieldKind::Uint64 => json!(raw),
        // Signed and enum values travel as two's complement varints
        FieldKind::Int32 | FieldKind::Int64 | FieldKind::Enum => json!(raw as i64),
        _ => unreachable!("not a varint kind"),
    }
}

fn value_to_varint(
    kind: &FieldKind,
    field: &FieldDescriptor,
    value: &Value,
) -> Result<u64, DecodeError> {
    match kind {
        FieldKind::Bool => {
            let flag = value.as_bool().ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "bool",
            })?;
            Ok(u64::from(flag))
        }
        FieldKind::Uint32 | FieldKind::Uint64 => {
            value.as_u64().ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "unsigned integer",
            })
        }
        FieldKind::Int32 | FieldKind::Int64 | FieldKind::Enum => value
            .as_i64()
            .map(|v| v as u64)
            .ok_or_else(|| DecodeError::ValueType {
                field: field.name.clone(),
                expected: "integer",
            }),
        _ => unreachable!("not a varint kind"),
    }
}
