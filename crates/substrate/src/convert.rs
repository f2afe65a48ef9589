//! SCALE value to JSON conversion and back.
//!
//! Decoded values carry their type id, so the registry tells a byte vector
//! from a list of small numbers and a newtype from a one-element tuple.
//! Values without a resolvable type (decoded storage keys) fall back to
//! shape heuristics.

use scale_info::{PortableRegistry, TypeDef, TypeDefPrimitive, form::PortableForm};
use serde_json::{Map, Value as Json};
use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef, Variant};
use subxt::utils::AccountId32;

/// Type id that resolves to nothing, for values decoded without type info.
pub(crate) const UNTYPED: u32 = u32::MAX;

// =============================================================================
// SCALE value to JSON
// =============================================================================

/// Convert a decoded value to JSON.
///
/// Accounts, hashes and other byte vectors become 0x-hex strings, integers
/// become decimal strings, enums become `{ "Variant": inner }`. Options are
/// flattened to their value or `null`, and single-field structs are
/// replaced by their field.
pub(crate) fn value_to_json(value: &Value<u32>, types: &PortableRegistry) -> Json {
    match &value.value {
        ValueDef::Composite(composite) => {
            let def = types.resolve(value.context).map(|ty| &ty.type_def);
            composite_to_json(composite, def, types)
        }
        ValueDef::Variant(variant) => variant_to_json(variant, types),
        ValueDef::Primitive(primitive) => primitive_to_json(primitive),
        ValueDef::BitSequence(bits) => Json::String(format!("{bits:?}")),
    }
}

fn composite_to_json(
    composite: &Composite<u32>,
    def: Option<&TypeDef<PortableForm>>,
    types: &PortableRegistry,
) -> Json {
    let values: Vec<&Value<u32>> = composite.values().collect();
    match def {
        Some(def @ (TypeDef::Sequence(_) | TypeDef::Array(_))) => {
            if is_byte_sequence(def, types) {
                if let Some(hex) = as_hex(&values) {
                    return Json::String(hex);
                }
            }
            Json::Array(values.iter().map(|v| value_to_json(v, types)).collect())
        }
        Some(TypeDef::Tuple(_)) => {
            Json::Array(values.iter().map(|v| value_to_json(v, types)).collect())
        }
        Some(TypeDef::Composite(_)) if values.len() == 1 => value_to_json(values[0], types),
        Some(_) => fields_to_json(composite, types),
        None => {
            if matches!(values.len(), 20 | 32 | 64) {
                if let Some(hex) = as_hex(&values) {
                    return Json::String(hex);
                }
            }
            if values.len() == 1 {
                return value_to_json(values[0], types);
            }
            fields_to_json(composite, types)
        }
    }
}

fn fields_to_json(composite: &Composite<u32>, types: &PortableRegistry) -> Json {
    match composite {
        Composite::Named(fields) => Json::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v, types)))
                .collect(),
        ),
        Composite::Unnamed(values) => {
            Json::Array(values.iter().map(|v| value_to_json(v, types)).collect())
        }
    }
}

fn variant_to_json(variant: &Variant<u32>, types: &PortableRegistry) -> Json {
    let values: Vec<&Value<u32>> = variant.values.values().collect();
    match (variant.name.as_str(), values.as_slice()) {
        ("None", []) => return Json::Null,
        // Option and MultiAddress::Id carry no information of their own
        ("Some" | "Id", [inner]) => return value_to_json(inner, types),
        _ => {}
    }

    let inner = match (&variant.values, values.as_slice()) {
        (Composite::Unnamed(_), [single]) => value_to_json(single, types),
        _ => fields_to_json(&variant.values, types),
    };
    let mut map = Map::new();
    map.insert(variant.name.clone(), inner);
    Json::Object(map)
}

fn primitive_to_json(primitive: &Primitive) -> Json {
    match primitive {
        Primitive::Bool(b) => Json::Bool(*b),
        Primitive::Char(c) => Json::String(c.to_string()),
        Primitive::String(s) => Json::String(s.clone()),
        Primitive::U128(n) => Json::String(n.to_string()),
        Primitive::I128(n) => Json::String(n.to_string()),
        Primitive::U256(n) => Json::String(format!("0x{}", hex::encode(n))),
        Primitive::I256(n) => Json::String(format!("0x{}", hex::encode(n))),
    }
}

/// Whether a sequence or array type has `u8` elements.
fn is_byte_sequence(def: &TypeDef<PortableForm>, types: &PortableRegistry) -> bool {
    let element = match def {
        TypeDef::Sequence(seq) => seq.type_param.id,
        TypeDef::Array(arr) => arr.type_param.id,
        _ => return false,
    };
    matches!(
        types.resolve(element).map(|ty| &ty.type_def),
        Some(TypeDef::Primitive(TypeDefPrimitive::U8))
    )
}

/// Render values as a 0x-hex string if every one of them is a byte.
fn as_hex<T>(values: &[&Value<T>]) -> Option<String> {
    let bytes = values
        .iter()
        .map(|v| match &v.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect::<Option<Vec<u8>>>()?;
    Some(format!("0x{}", hex::encode(bytes)))
}

// =============================================================================
// JSON to SCALE value
// =============================================================================

/// Convert a JSON storage key into a SCALE value.
///
/// Strings are tried, in order, as 0x-hex bytes, a decimal integer and an
/// SS58 account before being passed through as text.
pub(crate) fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::unnamed_composite(Vec::new()),
        Json::Bool(b) => Value::bool(*b),
        Json::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => Value::u128(u as u128),
            (None, Some(i)) => Value::i128(i as i128),
            _ => Value::string(n.to_string()),
        },
        Json::String(s) => {
            if let Some(bytes) = s.strip_prefix("0x").and_then(|h| hex::decode(h).ok()) {
                return Value::from_bytes(bytes);
            }
            if let Ok(n) = s.parse::<u128>() {
                return Value::u128(n);
            }
            if let Ok(account) = s.parse::<AccountId32>() {
                return Value::from_bytes(account.0);
            }
            Value::string(s.clone())
        }
        Json::Array(items) => Value::unnamed_composite(items.iter().map(json_to_value)),
        Json::Object(fields) => Value::named_composite(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), json_to_value(v))),
        ),
    }
}
