//! Parsing helpers for decoded chain values.
//!
//! Node adapters hand over SCALE values converted to JSON: accounts and
//! hashes as 0x-hex strings, integers as decimal strings, enums as
//! `{ "Variant": inner }`. These helpers normalize the shapes the enricher
//! and storage fetcher rely on.

use serde_json::Value;

// =============================================================================
// Account parsing
// =============================================================================

/// Parse an account from various JSON representations.
///
/// Handles multiple formats that may be returned by Substrate nodes:
/// - Hex string: `"0x1234..."` (returned lowercased)
/// - SS58 string: returned as is
/// - Wrapped object: `{ "Id": "0x..." }`
/// - Array wrapper: `["0x..."]`
/// - Byte array: `[b0, b1, ..., b31]`
pub fn parse_account(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => {
                let bytes = hex::decode(hex_str).ok()?;
                Some(format!("0x{}", hex::encode(bytes)))
            }
            None => Some(s.clone()),
        },
        Value::Object(obj) => obj
            .get("Id")
            .or_else(|| obj.get("id"))
            .and_then(parse_account),
        Value::Array(arr) => {
            if arr.len() == 1 {
                return parse_account(&arr[0]);
            }
            if arr.len() != 32 {
                return None;
            }
            let bytes = byte_array(arr)?;
            Some(format!("0x{}", hex::encode(bytes)))
        }
        _ => None,
    }
}

/// Parse a list of accounts, skipping entries that are not accounts.
///
/// Tuples such as `(AccountId, Balance)` contribute their first element.
pub fn parse_accounts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(arr) => arr
            .iter()
            .filter_map(|item| match item {
                Value::Array(tuple) if tuple.len() != 32 && !tuple.is_empty() => {
                    parse_account(&tuple[0])
                }
                other => parse_account(other),
            })
            .collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Numeric parsing
// =============================================================================

/// Parse an amount as a decimal string.
///
/// Substrate balances are u128 which JSON numbers cannot hold, so the value
/// is validated as u128 and kept as a string.
pub fn parse_amount(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        Value::String(s) => s.parse::<u128>().ok().map(|n| n.to_string()),
        Value::Array(arr) if arr.len() == 1 => parse_amount(&arr[0]),
        _ => None,
    }
}

/// Parse a u64 from JSON.
pub fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        Value::Array(arr) if arr.len() == 1 => parse_u64(&arr[0]),
        _ => None,
    }
}

/// Parse a u32 from JSON.
pub fn parse_u32(value: &Value) -> Option<u32> {
    parse_u64(value).and_then(|v| v.try_into().ok())
}

/// Parse a boolean, accepting `DispatchResult` shapes (`{"Ok": ..}`, `{"Err": ..}`).
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        Value::Object(obj) if obj.contains_key("Ok") => Some(true),
        Value::Object(obj) if obj.contains_key("Err") => Some(false),
        _ => None,
    }
}

// =============================================================================
// Hash/bytes parsing
// =============================================================================

/// Parse a 32-byte hash into a 0x-prefixed lowercase hex string.
pub fn parse_hash(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let hex_str = s.strip_prefix("0x").unwrap_or(s);
            let bytes = hex::decode(hex_str).ok()?;
            (bytes.len() == 32).then(|| format!("0x{}", hex::encode(bytes)))
        }
        Value::Array(arr) if arr.len() == 1 => parse_hash(&arr[0]),
        Value::Array(arr) if arr.len() == 32 => {
            let bytes = byte_array(arr)?;
            Some(format!("0x{}", hex::encode(bytes)))
        }
        _ => None,
    }
}

/// Parse arbitrary bytes from JSON.
///
/// Handles:
/// - Hex string: `"0x1234..."`
/// - Byte array: `[b0, b1, ...]`
/// - Plain strings, taken as UTF-8
pub fn parse_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => hex::decode(hex_str).ok(),
            None => Some(s.as_bytes().to_vec()),
        },
        Value::Array(arr) => byte_array(arr),
        _ => None,
    }
}

/// Parse bytes and decode them as (lossy) UTF-8 text.
pub fn parse_text(value: &Value) -> Option<String> {
    parse_bytes(value).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn byte_array(arr: &[Value]) -> Option<Vec<u8>> {
    let mut bytes = Vec::with_capacity(arr.len());
    for v in arr {
        let n = parse_u64(v)?;
        bytes.push(u8::try_from(n).ok()?);
    }
    Some(bytes)
}

// =============================================================================
// Enums and naming
// =============================================================================

/// Split an enum value into `(variant, inner)`.
///
/// Unit variants may arrive as a bare string.
pub fn variant(value: &Value) -> Option<(&str, &Value)> {
    match value {
        Value::Object(obj) if obj.len() == 1 => obj.iter().next().map(|(k, v)| (k.as_str(), v)),
        Value::String(s) => Some((s.as_str(), &Value::Null)),
        _ => None,
    }
}

/// Render a decoded argument the way it is reported in payloads.
pub fn value_to_arg_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert `PascalCase` or `snake_case` to `lowerCamelCase`.
///
/// `"TechnicalCommittee"` becomes `"technicalCommittee"`, `"submit_candidacy"`
/// becomes `"submitCandidacy"`.
pub fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, c) in name.chars().enumerate() {
        if c == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if i == 0 {
            out.extend(c.to_lowercase());
        } else if upper_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper_next = false;
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
