//! Best-effort value coercion and column-name canonicalization

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static pattern compiles"));

static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.\-]+").expect("static pattern compiles"));

/// Canonical form of a column name: lowercase, runs of anything that is not
/// `[a-z0-9]` collapsed to `_`, leading and trailing `_` removed.
///
/// `"GPU Util"`, `"gpu_util"` and `"GPU-UTIL"` all become `"gpu_util"`.
pub fn canonicalize_column(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    NON_ALNUM
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

/// Parse a loosely formatted number.
///
/// Thousands separators and unit suffixes are stripped (`"1,024 MiB"` → 1024),
/// so anything that still fails to parse yields `None`.
pub fn to_float(token: &str) -> Option<f64> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_commas = trimmed.replace(',', "");
    let numeric = NON_NUMERIC.replace_all(&without_commas, "");
    if numeric.is_empty() {
        return None;
    }
    numeric.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a non-negative integer field; fractions truncate, negatives reject.
pub fn to_index(token: &str) -> Option<u32> {
    to_float(token)
        .filter(|v| *v >= 0.0)
        .map(|v| v.trunc().min(u32::MAX as f64) as u32)
}

/// Render a JSON value as a raw token, the shape CSV cells arrive in.
///
/// `null` becomes the blank token, which every lookup treats as missing.
pub fn json_token(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                // f64 Display never uses exponent notation
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        other => other.to_string(),
    }
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
