//! Canonical JSON codec.
//!
//! One byte representation per value:
//! - Objects: keys sorted lexicographically (UTF-8 code point order);
//!   duplicate keys are rejected at parse time
//! - Arrays: order preserved (caller is responsible for stable ordering)
//! - Strings: `\r\n` / `\r` collapse to `\n`; values of path-context keys
//!   normalize to POSIX separators; offset-carrying ISO-8601 timestamps
//!   normalize to UTC `Z` truncated to milliseconds
//! - Numbers: integers undotted; finite floats in shortest round-trip form
//!   (serde_json's ryu); non-finite rejected
//! - Output: compact UTF-8, no trailing newline
//! - Atomic write: temp file in same dir + fsync(temp) + rename; fsync(dir)
//!   on Unix; direct-write fallback if rename fails (e.g., cross-device)

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{Deserializer, Error as DeError, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use rpk_core::volatile::is_path_context_key;

use crate::IoError;

/* ---------------------------- strict parsing ---------------------------- */

const DUPLICATE_KEY_MARK: &str = "duplicate object key `";

/// Parse JSON bytes, rejecting duplicate object keys and trailing garbage.
///
/// serde_json silently keeps the last of repeated keys; the artifact
/// contract forbids them, so parsing goes through a strict visitor.
pub fn parse_strict(bytes: &[u8]) -> Result<Value, IoError> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = StrictValue::deserialize(&mut de)
        .map_err(classify_parse_error)?
        .0;
    de.end().map_err(classify_parse_error)?;
    Ok(value)
}

fn classify_parse_error(e: serde_json::Error) -> IoError {
    let msg = e.to_string();
    if let Some(start) = msg.find(DUPLICATE_KEY_MARK) {
        let rest = &msg[start + DUPLICATE_KEY_MARK.len()..];
        let key = rest.split('`').next().unwrap_or(rest).to_string();
        IoError::DuplicateKey { key }
    } else {
        IoError::InvalidJson(msg)
    }
}

struct StrictValue(Value);

impl<'de> Deserialize<'de> for StrictValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StrictVisitor;

        impl<'de> Visitor<'de> for StrictVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
                Ok(Value::Bool(b))
            }

            fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
                Ok(Value::Number(n.into()))
            }

            fn visit_u64<E>(self, n: u64) -> Result<Value, E> {
                Ok(Value::Number(n.into()))
            }

            fn visit_f64<E: DeError>(self, n: f64) -> Result<Value, E> {
                Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| E::custom("non-finite number"))
            }

            fn visit_str<E>(self, s: &str) -> Result<Value, E> {
                Ok(Value::String(s.to_string()))
            }

            fn visit_string<E>(self, s: String) -> Result<Value, E> {
                Ok(Value::String(s))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(StrictValue(v)) = seq.next_element()? {
                    items.push(v);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A>(self, mut access: A) -> Result<Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Map::new();
                while let Some(key) = access.next_key::<String>()? {
                    if out.contains_key(&key) {
                        return Err(A::Error::custom(format!(
                            "{DUPLICATE_KEY_MARK}{key}`"
                        )));
                    }
                    let StrictValue(v) = access.next_value()?;
                    out.insert(key, v);
                }
                Ok(Value::Object(out))
            }
        }

        deserializer.deserialize_any(StrictVisitor).map(StrictValue)
    }
}

/* ---------------------------- canonical emit ---------------------------- */

/// Convert a `Value` to canonical bytes.
pub fn to_canonical_bytes(v: &Value) -> Result<Vec<u8>, IoError> {
    let mut out = Vec::with_capacity(1024);
    write_canonical_value(v, None, &mut out)?;
    Ok(out)
}

/// Convert any `Serialize` to canonical bytes.
pub fn canonical_bytes_of<T: Serialize>(t: &T) -> Result<Vec<u8>, IoError> {
    let value = serde_json::to_value(t).map_err(|e| IoError::InvalidJson(e.to_string()))?;
    to_canonical_bytes(&value)
}

fn write_canonical_value(
    v: &Value,
    context_key: Option<&str>,
    out: &mut Vec<u8>,
) -> Result<(), IoError> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(IoError::NonFiniteNumber);
                }
            }
            // Integers print undotted (itoa); floats print shortest
            // round-trip (ryu). Both are locale-free.
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => {
            let normalized = normalize_string(s, context_key);
            let quoted =
                serde_json::to_string(&normalized).expect("string serialization cannot fail");
            out.extend_from_slice(quoted.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            let mut first = true;
            for item in items {
                if !first {
                    out.push(b',');
                }
                first = false;
                write_canonical_value(item, None, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            keys.sort_unstable();
            let mut first = true;
            for k in keys {
                if !first {
                    out.push(b',');
                }
                first = false;
                let quoted_key =
                    serde_json::to_string(k).expect("key serialization cannot fail");
                out.extend_from_slice(quoted_key.as_bytes());
                out.push(b':');
                write_canonical_value(&map[k], Some(k), out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

/* -------------------------- string normalization ------------------------- */

fn normalize_string(s: &str, context_key: Option<&str>) -> String {
    let s = normalize_newlines(s);
    if context_key.is_some_and(is_path_context_key) {
        return normalize_path_string(&s);
    }
    if let Some(ts) = normalize_timestamp(&s) {
        return ts;
    }
    s
}

/// Collapse `\r\n` and bare `\r` to `\n`.
fn normalize_newlines(s: &str) -> String {
    if !s.contains('\r') {
        return s.to_string();
    }
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// POSIX separators, no duplicate `/`, no trailing `/` except root.
fn normalize_path_string(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// ISO-8601 with an explicit offset → UTC `Z`, at most 3 fractional digits.
/// Offset-free strings are left untouched.
fn normalize_timestamp(s: &str) -> Option<String> {
    let dt: DateTime<chrono::FixedOffset> = DateTime::parse_from_rfc3339(s).ok()?;
    let utc = dt.with_timezone(&Utc);
    let format = if utc.timestamp_subsec_millis() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Millis
    };
    Some(utc.to_rfc3339_opts(format, true))
}

/* ------------------------------ atomic write ----------------------------- */

/// Write `bytes` to `path` atomically (with safe cross-device fallback).
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    let parent = path
        .parent()
        .ok_or_else(|| IoError::Path("path has no parent".to_string()))?;
    fs::create_dir_all(parent)?;

    let tmp = make_unique_tmp_path(path);
    let mut tf = OpenOptions::new()
        .write(true)
        .create_new(true) // avoid clobbering another writer's temp
        .open(&tmp)?;
    tf.write_all(bytes)?;
    tf.sync_all()?;
    drop(tf);

    match fs::rename(&tmp, path) {
        Ok(()) => {
            let _ = fsync_dir(parent);
            Ok(())
        }
        Err(_) => {
            // Fallback: write directly to the target (handles cross-device cases).
            let res: io::Result<()> = (|| {
                let mut f = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                f.write_all(bytes)?;
                f.sync_all()?;
                Ok(())
            })();
            let _ = fs::remove_file(&tmp);
            res?;
            let _ = fsync_dir(parent);
            Ok(())
        }
    }
}

/// "<filename>.<pid>.<counter>.tmp" next to the destination.
fn make_unique_tmp_path(target: &Path) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let fname = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    let tmp_name = format!("{fname}.{pid}.{n}.tmp");
    match target.parent() {
        Some(dir) => dir.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> io::Result<()> {
    let df = OpenOptions::new().read(true).open(dir)?;
    df.sync_all()
}

#[cfg(not(unix))]
#[inline]
fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/* --------------------------------- tests -------------------------------- */
