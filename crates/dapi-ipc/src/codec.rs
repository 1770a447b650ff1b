//! Record codec
//!
//! One encode and one decode routine serve every function and every role:
//! the [`RecordLayout`] of the role says which slots exist and which of them
//! announce a trailing payload.
//!
//! Strings are opaque bytes on the wire and stay bytes here; callers that
//! need text convert with [`Args::str`] or [`Args::lossy`].

use std::borrow::Cow;
use std::io::Read;

use crate::protocol::{RecordLayout, Slot};
use crate::schema::ArgType;
use crate::wire::{self, FrameError, Header};

/// A decoded or to-be-encoded argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    String(Vec<u8>),
    StringList(Vec<Vec<u8>>),
    IntList(Vec<i32>),
}

impl Value {
    /// The value a reply carries when an action did not happen
    pub fn zero(ty: &ArgType) -> Self {
        match ty {
            ArgType::Bool => Value::Bool(false),
            ArgType::Int(_) => Value::Int(0),
            ArgType::String => Value::String(Vec::new()),
            ArgType::StringList => Value::StringList(Vec::new()),
            ArgType::IntList => Value::IntList(Vec::new()),
        }
    }

    /// A string value from raw bytes
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value::String(bytes.into())
    }

    pub fn matches(&self, ty: &ArgType) -> bool {
        matches!(
            (self, ty),
            (Value::Bool(_), ArgType::Bool)
                | (Value::Int(_), ArgType::Int(_))
                | (Value::String(_), ArgType::String)
                | (Value::StringList(_), ArgType::StringList)
                | (Value::IntList(_), ArgType::IntList)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// The string as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_byte_list(&self) -> Option<&[Vec<u8>]> {
        match self {
            Value::StringList(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i32]> {
        match self {
            Value::IntList(value) => Some(value),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::String(_) => "string",
            Value::StringList(_) => "stringlist",
            Value::IntList(_) => "intlist",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into_bytes())
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StringList(value.into_iter().map(String::into_bytes).collect())
    }
}

impl From<&[&str]> for Value {
    fn from(value: &[&str]) -> Self {
        Value::StringList(value.iter().map(|s| s.as_bytes().to_vec()).collect())
    }
}

impl From<Vec<Vec<u8>>> for Value {
    fn from(value: Vec<Vec<u8>>) -> Self {
        Value::StringList(value)
    }
}

impl From<Vec<i32>> for Value {
    fn from(value: Vec<i32>) -> Self {
        Value::IntList(value)
    }
}

/// Named argument values, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    entries: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Args::insert`]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set `name`, replacing an earlier value
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Zero values for every field of `layout`
    pub fn zeroed(layout: &RecordLayout) -> Self {
        let mut args = Self::new();
        for field in &layout.fields {
            args.insert(&field.name, Value::zero(&field.ty));
        }
        args
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(Value::as_bytes)
    }

    /// `None` unless `name` is a string holding valid UTF-8
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Text of `name` with invalid sequences replaced
    pub fn lossy(&self, name: &str) -> Option<Cow<'_, str>> {
        self.bytes(name).map(String::from_utf8_lossy)
    }

    pub fn byte_list(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.get(name).and_then(Value::as_byte_list)
    }

    /// Items of `name` as text, invalid sequences replaced
    pub fn string_list(&self, name: &str) -> Option<Vec<String>> {
        self.byte_list(name).map(|items| {
            items
                .iter()
                .map(|item| String::from_utf8_lossy(item).into_owned())
                .collect()
        })
    }

    pub fn int_list(&self, name: &str) -> Option<&[i32]> {
        self.get(name).and_then(Value::as_int_list)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a frame could not be written
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("missing argument `{0}`")]
    MissingArgument(String),
    #[error("argument `{name}` should be {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: &'static str,
    },
    #[error("argument `{0}` is too long for the wire")]
    TooLong(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn wire_len(name: &str, len: usize) -> Result<i32, EncodeError> {
    i32::try_from(len).map_err(|_| EncodeError::TooLong(name.to_string()))
}

/// Encode a whole frame: header, record, then trailing payloads
pub fn encode_frame(
    header: Header,
    layout: &RecordLayout,
    args: &Args,
) -> Result<Vec<u8>, EncodeError> {
    let mut values = Vec::with_capacity(layout.fields.len());
    for field in &layout.fields {
        let value = args
            .get(&field.name)
            .ok_or_else(|| EncodeError::MissingArgument(field.name.clone()))?;
        if !value.matches(&field.ty) {
            return Err(EncodeError::TypeMismatch {
                name: field.name.clone(),
                expected: field.ty.spelling().to_string(),
                actual: value.kind(),
            });
        }
        values.push(value);
    }

    let mut buf = Vec::with_capacity(Header::SIZE + layout.size());
    header.encode_into(&mut buf);

    if values.is_empty() {
        wire::put_i32(&mut buf, 0);
    }
    for (field, value) in layout.fields.iter().zip(&values) {
        let slot = match value {
            Value::Bool(b) => i32::from(*b),
            Value::Int(i) => *i,
            Value::String(s) => wire_len(&field.name, s.len())?,
            Value::StringList(list) => wire_len(&field.name, list.len())?,
            Value::IntList(list) => wire_len(&field.name, list.len())?,
        };
        wire::put_i32(&mut buf, slot);
    }

    for (index, field) in layout.trailing() {
        match values[index] {
            Value::String(bytes) => buf.extend_from_slice(bytes),
            Value::StringList(list) => {
                for item in list {
                    wire::put_i32(&mut buf, wire_len(&field.name, item.len())?);
                    buf.extend_from_slice(item);
                }
            }
            Value::IntList(list) => {
                for item in list {
                    wire::put_i32(&mut buf, *item);
                }
            }
            Value::Bool(_) | Value::Int(_) => {}
        }
    }

    Ok(buf)
}

/// Decode a record and its trailing payloads.
///
/// Every length in the record is checked before any payload is read, and
/// either every field is materialised or nothing is returned.
pub fn decode_body<R: Read>(
    reader: &mut R,
    layout: &RecordLayout,
    max_payload_len: usize,
) -> Result<Args, FrameError> {
    let mut record = vec![0u8; layout.size()];
    wire::read_exact(reader, &mut record)?;

    let mut values = Vec::with_capacity(layout.fields.len());
    let mut lengths = vec![0usize; layout.fields.len()];
    for (index, field) in layout.fields.iter().enumerate() {
        let raw = wire::i32_at(&record, index);
        values.push(match field.slot {
            Slot::Bool => Some(Value::Bool(raw != 0)),
            Slot::Int => Some(Value::Int(raw)),
            Slot::Length | Slot::Count => {
                lengths[index] = wire::checked_len(&field.name, raw, max_payload_len)?;
                None
            }
        });
    }

    for (index, field) in layout.trailing() {
        let len = lengths[index];
        let value = match field.ty {
            ArgType::String => Value::String(read_bytes(reader, len)?),
            ArgType::StringList => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    let item_len =
                        wire::checked_len(&field.name, wire::read_i32(reader)?, max_payload_len)?;
                    items.push(read_bytes(reader, item_len)?);
                }
                Value::StringList(items)
            }
            ArgType::IntList => {
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(wire::read_i32(reader)?);
                }
                Value::IntList(items)
            }
            ArgType::Bool | ArgType::Int(_) => continue,
        };
        values[index] = Some(value);
    }

    let mut args = Args::new();
    for (field, value) in layout.fields.iter().zip(values) {
        if let Some(value) = value {
            args.insert(&field.name, value);
        }
    }
    Ok(args)
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, FrameError> {
    let mut bytes = vec![0u8; len];
    wire::read_exact(reader, &mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod property_tests;
