//! Conversion between application values and the wire's string and byte forms.
//!
//! Values are inspected through their [`Serialize`] implementation: a probing
//! serializer captures scalars directly and everything compound (records,
//! maps, sequences, enum payloads) is captured as a JSON document. The
//! resulting [`FieldValue`] drives every decision made by the attribute codec
//! and the producer: whether a value is zero, which wire data type it maps
//! to, and how it is rendered as text or bytes.

use crate::attributes::DataType;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::ser::{self, Impossible, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

#[cfg(test)]
#[path = "convert_tests.rs"]
mod tests;

// ============================================================================
// Field Values
// ============================================================================

/// A value captured from an arbitrary serializable type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Composite(Value),
}

impl FieldValue {
    /// Capture a value through its `Serialize` implementation.
    ///
    /// Optional wrappers and newtypes are unwrapped. A value that cannot be
    /// represented at all is captured as [`FieldValue::Null`].
    pub fn of<T>(value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        match value.serialize(ScalarProbe) {
            Ok(field) => field,
            Err(ProbeError::Compound) => match serde_json::to_value(value) {
                Ok(document) => Self::Composite(document),
                Err(e) => {
                    tracing::debug!(error = %e, "Value has no JSON representation, treating as empty");
                    Self::Null
                }
            },
            Err(ProbeError::Custom(message)) => {
                tracing::debug!(error = %message, "Value failed to serialize, treating as empty");
                Self::Null
            }
        }
    }

    /// Check whether the value is meaningfully empty
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::UInt(u) => *u == 0,
            Self::Float(f) => *f == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::Composite(document) => is_zero_document(document),
        }
    }

    /// Wire data type for the value, `None` when only a binary form exists
    pub fn wire_type(&self) -> Option<DataType> {
        match self {
            Self::Composite(_) | Self::Text(_) | Self::Bool(_) => Some(DataType::String),
            Self::Int(_) | Self::UInt(_) | Self::Float(_) => Some(DataType::Number),
            Self::Bytes(_) | Self::Null => None,
        }
    }

    /// Render the value as wire text; zero values render as the empty string
    pub fn to_wire_string(&self) -> String {
        if self.is_zero() {
            return String::new();
        }

        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::UInt(u) => u.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => STANDARD.encode(b),
            Self::Composite(document) => serde_json::to_string(document).unwrap_or_default(),
        }
    }

    /// Render the value as wire bytes; zero values render as no bytes.
    ///
    /// Composite values use their JSON text, numbers their big-endian
    /// machine representation and booleans a single `0`/`1` byte.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        if self.is_zero() {
            return Vec::new();
        }

        match self {
            Self::Null => Vec::new(),
            Self::Bool(b) => vec![u8::from(*b)],
            Self::Int(i) => i.to_be_bytes().to_vec(),
            Self::UInt(u) => u.to_be_bytes().to_vec(),
            Self::Float(f) => f.to_be_bytes().to_vec(),
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
            Self::Composite(document) => serde_json::to_vec(document).unwrap_or_default(),
        }
    }
}

fn is_zero_document(document: &Value) -> bool {
    match document {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

// ============================================================================
// Public Conversion Functions
// ============================================================================

/// Convert any serializable value to its wire text. Never fails.
pub fn convert_to_string<T>(value: &T) -> String
where
    T: Serialize + ?Sized,
{
    FieldValue::of(value).to_wire_string()
}

/// Convert any serializable value to wire bytes; empty when nothing can be produced
pub fn convert_to_bytes<T>(value: &T) -> Vec<u8>
where
    T: Serialize + ?Sized,
{
    FieldValue::of(value).to_wire_bytes()
}

/// Check whether a value is absent, zero, empty, or an empty record
pub fn is_zero<T>(value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    FieldValue::of(value).is_zero()
}

/// Detect the wire data type of a value; `None` means binary encoding is needed
pub fn detect_wire_type<T>(value: &T) -> Option<DataType>
where
    T: Serialize + ?Sized,
{
    FieldValue::of(value).wire_type()
}

/// Parse wire text into `T`.
///
/// Attempts run in a fixed order: JSON document, integer, boolean, float,
/// RFC 3339 timestamp and finally the raw text. A parse only wins when its
/// result also deserializes into `T`, so numeric-looking text destined for a
/// string field still falls through to the raw text.
pub fn parse_string_to_typed<T>(raw: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return Some(value);
    }

    if let Ok(i) = raw.parse::<i64>() {
        if let Some(value) = accept(Value::from(i)) {
            return Some(value);
        }
    }

    if let Ok(b) = raw.parse::<bool>() {
        if let Some(value) = accept(Value::Bool(b)) {
            return Some(value);
        }
    }

    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            if let Some(value) = accept(Value::from(f)) {
                return Some(value);
            }
        }
    }

    if DateTime::parse_from_rfc3339(raw).is_ok() {
        if let Some(value) = accept(Value::String(raw.to_owned())) {
            return Some(value);
        }
    }

    accept(Value::String(raw.to_owned()))
}

fn accept<T>(candidate: Value) -> Option<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(candidate).ok()
}

/// Extract the wire name from a field tag such as `"name,omitempty"`.
///
/// Returns the empty string when the tag carries no name or only the
/// `omitempty` marker, meaning the declared field name should be used.
pub fn field_name_from_tag(tag: &str) -> &str {
    let name = tag.split(',').next().unwrap_or_default();
    if name == "omitempty" {
        ""
    } else {
        name
    }
}

// ============================================================================
// Scalar Probe
// ============================================================================

#[derive(Debug)]
enum ProbeError {
    Compound,
    Custom(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compound => write!(f, "value is not a scalar"),
            Self::Custom(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ProbeError {}

impl ser::Error for ProbeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Serializer that captures scalars and rejects compound shapes
struct ScalarProbe;

type Rejected = Impossible<FieldValue, ProbeError>;

impl Serializer for ScalarProbe {
    type Ok = FieldValue;
    type Error = ProbeError;
    type SerializeSeq = Rejected;
    type SerializeTuple = Rejected;
    type SerializeTupleStruct = Rejected;
    type SerializeTupleVariant = Rejected;
    type SerializeMap = Rejected;
    type SerializeStruct = Rejected;
    type SerializeStructVariant = Rejected;

    fn serialize_bool(self, v: bool) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Int(i64::from(v)))
    }

    fn serialize_i16(self, v: i16) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Int(i64::from(v)))
    }

    fn serialize_i32(self, v: i32) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Int(i64::from(v)))
    }

    fn serialize_i64(self, v: i64) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<FieldValue, ProbeError> {
        Ok(i64::try_from(v)
            .map(FieldValue::Int)
            .unwrap_or_else(|_| FieldValue::Text(v.to_string())))
    }

    fn serialize_u8(self, v: u8) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::UInt(u64::from(v)))
    }

    fn serialize_u16(self, v: u16) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::UInt(u64::from(v)))
    }

    fn serialize_u32(self, v: u32) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::UInt(u64::from(v)))
    }

    fn serialize_u64(self, v: u64) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::UInt(v))
    }

    fn serialize_u128(self, v: u128) -> Result<FieldValue, ProbeError> {
        Ok(u64::try_from(v)
            .map(FieldValue::UInt)
            .unwrap_or_else(|_| FieldValue::Text(v.to_string())))
    }

    fn serialize_f32(self, v: f32) -> Result<FieldValue, ProbeError> {
        // Keep the shortest f32 decimal instead of the widened binary value
        Ok(FieldValue::Float(
            v.to_string().parse().unwrap_or_else(|_| f64::from(v)),
        ))
    }

    fn serialize_f64(self, v: f64) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Text(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Text(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Bytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<FieldValue, ProbeError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<FieldValue, ProbeError> {
        Ok(FieldValue::Text(variant.to_owned()))
    }

    fn serialize_newtype_struct<T>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<FieldValue, ProbeError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<FieldValue, ProbeError>
    where
        T: ?Sized + Serialize,
    {
        Err(ProbeError::Compound)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, ProbeError> {
        Err(ProbeError::Compound)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, ProbeError> {
        Err(ProbeError::Compound)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, ProbeError> {
        Err(ProbeError::Compound)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, ProbeError> {
        Err(ProbeError::Compound)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, ProbeError> {
        Err(ProbeError::Compound)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, ProbeError> {
        Err(ProbeError::Compound)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, ProbeError> {
        Err(ProbeError::Compound)
    }
}
