//! Message attribute codec.
//!
//! Encoding walks a map or record through its `Serialize` implementation and
//! keeps every non-zero field as a typed wire attribute. Decoding parses each
//! wire value back into the richest representation the target type accepts,
//! dropping entries that fit nothing.

use crate::convert::{field_name_from_tag, parse_string_to_typed, FieldValue};
use crate::error::SqsError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::ser::{self, Impossible, SerializeMap, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[cfg(test)]
#[path = "attributes_tests.rs"]
mod tests;

/// Field name marking a record field as excluded from the attributes
pub const EXCLUDED_FIELD: &str = "-";

// ============================================================================
// Wire Types
// ============================================================================

/// Data type carried by a wire attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Number,
    Binary,
}

impl DataType {
    /// Wire name of the data type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Binary => "Binary",
        }
    }

    /// Map a wire data type name, including custom suffixes such as
    /// `Number.float`, onto its base type
    pub fn from_wire_name(name: &str) -> Self {
        if name.starts_with("Number") {
            Self::Number
        } else if name.starts_with("Binary") {
            Self::Binary
        } else {
            Self::String
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single wire attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeValue {
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "binary_serde")]
    pub binary_value: Option<Bytes>,
}

impl AttributeValue {
    /// Create a text attribute
    pub fn string(value: impl Into<String>) -> Self {
        Self::with_string(DataType::String, value)
    }

    /// Create a numeric attribute from its decimal text
    pub fn number(value: impl Into<String>) -> Self {
        Self::with_string(DataType::Number, value)
    }

    /// Create a binary attribute
    pub fn binary(value: impl Into<Bytes>) -> Self {
        Self {
            data_type: DataType::Binary,
            string_value: None,
            binary_value: Some(value.into()),
        }
    }

    pub fn with_string(data_type: DataType, value: impl Into<String>) -> Self {
        Self {
            data_type,
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    /// Check the attribute carries the value its data type requires
    pub fn is_populated(&self) -> bool {
        match self.data_type {
            DataType::Binary => self.binary_value.as_ref().is_some_and(|b| !b.is_empty()),
            DataType::String | DataType::Number => {
                self.string_value.as_ref().is_some_and(|s| !s.is_empty())
            }
        }
    }

    /// Text view of the attribute used for decoding.
    ///
    /// Falls back to the binary value when no string value is present.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self.string_value.as_deref() {
            Some(s) if !s.is_empty() => Some(Cow::Borrowed(s)),
            _ => self
                .binary_value
                .as_ref()
                .filter(|b| !b.is_empty())
                .map(|b| String::from_utf8_lossy(b)),
        }
    }
}

/// Attribute name to wire value
pub type WireAttributes = BTreeMap<String, AttributeValue>;

/// Base64 serialization for optional binary values
mod binary_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => general_purpose::STANDARD.encode(bytes).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Bytes>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|e| {
                general_purpose::STANDARD
                    .decode(e)
                    .map(Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Convert one value to its wire attribute.
///
/// Returns `None` when the value yields no usable text or bytes.
pub fn to_wire_value<T>(value: &T) -> Option<AttributeValue>
where
    T: Serialize + ?Sized,
{
    wire_value_of(&FieldValue::of(value))
}

fn wire_value_of(field: &FieldValue) -> Option<AttributeValue> {
    match field.wire_type() {
        Some(data_type) => {
            let text = field.to_wire_string();
            (!text.is_empty()).then(|| AttributeValue::with_string(data_type, text))
        }
        None => {
            let bytes = field.to_wire_bytes();
            (!bytes.is_empty()).then(|| AttributeValue::binary(bytes))
        }
    }
}

/// Encode a map or record into wire attributes.
///
/// Zero-valued fields, empty keys and excluded record fields are skipped.
/// Returns `Ok(None)` when nothing remains, including for absent values.
///
/// # Errors
///
/// Returns [`SqsError::InvalidAttributeContainer`] when the value is neither
/// a map nor a record.
pub fn record_or_map_to_wire_attributes<T>(value: &T) -> Result<Option<WireAttributes>, SqsError>
where
    T: Serialize + ?Sized,
{
    let fields = value.serialize(ContainerWalker).map_err(|e| match e {
        WalkError::NotContainer(kind) => SqsError::InvalidAttributeContainer { kind },
        WalkError::Custom(message) => {
            tracing::debug!(error = %message, "Attribute container failed to serialize");
            SqsError::InvalidAttributeContainer {
                kind: "unserializable value",
            }
        }
    })?;

    let attributes: WireAttributes = fields
        .into_iter()
        .filter(|(_, field)| !field.is_zero())
        .filter_map(|(name, field)| wire_value_of(&field).map(|value| (name, value)))
        .collect();

    Ok((!attributes.is_empty()).then_some(attributes))
}

#[derive(Debug)]
enum WalkError {
    NotContainer(&'static str),
    Custom(String),
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotContainer(kind) => write!(f, "expected a map or record, got {}", kind),
            Self::Custom(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for WalkError {}

impl ser::Error for WalkError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

type Fields = Vec<(String, FieldValue)>;
type NotAContainer = Impossible<Fields, WalkError>;

/// Serializer collecting the named fields of a map or record
struct ContainerWalker;

struct MapWalk {
    fields: Fields,
    pending_key: Option<String>,
}

struct RecordWalk {
    fields: Fields,
}

impl Serializer for ContainerWalker {
    type Ok = Fields;
    type Error = WalkError;
    type SerializeSeq = NotAContainer;
    type SerializeTuple = NotAContainer;
    type SerializeTupleStruct = NotAContainer;
    type SerializeTupleVariant = NotAContainer;
    type SerializeMap = MapWalk;
    type SerializeStruct = RecordWalk;
    type SerializeStructVariant = NotAContainer;

    fn serialize_bool(self, _v: bool) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("bool"))
    }

    fn serialize_i8(self, _v: i8) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_i16(self, _v: i16) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_i32(self, _v: i32) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_i64(self, _v: i64) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_u8(self, _v: u8) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_u16(self, _v: u16) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_u32(self, _v: u32) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_u64(self, _v: u64) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("integer"))
    }

    fn serialize_f32(self, _v: f32) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("float"))
    }

    fn serialize_f64(self, _v: f64) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("float"))
    }

    fn serialize_char(self, _v: char) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("string"))
    }

    fn serialize_str(self, _v: &str) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("string"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("bytes"))
    }

    fn serialize_none(self) -> Result<Fields, WalkError> {
        Ok(Vec::new())
    }

    fn serialize_some<T>(self, value: &T) -> Result<Fields, WalkError>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Fields, WalkError> {
        Ok(Vec::new())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Fields, WalkError> {
        Ok(Vec::new())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Fields, WalkError> {
        Err(WalkError::NotContainer("enum"))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Fields, WalkError>
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
    ) -> Result<Fields, WalkError>
    where
        T: ?Sized + Serialize,
    {
        Err(WalkError::NotContainer("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, WalkError> {
        Err(WalkError::NotContainer("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, WalkError> {
        Err(WalkError::NotContainer("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, WalkError> {
        Err(WalkError::NotContainer("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, WalkError> {
        Err(WalkError::NotContainer("enum"))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, WalkError> {
        Ok(MapWalk {
            fields: Vec::with_capacity(len.unwrap_or_default()),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct, WalkError> {
        Ok(RecordWalk {
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, WalkError> {
        Err(WalkError::NotContainer("enum"))
    }
}

impl SerializeMap for MapWalk {
    type Ok = Fields;
    type Error = WalkError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), WalkError>
    where
        T: ?Sized + Serialize,
    {
        // Zero keys render as the empty string and are skipped with their value
        self.pending_key = Some(FieldValue::of(key).to_wire_string());
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), WalkError>
    where
        T: ?Sized + Serialize,
    {
        let key = self.pending_key.take().unwrap_or_default();
        if !key.is_empty() {
            self.fields.push((key, FieldValue::of(value)));
        }
        Ok(())
    }

    fn end(self) -> Result<Fields, WalkError> {
        Ok(self.fields)
    }
}

impl SerializeStruct for RecordWalk {
    type Ok = Fields;
    type Error = WalkError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), WalkError>
    where
        T: ?Sized + Serialize,
    {
        let name = match field_name_from_tag(key) {
            EXCLUDED_FIELD => return Ok(()),
            "" => key,
            name => name,
        };
        self.fields.push((name.to_owned(), FieldValue::of(value)));
        Ok(())
    }

    fn end(self) -> Result<Fields, WalkError> {
        Ok(self.fields)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Target type for decoded message attributes.
///
/// Any type that deserializes from a string-keyed document can be a target
/// by implementing this trait with the provided decoding. Records should
/// tolerate missing fields (`#[serde(default)]`) so that attributes which
/// fail to convert can be dropped individually.
pub trait MessageAttributes: DeserializeOwned + Default + Send + Sync + 'static {
    /// Decode wire attributes into the target type
    fn from_wire(wire: &WireAttributes) -> Self {
        decode_fields(
            wire.iter()
                .filter_map(|(name, value)| value.as_text().map(|text| (name.as_str(), text))),
        )
    }
}

impl MessageAttributes for WireAttributes {
    fn from_wire(wire: &WireAttributes) -> Self {
        wire.clone()
    }
}

impl MessageAttributes for HashMap<String, String> {}

impl MessageAttributes for HashMap<String, Value> {}

impl MessageAttributes for BTreeMap<String, Value> {}

impl MessageAttributes for Value {}

/// Decode wire attributes into a map or record type
pub fn wire_attributes_to_record_or_map<T>(wire: &WireAttributes) -> T
where
    T: MessageAttributes,
{
    if wire.is_empty() {
        return T::default();
    }
    T::from_wire(wire)
}

/// Decode named text values into `T`.
///
/// Every value is first parsed into its richest representation. When the
/// whole set does not deserialize into `T`, entries are admitted one at a
/// time: the parsed value if it fits, otherwise the raw text, otherwise the
/// entry is dropped.
pub(crate) fn decode_fields<'a, T, I>(entries: I) -> T
where
    T: DeserializeOwned + Default,
    I: IntoIterator<Item = (&'a str, Cow<'a, str>)>,
{
    let candidates: Vec<(String, Value, String)> = entries
        .into_iter()
        .filter_map(|(name, raw)| {
            let typed = parse_string_to_typed::<Value>(&raw)?;
            Some((name.to_owned(), typed, raw.into_owned()))
        })
        .collect();

    if candidates.is_empty() {
        return T::default();
    }

    let document: Map<String, Value> = candidates
        .iter()
        .map(|(name, typed, _)| (name.clone(), typed.clone()))
        .collect();
    if let Ok(decoded) = serde_json::from_value::<T>(Value::Object(document)) {
        return decoded;
    }

    let fits = |accepted: &Map<String, Value>| {
        serde_json::from_value::<T>(Value::Object(accepted.clone())).is_ok()
    };

    let mut accepted = Map::new();
    for (name, typed, raw) in candidates {
        accepted.insert(name.clone(), typed);
        if fits(&accepted) {
            continue;
        }

        accepted.insert(name.clone(), Value::String(raw));
        if fits(&accepted) {
            continue;
        }

        accepted.remove(&name);
        tracing::debug!(attribute = %name, "Dropping attribute that does not fit the target type");
    }

    serde_json::from_value(Value::Object(accepted)).unwrap_or_default()
}
