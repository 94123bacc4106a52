use std::collections::HashMap;
use std::fmt;

use chrono::{Local, SecondsFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Protocol version carried by every envelope
pub const PROTOCOL_VERSION: &str = "1.0";

/// Auxiliary string metadata
pub type Props = HashMap<String, String>;

/// Shape of the `val` field, transmitted as `val_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    #[default]
    Null,
    StrArray,
    IntArray,
    FloatArray,
    BoolArray,
    StrMap,
    IntMap,
    FloatMap,
    BoolMap,
    Object,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Null => "null",
            Self::StrArray => "str_array",
            Self::IntArray => "int_array",
            Self::FloatArray => "float_array",
            Self::BoolArray => "bool_array",
            Self::StrMap => "str_map",
            Self::IntMap => "int_map",
            Self::FloatMap => "float_map",
            Self::BoolMap => "bool_map",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FIMP message envelope
///
/// Messages built with the constructors always carry a fresh `uid` and a
/// creation timestamp. Messages produced by a decoder may have either left
/// empty when the wire payload omitted them; see [`Message::is_complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub service: String,
    pub msg_type: String,
    pub value_type: ValueType,
    pub value: Value,
    pub tags: Vec<String>,
    pub props: Props,
    pub ctime: String,
    pub uid: String,
    pub ver: String,
    /// `uid` of the message this one replies to, empty if none
    pub corid: String,
}

impl Default for Message {
    /// An envelope with no identity, as a decoder sees it before applying
    /// optional keys
    fn default() -> Self {
        Self {
            service: String::new(),
            msg_type: String::new(),
            value_type: ValueType::Null,
            value: Value::Null,
            tags: Vec::new(),
            props: Props::new(),
            ctime: String::new(),
            uid: String::new(),
            ver: PROTOCOL_VERSION.to_string(),
            corid: String::new(),
        }
    }
}

impl Message {
    pub fn new(
        msg_type: impl Into<String>,
        service: impl Into<String>,
        value_type: ValueType,
        value: Value,
    ) -> Self {
        Self {
            service: service.into(),
            msg_type: msg_type.into(),
            value_type,
            value,
            ctime: timestamp(),
            uid: generate_uid(),
            ..Self::default()
        }
    }

    pub fn new_string(
        msg_type: impl Into<String>,
        service: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(msg_type, service, ValueType::String, Value::String(value.into()))
    }

    pub fn new_bool(msg_type: impl Into<String>, service: impl Into<String>, value: bool) -> Self {
        Self::new(msg_type, service, ValueType::Bool, Value::Bool(value))
    }

    pub fn new_int(msg_type: impl Into<String>, service: impl Into<String>, value: i64) -> Self {
        Self::new(msg_type, service, ValueType::Int, Value::from(value))
    }

    /// Non-finite floats have no JSON form and are sent as `null`
    pub fn new_float(msg_type: impl Into<String>, service: impl Into<String>, value: f64) -> Self {
        Self::new(msg_type, service, ValueType::Float, Value::from(value))
    }

    pub fn new_null(msg_type: impl Into<String>, service: impl Into<String>) -> Self {
        Self::new(msg_type, service, ValueType::Null, Value::Null)
    }

    pub fn new_str_map(
        msg_type: impl Into<String>,
        service: impl Into<String>,
        value: HashMap<String, String>,
    ) -> Self {
        let map = value.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        Self::new(msg_type, service, ValueType::StrMap, Value::Object(map))
    }

    pub fn new_str_array(
        msg_type: impl Into<String>,
        service: impl Into<String>,
        value: Vec<String>,
    ) -> Self {
        let items = value.into_iter().map(Value::String).collect();
        Self::new(msg_type, service, ValueType::StrArray, Value::Array(items))
    }

    /// Build an `object` message from any serializable value
    pub fn new_object<T: Serialize>(
        msg_type: impl Into<String>,
        service: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(Self::new(msg_type, service, ValueType::Object, value))
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    pub fn with_ctime(mut self, ctime: impl Into<String>) -> Self {
        self.ctime = ctime.into();
        self
    }

    /// Mark this message as the reply to `request`
    pub fn reply_to(mut self, request: &Message) -> Self {
        self.corid = request.uid.clone();
        self
    }

    /// Whether both identity fields are present
    pub fn is_complete(&self) -> bool {
        !self.uid.is_empty() && !self.ctime.is_empty()
    }

    /// Fill in a missing `uid` or `ctime`
    pub fn ensure_identity(&mut self) {
        if self.uid.is_empty() {
            self.uid = generate_uid();
        }
        if self.ctime.is_empty() {
            self.ctime = timestamp();
        }
    }

    fn expect_type(&self, expected: ValueType) -> Result<()> {
        if self.value_type == expected {
            Ok(())
        } else {
            Err(Error::ValueType {
                expected,
                actual: self.value_type,
            })
        }
    }

    pub fn string_value(&self) -> Result<&str> {
        self.expect_type(ValueType::String)?;
        self.value
            .as_str()
            .ok_or_else(|| shape_error(ValueType::String, &self.value))
    }

    pub fn bool_value(&self) -> Result<bool> {
        self.expect_type(ValueType::Bool)?;
        self.value
            .as_bool()
            .ok_or_else(|| shape_error(ValueType::Bool, &self.value))
    }

    pub fn int_value(&self) -> Result<i64> {
        self.expect_type(ValueType::Int)?;
        self.value
            .as_i64()
            .ok_or_else(|| shape_error(ValueType::Int, &self.value))
    }

    /// Integer JSON numbers are accepted as floats
    pub fn float_value(&self) -> Result<f64> {
        self.expect_type(ValueType::Float)?;
        self.value
            .as_f64()
            .ok_or_else(|| shape_error(ValueType::Float, &self.value))
    }

    pub fn str_map_value(&self) -> Result<HashMap<String, String>> {
        self.expect_type(ValueType::StrMap)?;
        serde_json::from_value(self.value.clone())
            .map_err(|_| shape_error(ValueType::StrMap, &self.value))
    }

    pub fn str_array_value(&self) -> Result<Vec<String>> {
        self.expect_type(ValueType::StrArray)?;
        serde_json::from_value(self.value.clone())
            .map_err(|_| shape_error(ValueType::StrArray, &self.value))
    }

    /// Deserialize `val` into `T` regardless of the declared value type
    pub fn object_value<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service={} type={} val_t={} uid={}",
            self.service, self.msg_type, self.value_type, self.uid
        )?;
        if !self.corid.is_empty() {
            write!(f, " corid={}", self.corid)?;
        }
        Ok(())
    }
}

fn shape_error(expected: ValueType, value: &Value) -> Error {
    Error::format(format!("value {value} does not have shape {expected}"))
}

/// Fresh random message identifier
pub fn generate_uid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current local time, ISO-8601 with millisecond precision
pub fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}
