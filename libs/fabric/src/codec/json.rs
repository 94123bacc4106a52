use fimp_core::{Message, Props, ValueType};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::codec::Codec;
use crate::error::{Error, Result};

/// JSON envelope codec (`pt:j1`)
///
/// Writes the keys `serv, type, val_t, val, tags, props, ctime, ver, uid`.
/// `corid` is read back on decode but only written when enabled with
/// [`JsonCodec::with_corid`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    emit_corid: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write `corid`, making encode/decode symmetric
    pub fn with_corid() -> Self {
        Self { emit_corid: true }
    }

    pub fn emits_corid(&self) -> bool {
        self.emit_corid
    }

    /// Encode into a JSON object without rendering it to bytes
    pub fn to_value(&self, message: &Message) -> Result<Value> {
        serde_json::to_value(self.envelope(message)).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Decode from an already parsed JSON value
    pub fn from_value(&self, value: Value) -> Result<Message> {
        let envelope: WireIn =
            serde_json::from_value(value).map_err(|e| Error::Codec(e.to_string()))?;
        Ok(envelope.into_message())
    }

    fn envelope<'a>(&self, message: &'a Message) -> WireOut<'a> {
        WireOut {
            serv: &message.service,
            msg_type: &message.msg_type,
            val_t: message.value_type,
            val: &message.value,
            tags: &message.tags,
            props: &message.props,
            ctime: &message.ctime,
            ver: &message.ver,
            uid: &message.uid,
            corid: (self.emit_corid && !message.corid.is_empty()).then_some(message.corid.as_str()),
        }
    }
}

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.envelope(message)).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        let envelope: WireIn =
            serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))?;
        Ok(envelope.into_message())
    }
}

#[derive(Serialize)]
struct WireOut<'a> {
    serv: &'a str,
    #[serde(rename = "type")]
    msg_type: &'a str,
    val_t: ValueType,
    val: &'a Value,
    tags: &'a [String],
    props: &'a Props,
    ctime: &'a str,
    ver: &'a str,
    uid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    corid: Option<&'a str>,
}

#[derive(Deserialize)]
struct WireIn {
    serv: String,
    #[serde(rename = "type")]
    msg_type: String,
    val_t: ValueType,
    val: Value,
    #[serde(deserialize_with = "null_as_empty")]
    tags: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    props: Props,
    ctime: Option<String>,
    ver: Option<String>,
    uid: Option<String>,
    corid: Option<String>,
}

impl WireIn {
    fn into_message(self) -> Message {
        let mut message = Message {
            service: self.serv,
            msg_type: self.msg_type,
            value_type: self.val_t,
            value: self.val,
            tags: self.tags,
            props: self.props,
            ..Message::default()
        };
        if let Some(ctime) = self.ctime {
            message.ctime = ctime;
        }
        if let Some(ver) = self.ver {
            message.ver = ver;
        }
        if let Some(uid) = self.uid {
            message.uid = uid;
        }
        if let Some(corid) = self.corid {
            message.corid = corid;
        }
        message
    }
}

// Producers of the protocol emit `null` for empty tag lists and prop maps.
// The key itself is still required.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
