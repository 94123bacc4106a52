//! Topic addressing
//!
//! A FIMP address is a slash-delimited list of `prefix:value` tokens that is
//! used verbatim as the pub/sub topic:
//!
//! ```text
//! pt:j1/mt:cmd/rt:dev/rn:zw/ad:1/sv:out_bin_switch/ad:15_0
//! pt:j1/mt:evt/rt:app/rn:tpflow/ad:1
//! pt:j1/mt:cmd/rt:ad/rn:zigbee/ad:1
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Payload encoding tag for JSON envelopes
pub const PAYLOAD_JSON: &str = "j1";

/// Command or event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MsgType {
    #[default]
    Cmd,
    Evt,
}

impl MsgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cmd => "cmd",
            Self::Evt => "evt",
        }
    }
}

impl FromStr for MsgType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cmd" => Ok(Self::Cmd),
            "evt" => Ok(Self::Evt),
            other => Err(Error::format(format!("unknown message type '{other}'"))),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of resource owning the topic, selects the token layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceType {
    #[default]
    Device,
    App,
    Adapter,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "dev",
            Self::App => "app",
            Self::Adapter => "ad",
        }
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(Self::Device),
            "app" => Ok(Self::App),
            "ad" => Ok(Self::Adapter),
            other => Err(Error::format(format!("unknown resource type '{other}'"))),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decomposed routing address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub payload_type: String,
    pub msg_type: MsgType,
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub resource_address: String,
    /// Only serialized for [`ResourceType::Device`]
    pub service_name: String,
    /// Only serialized for [`ResourceType::Device`]
    pub service_address: String,
}

impl Default for Address {
    fn default() -> Self {
        Self {
            payload_type: PAYLOAD_JSON.to_string(),
            msg_type: MsgType::default(),
            resource_type: ResourceType::default(),
            resource_name: String::new(),
            resource_address: String::new(),
            service_name: String::new(),
            service_address: String::new(),
        }
    }
}

impl Address {
    /// Address of a device service
    pub fn device(
        msg_type: MsgType,
        resource_name: impl Into<String>,
        resource_address: impl Into<String>,
        service_name: impl Into<String>,
        service_address: impl Into<String>,
    ) -> Self {
        Self {
            msg_type,
            resource_type: ResourceType::Device,
            resource_name: resource_name.into(),
            resource_address: resource_address.into(),
            service_name: service_name.into(),
            service_address: service_address.into(),
            ..Self::default()
        }
    }

    /// Address of an application instance
    pub fn app(
        msg_type: MsgType,
        resource_name: impl Into<String>,
        resource_address: impl Into<String>,
    ) -> Self {
        Self {
            msg_type,
            resource_type: ResourceType::App,
            resource_name: resource_name.into(),
            resource_address: resource_address.into(),
            ..Self::default()
        }
    }

    /// Address of an adapter instance
    pub fn adapter(
        msg_type: MsgType,
        resource_name: impl Into<String>,
        resource_address: impl Into<String>,
    ) -> Self {
        Self {
            msg_type,
            resource_type: ResourceType::Adapter,
            resource_name: resource_name.into(),
            resource_address: resource_address.into(),
            ..Self::default()
        }
    }

    /// Render the topic string for this address
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Parse a topic string
    ///
    /// Parsing is lenient: tokens with an unknown prefix, no `:` separator or
    /// an unrecognized value are skipped and the corresponding field keeps its
    /// default. An `ad:` token before any `sv:` token is the resource address,
    /// one after it is the service address.
    pub fn parse(topic: &str) -> Self {
        let mut addr = Self::default();
        let mut seen_service = false;

        for token in topic.split('/') {
            let Some((prefix, value)) = token.split_once(':') else {
                tracing::trace!(token, "skipping address token without prefix");
                continue;
            };

            match prefix {
                "pt" => addr.payload_type = value.to_string(),
                "mt" => match value.parse() {
                    Ok(mt) => addr.msg_type = mt,
                    Err(e) => tracing::trace!(error = %e, "ignoring address token"),
                },
                "rt" => match value.parse() {
                    Ok(rt) => addr.resource_type = rt,
                    Err(e) => tracing::trace!(error = %e, "ignoring address token"),
                },
                "rn" => addr.resource_name = value.to_string(),
                "sv" => {
                    addr.service_name = value.to_string();
                    seen_service = true;
                }
                "ad" if seen_service => addr.service_address = value.to_string(),
                "ad" => addr.resource_address = value.to_string(),
                _ => tracing::trace!(token, "ignoring unknown address token"),
            }
        }

        addr
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pt:{}/mt:{}/rt:{}/rn:{}/ad:{}",
            self.payload_type,
            self.msg_type,
            self.resource_type,
            self.resource_name,
            self.resource_address
        )?;
        if self.resource_type == ResourceType::Device {
            write!(f, "/sv:{}/ad:{}", self.service_name, self.service_address)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::parse(s))
    }
}
