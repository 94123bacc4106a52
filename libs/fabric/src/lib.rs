//! FIMP Fabric - Messaging over publish/subscribe
//!
//! Provides the JSON envelope codec, a transport abstraction with a
//! subscription-remembering facade, an in-memory broker, and the
//! [`CorrelationEngine`] that turns publish/subscribe into request/response.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fimp_core::{Address, Message, MsgType};
//! use fimp_fabric::{
//!     codec::JsonCodec, request::ResponseFilter, transport::MemoryBroker, ConnectOptions,
//!     CorrelationEngine, EngineOptions, QoS, TransportFacade,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = MemoryBroker::new();
//! let facade = TransportFacade::new(Arc::new(broker.transport()), QoS::AtLeastOnce);
//! let engine = CorrelationEngine::new(facade, JsonCodec::new(), EngineOptions::default());
//! engine.connect(&ConnectOptions::default()).await?;
//!
//! let cmd = Address::device(MsgType::Cmd, "zw", "1", "out_bin_switch", "15_0");
//! let evt = Address::device(MsgType::Evt, "zw", "1", "out_bin_switch", "15_0");
//! let request = Message::new_bool("cmd.binary.set", "out_bin_switch", true);
//!
//! let report = engine
//!     .send_request(
//!         &cmd.serialize(),
//!         request,
//!         &evt.serialize(),
//!         ResponseFilter::any().msg_type("evt.binary.report"),
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod pending;
pub mod request;
pub mod topic;
pub mod transport;

// Re-exports for convenience
pub use channel::{InboundMessage, MessageFilter};
pub use config::FimpConfig;
pub use error::{Error, Result};
pub use request::{CorrelationEngine, EngineOptions, ResponseFilter};
pub use transport::{ConnectOptions, QoS, Transport, TransportFacade};
