//! FIMP Core - Shared addressing and message types
//!
//! Defines the topic [`Address`] scheme and the [`Message`] envelope used by
//! every FIMP participant, independent of any transport.
//!
//! # Example
//!
//! ```
//! use fimp_core::{Address, Message, MsgType};
//!
//! let addr = Address::device(MsgType::Cmd, "zw", "1", "out_bin_switch", "15_0");
//! assert_eq!(
//!     addr.to_string(),
//!     "pt:j1/mt:cmd/rt:dev/rn:zw/ad:1/sv:out_bin_switch/ad:15_0"
//! );
//!
//! let msg = Message::new_bool("cmd.binary.set", "out_bin_switch", true);
//! assert!(msg.bool_value().unwrap());
//! ```

pub mod address;
pub mod error;
pub mod message;

pub use address::{Address, MsgType, ResourceType};
pub use error::{Error, Result};
pub use message::{Message, Props, ValueType};
