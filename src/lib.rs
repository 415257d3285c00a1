//! # dbus-wire
//!
//! A pure implementation of the D-Bus client-side wire protocol: connect to a
//! message bus over a UNIX domain socket, complete SASL authentication, and
//! exchange method calls, returns, errors and signals without linking `libdbus`.
//!
//! The three layers that do the real work:
//!
//! * [`signature`] and the `Marshal`/`Unmarshal` traits in [`wire`] -
//!   type-directed (un)marshalling of values against a signature string.
//! * [`wire::marshal`] / [`wire::unmarshal`] together with
//!   [`stream_parser`] - the framed message codec and its streaming parser.
//! * [`router`] - correlates replies with pending calls and dispatches
//!   everything else to [`match_rule`] filters, under three concurrency
//!   models (blocking, OS-thread + futures, cooperative async).
//!
//! ## Quickstart
//! ```rust,no_run
//! use dbus_wire::{connection::Timeout, get_session_bus_path, DuplexConn};
//! fn main() -> Result<(), dbus_wire::connection::Error> {
//!     let session_path = get_session_bus_path()?;
//!     let mut con = DuplexConn::connect_to_bus(session_path, true)?;
//!     let unique_name = con.send_hello(Timeout::Infinite)?;
//!     println!("connected as {}", unique_name);
//!     Ok(())
//! }
//! ```
//!
//! ## Params and Value
//! The signature-driven `Marshal`/`Unmarshal` traits cover anything you know
//! the static type of. For introspective code (dbus-monitor-style tools,
//! generic property bags) [`value::Value`] maps dbus concepts onto a single
//! tagged representation instead.

pub mod auth;
pub mod connection;
pub mod match_rule;
pub mod message_builder;
pub mod properties;
pub mod router;
pub mod signature;
pub mod standard_messages;
pub mod stream_parser;
pub mod validation;
pub mod value;
pub mod wire;
pub mod wrappers;

// needed to create a connection
pub use connection::ll_conn::DuplexConn;
pub use connection::ll_conn::RecvConn;
pub use connection::ll_conn::SendConn;
pub use connection::rpc_conn::RpcConn;
pub use connection::{get_session_bus_path, get_system_bus_path, open_dbus_connection};

// needed to make new messages
pub use message_builder::{CallBuilder, MessageBuilder, MessageType, SignalBuilder};
pub use wire::marshal::traits::Marshal;
pub use wire::marshal::traits::Signature;
pub use wire::unmarshal::traits::Unmarshal;

#[cfg(test)]
mod tests;

/// The supported byte orders. Chosen per message by the sender; the
/// unmarshaller carries whatever the header says through every recursive read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::LittleEndian;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::BigEndian;
}

/// Errors that can surface synchronously at a marshalling/unmarshalling call site.
#[derive(Debug)]
pub enum Error {
    InvalidType,
    EmptyArray,
    EmptyDict,
    StringContainsNullByte,
    Marshal(crate::wire::errors::MarshalError),
    Unmarshal(crate::wire::unmarshal::Error),
    Validation(crate::validation::Error),
}

impl From<crate::validation::Error> for Error {
    fn from(e: crate::validation::Error) -> Self {
        Error::Validation(e)
    }
}
impl From<crate::wire::errors::MarshalError> for Error {
    fn from(e: crate::wire::errors::MarshalError) -> Self {
        Error::Marshal(e)
    }
}
impl From<crate::wire::unmarshal::Error> for Error {
    fn from(e: crate::wire::unmarshal::Error) -> Self {
        Error::Unmarshal(e)
    }
}
impl From<crate::signature::Error> for Error {
    fn from(e: crate::signature::Error) -> Self {
        Error::Validation(crate::validation::Error::InvalidSignature(e))
    }
}
