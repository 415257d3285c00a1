//! Address values and message constructors built on top of
//! [`crate::message_builder`]'s fluent builders.
//!
//! An `Address` names where a message is going (or where a signal claims to
//! come from): an object path plus the bus name and interface that give it
//! meaning. `method_call` needs all three; `signal` needs the path and
//! interface but never a destination (signals are broadcast).

use crate::message_builder::{MarshalledMessage, MessageBuilder, MessageType};

/// An `Address` was missing a field a particular constructor requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address has no bus_name set, but this message kind requires one")]
    MissingBusName,
    #[error("address has no interface set, but this message kind requires one")]
    MissingInterface,
}

/// `(object_path, bus_name?, interface?)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub object_path: String,
    pub bus_name: Option<String>,
    pub interface: Option<String>,
}

impl Address {
    pub fn new(object_path: impl Into<String>) -> Self {
        Address {
            object_path: object_path.into(),
            bus_name: None,
            interface: None,
        }
    }

    pub fn with_bus_name(mut self, bus_name: impl Into<String>) -> Self {
        self.bus_name = Some(bus_name.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }
}

/// Builds a `method_call` message addressed at `address`, which must carry a
/// `bus_name`.
pub fn method_call(
    address: &Address,
    member: impl Into<String>,
) -> Result<MarshalledMessage, AddressError> {
    let bus_name = address.bus_name.clone().ok_or(AddressError::MissingBusName)?;

    let mut builder = MessageBuilder::new()
        .call(member.into())
        .on(address.object_path.clone())
        .at(bus_name);
    if let Some(interface) = &address.interface {
        builder = builder.with_interface(interface.clone());
    }
    Ok(builder.build())
}

/// Builds the `method_return` for `call`, copying its serial into
/// `reply_serial` and its sender into `destination`.
pub fn method_return(call: &MarshalledMessage) -> MarshalledMessage {
    call.make_response()
}

/// Builds the `error` reply to `call`: a `method_return` shape plus
/// `error_name`, and optionally a single descriptive string in the body.
pub fn error(call: &MarshalledMessage, error_name: impl Into<String>, text: Option<String>) -> MarshalledMessage {
    call.make_error_response(error_name.into(), text)
}

/// Builds a `signal` message, which requires an `interface` on `address` but
/// never carries a destination (the bus broadcasts it per the registered
/// match rules).
pub fn signal(
    address: &Address,
    member: impl Into<String>,
) -> Result<MarshalledMessage, AddressError> {
    let interface = address.interface.clone().ok_or(AddressError::MissingInterface)?;

    Ok(MessageBuilder::new()
        .signal(interface, member.into(), address.object_path.clone())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_targets_bus_name_and_path() {
        let addr = Address::new("/org/freedesktop/DBus")
            .with_bus_name("org.freedesktop.DBus")
            .with_interface("org.freedesktop.DBus.Peer");
        let call = method_call(&addr, "Ping").unwrap();
        assert_eq!(call.typ, MessageType::Call);
        assert_eq!(call.dynheader.destination.as_deref(), Some("org.freedesktop.DBus"));
        assert_eq!(call.dynheader.object.as_deref(), Some("/org/freedesktop/DBus"));
        assert_eq!(call.dynheader.member.as_deref(), Some("Ping"));
    }

    #[test]
    fn method_call_without_bus_name_errors() {
        let addr = Address::new("/org/freedesktop/DBus");
        assert_eq!(method_call(&addr, "Ping").unwrap_err(), AddressError::MissingBusName);
    }

    #[test]
    fn method_return_copies_serial_and_sender() {
        let mut call = method_call(
            &Address::new("/x").with_bus_name("io.example.Test"),
            "DoThing",
        )
        .unwrap();
        call.dynheader.serial = Some(5);
        call.dynheader.sender = Some("io.example.Test".to_owned());

        let ret = method_return(&call);
        assert_eq!(ret.typ, MessageType::Reply);
        assert_eq!(
            ret.dynheader.response_serial,
            std::num::NonZeroU32::new(5)
        );
        assert_eq!(ret.dynheader.destination.as_deref(), Some("io.example.Test"));
    }

    #[test]
    fn signal_has_no_destination() {
        let addr = Address::new("/io/example/Obj").with_interface("io.example.Iface");
        let sig = signal(&addr, "Changed").unwrap();
        assert_eq!(sig.typ, MessageType::Signal);
        assert_eq!(sig.dynheader.destination, None);
        assert_eq!(sig.dynheader.interface.as_deref(), Some("io.example.Iface"));
    }

    #[test]
    fn signal_without_interface_errors() {
        let addr = Address::new("/io/example/Obj");
        assert_eq!(signal(&addr, "Changed").unwrap_err(), AddressError::MissingInterface);
    }
}
