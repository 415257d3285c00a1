//! Helpers for talking to the standard `org.freedesktop.DBus.Properties`
//! interface: `Get`, `GetAll`, `Set`.

use crate::message_builder::{MarshalledMessage, MessageBuilder};
use crate::value::{PropMap, Value};
use crate::wrappers::{Address, AddressError};

const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

fn call(address: &Address, member: &str) -> Result<MarshalledMessage, AddressError> {
    let bus_name = address.bus_name.clone().ok_or(AddressError::MissingBusName)?;

    Ok(MessageBuilder::new()
        .call(member.to_owned())
        .on(address.object_path.clone())
        .with_interface(PROPERTIES_IFACE.to_owned())
        .at(bus_name)
        .build())
}

/// `Get(interface, property)`. The reply body is a single `v`; read it with
/// `resp.body.parser().get::<Value>()`-style code once a typed `Unmarshal`
/// for a known property type is available, or with
/// [`crate::value::unmarshal_variant_value`] for a fully dynamic read.
pub fn get(
    address: &Address,
    interface: &str,
    property: &str,
) -> Result<MarshalledMessage, AddressError> {
    let mut msg = call(address, "Get")?;
    msg.body
        .push_param2(interface.to_owned(), property.to_owned())
        .unwrap();
    Ok(msg)
}

/// `GetAll(interface)`. The reply body is a single `a{sv}`.
pub fn get_all(address: &Address, interface: &str) -> Result<MarshalledMessage, AddressError> {
    let mut msg = call(address, "GetAll")?;
    msg.body.push_param(interface.to_owned()).unwrap();
    Ok(msg)
}

/// `Set(interface, property, value)`.
pub fn set(
    address: &Address,
    interface: &str,
    property: &str,
    value: &Value,
) -> Result<MarshalledMessage, AddressError> {
    let mut msg = call(address, "Set")?;
    msg.body
        .push_param2(interface.to_owned(), property.to_owned())
        .unwrap();
    msg.body.push_variant_value(value).unwrap();
    Ok(msg)
}

/// Decodes a `GetAll` reply body (`a{sv}`) into a [`PropMap`].
pub fn decode_all(msg: &MarshalledMessage) -> Result<PropMap, crate::wire::unmarshal::Error> {
    use crate::signature::{Base, Container, Type};
    use crate::wire::unmarshal::UnmarshalContext;

    let typ = Type::Container(Container::Dict(
        Base::String,
        Box::new(Type::Container(Container::Variant)),
    ));
    let mut ctx = UnmarshalContext {
        buf: msg.get_buf(),
        fds: msg.body.get_fds(),
        byteorder: msg.body.byteorder(),
        offset: 0,
    };
    let (_, value) = crate::value::unmarshal_typed(&mut ctx, &typ)?;
    match value {
        Value::Dict(entries, _, _) => Ok(entries
            .into_iter()
            .filter_map(|(k, v)| match k {
                Value::String(s) => Some((s, v)),
                _ => None,
            })
            .collect()),
        _ => unreachable!("unmarshal_typed honours the Dict type we asked for"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_targets_properties_interface() {
        let addr = Address::new("/org/example/Obj").with_bus_name("org.example.Service");
        let msg = get(&addr, "org.example.Iface", "Foo").unwrap();
        assert_eq!(
            msg.dynheader.interface.as_deref(),
            Some(PROPERTIES_IFACE)
        );
        assert_eq!(msg.dynheader.member.as_deref(), Some("Get"));
        assert_eq!(msg.get_sig(), "ss");
    }

    #[test]
    fn set_appends_a_variant() {
        let addr = Address::new("/org/example/Obj").with_bus_name("org.example.Service");
        let msg = set(&addr, "org.example.Iface", "Foo", &Value::Uint32(9)).unwrap();
        assert_eq!(msg.get_sig(), "ssv");
    }

    #[test]
    fn get_without_bus_name_errors() {
        let addr = Address::new("/org/example/Obj");
        assert_eq!(
            get(&addr, "org.example.Iface", "Foo").unwrap_err(),
            AddressError::MissingBusName
        );
    }

    #[test]
    fn decode_all_round_trips() {
        use crate::message_builder::MarshalledMessageBody;
        use crate::signature::Base;
        use crate::wire::marshal::MarshalContext;
        use crate::ByteOrder;

        let dict = Value::Dict(
            vec![(
                Value::String("Foo".to_owned()),
                Value::Variant(Box::new(Value::Uint32(9))),
            )],
            Base::String,
            crate::signature::Type::Container(crate::signature::Container::Variant),
        );

        let mut buf = Vec::new();
        let mut fds = Vec::new();
        let mut ctx = MarshalContext {
            buf: &mut buf,
            fds: &mut fds,
            byteorder: ByteOrder::LittleEndian,
        };
        crate::value::marshal_value(&dict, &mut ctx).unwrap();

        let body = MarshalledMessageBody::from_parts(buf, vec![], "a{sv}".to_owned(), ByteOrder::LittleEndian);
        let mut msg = MarshalledMessage::new();
        msg.body = body;

        let decoded = decode_all(&msg).unwrap();
        assert_eq!(decoded.get("Foo"), Some(&Value::Uint32(9)));
    }
}
