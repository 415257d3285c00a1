//! Messages to/from `org.freedesktop.DBus` itself: the handful of calls
//! every client needs regardless of what it is actually there to do.

use crate::message_builder::{DynamicHeader, MarshalledMessage, MessageBuilder};

const DBUS_DEST: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";
const DBUS_IFACE: &str = "org.freedesktop.DBus";

fn call(member: &str) -> MarshalledMessage {
    MessageBuilder::new()
        .call(member.to_owned())
        .on(DBUS_PATH.to_owned())
        .with_interface(DBUS_IFACE.to_owned())
        .at(DBUS_DEST.to_owned())
        .build()
}

pub fn hello() -> MarshalledMessage {
    call("Hello")
}

pub fn add_match(rule: String) -> MarshalledMessage {
    let mut msg = call("AddMatch");
    msg.body.push_param(rule).unwrap();
    msg
}

pub fn remove_match(rule: String) -> MarshalledMessage {
    let mut msg = call("RemoveMatch");
    msg.body.push_param(rule).unwrap();
    msg
}

bitflags::bitflags! {
    /// Flags accepted by `RequestName`, per the bus daemon's own definitions.
    pub struct RequestNameFlags: u32 {
        const ALLOW_REPLACEMENT = 0x1;
        const REPLACE_EXISTING  = 0x2;
        const DO_NOT_QUEUE      = 0x4;
    }
}

/// The outcome codes `RequestName` replies with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestNameReply {
    PrimaryOwner,
    InQueue,
    Exists,
    AlreadyOwner,
}

impl RequestNameReply {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(RequestNameReply::PrimaryOwner),
            2 => Some(RequestNameReply::InQueue),
            3 => Some(RequestNameReply::Exists),
            4 => Some(RequestNameReply::AlreadyOwner),
            _ => None,
        }
    }
}

pub fn request_name(name: String, flags: RequestNameFlags) -> MarshalledMessage {
    let mut msg = call("RequestName");
    msg.body.push_param2(name, flags.bits()).unwrap();
    msg
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReleaseNameReply {
    Released,
    NonExistent,
    NotOwner,
}

impl ReleaseNameReply {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(ReleaseNameReply::Released),
            2 => Some(ReleaseNameReply::NonExistent),
            3 => Some(ReleaseNameReply::NotOwner),
            _ => None,
        }
    }
}

pub fn release_name(name: String) -> MarshalledMessage {
    let mut msg = call("ReleaseName");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn name_has_owner(name: String) -> MarshalledMessage {
    let mut msg = call("NameHasOwner");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn get_name_owner(name: String) -> MarshalledMessage {
    let mut msg = call("GetNameOwner");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn list_names() -> MarshalledMessage {
    call("ListNames")
}

pub fn list_activatable_names() -> MarshalledMessage {
    call("ListActivatableNames")
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StartServiceReply {
    Success,
    AlreadyRunning,
}

impl StartServiceReply {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(StartServiceReply::Success),
            2 => Some(StartServiceReply::AlreadyRunning),
            _ => None,
        }
    }
}

pub fn start_service_by_name(name: String, flags: u32) -> MarshalledMessage {
    let mut msg = call("StartServiceByName");
    msg.body.push_param2(name, flags).unwrap();
    msg
}

pub fn update_activation_environment(env: std::collections::HashMap<String, String>) -> MarshalledMessage {
    let mut msg = call("UpdateActivationEnvironment");
    msg.body.push_param(env).unwrap();
    msg
}

pub fn get_connection_unix_user(name: String) -> MarshalledMessage {
    let mut msg = call("GetConnectionUnixUser");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn get_connection_unix_process_id(name: String) -> MarshalledMessage {
    let mut msg = call("GetConnectionUnixProcessID");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn get_connection_credentials(name: String) -> MarshalledMessage {
    let mut msg = call("GetConnectionCredentials");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn get_connection_selinux_security_context(name: String) -> MarshalledMessage {
    let mut msg = call("GetConnectionSELinuxSecurityContext");
    msg.body.push_param(name).unwrap();
    msg
}

pub fn get_id() -> MarshalledMessage {
    call("GetId")
}

pub fn become_monitor(names: Vec<String>, flags: u32) -> MarshalledMessage {
    let mut msg = call("BecomeMonitor");
    msg.body.push_param2(names, flags).unwrap();
    msg
}

/// The standard error reply sent back to a caller whose method call was
/// filtered out (no matching object/interface/member registered).
pub fn unknown_method(dynheader: &DynamicHeader) -> MarshalledMessage {
    let text = format!(
        "Unknown method {} on interface {} at object {}",
        dynheader.member.as_deref().unwrap_or("<unknown>"),
        dynheader.interface.as_deref().unwrap_or("<unknown>"),
        dynheader.object.as_deref().unwrap_or("<unknown>"),
    );
    let mut resp = MarshalledMessage::new();
    resp.typ = crate::message_builder::MessageType::Error;
    resp.dynheader.response_serial = dynheader.serial.and_then(std::num::NonZeroU32::new);
    resp.dynheader.destination = dynheader.sender.clone();
    resp.dynheader.error_name = Some("org.freedesktop.DBus.Error.UnknownMethod".to_owned());
    resp.body.push_param(text).unwrap();
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_targets_the_bus() {
        let msg = hello();
        assert_eq!(msg.dynheader.destination.as_deref(), Some(DBUS_DEST));
        assert_eq!(msg.dynheader.member.as_deref(), Some("Hello"));
    }

    #[test]
    fn request_name_encodes_flags() {
        let msg = request_name(
            "io.killing.spark".to_owned(),
            RequestNameFlags::DO_NOT_QUEUE,
        );
        assert_eq!(msg.get_sig(), "su");
    }

    #[test]
    fn unknown_method_targets_the_sender() {
        let mut hdr = DynamicHeader::default();
        hdr.sender = Some(":1.42".to_owned());
        hdr.serial = Some(7);
        hdr.member = Some("Frobnicate".to_owned());

        let resp = unknown_method(&hdr);
        assert_eq!(resp.dynheader.destination.as_deref(), Some(":1.42"));
        assert_eq!(
            resp.dynheader.response_serial,
            std::num::NonZeroU32::new(7)
        );
    }
}
