//! Types used to build and inspect messages: the dynamic header, the body
//! (the part the signature describes) and fluent builders for common message
//! shapes (method calls, signals).

use std::num::NonZeroU32;

use crate::wire::marshal::MarshalContext;
use crate::wire::marshal::traits::{Marshal, Signature};
use crate::wire::unmarshal::traits::Unmarshal;
use crate::wire::unmarshal::{self, UnmarshalContext};
use crate::wire::UnixFd;
use crate::ByteOrder;

/// The type of a message, as it appears in the fixed header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageType {
    Invalid,
    Call,
    Reply,
    Error,
    Signal,
}

/// The header fields that aren't fixed-position: everything after the
/// 16-byte prefix, plus the serial from the fixed header for convenience.
#[derive(Debug, Clone, Default)]
pub struct DynamicHeader {
    pub serial: Option<u32>,
    pub interface: Option<String>,
    pub member: Option<String>,
    pub object: Option<String>,
    pub destination: Option<String>,
    pub sender: Option<String>,
    pub signature: Option<String>,
    pub error_name: Option<String>,
    pub response_serial: Option<NonZeroU32>,
    pub num_fds: Option<u32>,
}

/// The body of a message: the marshalled bytes plus the signature string
/// describing them, and any unix fds that were marshalled along the way.
#[derive(Debug, Clone)]
pub struct MarshalledMessageBody {
    buf: Vec<u8>,
    sig: String,
    raw_fds: Vec<UnixFd>,
    byteorder: ByteOrder,
}

impl Default for MarshalledMessageBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MarshalledMessageBody {
    pub fn new() -> Self {
        MarshalledMessageBody {
            buf: Vec::new(),
            sig: String::new(),
            raw_fds: Vec::new(),
            byteorder: ByteOrder::NATIVE,
        }
    }

    pub fn with_byteorder(byteorder: ByteOrder) -> Self {
        MarshalledMessageBody {
            buf: Vec::new(),
            sig: String::new(),
            raw_fds: Vec::new(),
            byteorder,
        }
    }

    /// Build a body out of bytes that were already marshalled elsewhere
    /// (e.g. read straight off the wire).
    pub fn from_parts(buf: Vec<u8>, raw_fds: Vec<UnixFd>, sig: String, byteorder: ByteOrder) -> Self {
        MarshalledMessageBody {
            buf,
            sig,
            raw_fds,
            byteorder,
        }
    }

    pub fn byteorder(&self) -> ByteOrder {
        self.byteorder
    }

    pub fn get_buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn get_sig(&self) -> &str {
        &self.sig
    }

    pub fn get_fds(&self) -> &[UnixFd] {
        &self.raw_fds
    }

    /// Extends the set of fds carried alongside this body with ones that
    /// arrived out-of-band (as `SCM_RIGHTS` ancillary data) rather than
    /// through `push_param`.
    pub(crate) fn extend_raw_fds(&mut self, fds: impl IntoIterator<Item = UnixFd>) {
        self.raw_fds.extend(fds);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `p` to the body, extending the signature accordingly.
    pub fn push_param<P: Marshal>(&mut self, p: P) -> Result<(), crate::Error> {
        let mut ctx = MarshalContext {
            buf: &mut self.buf,
            fds: &mut self.raw_fds,
            byteorder: self.byteorder,
        };
        p.marshal(&mut ctx)?;
        P::signature().to_str(&mut self.sig);
        Ok(())
    }

    pub fn push_param2<P1: Marshal, P2: Marshal>(&mut self, p1: P1, p2: P2) -> Result<(), crate::Error> {
        self.push_param(p1)?;
        self.push_param(p2)
    }

    pub fn push_param3<P1: Marshal, P2: Marshal, P3: Marshal>(
        &mut self,
        p1: P1,
        p2: P2,
        p3: P3,
    ) -> Result<(), crate::Error> {
        self.push_param(p1)?;
        self.push_param(p2)?;
        self.push_param(p3)
    }

    /// Appends `p` wrapped in a `v` variant: the element's own signature is
    /// marshalled inline before the value, and only a single `v` is appended
    /// to the body's own signature.
    pub fn push_variant<P: Marshal>(&mut self, p: P) -> Result<(), crate::Error> {
        let mut inner_sig = String::new();
        P::signature().to_str(&mut inner_sig);
        crate::wire::util::write_signature(&inner_sig, &mut self.buf);

        let mut ctx = MarshalContext {
            buf: &mut self.buf,
            fds: &mut self.raw_fds,
            byteorder: self.byteorder,
        };
        ctx.align_to(P::alignment());
        p.marshal(&mut ctx)?;
        self.sig.push('v');
        Ok(())
    }

    /// Appends a dynamically-typed [`crate::value::Value`] wrapped in a `v`
    /// variant, the same layout [`Self::push_variant`] gives a statically
    /// typed one.
    pub fn push_variant_value(&mut self, v: &crate::value::Value) -> Result<(), crate::Error> {
        let mut inner_sig = String::new();
        v.value_signature().to_str(&mut inner_sig);
        crate::wire::util::write_signature(&inner_sig, &mut self.buf);

        let mut ctx = MarshalContext {
            buf: &mut self.buf,
            fds: &mut self.raw_fds,
            byteorder: self.byteorder,
        };
        ctx.align_to(v.value_signature().get_alignment());
        crate::value::marshal_value(v, &mut ctx)?;
        self.sig.push('v');
        Ok(())
    }

    pub fn parser(&self) -> MessageBodyParser {
        MessageBodyParser {
            buf: &self.buf,
            fds: &self.raw_fds,
            byteorder: self.byteorder,
            offset: 0,
        }
    }
}

/// Walks a [`MarshalledMessageBody`] front-to-back, reading one typed value
/// at a time.
pub struct MessageBodyParser<'body> {
    buf: &'body [u8],
    fds: &'body [UnixFd],
    byteorder: ByteOrder,
    offset: usize,
}

impl<'body> MessageBodyParser<'body> {
    pub fn get<T: Unmarshal<'body>>(&mut self) -> Result<T, unmarshal::Error> {
        let mut ctx = UnmarshalContext {
            buf: self.buf,
            fds: self.fds,
            byteorder: self.byteorder,
            offset: self.offset,
        };
        let (bytes, val) = T::unmarshal(&mut ctx)?;
        self.offset += bytes;
        Ok(val)
    }

    pub fn get2<T1: Unmarshal<'body>, T2: Unmarshal<'body>>(
        &mut self,
    ) -> Result<(T1, T2), unmarshal::Error> {
        Ok((self.get()?, self.get()?))
    }

    pub fn get3<T1: Unmarshal<'body>, T2: Unmarshal<'body>, T3: Unmarshal<'body>>(
        &mut self,
    ) -> Result<(T1, T2, T3), unmarshal::Error> {
        Ok((self.get()?, self.get()?, self.get()?))
    }

    /// Bytes left unread in the body.
    pub fn bytes_remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

/// A message ready to be sent, or one that was just received.
#[derive(Debug, Clone)]
pub struct MarshalledMessage {
    pub typ: MessageType,
    pub flags: u8,
    pub dynheader: DynamicHeader,
    pub body: MarshalledMessageBody,
}

impl Default for MarshalledMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl MarshalledMessage {
    pub fn new() -> Self {
        MarshalledMessage {
            typ: MessageType::Invalid,
            flags: 0,
            dynheader: DynamicHeader::default(),
            body: MarshalledMessageBody::new(),
        }
    }

    pub fn get_buf(&self) -> &[u8] {
        self.body.get_buf()
    }

    pub fn get_sig(&self) -> &str {
        self.body.get_sig()
    }

    /// `NO_REPLY_EXPECTED` per the wire protocol.
    pub const NO_REPLY_EXPECTED: u8 = 0x1;
    /// `NO_AUTO_START` per the wire protocol.
    pub const NO_AUTO_START: u8 = 0x2;

    pub fn set_no_reply_expected(&mut self, val: bool) {
        if val {
            self.flags |= Self::NO_REPLY_EXPECTED;
        } else {
            self.flags &= !Self::NO_REPLY_EXPECTED;
        }
    }

    pub fn splits_into_reply(&self) -> bool {
        self.flags & Self::NO_REPLY_EXPECTED == 0
    }

    /// Build a method-return or error message addressed back to whoever sent
    /// this message, copying `sender` into `destination` and this message's
    /// serial into `response_serial`.
    pub fn make_response(&self) -> MarshalledMessage {
        let mut resp = MarshalledMessage::new();
        resp.typ = MessageType::Reply;
        resp.dynheader.response_serial =
            self.dynheader.serial.and_then(NonZeroU32::new);
        resp.dynheader.destination = self.dynheader.sender.clone();
        resp
    }

    pub fn make_error_response(&self, error_name: String, text: Option<String>) -> MarshalledMessage {
        let mut resp = self.make_response();
        resp.typ = MessageType::Error;
        resp.dynheader.error_name = Some(error_name);
        if let Some(text) = text {
            resp.body.push_param(text).expect("string always marshals");
        }
        resp
    }
}

pub struct MessageBuilder {
    msg: MarshalledMessage,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        MessageBuilder {
            msg: MarshalledMessage::new(),
        }
    }

    pub fn call(mut self, member: String) -> CallBuilder {
        self.msg.typ = MessageType::Call;
        self.msg.dynheader.member = Some(member);
        CallBuilder { msg: self.msg }
    }

    pub fn signal(mut self, interface: String, member: String, object: String) -> SignalBuilder {
        self.msg.typ = MessageType::Signal;
        self.msg.dynheader.interface = Some(interface);
        self.msg.dynheader.member = Some(member);
        self.msg.dynheader.object = Some(object);
        SignalBuilder { msg: self.msg }
    }
}

pub struct CallBuilder {
    msg: MarshalledMessage,
}

impl CallBuilder {
    pub fn on(mut self, object_path: String) -> Self {
        self.msg.dynheader.object = Some(object_path);
        self
    }

    pub fn with_interface(mut self, interface: String) -> Self {
        self.msg.dynheader.interface = Some(interface);
        self
    }

    pub fn at(mut self, destination: String) -> Self {
        self.msg.dynheader.destination = Some(destination);
        self
    }

    pub fn no_reply(mut self) -> Self {
        self.msg.set_no_reply_expected(true);
        self
    }

    pub fn build(self) -> MarshalledMessage {
        self.msg
    }
}

impl std::ops::Deref for CallBuilder {
    type Target = MarshalledMessage;
    fn deref(&self) -> &Self::Target {
        &self.msg
    }
}
impl std::ops::DerefMut for CallBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.msg
    }
}

pub struct SignalBuilder {
    msg: MarshalledMessage,
}

impl SignalBuilder {
    pub fn to(mut self, destination: String) -> Self {
        self.msg.dynheader.destination = Some(destination);
        self
    }

    pub fn build(self) -> MarshalledMessage {
        self.msg
    }
}

impl std::ops::Deref for SignalBuilder {
    type Target = MarshalledMessage;
    fn deref(&self) -> &Self::Target {
        &self.msg
    }
}
impl std::ops::DerefMut for SignalBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_call_message() {
        let mut call = MessageBuilder::new()
            .call("Ping".to_string())
            .on("/org/freedesktop/DBus".to_string())
            .with_interface("org.freedesktop.DBus.Peer".to_string())
            .at("org.freedesktop.DBus".to_string())
            .build();
        call.body.push_param(42u32).unwrap();

        assert_eq!(call.typ, MessageType::Call);
        assert_eq!(call.dynheader.member.as_deref(), Some("Ping"));
        assert_eq!(call.get_sig(), "u");
    }

    #[test]
    fn response_carries_serial_and_destination() {
        let mut call = MessageBuilder::new().call("Foo".to_string()).build();
        call.dynheader.serial = Some(7);
        call.dynheader.sender = Some(":1.1".to_string());

        let resp = call.make_response();
        assert_eq!(resp.typ, MessageType::Reply);
        assert_eq!(resp.dynheader.response_serial, NonZeroU32::new(7));
        assert_eq!(resp.dynheader.destination.as_deref(), Some(":1.1"));
    }
}
