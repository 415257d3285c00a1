//! A transport-agnostic message parser: feed it bytes (and any file
//! descriptors that rode alongside them out-of-band) as they arrive, however
//! they happen to be chunked, and pull out whole messages as they complete.
//!
//! This is the same codec [`crate::connection::ll_conn::RecvConn`] drives
//! directly off the socket, pulled apart from the I/O so it can be handed
//! bytes from any source -- and so the same byte stream, split into 1-byte
//! chunks or handed over whole, always yields the same messages.

use crate::message_builder::MarshalledMessage;
use crate::wire::unmarshal;
use crate::wire::unmarshal::HEADER_LEN;
use crate::wire::UnixFd;
use crate::wire::MAX_MESSAGE_LENGTH_BYTES;

#[derive(Debug)]
pub struct MessageParser {
    buf: Vec<u8>,
    fds: Vec<UnixFd>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    pub fn new() -> Self {
        MessageParser {
            buf: Vec::new(),
            fds: Vec::new(),
        }
    }

    /// Appends freshly-received bytes to the internal buffer.
    pub fn add_data(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Appends file descriptors that arrived as ancillary data alongside the
    /// bytes currently buffered. They are attached to whichever message
    /// finishes decoding next.
    pub fn add_fds(&mut self, fds: impl IntoIterator<Item = UnixFd>) {
        self.fds.extend(fds);
    }

    /// How many bytes are needed before a complete message can be decoded,
    /// given what's buffered so far. `Ok(None)` means not even the fixed
    /// header has arrived yet.
    fn bytes_needed(&self) -> unmarshal::UnmarshalResult<usize> {
        if self.buf.len() < HEADER_LEN + 4 {
            return Ok((0, HEADER_LEN + 4));
        }
        let (_, header) = unmarshal::unmarshal_header(&self.buf, 0)?;
        let (_, header_fields_len) =
            crate::wire::util::parse_u32(&self.buf[HEADER_LEN..], header.byteorder)?;
        // +4: the length prefix itself isn't counted in header_fields_len.
        let header_size = HEADER_LEN + header_fields_len as usize + 4;
        let body_padding = match header_size % 8 {
            0 => 0,
            n => 8 - n,
        };
        let total = header_size as u64 + body_padding as u64 + header.body_len as u64;
        if total > MAX_MESSAGE_LENGTH_BYTES {
            return Err(unmarshal::Error::NotEnoughBytesForCollection);
        }
        Ok((0, total as usize))
    }

    /// Returns the next complete message if one is fully buffered, without
    /// blocking or requesting more data. `Ok(None)` means keep calling
    /// `add_data` and try again.
    pub fn get_next_message(&mut self) -> Result<Option<MarshalledMessage>, unmarshal::Error> {
        let (_, needed) = self.bytes_needed()?;
        if self.buf.len() < needed {
            return Ok(None);
        }

        let (hdrbytes, header) = unmarshal::unmarshal_header(&self.buf, 0)?;
        let (dynhdrbytes, dynheader) =
            unmarshal::unmarshal_dynamic_header(&header, &self.buf, hdrbytes)?;
        let (bytes_used, mut msg) =
            unmarshal::unmarshal_next_message(&header, dynheader, &self.buf, hdrbytes + dynhdrbytes)?;

        let total = hdrbytes + dynhdrbytes + bytes_used;
        if total != needed {
            return Err(unmarshal::Error::NotAllBytesUsed);
        }

        let num_fds = msg.dynheader.num_fds.unwrap_or(0) as usize;
        if self.fds.len() < num_fds {
            return Err(unmarshal::Error::BadFdIndex(self.fds.len()));
        }
        let taken: Vec<UnixFd> = self.fds.drain(..num_fds).collect();
        msg.body.extend_raw_fds(taken);

        self.buf.drain(..total);
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_builder::MessageBuilder;
    use crate::wire::marshal;
    use std::num::NonZeroU32;

    fn wire_bytes_for_ping() -> Vec<u8> {
        let mut msg = MessageBuilder::new()
            .call("Ping".to_owned())
            .on("/org/freedesktop/DBus".to_owned())
            .with_interface("org.freedesktop.DBus.Peer".to_owned())
            .at("org.freedesktop.DBus".to_owned())
            .build();
        msg.body.push_param(7u32).unwrap();
        let mut buf = Vec::new();
        marshal::marshal(&msg, NonZeroU32::new(1).unwrap(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn whole_chunk_yields_one_message() {
        let bytes = wire_bytes_for_ping();
        let mut parser = MessageParser::new();
        parser.add_data(&bytes);
        let msg = parser.get_next_message().unwrap().unwrap();
        assert_eq!(msg.dynheader.member.as_deref(), Some("Ping"));
        assert!(parser.get_next_message().unwrap().is_none());
    }

    #[test]
    fn one_byte_chunks_yield_the_same_message() {
        let bytes = wire_bytes_for_ping();
        let mut parser = MessageParser::new();
        let mut got = None;
        for b in &bytes {
            parser.add_data(std::slice::from_ref(b));
            if let Some(msg) = parser.get_next_message().unwrap() {
                got = Some(msg);
                break;
            }
        }
        let msg = got.expect("message completed across 1-byte chunks");
        assert_eq!(msg.dynheader.member.as_deref(), Some("Ping"));
    }

    #[test]
    fn two_back_to_back_messages_both_come_out() {
        let bytes = wire_bytes_for_ping();
        let mut parser = MessageParser::new();
        parser.add_data(&bytes);
        parser.add_data(&bytes);
        assert!(parser.get_next_message().unwrap().is_some());
        assert!(parser.get_next_message().unwrap().is_some());
        assert!(parser.get_next_message().unwrap().is_none());
    }

    #[test]
    fn empty_buffer_is_not_a_message() {
        let mut parser = MessageParser::new();
        assert!(parser.get_next_message().unwrap().is_none());
    }
}
