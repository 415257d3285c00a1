//! Drives the SASL line-oriented handshake used before the first dbus
//! message can be sent. You probably do not need this directly; it is
//! driven by `DuplexConn::connect_to_bus`.

use nix::unistd::getuid;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

fn write_message(msg: &str, stream: &mut UnixStream) -> std::io::Result<()> {
    let mut buf = Vec::new();
    buf.extend(msg.bytes());
    buf.push(b'\r');
    buf.push(b'\n');
    stream.write_all(&buf)?;
    Ok(())
}

fn has_line_ending(buf: &[u8]) -> bool {
    for idx in 1..buf.len() {
        if buf[idx - 1] == b'\r' && buf[idx] == b'\n' {
            return true;
        }
    }
    false
}

fn find_line_ending(buf: &[u8]) -> Option<usize> {
    for idx in 1..buf.len() {
        if buf[idx - 1] == b'\r' && buf[idx] == b'\n' {
            return Some(idx - 1);
        }
    }
    None
}

fn read_message(stream: &mut UnixStream, buf: &mut Vec<u8>) -> std::io::Result<String> {
    let mut tmpbuf = [0u8; 512];
    while !has_line_ending(buf) {
        let bytes = stream.read(&mut tmpbuf[..])?;
        if bytes == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed during SASL handshake",
            ));
        }
        buf.extend(&tmpbuf[..bytes])
    }
    let idx = find_line_ending(buf).unwrap();
    let line = buf.drain(0..idx).collect::<Vec<_>>();
    // drop the trailing \r\n plus the line itself
    buf.drain(0..2.min(buf.len()));
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn get_uid_as_hex() -> String {
    let uid = getuid();
    let mut tmp = uid.as_raw();
    let mut numbers = Vec::new();
    if tmp == 0 {
        return "30".to_owned();
    }
    while tmp > 0 {
        numbers.push(tmp % 10);
        tmp /= 10;
    }
    let mut hex = String::new();
    for idx in 0..numbers.len() {
        hex.push_str(match numbers[numbers.len() - 1 - idx] {
            0 => "30",
            1 => "31",
            2 => "32",
            3 => "33",
            4 => "34",
            5 => "35",
            6 => "36",
            7 => "37",
            8 => "38",
            9 => "39",
            _ => unreachable!(),
        })
    }

    hex
}

/// Whether ANONYMOUS may be tried after the server REJECTs EXTERNAL.
/// Disabled by default; dbus-daemon accepts it only in unusual
/// configurations and most services never expect it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthPolicy {
    pub allow_anonymous_fallback: bool,
}

pub enum AuthResult {
    Ok,
    /// The server's line after the rejected mechanism, kept as a diagnostic.
    Rejected(String),
}

/// Runs EXTERNAL, optionally falling back to ANONYMOUS per `policy` if the
/// server rejects it. Leaves the stream positioned right after the line
/// that ended the exchange; the caller must still send `BEGIN`.
pub fn do_auth(stream: &mut UnixStream, policy: AuthPolicy) -> std::io::Result<AuthResult> {
    // send a null byte as the first thing
    stream.write_all(&[0])?;
    write_message(&format!("AUTH EXTERNAL {}", get_uid_as_hex()), stream)?;

    let mut read_buf = Vec::new();
    let msg = read_message(stream, &mut read_buf)?;
    if msg.starts_with("OK") {
        return Ok(AuthResult::Ok);
    }
    if !policy.allow_anonymous_fallback || !msg.starts_with("REJECTED") {
        log::debug!("SASL EXTERNAL rejected, no ANONYMOUS fallback allowed: {msg}");
        return Ok(AuthResult::Rejected(msg));
    }

    log::debug!("SASL EXTERNAL rejected, falling back to ANONYMOUS");
    write_message("AUTH ANONYMOUS", stream)?;
    let msg = read_message(stream, &mut read_buf)?;
    if msg.starts_with("OK") {
        Ok(AuthResult::Ok)
    } else {
        log::debug!("SASL ANONYMOUS rejected: {msg}");
        Ok(AuthResult::Rejected(msg))
    }
}

pub fn negotiate_unix_fds(stream: &mut UnixStream) -> std::io::Result<AuthResult> {
    write_message("NEGOTIATE_UNIX_FD", stream)?;

    let mut read_buf = Vec::new();
    let msg = read_message(stream, &mut read_buf)?;
    if msg.starts_with("AGREE_UNIX_FD") {
        Ok(AuthResult::Ok)
    } else {
        log::debug!("unix fd passing not agreed by server: {msg}");
        Ok(AuthResult::Rejected(msg))
    }
}

pub fn send_begin(stream: &mut UnixStream) -> std::io::Result<()> {
    write_message("BEGIN", stream)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_ending_detection() {
        assert!(!has_line_ending(b"OK 1234"));
        assert!(has_line_ending(b"OK 1234\r\n"));
        assert_eq!(find_line_ending(b"OK 1234\r\n"), Some(7));
    }
}
