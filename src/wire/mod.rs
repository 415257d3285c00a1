//! Everything that deals with converting from/to raw bytes. You probably only need the various wrapper types.

pub mod errors;
pub mod marshal;
pub mod unixfd;
pub mod unmarshal;
pub mod util;
pub mod validate_raw;

pub use unixfd::UnixFd;

/// Largest byte length an array (or dict-entry array) body may declare.
pub const MAX_ARRAY_LENGTH_BYTES: u32 = 64 * 1024 * 1024;

/// Largest total byte length (header + body) a single message may occupy.
pub const MAX_MESSAGE_LENGTH_BYTES: u64 = 128 * 1024 * 1024;

/// Default cap on unix fds accepted per message, absent an explicit
/// `RecvConn::set_max_unix_fds` call.
pub const DEFAULT_MAX_UNIX_FDS: u32 = 16;

/// Upper bound `set_max_unix_fds` will accept, matching what a typical
/// process's open-fd ulimit leaves headroom for.
pub const MAX_UNIX_FDS_CEILING: u32 = 253;

/// The different header fields a message may or maynot have
#[derive(Debug)]
pub enum HeaderField {
    Path(String),
    Interface(String),
    Member(String),
    ErrorName(String),
    ReplySerial(u32),
    Destination(String),
    Sender(String),
    Signature(String),
    UnixFds(u32),
}
