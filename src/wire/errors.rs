/// Errors that can occur while marshalling a value into a dbus message
#[derive(Debug, Eq, PartialEq)]
pub enum MarshalError {
    /// Tried to marshal a message with the "invalid" message type
    InvalidMessageType,
    /// Tried to marshal an empty UnixFd
    EmptyUnixFd,
    /// Error while trying to dup a UnixFd
    DupUnixFd(std::io::ErrorKind),
    /// Errors occuring while validating the input
    Validation(crate::validation::Error),
}

//--------
// Conversion to MarshalError
//--------

impl From<crate::validation::Error> for MarshalError {
    fn from(e: crate::validation::Error) -> Self {
        MarshalError::Validation(e)
    }
}

impl From<crate::signature::Error> for MarshalError {
    fn from(e: crate::signature::Error) -> Self {
        MarshalError::Validation(crate::validation::Error::InvalidSignature(e))
    }
}
