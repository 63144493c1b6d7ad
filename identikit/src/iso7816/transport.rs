//! The contactless-transport seam.
//!
//! The physical layer (NFC controller, PC/SC reader, test double) lives
//! outside this crate; everything here talks to it through [`Transport`].


use std::fmt;

use crate::iso7816::apdu;
use crate::secure_messaging;


#[derive(Debug)]
pub enum CommunicationError {
    Write(apdu::WriteError),
    /// The physical link failed or was lost; the message comes from the
    /// external transport implementation.
    Link { message: String },
    ShortResponse,
    SecureMessaging(secure_messaging::Error),
}
impl fmt::Display for CommunicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write(e) => write!(f, "APDU write error: {}", e),
            Self::Link { message } => write!(f, "transport link error: {}", message),
            Self::ShortResponse => write!(f, "response too short"),
            Self::SecureMessaging(e) => write!(f, "Secure Messaging error: {}", e),
        }
    }
}
impl std::error::Error for CommunicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write(e) => Some(e),
            Self::Link { .. } => None,
            Self::ShortResponse => None,
            Self::SecureMessaging(e) => Some(e),
        }
    }
}
impl From<apdu::WriteError> for CommunicationError {
    fn from(value: apdu::WriteError) -> Self { Self::Write(value) }
}
impl From<secure_messaging::Error> for CommunicationError {
    fn from(value: secure_messaging::Error) -> Self { Self::SecureMessaging(value) }
}


/// A contactless transport carrying ISO/IEC 7816 APDUs.
///
/// Implementations are not safe for concurrent use; one tag, one transport,
/// one caller at a time. [`Transport::close`] must be idempotent.
pub trait Transport {
    /// Establish the physical link, observing the implementation's own
    /// connect timeout.
    fn connect(&mut self) -> Result<(), CommunicationError>;

    /// Send a command APDU and receive the response APDU.
    fn communicate(&mut self, request: &apdu::Apdu) -> Result<apdu::Response, CommunicationError>;

    /// Release the physical link. Safe to call more than once.
    fn close(&mut self);
}
