//! Structures for ISO/IEC 7816-4 smart-card communication.

pub mod apdu;
pub mod transport;
