//! Identity-document data extraction and authentication.
//!
//! The crate covers the format-level core of a document verification
//! pipeline: AAMVA PDF417 driver's-license payloads, ICAO Doc 9303
//! machine-readable zones, Basic Access Control against the passport chip,
//! cross-validation of barcode data against OCR output, and DER-encoded
//! certificate signing requests for mutual-TLS client identity. Camera
//! capture, OCR, rendering and network transport all live outside; what
//! enters here is text and bytes, what leaves is structured data.

pub mod aamva;
pub mod bac;
pub mod compare;
pub mod csr;
pub mod der;
pub mod iso7816;
pub mod mrz;
pub mod secure_messaging;
pub mod session;
