//! Secure Messaging for the BAC session channel.
//!
//! Once Basic Access Control has established session keys, every APDU is
//! wrapped per ISO/IEC 7816-4: the command data is 3DES-CBC encrypted into a
//! DO'87', the expected response length moves into a DO'97', and a Retail MAC
//! (ISO/IEC 9797-1 algorithm 3 with DES) over the send-sequence counter,
//! masked header and data objects is appended as DO'8E'. Responses are
//! MAC-verified and decrypted symmetrically.
//!
//! 3DES runs in EDE two-key mode with CBC and a zero IV; data is padded with
//! ISO 7816 padding (a `0x80` byte, then zeros to the block boundary). The
//! key derivation function is
//! ```plain
//! keydata = sha1(seed || counter)[0..16]
//! ```
//! with counter 1 for encryption keys and 2 for MAC keys.


use std::fmt;

use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cipher::block_padding::NoPadding;
use des::{Des, TdesEde2};
use digest::Mac;
use retail_mac::RetailMac;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;
use zeroize_derive::ZeroizeOnDrop;

use crate::der;
use crate::iso7816::apdu::{Apdu, Data, Response, ResponseTrailer};
use crate::iso7816::transport::{CommunicationError, Transport};


type RetailMacDes = RetailMac<Des>;

const BLOCK_SIZE: usize = 8;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    GetChallenge,
    ExternalAuthenticate,
    SelectApplication,
    SelectFile,
    ReadBinary,
}
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetChallenge => write!(f, "GET CHALLENGE"),
            Self::ExternalAuthenticate => write!(f, "EXTERNAL AUTHENTICATE"),
            Self::SelectApplication => write!(f, "SELECT (application)"),
            Self::SelectFile => write!(f, "SELECT (file)"),
            Self::ReadBinary => write!(f, "READ BINARY"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MismatchedValue {
    RndIc,
    RndIfd,
}


#[derive(Debug)]
pub enum Error {
    OperationFailed { operation: Operation, status: u16 },
    LengthMismatch {
        operation: Operation,
        obtained: usize,
        expected: usize,
    },
    ResponseMac,
    ValueMismatch { value: MismatchedValue },
    ResponseTlvFormat,
    MissingResponseStatus,
    StatusLength { obtained: usize },
    UnknownPadding { padding_mode: u8 },
    InvalidPadding,
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::OperationFailed { operation, status }
                => write!(f, "{} failed with response code 0x{:04X}", operation, status),
            Self::LengthMismatch { operation, obtained, expected }
                => write!(f, "{} response has length {}, expected {}", operation, obtained, expected),
            Self::ResponseMac
                => write!(f, "response MAC incorrect"),
            Self::ValueMismatch { value }
                => write!(f, "{:?} mismatched", value),
            Self::ResponseTlvFormat
                => write!(f, "response has an invalid TLV format"),
            Self::MissingResponseStatus
                => write!(f, "response does not contain status"),
            Self::StatusLength { obtained }
                => write!(f, "status has unexpected length {}", obtained),
            Self::UnknownPadding { padding_mode }
                => write!(f, "response payload has unknown padding mode {}", padding_mode),
            Self::InvalidPadding
                => write!(f, "response payload has invalid padding"),
        }
    }
}
impl std::error::Error for Error {
}


/// ICAO key derivation: `sha1(seed || counter)`, truncated to 16 key bytes
/// with DES odd parity restored on every byte.
pub fn derive_key(key_seed: &[u8], counter: u32) -> Zeroizing<[u8; 16]> {
    let mut hasher = Sha1::new();
    hasher.update(key_seed);
    hasher.update(counter.to_be_bytes());
    let digest = hasher.finalize();

    let mut key = Zeroizing::new([0u8; 16]);
    key.copy_from_slice(&digest[0..16]);
    for b in key.iter_mut() {
        if b.count_ones() % 2 == 0 {
            *b ^= 1;
        }
    }
    key
}

/// Derive the encryption key from a key seed.
pub fn derive_encryption_key(key_seed: &[u8]) -> Zeroizing<[u8; 16]> {
    derive_key(key_seed, 1)
}

/// Derive the MAC key from a key seed.
pub fn derive_mac_key(key_seed: &[u8]) -> Zeroizing<[u8; 16]> {
    derive_key(key_seed, 2)
}


/// Encrypt block-aligned data in place with two-key 3DES in CBC mode.
pub(crate) fn encrypt_in_place(data: &mut [u8], key: &[u8; 16], iv: &[u8; 8]) {
    let encryptor = cbc::Encryptor::<TdesEde2>::new(key.into(), iv.into());
    let length = data.len();
    encryptor.encrypt_padded_mut::<NoPadding>(data, length)
        .expect("data is block-aligned");
}

/// Decrypt block-aligned data in place with two-key 3DES in CBC mode.
pub(crate) fn decrypt_in_place(data: &mut [u8], key: &[u8; 16], iv: &[u8; 8]) {
    let decryptor = cbc::Decryptor::<TdesEde2>::new(key.into(), iv.into());
    decryptor.decrypt_padded_mut::<NoPadding>(data)
        .expect("data is block-aligned");
}

/// Retail MAC (ISO/IEC 9797-1 algorithm 3) over pre-padded data.
pub(crate) fn retail_mac(data: &[u8], key: &[u8; 16]) -> [u8; 8] {
    let mut mac = RetailMacDes::new_from_slice(key).expect("MAC key is 16 bytes");
    mac.update(data);
    let mut output = [0u8; 8];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Constant-time comparison of an expected MAC against pre-padded data.
pub(crate) fn verify_retail_mac(data: &[u8], key: &[u8; 16], expected_mac: &[u8]) -> bool {
    retail_mac(data, key).as_slice().ct_eq(expected_mac).into()
}

/// ISO 7816 padding: one `0x80` byte, then zeros up to the block boundary.
pub(crate) fn pad_iso7816(data: &mut Vec<u8>) {
    data.push(0x80);
    while data.len() % BLOCK_SIZE != 0 {
        data.push(0x00);
    }
}

fn strip_iso7816_padding(data: &[u8]) -> Result<&[u8], Error> {
    let mut end = data.len();
    while end > 0 && data[end - 1] == 0x00 {
        end -= 1;
    }
    if end == 0 || data[end - 1] != 0x80 {
        return Err(Error::InvalidPadding);
    }
    Ok(&data[..end - 1])
}


/// A BAC session channel wrapping a plain transport.
///
/// Implements [`Transport`] itself so that callers keep issuing ordinary
/// APDUs and the wrapping stays invisible, the same way the unprotected
/// transport is used before authentication.
#[derive(ZeroizeOnDrop)]
pub struct SecureChannel {
    #[zeroize(skip)]
    transport: Box<dyn Transport>,
    k_enc: [u8; 16],
    k_mac: [u8; 16],
    send_sequence_counter: [u8; 8],
}
impl SecureChannel {
    pub fn new(
        transport: Box<dyn Transport>,
        k_enc: [u8; 16],
        k_mac: [u8; 16],
        send_sequence_counter: [u8; 8],
    ) -> Self {
        Self { transport, k_enc, k_mac, send_sequence_counter }
    }

    fn increment_send_sequence_counter(&mut self) -> [u8; 8] {
        for b in self.send_sequence_counter.iter_mut().rev() {
            if *b == 0xFF {
                *b = 0x00;
                // carry; keep going
            } else {
                *b += 1;
                break;
            }
        }
        self.send_sequence_counter
    }

    fn wrap_request(&mut self, request: &Apdu) -> Apdu {
        let mut wrapped_header = request.header.clone();
        wrapped_header.cla |= 0b000_0_11_00;

        let mut padded_header = wrapped_header.to_bytes().to_vec();
        pad_iso7816(&mut padded_header);

        let send_sequence_counter = self.increment_send_sequence_counter();
        let mut mac_data = Vec::new();
        mac_data.extend(send_sequence_counter);
        mac_data.extend(&padded_header);

        let mut body = Vec::new();

        if let Some(request_data) = request.data.request_data() {
            let mut padded_data = request_data.to_vec();
            pad_iso7816(&mut padded_data);
            encrypt_in_place(&mut padded_data, &self.k_enc, &[0u8; 8]);

            // DO'87': padding indicator 0x01, then the cryptogram
            body.push(0x87);
            der::encode_length(&mut body, 1 + padded_data.len());
            body.push(0x01);
            body.extend(padded_data);
        }

        if let Some(response_length) = request.data.response_length() {
            let le_byte = if response_length == 256 { 0x00 } else { response_length as u8 };
            body.extend([0x97, 0x01, le_byte]);
        }

        mac_data.extend(&body);
        pad_iso7816(&mut mac_data);
        let mac = retail_mac(&mac_data, &self.k_mac);

        body.push(0x8E);
        der::encode_length(&mut body, mac.len());
        body.extend(mac);

        Apdu {
            header: wrapped_header,
            data: Data::Both { data: body, length: 256 },
        }
    }

    fn unwrap_response(&mut self, response: Response) -> Result<Response, Error> {
        let mut slice = response.data.as_slice();
        let mut protected = Vec::new();
        let mut cryptogram: Option<Vec<u8>> = None;
        let mut status: Option<[u8; 2]> = None;
        let mut received_mac: Option<Vec<u8>> = None;

        while !slice.is_empty() {
            if slice.len() < 2 {
                return Err(Error::ResponseTlvFormat);
            }
            let tag = slice[0];
            let (length, rest) = der::try_decode_length(&slice[1..])
                .ok_or(Error::ResponseTlvFormat)?;
            if rest.len() < length {
                return Err(Error::ResponseTlvFormat);
            }
            let tlv_total = (slice.len() - rest.len()) + length;
            let data = &rest[..length];

            match tag {
                0x8E => received_mac = Some(data.to_vec()),
                _ => {
                    // data objects with odd tags are MAC-protected
                    if tag & 0b1 != 0 {
                        protected.extend(&slice[..tlv_total]);
                    }
                    match tag {
                        0x87 => cryptogram = Some(data.to_vec()),
                        0x99 => {
                            status = Some(data.try_into().map_err(|_| Error::StatusLength {
                                obtained: data.len(),
                            })?);
                        },
                        _ => {},
                    }
                },
            }

            slice = &rest[length..];
        }

        let received_mac = received_mac.ok_or(Error::ResponseMac)?;
        let send_sequence_counter = self.increment_send_sequence_counter();
        let mut mac_data = Vec::new();
        mac_data.extend(send_sequence_counter);
        mac_data.extend(&protected);
        pad_iso7816(&mut mac_data);
        if !verify_retail_mac(&mac_data, &self.k_mac, &received_mac) {
            return Err(Error::ResponseMac);
        }

        let status = status.ok_or(Error::MissingResponseStatus)?;

        let data = match cryptogram {
            Some(mut cryptogram) => {
                if cryptogram.is_empty() {
                    return Err(Error::ResponseTlvFormat);
                }
                let padding_mode = cryptogram[0];
                if padding_mode != 0x01 {
                    return Err(Error::UnknownPadding { padding_mode });
                }
                decrypt_in_place(&mut cryptogram[1..], &self.k_enc, &[0u8; 8]);
                strip_iso7816_padding(&cryptogram[1..])?.to_vec()
            },
            None => Vec::new(),
        };

        Ok(Response {
            data,
            trailer: ResponseTrailer::new(status[0], status[1]),
        })
    }
}
impl Transport for SecureChannel {
    fn connect(&mut self) -> Result<(), CommunicationError> {
        self.transport.connect()
    }

    fn communicate(&mut self, request: &Apdu) -> Result<Response, CommunicationError> {
        let wrapped = self.wrap_request(request);
        let raw_response = self.transport.communicate(&wrapped)?;
        Ok(self.unwrap_response(raw_response)?)
    }

    fn close(&mut self) {
        self.transport.close();
    }
}
