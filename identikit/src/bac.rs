//! Basic Access Control: key material derived from the machine-readable zone
//! and the mutual-authentication exchange that turns it into a session
//! channel.
//!
//! The access key is the triple (document number, date of birth, date of
//! expiry). Two renderings exist: the fixed-width 9+6+6 concatenation handed
//! to the chip authentication routine, and a pipe-delimited `num|dob|doe`
//! form used for transport and logging, which round-trips through
//! [`BacKey::from_str`]. The concatenated form is deliberately not
//! self-describing; it mirrors the wire layout and is only reversible with
//! the field widths in hand.


use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rand::RngCore;
use rand::rngs::OsRng;
use sha1::{Digest, Sha1};
use smallstr::SmallString;
use tracing::instrument;
use zeroize::Zeroizing;
use zeroize_derive::ZeroizeOnDrop;

use crate::iso7816::apdu::{Apdu, CommandHeader, Data};
use crate::iso7816::transport::{CommunicationError, Transport};
use crate::mrz::{self, MrzData};
use crate::secure_messaging::{
    self, Error, MismatchedValue, Operation, SecureChannel,
};


const DOCUMENT_NUMBER_LENGTH: usize = 9;
const DATE_LENGTH: usize = 6;

/// Date renderings accepted by [`date_to_mrz_format`], tried in order.
const ACCEPTED_DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%Y%m%d",
    "%m/%d/%y",
];


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FormatError {
    PartCount { obtained: usize },
    DateLength { obtained: usize },
    InvalidDate { digits: String },
    UnrecognizedDate { value: String },
}
impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartCount { obtained }
                => write!(f, "expected 3 pipe-delimited parts, obtained {}", obtained),
            Self::DateLength { obtained }
                => write!(f, "expected 6 date digits, obtained {}", obtained),
            Self::InvalidDate { digits }
                => write!(f, "{:?} is not a calendar date", digits),
            Self::UnrecognizedDate { value }
                => write!(f, "{:?} does not match any accepted date format", value),
        }
    }
}
impl std::error::Error for FormatError {
}


/// The BAC access key: cleaned document number and the two YYMMDD dates.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BacKey {
    document_number: SmallString<[u8; 9]>,
    birth_date: SmallString<[u8; 6]>,
    expiry_date: SmallString<[u8; 6]>,
}
impl BacKey {
    /// Build a key from raw field values.
    ///
    /// The document number is uppercased, stripped of everything outside
    /// `[A-Z0-9]` and brought to exactly 9 characters (`<`-padded or
    /// truncated). Dates are stripped of non-digits and must then be six
    /// digits naming a real calendar day.
    pub fn new(document_number: &str, birth_date: &str, expiry_date: &str) -> Result<Self, FormatError> {
        Ok(Self {
            document_number: clean_document_number(document_number),
            birth_date: clean_date(birth_date)?,
            expiry_date: clean_date(expiry_date)?,
        })
    }

    /// Build a key from an already validated machine-readable zone.
    pub fn from_mrz(data: &MrzData) -> Result<Self, FormatError> {
        Self::new(&data.document_number, &data.birth_date, &data.expiry_date)
    }

    pub fn document_number(&self) -> &str {
        &self.document_number
    }

    pub fn birth_date(&self) -> &str {
        &self.birth_date
    }

    pub fn expiry_date(&self) -> &str {
        &self.expiry_date
    }

    /// The fixed-width 9+6+6 concatenation consumed by chip authentication.
    pub fn seed(&self) -> String {
        let mut ret = String::with_capacity(DOCUMENT_NUMBER_LENGTH + 2 * DATE_LENGTH);
        ret.push_str(&self.document_number);
        ret.push_str(&self.birth_date);
        ret.push_str(&self.expiry_date);
        ret
    }

    /// The MRZ information block hashed into the BAC key seed: each field
    /// followed by its check digit, as printed in the zone's second line.
    pub fn mrz_information(&self) -> String {
        let mut ret = String::with_capacity(DOCUMENT_NUMBER_LENGTH + 2 * DATE_LENGTH + 3);
        for field in [&*self.document_number, &*self.birth_date, &*self.expiry_date] {
            ret.push_str(field);
            ret.push(char::from(b'0' + mrz::check_digit(field)));
        }
        ret
    }

    /// SHA-1 of the MRZ information block, truncated to the 16 seed bytes
    /// that the session keys are derived from.
    pub fn key_seed(&self) -> Zeroizing<[u8; 16]> {
        let digest = Sha1::digest(self.mrz_information().as_bytes());
        let mut seed = Zeroizing::new([0u8; 16]);
        seed.copy_from_slice(&digest[0..16]);
        seed
    }
}
impl fmt::Display for BacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.document_number, self.birth_date, self.expiry_date)
    }
}
impl FromStr for BacKey {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('|').collect();
        if parts.len() != 3 {
            return Err(FormatError::PartCount { obtained: parts.len() });
        }
        Self::new(parts[0], parts[1], parts[2])
    }
}


fn clean_document_number(raw: &str) -> SmallString<[u8; 9]> {
    let mut cleaned: SmallString<[u8; 9]> = SmallString::new();
    for c in raw.chars() {
        if cleaned.len() == DOCUMENT_NUMBER_LENGTH {
            break;
        }
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() || upper.is_ascii_digit() {
            cleaned.push(upper);
        }
    }
    while cleaned.len() < DOCUMENT_NUMBER_LENGTH {
        cleaned.push('<');
    }
    cleaned
}

fn clean_date(raw: &str) -> Result<SmallString<[u8; 6]>, FormatError> {
    let mut digits: SmallString<[u8; 6]> = SmallString::new();
    for c in raw.chars().filter(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    if digits.len() != DATE_LENGTH {
        return Err(FormatError::DateLength { obtained: digits.len() });
    }
    if mrz::date_from_yymmdd(&digits, mrz::DEFAULT_CENTURY_PIVOT).is_none() {
        return Err(FormatError::InvalidDate { digits: digits.to_string() });
    }
    Ok(digits)
}


/// Check whether a concatenated key string is plausible chip-authentication
/// input: at least the 9-character document number plus one date, and the
/// final 12 characters parse as two calendar dates.
pub fn validate_key(key: &str) -> bool {
    if !key.is_ascii() || key.len() < DOCUMENT_NUMBER_LENGTH + DATE_LENGTH {
        return false;
    }
    let (_, dates) = key.split_at(key.len() - 2 * DATE_LENGTH);
    mrz::date_from_yymmdd(&dates[0..DATE_LENGTH], mrz::DEFAULT_CENTURY_PIVOT).is_some()
        && mrz::date_from_yymmdd(&dates[DATE_LENGTH..], mrz::DEFAULT_CENTURY_PIVOT).is_some()
}

/// Re-render a date from any of the accepted renderings into YYMMDD.
///
/// The format list is tried in its fixed order and the first hit wins, which
/// resolves renderings that are ambiguous between formats.
pub fn date_to_mrz_format(value: &str) -> Result<String, FormatError> {
    let trimmed = value.trim();
    for format in ACCEPTED_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.format("%y%m%d").to_string());
        }
    }
    Err(FormatError::UnrecognizedDate { value: value.to_owned() })
}


/// Session key material produced by a successful BAC exchange.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    pub k_enc: [u8; 16],
    pub k_mac: [u8; 16],
    pub send_sequence_counter: [u8; 8],
}
impl SessionKeys {
    /// Wrap a plain transport into the session channel these keys protect.
    pub fn into_channel(self, transport: Box<dyn Transport>) -> SecureChannel {
        SecureChannel::new(transport, self.k_enc, self.k_mac, self.send_sequence_counter)
    }
}


#[instrument(skip(transport))]
fn get_challenge(transport: &mut dyn Transport) -> Result<[u8; 8], CommunicationError> {
    let get_challenge_apdu = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x84, // GET CHALLENGE
            p1: 0x00,
            p2: 0x00,
        },
        data: Data::Response { length: 8 },
    };
    let response = transport.communicate(&get_challenge_apdu)?;
    if response.trailer.to_word() != 0x9000 {
        return Err(Error::OperationFailed {
            operation: Operation::GetChallenge,
            status: response.trailer.to_word(),
        }.into());
    }
    if response.data.len() != 8 {
        return Err(Error::LengthMismatch {
            operation: Operation::GetChallenge,
            obtained: response.data.len(),
            expected: 8,
        }.into());
    }
    let mut ret = [0u8; 8];
    ret.copy_from_slice(&response.data);
    Ok(ret)
}

/// Run the EXTERNAL AUTHENTICATE exchange with caller-supplied nonces and
/// derive the session keys.
///
/// Split out from [`establish`] so the exchange can be driven with the fixed
/// values of published worked examples. The transport is only borrowed:
/// callers keep the handle for cleanup whether or not the chip accepts the
/// key.
#[instrument(skip_all)]
pub fn establish_from_values(
    transport: &mut dyn Transport,
    k_seed: &[u8],
    rnd_ic: &[u8; 8],
    rnd_ifd: &[u8; 8],
    k_ifd: &[u8; 16],
) -> Result<SessionKeys, CommunicationError> {
    let k_enc = secure_messaging::derive_encryption_key(k_seed);
    let k_mac = secure_messaging::derive_mac_key(k_seed);

    // S = RND.IFD || RND.IC || K.IFD, encrypted with a zero IV, then MACed
    // over its ISO 7816 padding
    let mut ext_auth_data = Vec::with_capacity(40);
    ext_auth_data.extend(rnd_ifd);
    ext_auth_data.extend(rnd_ic);
    ext_auth_data.extend(k_ifd);
    secure_messaging::encrypt_in_place(&mut ext_auth_data, &k_enc, &[0u8; 8]);

    let mut mac_input = ext_auth_data.clone();
    secure_messaging::pad_iso7816(&mut mac_input);
    let mac = secure_messaging::retail_mac(&mac_input, &k_mac);
    ext_auth_data.extend(mac);

    let ext_auth_request = Apdu {
        header: CommandHeader {
            cla: 0x00,
            ins: 0x82, // EXTERNAL AUTHENTICATE
            p1: 0x00,
            p2: 0x00,
        },
        data: Data::Both {
            data: ext_auth_data,
            length: 40,
        },
    };
    let response = transport.communicate(&ext_auth_request)?;
    if response.trailer.to_word() != 0x9000 {
        return Err(Error::OperationFailed {
            operation: Operation::ExternalAuthenticate,
            status: response.trailer.to_word(),
        }.into());
    }
    if response.data.len() != 40 {
        return Err(Error::LengthMismatch {
            operation: Operation::ExternalAuthenticate,
            obtained: response.data.len(),
            expected: 40,
        }.into());
    }

    let mut mac_input = response.data[0..32].to_vec();
    secure_messaging::pad_iso7816(&mut mac_input);
    if !secure_messaging::verify_retail_mac(&mac_input, &k_mac, &response.data[32..40]) {
        return Err(Error::ResponseMac.into());
    }

    let mut decrypted = Zeroizing::new(response.data[0..32].to_vec());
    secure_messaging::decrypt_in_place(&mut decrypted, &k_enc, &[0u8; 8]);

    // R = RND.IC || RND.IFD || K.IC
    if &decrypted[0..8] != rnd_ic {
        return Err(Error::ValueMismatch { value: MismatchedValue::RndIc }.into());
    }
    if &decrypted[8..16] != rnd_ifd {
        return Err(Error::ValueMismatch { value: MismatchedValue::RndIfd }.into());
    }

    let mut k_session_seed = Zeroizing::new([0u8; 16]);
    for ((seed_byte, ifd_byte), ic_byte) in k_session_seed.iter_mut().zip(k_ifd).zip(&decrypted[16..32]) {
        *seed_byte = *ifd_byte ^ *ic_byte;
    }

    let k_session_enc = secure_messaging::derive_encryption_key(k_session_seed.as_slice());
    let k_session_mac = secure_messaging::derive_mac_key(k_session_seed.as_slice());

    let mut send_sequence_counter = [0u8; 8];
    send_sequence_counter[0..4].copy_from_slice(&rnd_ic[4..8]);
    send_sequence_counter[4..8].copy_from_slice(&rnd_ifd[4..8]);

    Ok(SessionKeys {
        k_enc: *k_session_enc,
        k_mac: *k_session_mac,
        send_sequence_counter,
    })
}

/// Establish Basic Access Control over a connected transport.
///
/// Runs GET CHALLENGE with fresh terminal nonces and the mutual
/// authentication exchange; on success the returned keys wrap the transport
/// into the session channel via [`SessionKeys::into_channel`].
#[instrument(skip_all)]
pub fn establish(
    transport: &mut dyn Transport,
    key: &BacKey,
) -> Result<SessionKeys, CommunicationError> {
    let k_seed = key.key_seed();

    let rnd_ic = get_challenge(transport)?;

    let mut rnd_ifd = [0u8; 8];
    let mut k_ifd = [0u8; 16];
    OsRng.fill_bytes(&mut rnd_ifd);
    OsRng.fill_bytes(&mut k_ifd);

    establish_from_values(transport, k_seed.as_slice(), &rnd_ic, &rnd_ifd, &k_ifd)
}


#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // ICAO Doc 9303 Part 11 Appendix D.1: MRZ information and key seed
    const APPENDIX_D_MRZ_INFORMATION: &str = "L898902C<369080619406236";
    const APPENDIX_D_K_SEED: [u8; 16] = hex!("239AB9CB282DAF66231DC5A4DF6BFBAE");

    #[test]
    fn test_appendix_d_key_seed() {
        let key = BacKey::new("L898902C", "690806", "940623").unwrap();
        assert_eq!(key.mrz_information(), APPENDIX_D_MRZ_INFORMATION);
        assert_eq!(*key.key_seed(), APPENDIX_D_K_SEED);
    }

    #[test]
    fn test_appendix_d_session_key_derivation() {
        // ICAO Doc 9303 Part 11 Appendix D.1: Ka/Kb of K.ENC and K.MAC
        let k_enc = secure_messaging::derive_encryption_key(&APPENDIX_D_K_SEED);
        assert_eq!(*k_enc, hex!("AB94FDECF2674FDFB9B391F85D7F76F2"));
        let k_mac = secure_messaging::derive_mac_key(&APPENDIX_D_K_SEED);
        assert_eq!(*k_mac, hex!("7962D9ECE03D1ACD4C76089DCE131543"));
    }
}
