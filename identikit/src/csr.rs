//! X.509 certificate signing requests for mutual-TLS client identity.
//!
//! The registration server that consumes these requests verifies them
//! byte-for-byte against a fixed reference layout, so the encoding below is a
//! wire-format contract rather than a stylistic choice: subject attributes are
//! emitted in the fixed C, ST, L, O, OU, CN order (country as PrintableString,
//! everything else as UTF8String), the public key is embedded as the PKCS#1
//! `RSAPublicKey` structure under the rsaEncryption algorithm identifier, and
//! the whole request is signed with SHA-256/RSA PKCS#1 v1.5.


use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rasn::types::Oid;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};

use crate::der;


const ATTRIBUTE_COUNTRY: &Oid = Oid::const_new(&[2, 5, 4, 6]);
const ATTRIBUTE_STATE: &Oid = Oid::const_new(&[2, 5, 4, 8]);
const ATTRIBUTE_LOCALITY: &Oid = Oid::const_new(&[2, 5, 4, 7]);
const ATTRIBUTE_ORGANIZATION: &Oid = Oid::const_new(&[2, 5, 4, 10]);
const ATTRIBUTE_ORGANIZATIONAL_UNIT: &Oid = Oid::const_new(&[2, 5, 4, 11]);
const ATTRIBUTE_COMMON_NAME: &Oid = Oid::const_new(&[2, 5, 4, 3]);

const RSA_ENCRYPTION: &Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 1]);
const SHA256_WITH_RSA_ENCRYPTION: &Oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 11]);


#[derive(Debug)]
pub enum CsrError {
    EmptySubject,
    Signing(rsa::Error),
}
impl fmt::Display for CsrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySubject => write!(f, "subject has no attributes"),
            Self::Signing(e) => write!(f, "signing failed: {}", e),
        }
    }
}
impl std::error::Error for CsrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EmptySubject => None,
            Self::Signing(e) => Some(e),
        }
    }
}
impl From<rsa::Error> for CsrError {
    fn from(value: rsa::Error) -> Self { Self::Signing(value) }
}


/// Subject of a certification request.
///
/// Absent attributes are skipped during encoding; the present ones are always
/// emitted in the field order of this struct.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SubjectName {
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub common_name: Option<String>,
}
impl SubjectName {
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.state.is_none()
            && self.locality.is_none()
            && self.organization.is_none()
            && self.organizational_unit.is_none()
            && self.common_name.is_none()
    }
}


/// Encode one relative distinguished name: `SET { SEQUENCE { type, value } }`.
fn encode_rdn(attribute_type: &Oid, value: &str, printable: bool) -> Vec<u8> {
    let mut attribute = der::encode_object_identifier(attribute_type);
    if printable {
        attribute.extend(der::encode_printable_string(value));
    } else {
        attribute.extend(der::encode_utf8_string(value));
    }
    der::encode_set(&der::encode_sequence(&attribute))
}

fn encode_subject_name(subject: &SubjectName) -> Vec<u8> {
    let fields: [(&Oid, &Option<String>, bool); 6] = [
        (ATTRIBUTE_COUNTRY, &subject.country, true),
        (ATTRIBUTE_STATE, &subject.state, false),
        (ATTRIBUTE_LOCALITY, &subject.locality, false),
        (ATTRIBUTE_ORGANIZATION, &subject.organization, false),
        (ATTRIBUTE_ORGANIZATIONAL_UNIT, &subject.organizational_unit, false),
        (ATTRIBUTE_COMMON_NAME, &subject.common_name, false),
    ];

    let mut rdns = Vec::new();
    for (attribute_type, value, printable) in fields {
        if let Some(value) = value {
            rdns.extend(encode_rdn(attribute_type, value, printable));
        }
    }
    der::encode_sequence(&rdns)
}

/// Encode SubjectPublicKeyInfo with the PKCS#1 `RSAPublicKey` body.
///
/// The BIT STRING carries `SEQUENCE { modulus, publicExponent }` directly;
/// key-pair APIs that hand out a ready-made SubjectPublicKeyInfo must not be
/// re-wrapped, which is why this is rebuilt from the raw key numbers.
fn encode_subject_public_key_info(public_key: &RsaPublicKey) -> Vec<u8> {
    let mut rsa_public_key = der::encode_integer(&public_key.n().to_bytes_be());
    rsa_public_key.extend(der::encode_integer(&public_key.e().to_bytes_be()));

    let mut algorithm = der::encode_object_identifier(RSA_ENCRYPTION);
    algorithm.extend(der::encode_null());

    let mut info = der::encode_sequence(&algorithm);
    info.extend(der::encode_bit_string(&der::encode_sequence(&rsa_public_key)));
    der::encode_sequence(&info)
}

fn encode_certification_request_info(
    subject: &SubjectName,
    public_key: &RsaPublicKey,
) -> Vec<u8> {
    let mut info = der::encode_integer(&[0]); // version
    info.extend(encode_subject_name(subject));
    info.extend(encode_subject_public_key_info(public_key));
    info.extend(der::encode_context_tagged(0, &[])); // no attributes
    der::encode_sequence(&info)
}

/// Build a signed certification request in DER form.
pub fn generate_csr(
    subject: &SubjectName,
    public_key: &RsaPublicKey,
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CsrError> {
    if subject.is_empty() {
        return Err(CsrError::EmptySubject);
    }

    let request_info = encode_certification_request_info(subject, public_key);

    let digest = Sha256::digest(&request_info);
    let signature = private_key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?;

    let mut signature_algorithm = der::encode_object_identifier(SHA256_WITH_RSA_ENCRYPTION);
    signature_algorithm.extend(der::encode_null());

    let mut request = request_info;
    request.extend(der::encode_sequence(&signature_algorithm));
    request.extend(der::encode_bit_string(&signature));
    Ok(der::encode_sequence(&request))
}

/// Build a signed certification request and render it as PEM.
pub fn generate_csr_pem(
    subject: &SubjectName,
    public_key: &RsaPublicKey,
    private_key: &RsaPrivateKey,
) -> Result<String, CsrError> {
    let request = generate_csr(subject, public_key, private_key)?;

    let encoded = STANDARD.encode(&request);
    let mut pem = String::with_capacity(encoded.len() + 80);
    pem.push_str("-----BEGIN CERTIFICATE REQUEST-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE REQUEST-----\n");
    Ok(pem)
}
