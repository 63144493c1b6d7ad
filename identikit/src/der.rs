//! ASN.1 encoding primitives following the Distinguished Encoding Rules.
//!
//! Everything in this module is a pure function from values to bytes. Only the
//! small set of universal types needed by the certificate-request builder is
//! covered; decoding is limited to lengths, which the secure-messaging layer
//! needs to take response TLVs apart.


use rasn::types::Oid;


const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_NULL: u8 = 0x05;
const TAG_OBJECT_IDENTIFIER: u8 = 0x06;
const TAG_UTF8_STRING: u8 = 0x0C;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_SEQUENCE: u8 = 0x10;
const TAG_SET: u8 = 0x11;

const CONSTRUCTED: u8 = 0b0010_0000;
const CLASS_CONTEXT: u8 = 0b1000_0000;


/// Encode a DER length octet sequence.
///
/// Lengths below 128 use the single-byte short form; anything longer uses the
/// long form with the minimal number of big-endian length bytes.
pub fn encode_length(output: &mut Vec<u8>, length: usize) {
    if length < 128 {
        output.push(length.try_into().unwrap());
    } else {
        let length_bytes = length.to_be_bytes();
        let mut trimmed = &length_bytes[..];
        while trimmed[0] == 0x00 {
            trimmed = &trimmed[1..];
        }
        output.push(0b1000_0000 | u8::try_from(trimmed.len()).unwrap());
        output.extend(trimmed);
    }
}

/// Decode a DER length octet sequence at the beginning of the input slice.
///
/// Returns `(length, rest)` where `rest` is the input with the length octets
/// removed, or `None` if the input is truncated or overflows `usize`.
pub fn try_decode_length(input: &[u8]) -> Option<(usize, &[u8])> {
    let start_byte = *input.first()?;
    let lower_bits = start_byte & 0b0111_1111;
    if start_byte & 0b1000_0000 == 0 {
        return Some((lower_bits.into(), &input[1..]));
    }

    let length_byte_count: usize = lower_bits.into();
    if length_byte_count == 0 || length_byte_count > input.len() - 1 {
        return None;
    }
    let mut length: usize = 0;
    for length_byte in &input[1..1+length_byte_count] {
        length = length.checked_mul(256)?;
        length = length.checked_add(usize::from(*length_byte))?;
    }
    Some((length, &input[1+length_byte_count..]))
}

/// Encode a complete tag-length-value triple.
///
/// `tag` carries the class bits but not the constructed bit, which is set from
/// the `constructed` flag.
pub fn encode_tagged(tag: u8, constructed: bool, content: &[u8]) -> Vec<u8> {
    let mut ret = Vec::with_capacity(2 + content.len());
    ret.push(if constructed { tag | CONSTRUCTED } else { tag });
    encode_length(&mut ret, content.len());
    ret.extend(content);
    ret
}

/// Encode a SEQUENCE from already-encoded inner values.
pub fn encode_sequence(content: &[u8]) -> Vec<u8> {
    encode_tagged(TAG_SEQUENCE, true, content)
}

/// Encode a SET from already-encoded inner values.
pub fn encode_set(content: &[u8]) -> Vec<u8> {
    encode_tagged(TAG_SET, true, content)
}

/// Encode a context-specific constructed value, e.g. `[0]` for tag 0.
pub fn encode_context_tagged(tag_number: u8, content: &[u8]) -> Vec<u8> {
    assert!(tag_number < 31, "high-tag-number form is not supported");
    encode_tagged(CLASS_CONTEXT | tag_number, true, content)
}

/// Encode an INTEGER from its unsigned big-endian magnitude.
///
/// Leading zero bytes are stripped down to the minimal encoding; a zero byte
/// is prepended when the top bit of the magnitude is set, since DER INTEGERs
/// are two's complement.
pub fn encode_integer(magnitude: &[u8]) -> Vec<u8> {
    let mut trimmed = magnitude;
    while trimmed.len() > 1 && trimmed[0] == 0x00 {
        trimmed = &trimmed[1..];
    }

    let mut content = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.is_empty() || trimmed[0] & 0b1000_0000 != 0 {
        content.push(0x00);
    }
    content.extend(trimmed);
    encode_tagged(TAG_INTEGER, false, &content)
}

/// Encode an object identifier value into bytes, without tag or length.
///
/// The first two arcs share an octet sequence starting from `40*c0 + c1`;
/// every arc is written in base-128 with the top bit marking continuation.
///
/// An identifier with fewer than two arcs is a programmer error and panics.
pub fn oid_value_bytes(oid: &Oid) -> Vec<u8> {
    assert!(oid.len() >= 2);
    assert!(oid[0] <= 2);
    if oid[0] < 2 {
        assert!(oid[1] <= 39);
    }

    fn encode_arc(ret: &mut Vec<u8>, arc: u32) {
        let mut shift = 28;
        while shift > 0 && (arc >> shift) & 0b111_1111 == 0 {
            shift -= 7;
        }
        while shift > 0 {
            ret.push(u8::try_from((arc >> shift) & 0b111_1111).unwrap() | 0b1000_0000);
            shift -= 7;
        }
        ret.push(u8::try_from(arc & 0b111_1111).unwrap());
    }

    let mut ret = Vec::new();
    encode_arc(&mut ret, 40*oid[0] + oid[1]);
    for arc in oid.iter().skip(2) {
        encode_arc(&mut ret, *arc);
    }
    ret
}

/// Encode a complete OBJECT IDENTIFIER.
pub fn encode_object_identifier(oid: &Oid) -> Vec<u8> {
    encode_tagged(TAG_OBJECT_IDENTIFIER, false, &oid_value_bytes(oid))
}

/// Encode a UTF8String.
pub fn encode_utf8_string(value: &str) -> Vec<u8> {
    encode_tagged(TAG_UTF8_STRING, false, value.as_bytes())
}

/// Encode a PrintableString.
///
/// The caller is responsible for restricting the value to the PrintableString
/// character set; the bytes are written as-is.
pub fn encode_printable_string(value: &str) -> Vec<u8> {
    encode_tagged(TAG_PRINTABLE_STRING, false, value.as_bytes())
}

/// Encode a BIT STRING from byte-aligned content (zero unused bits).
pub fn encode_bit_string(content: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(content.len() + 1);
    inner.push(0x00);
    inner.extend(content);
    encode_tagged(TAG_BIT_STRING, false, &inner)
}

/// Encode a NULL.
pub fn encode_null() -> Vec<u8> {
    encode_tagged(TAG_NULL, false, &[])
}


#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_length_short_and_long_form() {
        let mut short = Vec::new();
        encode_length(&mut short, 127);
        assert_eq!(short, [0x7F]);

        let mut long_one = Vec::new();
        encode_length(&mut long_one, 128);
        assert_eq!(long_one, [0x81, 0x80]);

        let mut long_two = Vec::new();
        encode_length(&mut long_two, 0x0123);
        assert_eq!(long_two, [0x82, 0x01, 0x23]);
    }

    #[test]
    fn test_length_round_trip() {
        for length in [0, 1, 127, 128, 255, 256, 65535, 65536] {
            let mut encoded = Vec::new();
            encode_length(&mut encoded, length);
            let (decoded, rest) = try_decode_length(&encoded).unwrap();
            assert_eq!(decoded, length);
            assert_eq!(rest.len(), 0);
        }
    }

    #[test]
    fn test_integer_minimal_and_sign_padded() {
        assert_eq!(encode_integer(&[]), [0x02, 0x01, 0x00]);
        assert_eq!(encode_integer(&[0x00]), [0x02, 0x01, 0x00]);
        assert_eq!(encode_integer(&[0x00, 0x00, 0x2A]), [0x02, 0x01, 0x2A]);
        // top bit set: two's complement requires a leading zero byte
        assert_eq!(encode_integer(&[0x80]), [0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_integer(&[0x01, 0x00]), [0x02, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_rsa_encryption_oid() {
        // published DER bytes for rsaEncryption (1.2.840.113549.1.1.1)
        let oid = Oid::const_new(&[1, 2, 840, 113549, 1, 1, 1]);
        assert_eq!(oid_value_bytes(oid), hex!("2A 86 48 86 F7 0D 01 01 01"));
        assert_eq!(
            encode_object_identifier(oid),
            hex!("06 09 2A 86 48 86 F7 0D 01 01 01"),
        );
    }

    #[test]
    fn test_bit_string_prefixes_unused_bits_byte() {
        assert_eq!(encode_bit_string(&[0xAB, 0xCD]), [0x03, 0x03, 0x00, 0xAB, 0xCD]);
    }

    #[test]
    fn test_context_tag_zero_empty() {
        assert_eq!(encode_context_tagged(0, &[]), [0xA0, 0x00]);
    }
}
