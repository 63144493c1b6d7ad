//! Decoding of the machine-readable zone on a passport data page.
//!
//! Only the TD3 (passport-book) form factor is handled, two lines of 44
//! characters each:
//! ```plain
//! TTSSSIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIIII
//! NNNNNNNNNCAAABBBBBBDXEEEEEEFPPPPPPPPPPPPPPQG
//! ```
//! with
//! * `TT`: document type (right-padded with `<`)
//! * `SSS`: issuing state or organization
//! * `IIII…`: name: primary identifier, `<<`, secondary identifier, with
//!   components separated by `<` and the field right-padded with `<`
//! * `NNNNNNNNN`: document number (right-padded with `<`), `C` its check digit
//! * `AAA`: nationality
//! * `BBBBBB`: date of birth as YYMMDD, `D` its check digit
//! * `X`: sex (`M`, `F`, or `<` for unspecified)
//! * `EEEEEE`: date of expiry as YYMMDD, `F` its check digit
//! * `PPPPPPPPPPPPPP`: personal number (right-padded with `<`), `Q` its check
//!   digit (`<` allowed when the field is empty)
//! * `G`: composite check digit over `NNNNNNNNNC`, `BBBBBBD`, `EEEEEEF`,
//!   `PPPPPPPPPPPPPPQ`
//!
//! The input comes out of an OCR loop running against live camera frames, so
//! parsing is expected to fail most of the time; [`parse`] returns `None` for
//! "no valid zone in this frame, keep scanning" and never an error. When the
//! strict grammar fails, one recovery pass retries with the common OCR
//! misreads (`O`↔`0`, `I`↔`1`, `B`↔`8`, `K`↔`<`) substituted in positions
//! whose character class demands it.


use chrono::NaiveDate;
use smallstr::SmallString;


/// Default two-digit-year pivot: `yy <= 30` is read as 20yy, otherwise 19yy.
pub const DEFAULT_CENTURY_PIVOT: u8 = 30;

const LINE_LENGTH: usize = 44;


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Sex {
    Female,
    Male,
    Unspecified,
}
impl Sex {
    fn from_mrz_char(c: u8) -> Option<Self> {
        match c {
            b'F' => Some(Self::Female),
            b'M' => Some(Self::Male),
            b'<' | b'X' => Some(Self::Unspecified),
            _ => None,
        }
    }
}


/// Structured contents of a successfully validated TD3 zone.
///
/// Values are stored as they appear in the zone (dates stay YYMMDD); only the
/// name field is split and de-filled. Constructed once per successful parse
/// and immutable afterwards.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MrzData {
    /// Document type, e.g. `P`.
    pub document_type: SmallString<[u8; 2]>,

    /// Issuing state or organization.
    pub issuing_country: SmallString<[u8; 3]>,

    /// Primary identifier with fillers replaced by spaces.
    pub surname: String,

    /// Secondary identifier with fillers replaced by spaces.
    pub given_names: String,

    /// Document number, `<`-padded to 9 characters.
    pub document_number: SmallString<[u8; 9]>,

    /// Check digit of the document number.
    pub document_number_check: u8,

    /// Nationality of the holder.
    pub nationality: SmallString<[u8; 3]>,

    /// Date of birth as YYMMDD.
    pub birth_date: SmallString<[u8; 6]>,

    /// Check digit of the date of birth.
    pub birth_date_check: u8,

    /// Sex of the holder.
    pub sex: Sex,

    /// Date of expiry as YYMMDD.
    pub expiry_date: SmallString<[u8; 6]>,

    /// Check digit of the date of expiry.
    pub expiry_date_check: u8,

    /// Personal number with trailing fillers stripped; may be empty.
    pub personal_number: SmallString<[u8; 14]>,

    /// Check digit of the personal number (0 when the field is empty).
    pub personal_number_check: u8,

    /// Composite check digit.
    pub composite_check: u8,

    /// The validated first line.
    pub line1: String,

    /// The validated second line.
    pub line2: String,
}


/// ICAO Doc 9303 check digit: weighted sum mod 10 with weights cycling
/// 7, 3, 1. Digits keep their value, `A`..`Z` map to 10..35, `<` counts 0.
pub fn check_digit(data: &str) -> u8 {
    const WEIGHTS: [u8; 3] = [7, 3, 1];

    let mut sum: u32 = 0;
    for (b, weight) in data.bytes().zip(WEIGHTS.iter().cycle()) {
        let value: u32 = match b {
            b'0'..=b'9' => (b - b'0').into(),
            b'A'..=b'Z' => (b + 10 - b'A').into(),
            _ => 0, // filler, and anything unexpected
        };
        sum += value * u32::from(*weight);
    }
    (sum % 10) as u8
}

/// Interpret a YYMMDD string as a calendar date under the century pivot.
///
/// Returns `None` for anything that is not six digits or does not name a real
/// calendar day (month 13, February 30, ...).
pub fn date_from_yymmdd(digits: &str, century_pivot: u8) -> Option<NaiveDate> {
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let day: u32 = digits[4..6].parse().ok()?;
    let year = if yy <= i32::from(century_pivot) { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, month, day)
}


/// Parse OCR output lines, returning the first valid TD3 line pair.
///
/// Every window of two consecutive lines is tried, strict grammar first and
/// the OCR-recovery pass second. `None` means no window validated; callers in
/// a live-scanning loop treat that as "keep scanning", not as an error.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Option<MrzData> {
    for window in lines.windows(2) {
        let line1 = window[0].as_ref().trim();
        let line2 = window[1].as_ref().trim();
        if let Some(data) = parse_pair(line1, line2) {
            return Some(data);
        }
    }
    None
}

fn parse_pair(line1: &str, line2: &str) -> Option<MrzData> {
    if line1.len() != LINE_LENGTH || line2.len() != LINE_LENGTH {
        return None;
    }
    parse_strict(line1, line2)
        .or_else(|| parse_strict(&recover_line1(line1), &recover_line2(line2)))
}

fn parse_strict(line1: &str, line2: &str) -> Option<MrzData> {
    // the first line holds no digits at all; the second is alphanumeric
    if !line1.bytes().all(|b| b.is_ascii_uppercase() || b == b'<') {
        return None;
    }
    if !line2.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase() || b == b'<') {
        return None;
    }

    let document_number = &line2[0..9];
    let document_number_check = decimal_digit(line2.as_bytes()[9])?;
    let nationality = &line2[10..13];
    let birth_date = &line2[13..19];
    let birth_date_check = decimal_digit(line2.as_bytes()[19])?;
    let sex = Sex::from_mrz_char(line2.as_bytes()[20])?;
    let expiry_date = &line2[21..27];
    let expiry_date_check = decimal_digit(line2.as_bytes()[27])?;
    let personal_number = &line2[28..42];
    // an empty personal number may carry `<` instead of `0`
    let personal_number_check = match line2.as_bytes()[42] {
        b'<' => 0,
        other => decimal_digit(other)?,
    };
    let composite_check = decimal_digit(line2.as_bytes()[43])?;

    if check_digit(document_number) != document_number_check {
        return None;
    }
    if check_digit(birth_date) != birth_date_check {
        return None;
    }
    if check_digit(expiry_date) != expiry_date_check {
        return None;
    }
    if check_digit(personal_number) != personal_number_check {
        return None;
    }
    let composite_input: String = [&line2[0..10], &line2[13..20], &line2[21..43]].concat();
    if check_digit(&composite_input) != composite_check {
        return None;
    }

    date_from_yymmdd(birth_date, DEFAULT_CENTURY_PIVOT)?;
    date_from_yymmdd(expiry_date, DEFAULT_CENTURY_PIVOT)?;

    let document_type = line1[0..2].trim_end_matches('<');
    let issuing_country = &line1[2..5];
    let name_field = &line1[5..44];
    let (surname_raw, given_raw) = match name_field.split_once("<<") {
        Some(pair) => pair,
        None => (name_field, ""),
    };
    let surname = surname_raw.trim_matches('<').replace('<', " ");
    let given_names = given_raw.trim_matches('<').replace('<', " ");

    Some(MrzData {
        document_type: SmallString::from_str(document_type),
        issuing_country: SmallString::from_str(issuing_country),
        surname,
        given_names,
        document_number: SmallString::from_str(document_number),
        document_number_check,
        nationality: SmallString::from_str(nationality),
        birth_date: SmallString::from_str(birth_date),
        birth_date_check,
        sex,
        expiry_date: SmallString::from_str(expiry_date),
        expiry_date_check,
        personal_number: SmallString::from_str(personal_number.trim_end_matches('<')),
        personal_number_check,
        composite_check,
        line1: line1.to_owned(),
        line2: line2.to_owned(),
    })
}

fn decimal_digit(b: u8) -> Option<u8> {
    if b.is_ascii_digit() { Some(b - b'0') } else { None }
}


/// OCR-recovery pass for the first line: every position is alphabetic or
/// filler, so misread digits are mapped back to their letter shapes.
fn recover_line1(line1: &str) -> String {
    line1.bytes().map(|b| match b {
        b'0' => 'O',
        b'1' => 'I',
        b'8' => 'B',
        other => char::from(other),
    }).collect()
}

/// OCR-recovery pass for the second line, driven by the character class each
/// position must hold: letter shapes become digits in the numeric fields, the
/// reverse in the nationality field, and `K` becomes filler in the usually
/// empty personal-number field.
fn recover_line2(line2: &str) -> String {
    line2.bytes().enumerate().map(|(i, b)| {
        let c = char::from(b);
        match i {
            // check digits and date fields: digits only
            9 | 13..=19 | 21..=27 | 43 => letter_to_digit(c),
            // nationality: letters only
            10..=12 => digit_to_letter(c),
            // personal number: mostly filler on passports
            28..=42 => if c == 'K' { '<' } else { c },
            _ => c,
        }
    }).collect()
}

fn letter_to_digit(c: char) -> char {
    match c {
        'O' => '0',
        'I' => '1',
        'B' => '8',
        other => other,
    }
}

fn digit_to_letter(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '8' => 'B',
        other => other,
    }
}


/// Extract the machine-readable zone from the raw contents of data group 1.
///
/// DG1 is `61 len { 5F1F len mrz-bytes }`; a TD3 zone is 88 bytes which are
/// split into the two 44-character lines. Anything else, including the 90-byte
/// TD1 layout, yields `None`.
pub fn parse_dg1(data: &[u8]) -> Option<MrzData> {
    let rest = data.strip_prefix(&[0x61])?;
    let (outer_length, rest) = crate::der::try_decode_length(rest)?;
    let content = rest.get(0..outer_length)?;

    let inner = content.strip_prefix(&[0x5F, 0x1F])?;
    let (mrz_length, inner_rest) = crate::der::try_decode_length(inner)?;
    let mrz_bytes = inner_rest.get(0..mrz_length)?;
    if mrz_bytes.len() != 2 * LINE_LENGTH {
        return None;
    }

    let text = std::str::from_utf8(mrz_bytes).ok()?;
    parse(&[&text[0..LINE_LENGTH], &text[LINE_LENGTH..]])
}
