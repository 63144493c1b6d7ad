//! Parsing of decoded PDF417 payloads from North American driver's licenses.
//!
//! Two sub-grammars are dispatched on the payload shape:
//!
//! * the AAMVA element format used by US jurisdictions: after the `@`
//!   header, data elements are keyed by three-letter codes (`DAQ`, `DCS`,
//!   `DBB`, ...) and run to the end of their line;
//! * the delimiter format found on Canadian (notably British Columbia)
//!   licenses: fields are separated by `%`, `$`, `^`, `?`, `;` and `=`, and
//!   several attributes can only be recognized by the shape of their token.
//!
//! The payload arrives from a live barcode scanner, so partially-filled
//! results are the expected steady state: every field is independently
//! optional and a field that fails to extract never prevents the others.


use regex::Regex;


const CM_PER_INCH: f64 = 2.54;
const LB_PER_KG: f64 = 2.20462;


/// Fields extracted from a driver's-license barcode.
///
/// Dates are normalized to `MM/DD/YYYY` where the source value is
/// well-formed; malformed date values are carried through verbatim so that
/// the cross-validator can still surface them.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AamvaData {
    pub license_number: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub birth_date: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    pub license_class: Option<String>,
    pub sex: Option<String>,
    pub eye_color: Option<String>,
    pub hair_color: Option<String>,
    /// Height as carried on the card; Canadian metric values are converted
    /// to whole inches.
    pub height: Option<String>,
    /// Weight as carried on the card; Canadian metric values are converted
    /// to whole pounds.
    pub weight: Option<String>,
    pub restrictions: Option<String>,
    pub document_discriminator: Option<String>,
    pub real_id: Option<bool>,
    pub hazmat: Option<bool>,
    pub card_revision: Option<String>,
}


/// Parse a decoded barcode payload, dispatching on its format signature.
pub fn parse(payload: &str) -> AamvaData {
    if payload.contains("%BC") && payload.contains('$') {
        parse_canadian(payload)
    } else {
        parse_us(payload)
    }
}


fn parse_us(payload: &str) -> AamvaData {
    let payload = payload.strip_prefix("@\n").unwrap_or(payload);
    let mut data = AamvaData::default();

    // some jurisdictions put the license number into the subfile header
    // instead of a body element, directly after the DL designator
    let header_license = Regex::new(r"DLDAQL?([^\r\n]+)").unwrap();
    if let Some(captures) = header_license.captures(payload) {
        data.license_number = Some(captures[1].trim().to_owned());
    }

    let element = Regex::new(r"(D[A-Z]{2})([^\r\n]*)").unwrap();
    for captures in element.captures_iter(payload) {
        let code = &captures[1];
        let value = captures[2].trim();
        if value.is_empty() {
            continue;
        }
        let field = match code {
            "DAQ" => &mut data.license_number,
            "DAC" => &mut data.first_name,
            "DAD" => &mut data.middle_name,
            "DCS" => &mut data.last_name,
            "DAG" => &mut data.street_address,
            "DAI" => &mut data.city,
            "DAJ" => &mut data.state,
            "DAK" => &mut data.postal_code,
            "DCG" => &mut data.country,
            "DCA" => &mut data.license_class,
            "DAY" => &mut data.eye_color,
            "DAZ" => &mut data.hair_color,
            "DAU" => &mut data.height,
            "DAW" => &mut data.weight,
            "DCB" => &mut data.restrictions,
            "DCF" => &mut data.document_discriminator,
            "DDB" => &mut data.card_revision,
            "DBB" => {
                if data.birth_date.is_none() {
                    data.birth_date = Some(format_us_date(value));
                }
                continue;
            },
            "DBA" => {
                if data.expiry_date.is_none() {
                    data.expiry_date = Some(format_us_date(value));
                }
                continue;
            },
            "DBD" => {
                if data.issue_date.is_none() {
                    data.issue_date = Some(format_us_date(value));
                }
                continue;
            },
            "DBC" => {
                if data.sex.is_none() {
                    data.sex = Some(match value {
                        "1" => "M".to_owned(),
                        "2" => "F".to_owned(),
                        other => other.to_owned(),
                    });
                }
                continue;
            },
            "DDA" => {
                if data.real_id.is_none() {
                    data.real_id = Some(value == "F");
                }
                continue;
            },
            "DDC" => {
                // a HazMat endorsement expiry is only present when the
                // endorsement exists
                if data.hazmat.is_none() {
                    data.hazmat = Some(true);
                }
                continue;
            },
            _ => continue,
        };
        if field.is_none() {
            *field = Some(value.to_owned());
        }
    }

    data
}

/// Re-render an MMDDYYYY element value as `MM/DD/YYYY`.
///
/// Values that are not eight digits are carried through verbatim.
fn format_us_date(value: &str) -> String {
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}/{}/{}", &value[0..2], &value[2..4], &value[4..8])
    } else {
        value.to_owned()
    }
}


/// Parse the Canadian delimiter format.
///
/// Beyond the fixed delimiters, the attribute typing here is shape-based
/// guesswork carried over from field observations rather than a published
/// grammar; it is kept deliberately permissive.
fn parse_canadian(payload: &str) -> AamvaData {
    let mut data = AamvaData::default();

    parse_canadian_name_and_address(payload, &mut data);
    parse_canadian_license_number(payload, &mut data);
    parse_canadian_dates(payload, &mut data);
    parse_canadian_attributes(payload, &mut data);

    data
}

fn parse_canadian_name_and_address(payload: &str, data: &mut AamvaData) {
    let Some(marker) = payload.find("%BC") else { return };
    let after_marker = &payload[marker + 3..];

    // surname runs from the marker to the first `$`, usually with a
    // trailing comma
    let Some(dollar) = after_marker.find('$') else { return };
    let surname = after_marker[..dollar].trim().trim_end_matches(',').trim();
    if !surname.is_empty() {
        data.last_name = Some(surname.to_owned());
    }

    // given names run to the `^` that opens the street address
    let after_surname = &after_marker[dollar + 1..];
    let Some(caret) = after_surname.find('^') else { return };
    let mut given = after_surname[..caret].split_whitespace();
    if let Some(first) = given.next() {
        data.first_name = Some(first.to_owned());
    }
    let middle = given.collect::<Vec<&str>>().join(" ");
    if !middle.is_empty() {
        data.middle_name = Some(middle);
    }

    // street address runs to the next `$`
    let after_given = &after_surname[caret + 1..];
    let Some(dollar) = after_given.find('$') else { return };
    let street = after_given[..dollar].trim();
    if !street.is_empty() {
        data.street_address = Some(street.to_owned());
    }

    // city, province and postal code run to the `?`, as space-separated
    // tokens with the postal code last and the two-letter province in front
    // of it
    let after_street = &after_given[dollar + 1..];
    let locality = match after_street.find('?') {
        Some(question) => &after_street[..question],
        None => after_street,
    };
    let mut tokens: Vec<&str> = locality.split_whitespace().collect();
    if let Some(last) = tokens.last() {
        if is_canadian_postal_code(last) {
            data.postal_code = Some((*last).to_owned());
            tokens.pop();
        }
    }
    if let Some(last) = tokens.last() {
        if last.len() == 2 && last.bytes().all(|b| b.is_ascii_uppercase()) {
            data.state = Some((*last).to_owned());
            tokens.pop();
        }
    }
    if !tokens.is_empty() {
        data.city = Some(tokens.join(" "));
    }
    if data.country.is_none() && data.state.is_some() {
        data.country = Some("CAN".to_owned());
    }
}

fn is_canadian_postal_code(token: &str) -> bool {
    // A1A1A1, letters and digits alternating
    token.len() == 6 && token.bytes().enumerate().all(|(i, b)| {
        if i % 2 == 0 { b.is_ascii_uppercase() } else { b.is_ascii_digit() }
    })
}

fn parse_canadian_license_number(payload: &str, data: &mut AamvaData) {
    let Some(semicolon) = payload.find(';') else { return };
    let after = &payload[semicolon + 1..];
    let section = match after.find('=') {
        Some(equals) => &after[..equals],
        None => after,
    };
    let digit_run = Regex::new(r"[0-9]{6,}").unwrap();
    if let Some(found) = digit_run.find(section) {
        data.license_number = Some(found.as_str().to_owned());
    }
}

fn parse_canadian_dates(payload: &str, data: &mut AamvaData) {
    // birth and expiry ride together as two MMDDYY values in one
    // twelve-digit run between `=` delimiters
    let date_pair = Regex::new(r"[0-9]{12}").unwrap();
    for section in payload.split('=').skip(1) {
        let Some(found) = date_pair.find(section) else { continue };
        let run = found.as_str();
        data.birth_date = Some(format_canadian_date(&run[0..6], true));
        data.expiry_date = Some(format_canadian_date(&run[6..12], false));
        return;
    }
}

/// Render MMDDYY as `MM/DD/YYYY`. Birth years pivot on the usual two-digit
/// rule; expiry dates are never in the previous century.
fn format_canadian_date(mmddyy: &str, is_birth: bool) -> String {
    let yy: u32 = mmddyy[4..6].parse().unwrap_or(0);
    let century = if is_birth {
        if yy <= 30 { 2000 } else { 1900 }
    } else {
        2000
    };
    format!("{}/{}/{}", &mmddyy[0..2], &mmddyy[2..4], century + yy)
}

fn parse_canadian_attributes(payload: &str, data: &mut AamvaData) {
    // physical attributes live in the tail after the `?`; type each token by
    // its shape
    let Some(question) = payload.find('?') else { return };
    let tail = &payload[question + 1..];

    let mut colors: Vec<String> = Vec::new();
    for token in tail.split(|c: char| c.is_whitespace() || "$^?;=%".contains(c)) {
        if token.is_empty() {
            continue;
        }

        if token == "M" || token == "F" {
            if data.sex.is_none() {
                data.sex = Some(token.to_owned());
            }
        } else if token.len() == 4 && token.starts_with('1') && token.bytes().all(|b| b.is_ascii_digit()) {
            // height in centimeters with a tenths digit, e.g. 1750 = 175.0 cm
            if data.height.is_none() {
                let centimeters: f64 = token.parse().unwrap_or(0.0) / 10.0;
                let inches = (centimeters / CM_PER_INCH).round() as i64;
                data.height = Some(inches.to_string());
            }
        } else if (2..=3).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_digit()) {
            let kilograms: i64 = token.parse().unwrap_or(0);
            if (30..=200).contains(&kilograms) && data.weight.is_none() {
                let pounds = (kilograms as f64 * LB_PER_KG).round() as i64;
                data.weight = Some(pounds.to_string());
            }
        } else if token.len() == 3
                && token.bytes().all(|b| b.is_ascii_uppercase())
                && !colors.iter().any(|c| c == token) {
            if colors.len() < 2 {
                colors.push(token.to_owned());
            }
        }
    }

    let mut colors = colors.into_iter();
    if let Some(eye) = colors.next() {
        data.eye_color = Some(eye);
    }
    if let Some(hair) = colors.next() {
        data.hair_color = Some(hair);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_us_date() {
        assert_eq!(format_us_date("06151984"), "06/15/1984");
        // anything not eight digits is carried through
        assert_eq!(format_us_date("1984"), "1984");
        assert_eq!(format_us_date("0615198X"), "0615198X");
    }

    #[test]
    fn test_canadian_postal_code_shape() {
        assert!(is_canadian_postal_code("V5K0A1"));
        assert!(!is_canadian_postal_code("90210"));
        assert!(!is_canadian_postal_code("VANCOU"));
    }
}
