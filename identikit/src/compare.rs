//! Cross-validation of barcode fields against OCR-extracted text.
//!
//! The barcode side is authoritative structured data; the OCR side is a map
//! of independently extracted field values, optionally accompanied by the
//! raw recognized text under [`OCR_FULL_TEXT`]. When a structured OCR field
//! is missing, containment of the barcode value in the raw text counts as a
//! weaker match signal.


use std::collections::HashMap;
use std::fmt::Write;

use crate::aamva::AamvaData;


/// Minimum fraction of comparable fields that must match for a positive
/// verdict. A business rule, not a cryptographic guarantee; callers with
/// different risk appetites pass their own value to
/// [`compare_with_threshold`].
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.70;

/// Zip codes are only compared on their first five characters.
const ZIP_SIGNIFICANT_CHARS: usize = 5;

/// Keys under which the OCR layer supplies its structured field values.
pub const OCR_FIRST_NAME: &str = "first_name";
pub const OCR_LAST_NAME: &str = "last_name";
pub const OCR_ID_NUMBER: &str = "id_number";
pub const OCR_BIRTH_DATE: &str = "birth_date";
pub const OCR_EXPIRY_DATE: &str = "expiry_date";
pub const OCR_STREET: &str = "street";
pub const OCR_CITY: &str = "city";
pub const OCR_STATE: &str = "state";
pub const OCR_ZIP: &str = "zip";

/// Key for the raw recognized text blob used as the containment fallback.
pub const OCR_FULL_TEXT: &str = "full_text";


/// Outcome of one comparison call; recomputed per call, never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonResult {
    pub is_match: bool,
    pub match_percentage: f64,
    pub matched_fields: Vec<&'static str>,
    pub unmatched_fields: Vec<&'static str>,
    pub report: String,
}


/// Compare with [`DEFAULT_MATCH_THRESHOLD`].
pub fn compare(ocr_fields: &HashMap<String, String>, barcode: &AamvaData) -> ComparisonResult {
    compare_with_threshold(ocr_fields, barcode, DEFAULT_MATCH_THRESHOLD)
}

/// Compare the nine field pairs shared between OCR and barcode extraction.
///
/// A pair is comparable when the barcode field is present and the OCR side
/// has either the structured field or the raw text blob. The verdict is
/// `matched / comparable >= threshold`; zero comparable fields never match.
pub fn compare_with_threshold(
    ocr_fields: &HashMap<String, String>,
    barcode: &AamvaData,
    threshold: f64,
) -> ComparisonResult {
    let pairs: [(&'static str, &str, &Option<String>); 9] = [
        ("first name", OCR_FIRST_NAME, &barcode.first_name),
        ("last name", OCR_LAST_NAME, &barcode.last_name),
        ("id number", OCR_ID_NUMBER, &barcode.license_number),
        ("date of birth", OCR_BIRTH_DATE, &barcode.birth_date),
        ("expiry date", OCR_EXPIRY_DATE, &barcode.expiry_date),
        ("street", OCR_STREET, &barcode.street_address),
        ("city", OCR_CITY, &barcode.city),
        ("state", OCR_STATE, &barcode.state),
        ("zip", OCR_ZIP, &barcode.postal_code),
    ];

    let full_text = ocr_fields.get(OCR_FULL_TEXT)
        .map(|text| normalize(text))
        .filter(|text| !text.is_empty());

    let mut matched_fields = Vec::new();
    let mut unmatched_fields = Vec::new();
    let mut comparable = 0usize;
    let mut report = String::new();

    for (label, ocr_key, barcode_value) in pairs {
        let mut barcode_value = match barcode_value {
            Some(value) => normalize(value),
            None => {
                let _ = writeln!(report, "{}: not on barcode", label);
                continue;
            },
        };
        if barcode_value.is_empty() {
            let _ = writeln!(report, "{}: not on barcode", label);
            continue;
        }
        if label == "zip" {
            truncate_chars(&mut barcode_value, ZIP_SIGNIFICANT_CHARS);
        }

        let ocr_value = ocr_fields.get(ocr_key)
            .map(|value| normalize(value))
            .filter(|value| !value.is_empty());

        let matches = match (&ocr_value, &full_text) {
            (Some(ocr_value), _) => {
                comparable += 1;
                let mut ocr_value = ocr_value.clone();
                if label == "zip" {
                    truncate_chars(&mut ocr_value, ZIP_SIGNIFICANT_CHARS);
                }
                Some(ocr_value == barcode_value)
            },
            (None, Some(full_text)) => {
                // weaker signal: the barcode value somewhere in the blob
                comparable += 1;
                Some(full_text.contains(&barcode_value))
            },
            (None, None) => None,
        };

        match matches {
            Some(true) => {
                matched_fields.push(label);
                let _ = writeln!(report, "{}: match", label);
            },
            Some(false) => {
                unmatched_fields.push(label);
                let _ = writeln!(report, "{}: MISMATCH", label);
            },
            None => {
                let _ = writeln!(report, "{}: not recognized by OCR", label);
            },
        }
    }

    let match_percentage = if comparable > 0 {
        matched_fields.len() as f64 / comparable as f64
    } else {
        0.0
    };
    let is_match = comparable > 0 && match_percentage >= threshold;
    let _ = writeln!(
        report,
        "{} of {} comparable fields matched ({:.0}%)",
        matched_fields.len(), comparable, match_percentage * 100.0,
    );

    ComparisonResult {
        is_match,
        match_percentage,
        matched_fields,
        unmatched_fields,
        report,
    }
}

/// Strip all whitespace and lowercase, so that spacing and case differences
/// between OCR output and barcode data do not count as mismatches.
fn normalize(value: &str) -> String {
    value.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn truncate_chars(value: &mut String, count: usize) {
    if let Some((index, _)) = value.char_indices().nth(count) {
        value.truncate(index);
    }
}
