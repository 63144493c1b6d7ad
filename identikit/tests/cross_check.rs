use std::collections::HashMap;

use identikit::aamva::AamvaData;
use identikit::compare::{self, DEFAULT_MATCH_THRESHOLD};


fn barcode_fixture() -> AamvaData {
    AamvaData {
        license_number: Some("D1234567".to_owned()),
        first_name: Some("JOHN".to_owned()),
        last_name: Some("PUBLIC".to_owned()),
        street_address: Some("789 E OAK ST".to_owned()),
        city: Some("ANYTOWN".to_owned()),
        state: Some("CA".to_owned()),
        postal_code: Some("90210".to_owned()),
        birth_date: Some("06/15/1984".to_owned()),
        expiry_date: Some("06/15/2028".to_owned()),
        ..AamvaData::default()
    }
}

fn matching_ocr() -> HashMap<String, String> {
    [
        ("first_name", "John"),
        ("last_name", "Public"),
        ("id_number", "D1234567"),
        ("birth_date", "06/15/1984"),
        ("expiry_date", "06/15/2028"),
        ("street", "789 E Oak St"),
        ("city", "Anytown"),
        ("state", "CA"),
        ("zip", "90210"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}


#[test]
fn test_all_nine_fields_matching() {
    let result = compare::compare(&matching_ocr(), &barcode_fixture());

    assert!(result.is_match);
    assert_eq!(result.match_percentage, 1.0);
    assert_eq!(result.matched_fields.len(), 9);
    assert!(result.unmatched_fields.is_empty());
}

#[test]
fn test_nothing_matching() {
    let ocr: HashMap<String, String> = matching_ocr()
        .into_keys()
        .map(|k| (k, "zzzzz9".to_owned()))
        .collect();
    let result = compare::compare(&ocr, &barcode_fixture());

    assert!(!result.is_match);
    assert_eq!(result.match_percentage, 0.0);
    assert_eq!(result.unmatched_fields.len(), 9);
}

#[test]
fn test_case_and_spacing_are_normalized() {
    let mut ocr = matching_ocr();
    ocr.insert("street".to_owned(), "789  e  oak  st".to_owned());
    ocr.insert("last_name".to_owned(), "  pUbLiC ".to_owned());

    let result = compare::compare(&ocr, &barcode_fixture());
    assert_eq!(result.match_percentage, 1.0);
}

#[test]
fn test_zip_compares_first_five_characters() {
    let mut barcode = barcode_fixture();
    barcode.postal_code = Some("90210-1234".to_owned());
    let result = compare::compare(&matching_ocr(), &barcode);
    assert!(result.matched_fields.contains(&"zip"));
}

#[test]
fn test_threshold_boundary() {
    // 6 of 9 is below the default threshold, 7 of 9 is above
    let mut ocr = matching_ocr();
    for key in ["city", "state", "zip"] {
        ocr.insert(key.to_owned(), "wrong".to_owned());
    }
    let result = compare::compare(&ocr, &barcode_fixture());
    assert!(!result.is_match);
    assert_eq!(result.matched_fields.len(), 6);

    ocr.insert("zip".to_owned(), "90210".to_owned());
    let result = compare::compare(&ocr, &barcode_fixture());
    assert!(result.is_match);
    assert!(result.match_percentage >= DEFAULT_MATCH_THRESHOLD);
}

#[test]
fn test_full_text_fallback() {
    let mut ocr = matching_ocr();
    ocr.remove("last_name");
    ocr.insert(
        "full_text".to_owned(),
        "DRIVER LICENSE\nPUBLIC, JOHN\n789 E OAK ST".to_owned(),
    );

    let result = compare::compare(&ocr, &barcode_fixture());
    // containment in the raw text still counts as a match
    assert!(result.matched_fields.contains(&"last name"));
    assert_eq!(result.match_percentage, 1.0);
}

#[test]
fn test_missing_fields_shrink_the_comparable_set() {
    let mut ocr = matching_ocr();
    ocr.remove("city");
    ocr.remove("state");

    let mut barcode = barcode_fixture();
    barcode.postal_code = None;

    // 6 comparable pairs remain, all matching
    let result = compare::compare(&ocr, &barcode);
    assert!(result.is_match);
    assert_eq!(result.match_percentage, 1.0);
    assert_eq!(result.matched_fields.len(), 6);
}

#[test]
fn test_no_comparable_fields_is_not_a_match() {
    let result = compare::compare(&HashMap::new(), &barcode_fixture());
    assert!(!result.is_match);
    assert_eq!(result.match_percentage, 0.0);
}

#[test]
fn test_custom_threshold() {
    let mut ocr = matching_ocr();
    for key in ["city", "state", "zip", "street"] {
        ocr.insert(key.to_owned(), "wrong".to_owned());
    }
    // 5 of 9 fails the default but passes a lax caller
    let strict = compare::compare(&ocr, &barcode_fixture());
    assert!(!strict.is_match);
    let lax = compare::compare_with_threshold(&ocr, &barcode_fixture(), 0.5);
    assert!(lax.is_match);
}
