use identikit::bac::{self, BacKey, FormatError};


#[test]
fn test_formatted_key_round_trip() {
    let key = BacKey::new("L898902C3", "690806", "940623").unwrap();
    assert_eq!(key.to_string(), "L898902C3|690806|940623");

    let reparsed: BacKey = key.to_string().parse().unwrap();
    assert_eq!(reparsed, key);
    assert_eq!(reparsed.document_number(), "L898902C3");
    assert_eq!(reparsed.birth_date(), "690806");
    assert_eq!(reparsed.expiry_date(), "940623");
}

#[test]
fn test_document_number_padding_and_truncation() {
    let short = BacKey::new("AB123", "690806", "940623").unwrap();
    assert_eq!(short.document_number(), "AB123<<<<");

    let long = BacKey::new("ABCDEFGHIJKL", "690806", "940623").unwrap();
    assert_eq!(long.document_number(), "ABCDEFGHI");

    let exact = BacKey::new("L898902C3", "690806", "940623").unwrap();
    assert_eq!(exact.document_number(), "L898902C3");
}

#[test]
fn test_document_number_cleaning() {
    // lowercase and separators are scanner artifacts, not key material
    let key = BacKey::new(" l898-902c3 ", "690806", "940623").unwrap();
    assert_eq!(key.document_number(), "L898902C3");
}

#[test]
fn test_date_cleaning_and_validation() {
    let key = BacKey::new("L898902C3", "69-08-06", "94/06/23").unwrap();
    assert_eq!(key.birth_date(), "690806");
    assert_eq!(key.expiry_date(), "940623");

    assert!(matches!(
        BacKey::new("L898902C3", "6908", "940623"),
        Err(FormatError::DateLength { obtained: 4 }),
    ));
    // month 13 is rejected by the calendar, not just the digit count
    assert!(matches!(
        BacKey::new("L898902C3", "691306", "940623"),
        Err(FormatError::InvalidDate { .. }),
    ));
    // February 30 likewise
    assert!(matches!(
        BacKey::new("L898902C3", "690230", "940623"),
        Err(FormatError::InvalidDate { .. }),
    ));
}

#[test]
fn test_formatted_key_part_count() {
    assert!(matches!(
        "L898902C3|690806".parse::<BacKey>(),
        Err(FormatError::PartCount { obtained: 2 }),
    ));
    assert!(matches!(
        "a|b|c|d".parse::<BacKey>(),
        Err(FormatError::PartCount { obtained: 4 }),
    ));
}

#[test]
fn test_seed_is_fixed_width() {
    let key = BacKey::new("AB123", "690806", "940623").unwrap();
    let seed = key.seed();
    assert_eq!(seed.len(), 21);
    assert_eq!(seed, "AB123<<<<690806940623");
}

#[test]
fn test_validate_key() {
    // anything shorter than document number + one date is never valid
    assert!(!bac::validate_key(""));
    assert!(!bac::validate_key("L898902C3<6908"));

    assert!(bac::validate_key("L898902C<690806940623"));
    assert!(bac::validate_key("AB123<<<<690806940623"));

    // dates must stay calendar-valid
    assert!(!bac::validate_key("L898902C<691306940623"));
    assert!(!bac::validate_key("L898902C<690806941323"));
}

#[test]
fn test_date_to_mrz_format() {
    assert_eq!(bac::date_to_mrz_format("08/06/1969").unwrap(), "690806");
    assert_eq!(bac::date_to_mrz_format("1969-08-06").unwrap(), "690806");
    assert_eq!(bac::date_to_mrz_format("06.08.1969").unwrap(), "690806");
    assert_eq!(bac::date_to_mrz_format("19690806").unwrap(), "690806");

    assert!(matches!(
        bac::date_to_mrz_format("not a date"),
        Err(FormatError::UnrecognizedDate { .. }),
    ));
}
