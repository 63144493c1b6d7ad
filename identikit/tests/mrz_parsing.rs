use identikit::mrz::{self, Sex};


// ICAO-style specimen: JOHN DOE, USA, born 1969-08-06, expires 1994-06-23
const LINE_1: &str = "P<USADOE<<JOHN<<<<<<<<<<<<<<<<<<<<<<<<<<<<<<";
const LINE_2: &str = "L898902C36USA6908061M9406236<<<<<<<<<<<<<<06";


#[test]
fn test_check_digit_icao_example() {
    // published check digit for the Doc 9303 specimen document number
    assert_eq!(mrz::check_digit("L898902C3"), 6);
    // the padded 8-character variant from the BAC worked example
    assert_eq!(mrz::check_digit("L898902C<"), 3);
    assert_eq!(mrz::check_digit("690806"), 1);
    assert_eq!(mrz::check_digit("940623"), 6);
    assert_eq!(mrz::check_digit("<<<<<<<<<<<<<<"), 0);
}

#[test]
fn test_parse_known_good_pair() {
    let data = mrz::parse(&[LINE_1, LINE_2]).expect("specimen zone must parse");

    assert_eq!(&*data.document_type, "P");
    assert_eq!(&*data.issuing_country, "USA");
    assert_eq!(data.surname, "DOE");
    assert_eq!(data.given_names, "JOHN");
    assert_eq!(&*data.document_number, "L898902C3");
    assert_eq!(data.document_number_check, 6);
    assert_eq!(&*data.nationality, "USA");
    assert_eq!(&*data.birth_date, "690806");
    assert_eq!(data.sex, Sex::Male);
    assert_eq!(&*data.expiry_date, "940623");
    assert_eq!(&*data.personal_number, "");
    assert_eq!(data.line1, LINE_1);
    assert_eq!(data.line2, LINE_2);
}

#[test]
fn test_parse_scans_line_windows() {
    let lines = [
        "REPUBLIC OF UTOPIA",
        "some ocr garbage",
        LINE_1,
        LINE_2,
        "more garbage",
    ];
    assert!(mrz::parse(&lines).is_some());
}

#[test]
fn test_parse_rejects_tampered_check_digit() {
    // birth date check digit off by one
    let tampered = LINE_2.replace("6908061", "6908062");
    assert!(mrz::parse(&[LINE_1, tampered.as_str()]).is_none());
}

#[test]
fn test_parse_rejects_calendar_invalid_date() {
    // month 13 with a recomputed field check digit is still not a date; try
    // every composite digit so the rejection cannot come from the checksum
    let bad_date = "691306";
    let check = mrz::check_digit(bad_date);
    for composite in b'0'..=b'9' {
        let line2 = format!(
            "L898902C36USA{}{}M9406236<<<<<<<<<<<<<<0{}",
            bad_date, check, char::from(composite),
        );
        assert!(mrz::parse(&[LINE_1, line2.as_str()]).is_none());
    }
}

#[test]
fn test_parse_returns_none_instead_of_erroring() {
    assert!(mrz::parse::<&str>(&[]).is_none());
    assert!(mrz::parse(&["just one line"]).is_none());
    assert!(mrz::parse(&["AAAA", "BBBB"]).is_none());
}

#[test]
fn test_ocr_recovery_letter_for_digit_in_date() {
    // '0' of the birth date misread as 'O'
    let noisy = LINE_2.replace("690806", "69O806");
    assert_ne!(noisy, LINE_2);
    let data = mrz::parse(&[LINE_1, noisy.as_str()]).expect("recovery pass must fix O->0");
    assert_eq!(&*data.birth_date, "690806");
}

#[test]
fn test_ocr_recovery_digit_for_letter_in_name() {
    // 'O' of the surname misread as '0'
    let noisy = LINE_1.replace("DOE", "D0E");
    let data = mrz::parse(&[noisy.as_str(), LINE_2]).expect("recovery pass must fix 0->O");
    assert_eq!(data.surname, "DOE");
}

#[test]
fn test_ocr_recovery_filler_misread_as_k() {
    // two fillers of the personal-number field misread as 'K'
    let noisy = LINE_2.replace("<<<<<<<<<<<<<<0", "<<KK<<<<<<<<<<0");
    let data = mrz::parse(&[LINE_1, noisy.as_str()]).expect("recovery pass must fix K-><");
    assert_eq!(&*data.personal_number, "");
}

#[test]
fn test_parse_dg1() {
    let mut dg1 = vec![0x61, 0x5B, 0x5F, 0x1F, 0x58];
    dg1.extend(LINE_1.bytes());
    dg1.extend(LINE_2.bytes());

    let data = mrz::parse_dg1(&dg1).expect("DG1 specimen must parse");
    assert_eq!(data.surname, "DOE");
    assert_eq!(&*data.document_number, "L898902C3");
}

#[test]
fn test_parse_dg1_rejects_other_layouts() {
    // a TD1-sized zone (90 bytes) is not handled
    let mut dg1 = vec![0x61, 0x5D, 0x5F, 0x1F, 0x5A];
    dg1.extend(std::iter::repeat(b'<').take(90));
    assert!(mrz::parse_dg1(&dg1).is_none());

    assert!(mrz::parse_dg1(&[]).is_none());
    assert!(mrz::parse_dg1(&[0x60, 0x02, 0x01, 0x02]).is_none());
}
