use std::path::PathBuf;

use clap::Parser;
use identikit::aamva;
use identikit::bac::BacKey;
use identikit::csr::{self, SubjectName};
use identikit::mrz;
use rsa::RsaPrivateKey;


#[derive(Clone, Debug, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
enum Mode {
    /// Parse machine-readable-zone lines from a text file.
    ParseMrz(ParseMrzOpts),
    /// Parse a decoded PDF417 barcode payload from a file.
    ParseBarcode(ParseBarcodeOpts),
    /// Derive the chip access key from document number and dates.
    BacKey(BacKeyOpts),
    /// Generate a fresh RSA key pair and print a certificate signing request.
    GenCsr(GenCsrOpts),
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
struct ParseMrzOpts {
    #[arg(short, long = "mrz")]
    pub mrz_path: PathBuf,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
struct ParseBarcodeOpts {
    #[arg(short, long = "payload")]
    pub payload_path: PathBuf,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
struct BacKeyOpts {
    #[arg(short = 'n', long)]
    pub document_number: String,

    /// Date of birth, YYMMDD or a common rendering such as MM/DD/YYYY.
    #[arg(short, long)]
    pub birth_date: String,

    /// Date of expiry, YYMMDD or a common rendering such as MM/DD/YYYY.
    #[arg(short, long)]
    pub expiry_date: String,
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
struct GenCsrOpts {
    #[arg(long)]
    pub country: Option<String>,

    #[arg(long)]
    pub state: Option<String>,

    #[arg(long)]
    pub locality: Option<String>,

    #[arg(long)]
    pub organization: Option<String>,

    #[arg(long)]
    pub organizational_unit: Option<String>,

    #[arg(long)]
    pub common_name: String,
}


fn main() {
    match Mode::parse() {
        Mode::ParseMrz(opts) => parse_mrz(&opts),
        Mode::ParseBarcode(opts) => parse_barcode(&opts),
        Mode::BacKey(opts) => bac_key(&opts),
        Mode::GenCsr(opts) => gen_csr(&opts),
    }
}

fn parse_mrz(opts: &ParseMrzOpts) {
    let text = std::fs::read_to_string(&opts.mrz_path)
        .expect("failed to read MRZ file");
    let lines: Vec<&str> = text.lines().collect();

    let Some(data) = mrz::parse(&lines) else {
        eprintln!("no valid machine-readable zone found");
        std::process::exit(1);
    };

    println!("document type:   {}", data.document_type);
    println!("issuing country: {}", data.issuing_country);
    println!("surname:         {}", data.surname);
    println!("given names:     {}", data.given_names);
    println!("document number: {}", data.document_number);
    println!("nationality:     {}", data.nationality);
    println!("date of birth:   {}", data.birth_date);
    println!("sex:             {:?}", data.sex);
    println!("date of expiry:  {}", data.expiry_date);
    if !data.personal_number.is_empty() {
        println!("personal number: {}", data.personal_number);
    }

    match BacKey::from_mrz(&data) {
        Ok(key) => println!("chip access key: {}", key),
        Err(e) => println!("no chip access key: {}", e),
    }
}

fn parse_barcode(opts: &ParseBarcodeOpts) {
    let payload = std::fs::read_to_string(&opts.payload_path)
        .expect("failed to read barcode payload");
    let data = aamva::parse(&payload);
    println!("{:#?}", data);
}

fn bac_key(opts: &BacKeyOpts) {
    let birth_date = normalize_date(&opts.birth_date);
    let expiry_date = normalize_date(&opts.expiry_date);

    let key = BacKey::new(&opts.document_number, &birth_date, &expiry_date)
        .expect("failed to derive access key");
    println!("formatted: {}", key);
    println!("seed:      {}", key.seed());
    println!("mrz info:  {}", key.mrz_information());
}

fn normalize_date(value: &str) -> String {
    if value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.to_owned();
    }
    identikit::bac::date_to_mrz_format(value)
        .expect("unrecognized date format")
}

fn gen_csr(opts: &GenCsrOpts) {
    let subject = SubjectName {
        country: opts.country.clone(),
        state: opts.state.clone(),
        locality: opts.locality.clone(),
        organization: opts.organization.clone(),
        organizational_unit: opts.organizational_unit.clone(),
        common_name: Some(opts.common_name.clone()),
    };

    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048)
        .expect("failed to generate RSA key pair");
    let public_key = private_key.to_public_key();

    let pem = csr::generate_csr_pem(&subject, &public_key, &private_key)
        .expect("failed to build CSR");
    print!("{}", pem);
}
