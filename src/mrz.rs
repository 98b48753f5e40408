//! Machine-readable zone parsing for TD1, TD2 and TD3 travel documents
//!
//! Input is OCR text, one MRZ line per text line. Lines are normalized
//! (trimmed, uppercased, spaces removed) and anything shorter than 20
//! characters is dropped before the layout is chosen.

use serde::Serialize;

use crate::error::{ScanError, ScanResult};

const MIN_LINE_LEN: usize = 20;
const FILLER: char = '<';

/// MRZ layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MrzFormat {
    /// ID cards, 3 x 30
    #[serde(rename = "TD1")]
    Td1,
    /// Official documents, 2 x 36
    #[serde(rename = "TD2")]
    Td2,
    /// Passports, 2 x 44
    #[serde(rename = "TD3")]
    Td3,
}

impl MrzFormat {
    fn line_len(self) -> usize {
        match self {
            MrzFormat::Td1 => 30,
            MrzFormat::Td2 => 36,
            MrzFormat::Td3 => 44,
        }
    }
}

/// Which check digits matched their fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckDigits {
    pub document_number: bool,
    pub date_of_birth: bool,
    pub date_of_expiry: bool,
}

impl CheckDigits {
    fn valid_count(&self) -> usize {
        [self.document_number, self.date_of_birth, self.date_of_expiry]
            .iter()
            .filter(|v| **v)
            .count()
    }
}

/// Parsed MRZ fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MrzResult {
    pub document_type: MrzFormat,
    pub document_number: String,
    pub issuing_country: String,
    pub nationality: String,
    /// YYMMDD
    pub date_of_birth: String,
    /// YYMMDD
    pub date_of_expiry: String,
    pub sex: String,
    pub surname: String,
    pub given_names: String,
    pub optional_data: String,
    /// Normalized, padded lines
    pub raw_mrz: Vec<String>,
    pub check_digits: CheckDigits,
    /// 0.5 plus 1/6 for every valid check digit
    pub confidence: f32,
}

/// ICAO 9303 check digit: weights 7, 3, 1 over digit, letter and filler values
pub fn check_digit(field: &str) -> u32 {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    field
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let value = match c {
                '0'..='9' => c as u32 - '0' as u32,
                'A'..='Z' => c as u32 - 'A' as u32 + 10,
                _ => 0,
            };
            value * WEIGHTS[i % 3]
        })
        .sum::<u32>()
        % 10
}

fn digit_matches(field: &str, check: &str) -> bool {
    let check = check.replace('O', "0");
    match check.chars().next().and_then(|c| c.to_digit(10)) {
        Some(d) => d == check_digit(field),
        // A filler check digit is allowed for an all-filler field
        None => check == "<" && field.chars().all(|c| c == FILLER),
    }
}

fn normalize(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim().to_uppercase().replace(' ', ""))
        .filter(|l| l.chars().count() >= MIN_LINE_LEN)
        .collect()
}

/// Pad with filler or truncate to `len` characters
fn fit_line(line: &str, len: usize) -> String {
    let mut out: String = line.chars().take(len).collect();
    while out.chars().count() < len {
        out.push(FILLER);
    }
    out
}

/// Characters `start..end`; lines are ASCII after fitting
fn field(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("")
}

fn strip_filler(s: &str) -> String {
    s.trim_end_matches(FILLER).to_string()
}

fn date(s: &str) -> String {
    s.replace('O', "0")
}

fn names(name_field: &str) -> (String, String) {
    let mut parts = name_field.splitn(2, "<<");
    let clean = |s: &str| {
        s.replace(FILLER, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .replace('0', "O")
    };
    let surname = parts.next().map(clean).unwrap_or_default();
    let given = parts.next().map(clean).unwrap_or_default();
    (surname, given)
}

fn confidence(checks: &CheckDigits) -> f32 {
    0.5 + checks.valid_count() as f32 / 6.0
}

fn parse_td1(lines: &[String]) -> MrzResult {
    let len = MrzFormat::Td1.line_len();
    let l1 = fit_line(&lines[0], len);
    let l2 = fit_line(&lines[1], len);
    let l3 = fit_line(&lines[2], len);

    let dob = date(field(&l2, 0, 6));
    let expiry = date(field(&l2, 8, 14));
    let checks = CheckDigits {
        document_number: digit_matches(field(&l1, 5, 14), field(&l1, 14, 15)),
        date_of_birth: digit_matches(&dob, field(&l2, 6, 7)),
        date_of_expiry: digit_matches(&expiry, field(&l2, 14, 15)),
    };
    let (surname, given_names) = names(&l3);

    MrzResult {
        document_type: MrzFormat::Td1,
        document_number: strip_filler(field(&l1, 5, 14)),
        issuing_country: field(&l1, 2, 5).to_string(),
        nationality: field(&l2, 15, 18).to_string(),
        date_of_birth: dob,
        date_of_expiry: expiry,
        sex: field(&l2, 7, 8).to_string(),
        surname,
        given_names,
        optional_data: strip_filler(field(&l1, 15, 30)),
        confidence: confidence(&checks),
        check_digits: checks,
        raw_mrz: vec![l1, l2, l3],
    }
}

/// TD2 and TD3 share the second-line layout and differ only in width
fn parse_two_line(lines: &[String], format: MrzFormat) -> MrzResult {
    let len = format.line_len();
    let l1 = fit_line(&lines[0], len);
    let l2 = fit_line(&lines[1], len);

    let dob = date(field(&l2, 13, 19));
    let expiry = date(field(&l2, 21, 27));
    let checks = CheckDigits {
        document_number: digit_matches(field(&l2, 0, 9), field(&l2, 9, 10)),
        date_of_birth: digit_matches(&dob, field(&l2, 19, 20)),
        date_of_expiry: digit_matches(&expiry, field(&l2, 27, 28)),
    };
    let optional_end = if format == MrzFormat::Td3 { 42 } else { 35 };
    let (surname, given_names) = names(field(&l1, 5, len));

    MrzResult {
        document_type: format,
        document_number: strip_filler(field(&l2, 0, 9)),
        issuing_country: field(&l1, 2, 5).to_string(),
        nationality: field(&l2, 10, 13).to_string(),
        date_of_birth: dob,
        date_of_expiry: expiry,
        sex: field(&l2, 20, 21).to_string(),
        surname,
        given_names,
        optional_data: strip_filler(field(&l2, 28, optional_end)),
        confidence: confidence(&checks),
        check_digits: checks,
        raw_mrz: vec![l1, l2],
    }
}

/// Parse OCR'd MRZ text
pub fn parse_mrz(text: &str) -> ScanResult<MrzResult> {
    let lines = normalize(text);
    if lines.iter().any(|l| !l.is_ascii()) {
        return Err(ScanError::Mrz("non-ASCII characters in MRZ".into()));
    }
    match lines.len() {
        0 => Err(ScanError::Mrz("no valid MRZ lines found".into())),
        2 if lines[0].len() >= 40 => Ok(parse_two_line(&lines, MrzFormat::Td3)),
        2 => Ok(parse_two_line(&lines, MrzFormat::Td2)),
        3 => Ok(parse_td1(&lines)),
        n => Err(ScanError::Mrz(format!("invalid MRZ format: {n} lines"))),
    }
}
