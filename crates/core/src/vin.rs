//! Vehicle identification code helpers.

use serde::Serialize;

pub const CODE_LENGTH: usize = 17;
pub const PREFIX_LENGTH: usize = 11;

const CHECK_DIGIT_WEIGHTS: [u32; CODE_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];
const CHECK_DIGIT_POSITION: usize = 8;
const YEAR_POSITION: usize = 9;
const LETTER_YEAR_CODES: &str = "ABCDEFGHJKLMNPRSTVWXY";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    Length,
    Charset,
    /// Positions 12 to 17 are one repeated character, a placeholder serial.
    RepeatedSerial,
}

impl InvalidReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Charset => "charset",
            Self::RepeatedSerial => "repeated_serial",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeValidation {
    Valid(String),
    Invalid(InvalidReason),
}

impl CodeValidation {
    pub fn valid(self) -> Option<String> {
        match self {
            Self::Valid(code) => Some(code),
            Self::Invalid(_) => None,
        }
    }
}

/// Trims, uppercases and repairs the usual transcription confusions.
pub fn canonicalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| match ch.to_ascii_uppercase() {
            'I' => '1',
            'O' | 'Q' => '0',
            other => other,
        })
        .collect()
}

pub fn validate(raw: &str) -> CodeValidation {
    let code = canonicalize(raw);
    if code.chars().count() != CODE_LENGTH {
        return CodeValidation::Invalid(InvalidReason::Length);
    }
    if !code.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return CodeValidation::Invalid(InvalidReason::Charset);
    }
    let serial = &code.as_bytes()[PREFIX_LENGTH..];
    if serial.iter().all(|byte| *byte == serial[0]) {
        return CodeValidation::Invalid(InvalidReason::RepeatedSerial);
    }
    CodeValidation::Valid(code)
}

/// First eleven characters of a code. Codes that are not valid have no prefix.
pub fn prefix11(code: &str) -> Option<String> {
    validate(code).valid().map(|code| code[..PREFIX_LENGTH].to_owned())
}

/// ISO 3779 position-9 check digit of a valid code.
pub fn check_digit_ok(code: &str) -> bool {
    let Some(code) = validate(code).valid() else {
        return false;
    };
    let bytes = code.as_bytes();
    let mut sum = 0;
    for (index, byte) in bytes.iter().enumerate() {
        let Some(value) = transliterate(*byte) else {
            return false;
        };
        sum += value * CHECK_DIGIT_WEIGHTS[index];
    }
    let expected = match sum % 11 {
        10 => b'X',
        digit => b'0' + digit as u8,
    };
    bytes[CHECK_DIGIT_POSITION] == expected
}

/// Model year from position 10. Letters map onto the 2010 to 2030 cycle and
/// digits onto 2001 to 2009.
pub fn decode_model_year(code: &str) -> Option<i32> {
    let code = validate(code).valid()?;
    let marker = code.as_bytes()[YEAR_POSITION] as char;
    if let Some(digit) = marker.to_digit(10) {
        return (digit > 0).then(|| 2000 + digit as i32);
    }
    LETTER_YEAR_CODES.find(marker).map(|offset| 2010 + offset as i32)
}

fn transliterate(byte: u8) -> Option<u32> {
    let value = match byte {
        b'0'..=b'9' => u32::from(byte - b'0'),
        b'A' | b'J' => 1,
        b'B' | b'K' | b'S' => 2,
        b'C' | b'L' | b'T' => 3,
        b'D' | b'M' | b'U' => 4,
        b'E' | b'N' | b'V' => 5,
        b'F' | b'W' => 6,
        b'G' | b'P' | b'X' => 7,
        b'H' | b'Y' => 8,
        b'R' | b'Z' => 9,
        _ => return None,
    };
    Some(value)
}
