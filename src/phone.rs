//! Phone number validation and canonicalisation.
//!
//! Brazilian numbers (prefixed with `+55`, `55` or the trunk `0`) are checked
//! against the area-code whitelist and returned as `55` + area code +
//! subscriber, inserting the mobile `9` for legacy 10-digit mobiles. Anything
//! else is treated as international and returned with a leading `+`.

use crate::error::RelayError;

const DOMESTIC_COUNTRY_CODE: &str = "55";
const MIN_INTERNATIONAL_DIGITS: usize = 11;

const AREA_CODES: &[u32] = &[
    11, 12, 13, 14, 15, 16, 17, 18, 19, //
    21, 22, 24, 27, 28, //
    31, 32, 33, 34, 35, 37, 38, //
    41, 42, 43, 44, 45, 46, 47, 48, 49, //
    51, 53, 54, 55, //
    61, 62, 63, 64, 65, 66, 67, 68, 69, //
    71, 73, 74, 75, 77, 79, //
    81, 82, 83, 84, 85, 86, 87, 88, 89, //
    91, 92, 93, 94, 95, 96, 97, 98, 99,
];

pub fn normalize(raw: &str) -> Result<String, RelayError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if cleaned.starts_with("+55") || cleaned.starts_with("55") || cleaned.starts_with('0') {
        return normalize_domestic(&cleaned);
    }
    match cleaned.strip_prefix('+') {
        Some(rest) => normalize_international(rest),
        None => normalize_international(&cleaned),
    }
}

fn normalize_domestic(number: &str) -> Result<String, RelayError> {
    let national = number
        .strip_prefix("+55")
        .or_else(|| number.strip_prefix("55"))
        .or_else(|| number.strip_prefix('0'))
        .unwrap_or(number);

    if national.len() != 10 && national.len() != 11 {
        return Err(RelayError::InvalidPhone(
            "domestic number must have 10 or 11 digits including the area code".to_string(),
        ));
    }

    let area_code: u32 = national[..2]
        .parse()
        .map_err(|_| RelayError::InvalidPhone("area code is not numeric".to_string()))?;
    if !AREA_CODES.contains(&area_code) {
        return Err(RelayError::InvalidPhone(format!(
            "area code {area_code} is not a valid area code"
        )));
    }

    let subscriber = &national[2..];
    if !is_digits(subscriber) {
        return Err(RelayError::InvalidPhone(
            "subscriber number must contain only digits".to_string(),
        ));
    }

    let mobile_legacy = national.len() == 10 && matches!(subscriber.as_bytes()[0], b'8' | b'9');
    if mobile_legacy {
        return Ok(format!("{DOMESTIC_COUNTRY_CODE}{}9{subscriber}", &national[..2]));
    }
    Ok(format!("{DOMESTIC_COUNTRY_CODE}{national}"))
}

fn normalize_international(number: &str) -> Result<String, RelayError> {
    if number.len() < MIN_INTERNATIONAL_DIGITS {
        return Err(RelayError::InvalidPhone(format!(
            "international number must have at least {MIN_INTERNATIONAL_DIGITS} digits"
        )));
    }

    let country_code = if is_digits(&number[..3]) {
        &number[..3]
    } else {
        &number[..2]
    };
    if !is_digits(country_code) || country_code.len() > 3 {
        return Err(RelayError::InvalidPhone("invalid country code".to_string()));
    }
    if country_code.starts_with('0') {
        return Err(RelayError::InvalidPhone(
            "country code cannot start with zero".to_string(),
        ));
    }
    if !is_digits(number) {
        return Err(RelayError::InvalidPhone(
            "number must contain only digits after the leading +".to_string(),
        ));
    }

    Ok(format!("+{number}"))
}

fn is_digits(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_digit())
}

/// Digits only, for comparing numbers stored in different notations.
pub fn digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
