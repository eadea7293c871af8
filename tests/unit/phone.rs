use inbox_relay::error::RelayError;
use inbox_relay::phone::{digits, normalize};

#[test]
fn test_documented_examples() {
    assert_eq!(normalize("+55 11 98877-6655").unwrap(), "5511988776655");
    assert_eq!(normalize("011988776655").unwrap(), "5511988776655");
    assert_eq!(normalize("+14155552671").unwrap(), "+14155552671");
    assert_eq!(normalize("14155552671").unwrap(), "+14155552671");
}

#[test]
fn test_legacy_mobiles_gain_nine_for_every_area_code_prefix() {
    for area in ["11", "21", "31", "47", "61", "71", "85", "91"] {
        for lead in ['8', '9'] {
            let raw = format!("+55{area}{lead}1234567");
            let expected = format!("55{area}9{lead}1234567");
            assert_eq!(normalize(&raw).unwrap(), expected, "input {raw}");
        }
    }
}

#[test]
fn test_eleven_digit_domestic_kept() {
    assert_eq!(normalize("+55 (11) 91234-5678").unwrap(), "5511912345678");
}

#[test]
fn test_unknown_area_code_rejected() {
    let err = normalize("+55 20 98877 6655").unwrap_err();
    assert!(matches!(err, RelayError::InvalidPhone(_)));
}

#[test]
fn test_domestic_wrong_length_rejected() {
    assert!(matches!(normalize("+55 11 9887"), Err(RelayError::InvalidPhone(_))));
    assert!(matches!(normalize("+55 11 988776655123"), Err(RelayError::InvalidPhone(_))));
}

#[test]
fn test_short_international_rejected() {
    assert!(matches!(normalize("+1415555267"), Err(RelayError::InvalidPhone(_))));
}

#[test]
fn test_country_code_starting_with_zero_rejected() {
    assert!(matches!(normalize("+01234567890"), Err(RelayError::InvalidPhone(_))));
}

#[test]
fn test_formatting_noise_is_stripped() {
    assert_eq!(normalize(" +44 (20) 7946-0958 ").unwrap(), "+442079460958");
}

#[test]
fn test_invalid_phone_is_client_error() {
    let err = normalize("123").unwrap_err();
    assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
}

#[test]
fn test_digits() {
    assert_eq!(digits("+55 (11) 98877-6655"), "5511988776655");
}
