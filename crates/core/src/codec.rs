//! Conversions between source and target attribute encodings.
//!
//! The source directory keeps a password digest as hex text and password
//! change times as Windows FILETIME ticks (100 ns since 1601-01-01). The
//! target wants an RFC 2307 `{SHA}` tagged base64 digest and Unix seconds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::errors::CodecError;

/// Scheme tag prefixed to target password hashes.
pub const PASSWORD_SCHEME: &str = "{SHA}";

/// FILETIME ticks between 1601-01-01 and 1970-01-01.
pub const EPOCH_DELTA_TICKS: i64 = 116_444_736_000_000_000;

/// FILETIME ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Hex digest from the source directory to a tagged base64 target hash.
pub fn encode_password(hex_digest: &str) -> Result<String, CodecError> {
    let raw = hex::decode(hex_digest.trim())
        .map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    Ok(format!("{PASSWORD_SCHEME}{}", STANDARD.encode(raw)))
}

/// Raw digest bytes from a tagged target hash.
pub fn decode_password(tagged: &str) -> Result<Vec<u8>, CodecError> {
    let encoded = tagged
        .strip_prefix(PASSWORD_SCHEME)
        .ok_or_else(|| CodecError::MissingScheme(PASSWORD_SCHEME.into()))?;
    STANDARD
        .decode(encoded)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

/// FILETIME ticks to Unix seconds, rounding toward negative infinity.
///
/// Tick counts so far below the epoch that the offset does not fit in an
/// `i64` are rejected.
pub fn convert_timestamp(ticks: i64) -> Result<i64, CodecError> {
    ticks
        .checked_sub(EPOCH_DELTA_TICKS)
        .map(|offset| offset.div_euclid(TICKS_PER_SECOND))
        .ok_or_else(|| CodecError::InvalidTimestamp(ticks.to_string()))
}

/// Parse the decimal string form both directories use for timestamps.
pub fn parse_ticks(value: &str) -> Result<i64, CodecError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| CodecError::InvalidTimestamp(value.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-1 of "password".
    const PASSWORD_SHA1_HEX: &str = "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8";

    #[test]
    fn test_encode_known_digest() {
        assert_eq!(
            encode_password(PASSWORD_SHA1_HEX).unwrap(),
            "{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g="
        );
    }

    #[test]
    fn test_encode_accepts_uppercase_and_trailing_newline() {
        let upper = PASSWORD_SHA1_HEX.to_uppercase() + "\n";
        assert_eq!(
            encode_password(&upper).unwrap(),
            encode_password(PASSWORD_SHA1_HEX).unwrap()
        );
    }

    #[test]
    fn test_password_round_trip() {
        for hex_digest in [
            PASSWORD_SHA1_HEX,
            "0000000000000000000000000000000000000000",
            "ffffffffffffffffffffffffffffffffffffffff",
            "00",
            "",
        ] {
            let encoded = encode_password(hex_digest).unwrap();
            assert!(encoded.starts_with(PASSWORD_SCHEME));
            assert_eq!(
                decode_password(&encoded).unwrap(),
                hex::decode(hex_digest).unwrap(),
                "round trip failed for {hex_digest:?}"
            );
        }
    }

    #[test]
    fn test_encode_rejects_bad_hex() {
        assert!(matches!(encode_password("xyz"), Err(CodecError::InvalidHex(_))));
        assert!(matches!(encode_password("abc"), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn test_decode_requires_scheme() {
        assert_eq!(
            decode_password("W6ph5Mm5Pz8GgiULbPgzG37mj9g="),
            Err(CodecError::MissingScheme("{SHA}".into()))
        );
        assert!(matches!(
            decode_password("{SHA}not base64!"),
            Err(CodecError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_convert_timestamp_known_values() {
        assert_eq!(convert_timestamp(EPOCH_DELTA_TICKS), Ok(0));
        assert_eq!(convert_timestamp(EPOCH_DELTA_TICKS + 9_999_999), Ok(0));
        assert_eq!(convert_timestamp(EPOCH_DELTA_TICKS + TICKS_PER_SECOND), Ok(1));
        // 2019-04-17T18:40:00Z
        assert_eq!(convert_timestamp(132_000_000_000_000_000), Ok(1_555_526_400));
    }

    #[test]
    fn test_convert_timestamp_never_set() {
        // pwdLastSet = 0 means "must change at next logon".
        assert_eq!(convert_timestamp(0), Ok(-11_644_473_600));
    }

    #[test]
    fn test_convert_timestamp_rejects_out_of_range_ticks() {
        let ticks = parse_ticks("-9223372036854775808").unwrap();
        assert_eq!(
            convert_timestamp(ticks),
            Err(CodecError::InvalidTimestamp("-9223372036854775808".into()))
        );
        assert!(convert_timestamp(i64::MIN + EPOCH_DELTA_TICKS).is_ok());
        assert!(convert_timestamp(i64::MIN + EPOCH_DELTA_TICKS - 1).is_err());
        assert!(convert_timestamp(i64::MAX).is_ok());
    }

    #[test]
    fn test_convert_timestamp_monotonic_and_non_negative() {
        let mut previous = convert_timestamp(EPOCH_DELTA_TICKS).unwrap();
        let mut ticks = EPOCH_DELTA_TICKS;
        for step in [1, 7, 9_999_999, 10_000_000, 123_456_789, 86_400 * TICKS_PER_SECOND] {
            ticks += step;
            let converted = convert_timestamp(ticks).unwrap();
            assert!(converted >= 0);
            assert!(converted >= previous);
            previous = converted;
        }
    }

    #[test]
    fn test_parse_ticks() {
        assert_eq!(parse_ticks("132000000000000000").unwrap(), 132_000_000_000_000_000);
        assert_eq!(parse_ticks(" 1000 ").unwrap(), 1000);
        assert_eq!(
            parse_ticks("never"),
            Err(CodecError::InvalidTimestamp("never".into()))
        );
    }
}
