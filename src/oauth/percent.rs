//! RFC 3986 percent-encoding as required by OAuth 1.0a signatures.
//!
//! Works on the UTF-8 bytes of the input, so multi-byte characters are
//! emitted as one `%XX` escape per byte.

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Returns true for bytes in the RFC 3986 unreserved set.
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encode a string using the unreserved set `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for &byte in input.as_bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX_UPPER[(byte >> 4) as usize] as char);
            out.push(HEX_UPPER[(byte & 0x0F) as usize] as char);
        }
    }
    out
}

/// Decode `%XX` escapes back into raw bytes.
///
/// Returns `None` for a truncated or non-hex escape. Other bytes are copied
/// through unchanged.
pub fn percent_decode(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unreserved_pass_through() {
        let unreserved = "ABCXYZabcxyz0129-._~";
        assert_eq!(percent_encode(unreserved), unreserved);
    }

    #[test]
    fn test_reserved_ascii_encoded_uppercase() {
        assert_eq!(percent_encode(" "), "%20");
        assert_eq!(percent_encode("!"), "%21");
        assert_eq!(percent_encode("+"), "%2B");
        assert_eq!(percent_encode("/"), "%2F");
        assert_eq!(percent_encode("="), "%3D");
        assert_eq!(percent_encode(","), "%2C");
        assert_eq!(percent_encode("*"), "%2A");
    }

    #[test]
    fn test_multibyte_encoded_per_utf8_byte() {
        // U+00E3 LATIN SMALL LETTER A WITH TILDE, two UTF-8 bytes
        assert_eq!(percent_encode("ã"), "%C3%A3");
        // U+2603 SNOWMAN, three bytes
        assert_eq!(percent_encode("☃"), "%E2%98%83");
        // U+1F600, four bytes (a surrogate pair in UTF-16)
        assert_eq!(percent_encode("😀"), "%F0%9F%98%80");
    }

    #[test]
    fn test_oauth_reference_string() {
        assert_eq!(
            percent_encode("Hello Ladies + Gentlemen, a signed OAuth request!"),
            "Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21"
        );
    }

    #[test]
    fn test_all_printable_ascii() {
        for byte in 0x20u8..=0x7E {
            let s = (byte as char).to_string();
            let encoded = percent_encode(&s);
            if is_unreserved(byte) {
                assert_eq!(encoded, s);
            } else {
                assert_eq!(encoded, format!("%{:02X}", byte));
            }
        }
    }

    #[test]
    fn test_decode_rejects_bad_escape() {
        assert_eq!(percent_decode("%G1"), None);
        assert_eq!(percent_decode("abc%2"), None);
    }

    proptest! {
        #[test]
        fn prop_round_trip(input in "\\PC{0,64}") {
            let encoded = percent_encode(&input);
            prop_assert!(encoded.bytes().all(|b| is_unreserved(b) || b == b'%'));
            let decoded = percent_decode(&encoded).unwrap();
            prop_assert_eq!(decoded, input.as_bytes().to_vec());
        }
    }
}
