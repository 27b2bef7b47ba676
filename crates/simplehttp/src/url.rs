//! Percent-decoding and query string parsing.

use std::collections::HashMap;

/// Decoded query parameters, a later duplicate key replaces an earlier one.
pub type QueryParams = HashMap<String, String>;

/// Decode `%XX` escapes and `+` in a URL component.
///
/// An escape with fewer than two characters left ends decoding at that point, so `"100%"`
/// decodes to `"100"`. A `%` followed by two non-hex characters is kept as-is.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let Some(pair) = bytes.get(i + 1..i + 3) else {
                    break;
                };

                if let Some(byte) = decode_hex_pair(pair) {
                    decoded.push(byte);
                    i += 3;
                    continue;
                }

                decoded.push(b'%');
            }
            b'+' => decoded.push(b' '),
            byte => decoded.push(byte),
        }

        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn decode_hex_pair(pair: &[u8]) -> Option<u8> {
    let high = (pair[0] as char).to_digit(16)?;
    let low = (pair[1] as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

/// Parse `key=value` pairs delimited by `&`.
///
/// With `find_start`, everything up to and including the first `?` or `&` is skipped, and no
/// pairs are produced if neither is present. Keys and values are percent-decoded, a key with no
/// `=` gets an empty value, and pairs with an empty key are dropped. The number of pairs
/// produced is the length of the returned map.
pub fn parse_query(input: &str, find_start: bool) -> QueryParams {
    let mut params = QueryParams::new();

    let query = if find_start {
        match input.find(|c| c == '?' || c == '&') {
            Some(index) => &input[index + 1..],
            None => return params,
        }
    } else {
        input
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }

        params.insert(percent_decode(key), percent_decode(value));
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_escapes_and_plus() {
        assert_eq!(percent_decode("a%20b+c"), "a b c");
        assert_eq!(percent_decode("%41%62c"), "Abc");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn decode_stops_at_dangling_escape() {
        assert_eq!(percent_decode("100%"), "100");
        assert_eq!(percent_decode("ab%4"), "ab");
        assert_eq!(percent_decode("%4"), "");
    }

    #[test]
    fn decode_keeps_invalid_escape() {
        assert_eq!(percent_decode("5%zz"), "5%zz");
    }

    #[test]
    fn decode_multibyte_utf8() {
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn query_last_duplicate_wins() {
        let params = parse_query("/x?a=1&b=2&a=3", true);

        assert_eq!(params.len(), 2);
        assert_eq!(params["a"], "3");
        assert_eq!(params["b"], "2");
    }

    #[test]
    fn query_without_start_marker_is_empty() {
        assert!(parse_query("/plain/path", true).is_empty());
    }

    #[test]
    fn query_from_start() {
        let params = parse_query("name=J%C3%BCrgen+S&flag", false);

        assert_eq!(params.len(), 2);
        assert_eq!(params["name"], "Jürgen S");
        assert_eq!(params["flag"], "");
    }

    #[test]
    fn query_value_splits_on_first_equals() {
        let params = parse_query("?expr=a=b&=orphan", true);

        assert_eq!(params.len(), 1);
        assert_eq!(params["expr"], "a=b");
    }

    #[test]
    fn query_starts_after_ampersand() {
        let params = parse_query("/path&k=v", true);

        assert_eq!(params.len(), 1);
        assert_eq!(params["k"], "v");
    }
}
