//! Remote-party URI handling

/// Shortest URI accepted by originate: one scheme byte, ':', one target byte.
pub const MIN_URI_LEN: usize = 3;

/// Check that a URI is acceptable for an outgoing call.
pub fn valid_uri(uri: &[u8], max_len: usize) -> bool {
    uri.len() >= MIN_URI_LEN && uri.len() <= max_len
}

/// Extract the URI scheme, i.e. the substring ending at the first ':' found
/// strictly inside the byte range `1..len-1`.
///
/// A ':' at offset 0 would yield an empty scheme and a ':' at the last byte
/// would consume the entire string, so both boundaries count as "no scheme".
pub fn uri_scheme(uri: &str) -> Option<&str> {
    let bytes = uri.as_bytes();
    if bytes.len() < 2 {
        return None;
    }

    for i in 1..bytes.len() - 1 {
        if bytes[i] == b':' {
            return Some(&uri[..i]);
        }
    }

    None
}

/// Match a scheme against a comma-delimited scheme list, case-sensitively and
/// by exact token length.
pub fn scheme_in_list(scheme: &str, scheme_list: &str) -> bool {
    scheme_list.split(',').any(|candidate| candidate == scheme)
}
