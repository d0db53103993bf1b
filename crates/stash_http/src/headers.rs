use std::collections::HashSet;

use http::{
    HeaderMap, HeaderName,
    header::{CONNECTION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE},
};

/// =======================================================
/// HOP-BY-HOP HEADERS
/// =======================================================
///
/// Solo tienen sentido en una conexion concreta; un proxy no los reenvia:
/// - Connection, Keep-Alive, Proxy-Connection
/// - TE, Trailer, Transfer-Encoding, Upgrade
/// - cualquier header nombrado como token dentro de `Connection`
///
/// Bodies are re-framed by hyper on each side (always fully buffered), so
/// Transfer-Encoding from one side must never leak to the other.
const HOP_BY_HOP: &[&str] = &["keep-alive", "proxy-connection"];

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for token in connection_tokens(headers) {
        if let Ok(name) = HeaderName::from_bytes(token.as_bytes()) {
            headers.remove(name);
        }
    }

    for name in [CONNECTION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE] {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn connection_tokens(headers: &HeaderMap) -> HashSet<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(split_header_tokens)
        .collect()
}

fn split_header_tokens(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').filter_map(|token| {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(
                trimmed
                    .trim_matches(|c| c == '"' || c == '\'')
                    .to_ascii_lowercase(),
            )
        }
    })
}
