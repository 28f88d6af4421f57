//! Small parsing and encoding helpers shared across the crate.

use bytes::Bytes;
use cookie::Cookie;

use crate::{Error, Result};

/// Parses a raw cookie string of the form `"k=v; k2=v2"` into cookies.
///
/// Segments without an `=` are skipped, as are empty segments.
pub(crate) fn parse_cookies(raw: &str) -> Vec<Cookie<'static>> {
    raw.split(';')
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            let (name, value) = segment.split_once('=')?;
            Some(Cookie::new(name.trim().to_owned(), value.to_owned()))
        })
        .collect()
}

/// Returns true if the trimmed string is bracket-balanced JSON-shaped,
/// i.e. starts/ends with `{}` or `[]`.
pub(crate) fn is_json_shaped(body: &str) -> bool {
    let body = body.trim();
    (body.starts_with('{') && body.ends_with('}'))
        || (body.starts_with('[') && body.ends_with(']'))
}

/// Re-interprets a byte buffer as GBK and transcodes it to UTF-8.
pub(crate) fn gbk_to_utf8(input: &[u8]) -> Result<Bytes> {
    let (decoded, _, had_errors) = encoding_rs::GBK.decode(input);
    if had_errors {
        return Err(Error::Encoding(
            "body contains byte sequences that are not valid GBK".to_owned(),
        ));
    }
    Ok(Bytes::from(decoded.into_owned()))
}
