use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

// How far into the body a <meta> charset declaration is looked for.
const PRESCAN_BYTES: usize = 1024;

/// Decodes a response body to text.
///
/// The encoding comes from the `Content-Type` charset, then a `<meta charset>`
/// or `http-equiv` declaration near the top of the document, then UTF-8. A byte
/// order mark overrides all of them. Undecodable bytes become U+FFFD.
pub fn decode<'a>(body: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let encoding = content_type
        .and_then(charset_param)
        .or_else(|| meta_charset(body))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text
}

fn charset_param(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches(|c: char| c == '"' || c == '\'').as_bytes())
    })
}

fn meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(PRESCAN_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();

    head.match_indices("<meta").find_map(|(start, _)| {
        let tag = &head[start..];
        let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
        let value = &tag[tag.find("charset")? + "charset".len()..];
        let value = value.trim_start().strip_prefix('=')?.trim_start();
        let value = value.trim_start_matches(|c: char| c == '"' || c == '\'');
        let end = value
            .find(|c: char| c == '"' || c == '\'' || c == ';' || c == '/' || c.is_whitespace())
            .unwrap_or(value.len());
        // utf-16 declared in an ASCII-readable prefix means utf-8
        Encoding::for_label(value[..end].as_bytes()).map(Encoding::output_encoding)
    })
}
