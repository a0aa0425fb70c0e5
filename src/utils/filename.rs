use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// RFC 5987 `attr-char`: everything else in `filename*` is percent-encoded
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Reduces a client-supplied filename to `[A-Za-z0-9._-]` so it can travel in
/// headers and URLs. Accents are folded (`ação` -> `acao`), whitespace and any
/// other character become `_`.
pub fn header_safe_filename(input: Option<&str>) -> String {
    let Some(input) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return "file".to_string();
    };

    let mut out = String::with_capacity(input.len());
    let mut in_whitespace = false;
    for c in input.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }

    if collapsed == "_-" || collapsed == "-_" {
        collapsed.clear();
    }

    if collapsed.trim().is_empty() {
        "file".to_string()
    } else {
        collapsed
    }
}

/// `report.pdf` -> `report-compressed.pdf`
pub fn compressed_file_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return "compressed.pdf".to_string();
    }

    match name.rfind('.') {
        Some(idx) => format!("{}-compressed.pdf", &name[..idx]),
        None => format!("{}-compressed.pdf", name),
    }
}

/// `form-data` disposition carrying both an ASCII fallback and the UTF-8 name.
pub fn content_disposition(field: &str, fallback: &str, utf8_name: &str) -> String {
    let fallback = fallback.replace(['"', '\\', '\r', '\n'], "_");
    format!(
        "form-data; name=\"{}\"; filename=\"{}\"; filename*=UTF-8''{}",
        field,
        fallback,
        utf8_percent_encode(utf8_name, ATTR_CHAR)
    )
}
