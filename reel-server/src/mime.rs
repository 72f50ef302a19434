//! Media-type normalization and filename helpers.

/// Legacy media types recorded by old publishing clients, normalized to what
/// browsers actually play.
const PATCHED_MEDIA_TYPES: &[(&str, &str)] = &[
    ("audio/m4a", "audio/mp4"),
    ("audio/mp3", "audio/mpeg"),
    ("audio/mpeg3", "audio/mpeg"),
    ("video/m4v", "video/mp4"),
    ("video/quicktime", "video/mp4"),
];

/// Extensions for the media types we commonly serve, used when the claim
/// carries no file name.
const EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mp4", "m4a"),
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("application/pdf", "pdf"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("text/markdown", "md"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
];

/// Normalize a claim's media type for the `Content-Type` header.
pub fn patch_media_type(media_type: &str) -> String {
    if media_type.is_empty() {
        return "application/octet-stream".to_string();
    }
    for (legacy, patched) in PATCHED_MEDIA_TYPES {
        if media_type.eq_ignore_ascii_case(legacy) {
            return (*patched).to_string();
        }
    }
    media_type.to_string()
}

/// Look up a file extension for a media type.
pub fn extension_by_type(media_type: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(mt, _)| media_type.eq_ignore_ascii_case(mt))
        .map(|(_, ext)| *ext)
}

/// Strip every character outside letters, digits, `-`, `.`, `_` and space
/// from a filename destined for a `Content-Disposition` header.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ' '))
        .collect()
}

/// Percent-encode a filename for the RFC 5987 `filename*` parameter:
/// everything outside the unreserved set is encoded as UTF-8 octets.
pub fn percent_encode_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
