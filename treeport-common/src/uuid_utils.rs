//! UUID utilities
//!
//! Identifiers are stored as hyphenated lowercase text. Values coming from
//! content (blob references, serialized files) often use the braced upper-case
//! form, e.g. `{B1E16562-F3F9-4DDD-84CA-6E099950ECC0}`.

use uuid::Uuid;

/// Length of a braced hyphenated identifier: `{` + 36 + `}`
pub const BRACED_ID_LEN: usize = 38;

/// Parse UUID from string (braced, hyphenated or simple form)
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s.trim())
}

/// Render an identifier the way the store keeps it
pub fn to_db(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

/// Render an identifier in braced upper-case form
pub fn braced(id: &Uuid) -> String {
    format!("{{{}}}", id.hyphenated().to_string().to_uppercase())
}

/// Try to read a blob reference from the start of a field value.
///
/// Blob-typed fields keep the blob identifier as the leading 38 characters of
/// the value. Anything that does not parse yields `None`.
pub fn parse_blob_reference(value: &str) -> Option<Uuid> {
    let candidate = match value.char_indices().nth(BRACED_ID_LEN) {
        Some((end, _)) => &value[..end],
        None => value,
    };

    Uuid::parse_str(candidate).ok()
}
