//! Field and attachment validation.
//!
//! Validation never panics and never blocks an update by itself: the façade
//! stores the error map alongside the document so both input channels can
//! show the same field-scoped messages.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::schema::AccidentReportForm;

/// MIME types accepted for uploaded attachments.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    // Images
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

/// Maximum decoded attachment size: 10 MiB.
pub const MAX_ATTACHMENT_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Validate PESEL format and checksum. Returns the error message on failure.
pub fn validate_pesel(pesel: &str) -> std::result::Result<(), String> {
    if pesel.is_empty() {
        return Err("PESEL is required".to_string());
    }
    if pesel.len() != 11 || !pesel.chars().all(|c| c.is_ascii_digit()) {
        return Err("PESEL must be exactly 11 digits".to_string());
    }

    let digits: Vec<u32> = pesel.chars().filter_map(|c| c.to_digit(10)).collect();
    const WEIGHTS: [u32; 10] = [1, 3, 7, 9, 1, 3, 7, 9, 1, 3];
    let mut checksum: u32 = digits
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum::<u32>()
        % 10;
    if checksum != 0 {
        checksum = 10 - checksum;
    }
    if checksum != digits[10] {
        return Err("PESEL checksum is invalid".to_string());
    }

    Ok(())
}

/// Validate a form document, returning field-scoped error messages keyed by
/// dotted path. An empty map means the form is complete.
pub fn validate_form(form: &AccidentReportForm) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();

    if !form.poszkodowany.pesel.is_empty() {
        if let Err(msg) = validate_pesel(&form.poszkodowany.pesel) {
            errors.insert("poszkodowany.pesel".to_string(), msg);
        }
    }

    let required: [(&str, &str); 5] = [
        ("poszkodowany.imie", &form.poszkodowany.imie),
        ("poszkodowany.nazwisko", &form.poszkodowany.nazwisko),
        ("poszkodowany.pesel", &form.poszkodowany.pesel),
        ("szczegoly.data", &form.szczegoly.data),
        ("szczegoly.miejsce", &form.szczegoly.miejsce),
    ];
    for (path, value) in required {
        if value.trim().is_empty() && !errors.contains_key(path) {
            errors.insert(path.to_string(), "To pole jest wymagane".to_string());
        }
    }

    errors
}

/// Whether the form has all required fields filled.
pub fn is_form_complete(form: &AccidentReportForm) -> bool {
    validate_form(form).is_empty()
}

/// Check a MIME type against the whitelist.
pub fn validate_mime_type(mime_type: &str) -> std::result::Result<(), String> {
    if ALLOWED_MIME_TYPES.contains(&mime_type) {
        Ok(())
    } else {
        Err(format!(
            "MIME type '{}' is not allowed. Allowed types: {}",
            mime_type,
            ALLOWED_MIME_TYPES.join(", ")
        ))
    }
}

/// Decode a base64 attachment payload and enforce the size limit.
/// Returns the decoded bytes.
pub fn decode_attachment(data_base64: &str) -> std::result::Result<Vec<u8>, String> {
    let bytes = BASE64
        .decode(data_base64)
        .map_err(|e| format!("Invalid base64 data: {}", e))?;
    if bytes.len() > MAX_ATTACHMENT_SIZE_BYTES {
        return Err(format!(
            "Attachment size ({} bytes) exceeds maximum allowed size ({} bytes)",
            bytes.len(),
            MAX_ATTACHMENT_SIZE_BYTES
        ));
    }
    Ok(bytes)
}
