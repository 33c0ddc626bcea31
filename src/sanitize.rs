//! Filename sanitization.
//!
//! Client-supplied filenames become the storage key for the raw upload, the
//! metadata row, the index status and the index directory. Every path that
//! accepts a filename runs it through [`sanitize_filename`] first so the same
//! logical name always resolves to the same key.

/// Replace every character outside `[a-zA-Z0-9.-]` with `_`.
///
/// The mapping is per Unicode scalar value, so a multi-byte character turns
/// into exactly one `_`. The function is total and idempotent.
///
/// ```rust
/// use pdf_query::sanitize::sanitize_filename;
///
/// assert_eq!(sanitize_filename("my report (v2).pdf"), "my_report__v2_.pdf");
/// assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
/// ```
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Case-insensitive check for a `.pdf` suffix.
pub fn has_pdf_extension(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}
