//! Upload validation: only PDF files enter the pipeline.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const PDF_MAGIC: &[u8] = b"%PDF-";
const HEADER_LEN: usize = PDF_MAGIC.len() + 3; // "%PDF-1.7"

/// Check that a file on disk is a PDF and return its header version.
///
/// ```no_run
/// let version = doccheck::detect::validate_upload("report.pdf").unwrap();
/// assert!(version.starts_with('1') || version.starts_with('2'));
/// ```
pub fn validate_upload<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut header = [0u8; HEADER_LEN];
    let mut file = File::open(path)?;
    file.read_exact(&mut header).map_err(|_| Error::UnknownFormat)?;
    validate_upload_bytes(&header)
}

/// Check that a byte buffer starts with a PDF header and return its version.
pub fn validate_upload_bytes(data: &[u8]) -> Result<String> {
    if data.len() < HEADER_LEN || !data.starts_with(PDF_MAGIC) {
        return Err(Error::UnknownFormat);
    }

    let version = &data[PDF_MAGIC.len()..HEADER_LEN];
    match version {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok(String::from_utf8_lossy(version).into_owned())
        }
        _ => Err(Error::UnsupportedVersion(
            String::from_utf8_lossy(version).into_owned(),
        )),
    }
}

/// Whether the bytes look like a PDF upload.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    validate_upload_bytes(data).is_ok()
}
