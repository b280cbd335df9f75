//! Remote path policy for file transfers
//!
//! Downloads are authorized purely by path prefix. Uploads always land in a
//! fixed staging directory, under a filename that must be a single path
//! component. Paths are embedded in remote shell commands using POSIX
//! single-quote escaping.

use crate::error::TransferError;

/// Prefixes a download path must start with
pub const ALLOWED_DOWNLOAD_PREFIXES: &[&str] = &["/home/", "/opt/", "/tmp/"];

/// Directory uploads are written to
pub const UPLOAD_STAGING_DIR: &str = "/tmp/";

/// Check a download path against the allow-list.
///
/// Must be called before any remote activity for the request.
pub fn authorize_download(path: &str) -> Result<(), TransferError> {
    if ALLOWED_DOWNLOAD_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        Ok(())
    } else {
        Err(TransferError::AccessDenied {
            path: path.to_string(),
        })
    }
}

/// Staging path for an uploaded file.
///
/// Rejects names that are empty, `.`/`..`, or contain `/` or NUL, so the
/// result is always a direct child of [`UPLOAD_STAGING_DIR`].
pub fn staging_path(filename: &str) -> Result<String, TransferError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\0');

    if invalid {
        return Err(TransferError::InvalidFileName(filename.to_string()));
    }

    Ok(format!("{}{}", UPLOAD_STAGING_DIR, filename))
}

/// Quote a string for safe interpretation by a POSIX shell
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Remote command writing its standard input to `path`
pub fn upload_command(path: &str) -> String {
    format!("cat > {}", shell_quote(path))
}

/// Remote command writing the contents of `path` to standard output
pub fn download_command(path: &str) -> String {
    format!("cat {}", shell_quote(path))
}

/// Base name of a remote path, made safe for a quoted header value
pub fn download_file_name(path: &str) -> String {
    let name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let name: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    if name.is_empty() {
        "download".to_string()
    } else {
        name
    }
}
