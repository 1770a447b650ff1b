//! Local file resolution.
//!
//! Only local files are handled: a plain absolute path or a `file:///` URL.
//! Anything needing a transfer is refused. Paths are raw bytes, like the
//! strings they arrive in.

const FILE_SCHEME: &[u8] = b"file://";

/// Local path named by `file`, if it names one
pub fn local_path(file: &[u8]) -> Option<&[u8]> {
    if file.starts_with(b"/") {
        return Some(file);
    }
    file.strip_prefix(FILE_SCHEME)
        .filter(|path| path.starts_with(b"/"))
}

/// Whether uploading `local` to `file` is a no-op (both name the same path)
pub fn is_same_file(local: &[u8], file: &[u8]) -> bool {
    local_path(file) == Some(local)
}
