//! Streaming SHA-256 content digests.

use crate::utils::errors::FileError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Read buffer size used while hashing
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 digest of a file.
///
/// The content is streamed through the hasher, so memory use does not grow
/// with file size. Open and mid-stream read failures are both reported as
/// [`FileError`]; no retry is attempted.
pub fn hash_file(path: &Path) -> Result<String, FileError> {
    let file = File::open(path).map_err(|e| FileError::from_io(path, e))?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);

    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| FileError::from_io(path, e))?;

    Ok(hex::encode(hasher.finalize()))
}
