//! Byte-buffer file reader used for shader blobs.

use std::path::Path;

use crate::error::{Error, Result};

/// Read an entire file into memory.
///
/// Returns [`Error::FileNotFound`] if the path cannot be opened or read.
pub fn read_file_to_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_existing_file() {
        let path = std::env::temp_dir().join(format!("triangle-fileio-{}.bin", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(&[0x03, 0x02, 0x23, 0x07]).unwrap();
        }

        let bytes = read_file_to_bytes(&path).unwrap();
        assert_eq!(bytes, vec![0x03, 0x02, 0x23, 0x07]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_reports_path() {
        let result = read_file_to_bytes("does/not/exist/vert.spv");
        match result {
            Err(Error::FileNotFound { path, .. }) => {
                assert_eq!(path, Path::new("does/not/exist/vert.spv"));
            }
            other => panic!("expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_message() {
        let err = read_file_to_bytes("missing.spv").unwrap_err();
        assert!(err.to_string().starts_with("Failed to open file missing.spv"));
    }
}
