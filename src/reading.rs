use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ReadError {
    NotFound(PathBuf),
    Io(PathBuf, std::io::Error),
    Encoding(PathBuf, std::string::FromUtf8Error),
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::NotFound(path) => {
                write!(f, "Clippings file not found: {}", path.display())
            }
            ReadError::Io(path, e) => {
                write!(f, "Failed to read {}: {}", path.display(), e)
            }
            ReadError::Encoding(path, e) => {
                write!(f, "{} is not valid UTF-8: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::NotFound(_) => None,
            ReadError::Io(_, e) => Some(e),
            ReadError::Encoding(_, e) => Some(e),
        }
    }
}

/// Reads the export as UTF-8, dropping the byte-order marks Kindle
/// firmware writes in front of the file and of some titles.
pub fn read_clippings(path: &Path) -> Result<String, ReadError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ReadError::NotFound(path.to_path_buf()),
        _ => ReadError::Io(path.to_path_buf(), e),
    })?;

    let text = String::from_utf8(bytes).map_err(|e| ReadError::Encoding(path.to_path_buf(), e))?;

    log::info!("Read {} bytes from {}", text.len(), path.display());

    Ok(text.replace('\u{feff}', ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_strips_bom() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all("\u{feff}Dune (Frank Herbert)\n\u{feff}rest".as_bytes())
            .unwrap();

        let text = read_clippings(file.path()).unwrap();

        assert_eq!(text, "Dune (Frank Herbert)\nrest");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My Clippings.txt");

        let result = read_clippings(&path);

        assert!(matches!(result, Err(ReadError::NotFound(_))));
    }

    #[test]
    fn test_read_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x44, 0x75, 0xff, 0xfe, 0x6e]).unwrap();

        let result = read_clippings(file.path());

        assert!(matches!(result, Err(ReadError::Encoding(_, _))));
    }

    #[test]
    fn test_read_empty_file_is_ok() {
        let file = NamedTempFile::new().unwrap();

        assert_eq!(read_clippings(file.path()).unwrap(), "");
    }
}
