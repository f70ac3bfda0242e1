use std::fs;
use std::path::Path;
use tracing::warn;

/// Reads a LaTeX source file as text.
///
/// UTF-8 is tried first; files that are not valid UTF-8 are decoded as Latin-1, which
/// maps every byte to a character and so never fails. A leading byte-order mark is
/// dropped.
pub fn read_document(path: &Path) -> crate::Result<String> {
    let bytes = fs::read(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    Ok(decode(bytes, path))
}

fn decode(bytes: Vec<u8>, path: &Path) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!("{} is not valid UTF-8, decoding as Latin-1", path.display());
            err.into_bytes().into_iter().map(char::from).collect()
        }
    };

    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_utf8_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\\chapter{{Théorie}}\nÉquations de Navier-Stokes.").unwrap();

        let text = read_document(file.path()).unwrap();
        assert!(text.starts_with("\\chapter{Théorie}"));
    }

    #[test]
    fn falls_back_to_latin1() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // "Théorie" in ISO-8859-1
        file.write_all(b"\\chapter{Th\xe9orie}").unwrap();

        let text = read_document(file.path()).unwrap();
        assert_eq!(text, "\\chapter{Théorie}");
    }

    #[test]
    fn strips_byte_order_mark() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\xef\xbb\xbf\\section{A}").unwrap();

        assert_eq!(read_document(file.path()).unwrap(), "\\section{A}");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_document(&dir.path().join("absent.tex")).unwrap_err();
        assert!(err.to_string().contains("absent.tex"));
    }
}
