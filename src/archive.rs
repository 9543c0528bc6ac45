use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::AnpError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Returns the first `.csv` member of a zip archive.
pub fn extract_csv(bytes: &[u8]) -> Result<Vec<u8>, AnpError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| AnpError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| AnpError::Archive(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let is_csv = entry
            .enclosed_name()
            .and_then(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .unwrap_or(false);
        if !is_csv {
            continue;
        }
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|err| AnpError::Archive(err.to_string()))?;
        return Ok(content);
    }

    Err(AnpError::Archive("archive has no CSV member".to_string()))
}

/// Passes plain files through and unwraps zip archives.
pub fn unwrap_source(bytes: Vec<u8>) -> Result<Vec<u8>, AnpError> {
    if is_zip(&bytes) {
        extract_csv(&bytes)
    } else {
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_first_csv_member() {
        let bytes = build_zip(&[("LEIAME.txt", b"readme"), ("dados/2019.csv", b"a,b\n1,2\n")]);
        assert!(is_zip(&bytes));
        assert_eq!(extract_csv(&bytes).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn archive_without_csv_is_an_error() {
        let bytes = build_zip(&[("LEIAME.txt", b"readme")]);
        assert_matches!(extract_csv(&bytes), Err(AnpError::Archive(_)));
    }

    #[test]
    fn plain_bytes_pass_through() {
        let bytes = b"Campo,Poco\n".to_vec();
        assert_eq!(unwrap_source(bytes.clone()).unwrap(), bytes);
    }
}
