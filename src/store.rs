use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::domain::{Environment, SourceDescriptor};
use crate::error::AnpError;

/// On-disk cache layout rooted at `~/.cache/anp-wells` by default.
#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, AnpError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("anp-wells")).ok()
            })
            .ok_or_else(|| AnpError::Filesystem("unable to resolve cache directory".to_string()))?;

        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn raw_file_path(&self, descriptor: &SourceDescriptor) -> Utf8PathBuf {
        self.cache_root
            .join("raw")
            .join(descriptor.environment.as_str())
            .join(&descriptor.year)
            .join(descriptor.file_name())
    }

    pub fn field_index_path(&self, environment: Environment) -> Utf8PathBuf {
        self.cache_root
            .join("index")
            .join(format!("fields-{environment}.txt"))
    }

    pub fn dataset_path(&self) -> Utf8PathBuf {
        self.cache_root.join("dataset").join("production.parquet")
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>, AnpError> {
        fs::read(path.as_std_path())
            .map_err(|err| AnpError::Filesystem(format!("read {path}: {err}")))
    }

    /// Removes every cached artifact (raw files, field indexes, dataset).
    pub fn clear(&self) -> Result<bool, AnpError> {
        if !self.cache_root.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_dir_all(self.cache_root.as_std_path())
            .map_err(|err| AnpError::Filesystem(err.to_string()))?;
        Ok(true)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), AnpError> {
        Self::write_atomic(path, |file| {
            use std::io::Write;
            file.write_all(content)
                .map_err(|err| AnpError::Filesystem(err.to_string()))
        })
    }

    /// Writes through a temp file in the destination directory, then renames over `path`.
    pub fn write_atomic<F>(path: &Utf8Path, write: F) -> Result<(), AnpError>
    where
        F: FnOnce(&mut fs::File) -> Result<(), AnpError>,
    {
        let parent = path
            .parent()
            .ok_or_else(|| AnpError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| AnpError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("anp-wells")
            .suffix(".tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| AnpError::Filesystem(err.to_string()))?;
        write(temp.as_file_mut())?;
        temp.as_file()
            .sync_all()
            .map_err(|err| AnpError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| AnpError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_root(Utf8PathBuf::from("/tmp/anp-cache"));
        let descriptor = SourceDescriptor {
            year: "2024".to_string(),
            environment: Environment::Offshore,
            url: "https://example.org/producao-mar-2024.csv".to_string(),
        };

        assert!(
            store
                .raw_file_path(&descriptor)
                .ends_with("raw/offshore/2024/producao-mar-2024-d330fd6a.csv")
        );
        assert!(
            store
                .field_index_path(Environment::Onshore)
                .ends_with("index/fields-onshore.txt")
        );
        assert!(store.dataset_path().ends_with("dataset/production.parquet"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("file.txt");

        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(Store::read_bytes(&path).unwrap(), b"second");
    }
}
