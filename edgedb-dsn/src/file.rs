use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// A source of file contents and filesystem metadata, abstracted so that
/// project discovery and credential reads can be tested against maps.
pub trait FileAccess {
    fn read(&self, path: &Path) -> io::Result<String>;

    fn exists(&self, path: &Path) -> io::Result<bool> {
        match self.read(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    /// The filesystem device holding `path`, when the platform exposes one.
    /// `None` disables boundary detection for the path.
    fn device_id(&self, _path: &Path) -> io::Result<Option<u64>> {
        Ok(None)
    }

    fn cwd(&self) -> Option<PathBuf> {
        None
    }
}

pub struct SystemFileAccess;

impl FileAccess for SystemFileAccess {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(path.exists())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    #[cfg(unix)]
    fn device_id(&self, path: &Path) -> io::Result<Option<u64>> {
        use std::os::unix::fs::MetadataExt;
        Ok(Some(std::fs::metadata(path)?.dev()))
    }

    #[cfg(not(unix))]
    fn device_id(&self, _path: &Path) -> io::Result<Option<u64>> {
        Ok(None)
    }

    fn cwd(&self) -> Option<PathBuf> {
        std::env::current_dir().ok()
    }
}

impl<K, V> FileAccess for HashMap<K, V>
where
    K: std::hash::Hash + Eq + std::borrow::Borrow<Path>,
    V: std::borrow::Borrow<str>,
{
    fn read(&self, name: &Path) -> io::Result<String> {
        self.get(name)
            .map(|value| value.borrow().into())
            .ok_or(io::Error::new(io::ErrorKind::NotFound, "File not found"))
    }
}

impl FileAccess for () {
    fn read(&self, _path: &Path) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::NotFound, "File not found"))
    }
}
