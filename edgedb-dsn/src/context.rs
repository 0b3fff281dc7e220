use std::path::PathBuf;

use crate::env::{EnvVar, SystemEnvVars};
use crate::file::{FileAccess, SystemFileAccess};

/// Everything resolution needs from the outside world, bundled so tests can
/// swap in maps for the environment and the filesystem.
pub(crate) trait BuildContext {
    fn env(&self) -> &impl EnvVar;
    fn files(&self) -> &impl FileAccess;
    /// The platform config root holding `credentials/`, `projects/` and
    /// `cloud-credentials/`.
    fn config_dir(&self) -> Option<PathBuf>;
    fn cwd(&self) -> Option<PathBuf>;
}

pub(crate) struct SystemContext;

fn system_config_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_local_dir().map(|dir| dir.join("EdgeDB").join("config"))
    } else {
        dirs::config_dir().map(|dir| dir.join("edgedb"))
    }
}

impl BuildContext for SystemContext {
    fn env(&self) -> &impl EnvVar {
        &SystemEnvVars
    }
    fn files(&self) -> &impl FileAccess {
        &SystemFileAccess
    }
    fn config_dir(&self) -> Option<PathBuf> {
        system_config_dir()
    }
    fn cwd(&self) -> Option<PathBuf> {
        SystemFileAccess.cwd()
    }
}

#[cfg(test)]
pub(crate) use test_context::TestContext;

#[cfg(test)]
mod test_context {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::path::Path;

    pub(crate) struct DeviceFs<F> {
        inner: F,
        devices: HashMap<PathBuf, u64>,
    }

    impl<F: FileAccess> FileAccess for DeviceFs<F> {
        fn read(&self, path: &Path) -> io::Result<String> {
            self.inner.read(path)
        }
        fn exists(&self, path: &Path) -> io::Result<bool> {
            self.inner.exists(path)
        }
        fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
            self.inner.canonicalize(path)
        }
        fn device_id(&self, path: &Path) -> io::Result<Option<u64>> {
            Ok(self.devices.get(path).copied())
        }
    }

    pub(crate) struct TestContext<E, F> {
        env: E,
        files: DeviceFs<F>,
        config_dir: Option<PathBuf>,
        cwd: Option<PathBuf>,
    }

    impl<E: EnvVar, F: FileAccess> TestContext<E, F> {
        pub(crate) fn new(env: E, files: F) -> TestContext<E, F> {
            TestContext {
                env,
                files: DeviceFs {
                    inner: files,
                    devices: HashMap::new(),
                },
                config_dir: Some(PathBuf::from("/cfg")),
                cwd: None,
            }
        }

        pub(crate) fn with_devices(mut self, devices: HashMap<PathBuf, u64>) -> Self {
            self.files.devices = devices;
            self
        }

        pub(crate) fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
            self.cwd = Some(cwd.into());
            self
        }
    }

    impl<E: EnvVar, F: FileAccess> BuildContext for TestContext<E, F> {
        fn env(&self) -> &impl EnvVar {
            &self.env
        }
        fn files(&self) -> &impl FileAccess {
            &self.files
        }
        fn config_dir(&self) -> Option<PathBuf> {
            self.config_dir.clone()
        }
        fn cwd(&self) -> Option<PathBuf> {
            self.cwd.clone()
        }
    }
}
