use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha1::{Digest, Sha1};

use crate::context::BuildContext;
use crate::error::ParseError;
use crate::file::FileAccess;
use crate::instance_name::InstanceName;

/// The project manifest filename searched for in the working directory and
/// its parents.
pub const PROJECT_FILE: &str = "edgedb.toml";

/// The stash contents of an initialized project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub instance_name: InstanceName,
    pub cloud_profile: Option<String>,
    pub database: Option<String>,
    pub branch: Option<String>,
}

/// Walks from `base` upward looking for the project manifest. The walk
/// stops without a match when stepping to the parent would cross onto a
/// different filesystem device.
pub fn search_directory(
    context: &impl BuildContext,
    base: &Path,
) -> io::Result<Option<PathBuf>> {
    let mut path = base.to_path_buf();
    loop {
        let manifest = path.join(PROJECT_FILE);
        if context.files().exists(&manifest)? {
            return Ok(Some(path));
        }
        let Some(parent) = path.parent() else {
            break;
        };
        if parent == path {
            break;
        }
        let current_dev = context.files().device_id(&path)?;
        let parent_dev = context.files().device_id(parent)?;
        if let (Some(current), Some(parent_dev)) = (current_dev, parent_dev) {
            if current != parent_dev {
                break;
            }
        }
        path = parent.to_path_buf();
    }
    Ok(None)
}

/// Computes the SHA-1 hash of a path's canonical representation.
fn hash_path(path: &Path) -> String {
    let mut hasher = Sha1::new();
    hasher.update(path.as_os_str().as_encoded_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generates the stash directory name for a project directory, e.g.
/// `myproj-<sha1 of the canonical path>`.
fn stash_name(path: &Path) -> OsString {
    let hash = hash_path(path);
    let base = path.file_name().unwrap_or(OsStr::new(""));
    let mut name = base.to_os_string();
    name.push("-");
    name.push(hash);
    name
}

/// The per-project stash directory under the platform config root.
pub fn stash_path(
    context: &impl BuildContext,
    project_dir: &Path,
) -> Result<PathBuf, ParseError> {
    let canonical = context
        .files()
        .canonicalize(project_dir)
        .unwrap_or(project_dir.to_path_buf());
    let config_dir = context.config_dir().ok_or(ParseError::ProjectNotInitialised)?;
    Ok(config_dir.join("projects").join(stash_name(&canonical)))
}

impl Project {
    /// Reads the stash files of a discovered project. A missing
    /// `instance-name` means the project was never initialized.
    pub fn load(
        context: &impl BuildContext,
        stash_path: &Path,
    ) -> Result<Project, ParseError> {
        let instance_name = read_stash_file(context, &stash_path.join("instance-name"))
            .ok_or(ParseError::ProjectNotInitialised)?;
        let instance_name = InstanceName::from_str(&instance_name)?;
        let cloud_profile = read_stash_file(context, &stash_path.join("cloud-profile"));
        let database = read_stash_file(context, &stash_path.join("database"));
        let branch = read_stash_file(context, &stash_path.join("branch"));
        Ok(Project {
            instance_name,
            cloud_profile,
            database,
            branch,
        })
    }
}

fn read_stash_file(context: &impl BuildContext, path: &Path) -> Option<String> {
    context
        .files()
        .read(path)
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use std::collections::HashMap;

    #[test]
    fn stash_name_is_stable() {
        assert_eq!(
            stash_name(Path::new("/home/edgedb/test")).to_string_lossy(),
            "test-cf3c86df8fc33fbb73a47671ac5762eda8219158",
        );
    }

    #[test]
    fn finds_manifest_in_parent() {
        let files = HashMap::from([
            (PathBuf::from("/home/edgedb/test/edgedb.toml"), ""),
        ]);
        let context = TestContext::new((), files);
        let found = search_directory(&context, Path::new("/home/edgedb/test/src/deep")).unwrap();
        assert_eq!(found, Some(PathBuf::from("/home/edgedb/test")));
    }

    #[test]
    fn stops_at_device_boundary() {
        // the manifest exists above the mount point and must not be found
        let files = HashMap::from([(PathBuf::from("/edgedb.toml"), "")]);
        let devices = HashMap::from([
            (PathBuf::from("/mnt/vol/work"), 2),
            (PathBuf::from("/mnt/vol"), 2),
            (PathBuf::from("/mnt"), 1),
            (PathBuf::from("/"), 1),
        ]);
        let context = TestContext::new((), files).with_devices(devices);
        let found = search_directory(&context, Path::new("/mnt/vol/work")).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn project_load_requires_instance_name() {
        let stash = PathBuf::from(
            "/cfg/projects/test-cf3c86df8fc33fbb73a47671ac5762eda8219158",
        );
        let files = HashMap::from([
            (stash.join("instance-name"), "my_instance\n"),
            (stash.join("database"), "main"),
        ]);
        let context = TestContext::new((), files);
        let project = Project::load(&context, &stash).unwrap();
        assert_eq!(
            project.instance_name,
            InstanceName::Local("my_instance".into())
        );
        assert_eq!(project.database.as_deref(), Some("main"));
        assert_eq!(project.branch, None);

        let empty = TestContext::new((), HashMap::<PathBuf, &str>::new());
        assert_eq!(
            Project::load(&empty, &stash).unwrap_err(),
            ParseError::ProjectNotInitialised
        );
    }
}
