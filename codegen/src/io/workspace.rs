//! Per-run project directories for persisted artifacts.
//!
//! Layout: `<root>/codegen/projects/<name>[_<timestamp>]/{src,tests,docs,config}`.
//! Every write goes through [`WorkspaceManager::safe_path`], which keeps the
//! final path inside the project directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::naming::{derive_project_name, sanitize_file_name, sanitize_project_name};
use crate::io::config::GeneratorConfig;

const PROJECTS_DIR: [&str; 2] = ["codegen", "projects"];
const SUBFOLDERS: [&str; 4] = ["src", "tests", "docs", "config"];

/// Workspace options taken from the generator config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub root: PathBuf,
    pub timestamp_folders: bool,
    pub project_subfolders: bool,
}

impl WorkspaceSettings {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            root: config.workspace_root.clone(),
            timestamp_folders: config.timestamp_folders,
            project_subfolders: config.project_subfolders,
        }
    }
}

/// A created project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    /// Sanitized project name (no timestamp).
    pub name: String,
    /// Absolute, normalized project directory.
    pub root_path: PathBuf,
    pub initialized: bool,
}

/// Creates project directories and resolves paths inside them.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    settings: WorkspaceSettings,
}

impl WorkspaceManager {
    pub fn new(settings: WorkspaceSettings) -> Self {
        Self { settings }
    }

    /// Create the project directory for this run.
    ///
    /// The name comes from `hint` when it sanitizes to something non-empty,
    /// otherwise from the leading keywords of `prompt`.
    pub fn initialize(&self, hint: Option<&str>, prompt: &str) -> Result<ProjectHandle> {
        let name = match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => sanitize_project_name(hint),
            None => derive_project_name(prompt),
        };
        let folder = if self.settings.timestamp_folders {
            format!("{name}_{}", Utc::now().format("%Y%m%d_%H%M%S"))
        } else {
            name.clone()
        };

        let mut root_path = absolute(&self.settings.root)?;
        for part in PROJECTS_DIR {
            root_path.push(part);
        }
        root_path.push(&folder);

        fs::create_dir_all(&root_path)
            .with_context(|| format!("create project dir {}", root_path.display()))?;
        if self.settings.project_subfolders {
            for sub in SUBFOLDERS {
                let dir = root_path.join(sub);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("create project subfolder {}", dir.display()))?;
            }
        }
        info!(project = %name, path = %root_path.display(), "project workspace created");
        Ok(ProjectHandle {
            name,
            root_path,
            initialized: true,
        })
    }

    /// Resolve `filename` (optionally inside `subfolder`) under the project.
    ///
    /// Both parts are sanitized first. If the result would still land outside
    /// the project directory, the bare sanitized file name under the project
    /// root is returned instead. Subfolders are ignored when the project was
    /// created without them.
    pub fn safe_path(
        &self,
        handle: &ProjectHandle,
        filename: &str,
        subfolder: Option<&str>,
    ) -> PathBuf {
        let safe_name = sanitize_file_name(filename);
        let mut candidate = handle.root_path.clone();
        if self.settings.project_subfolders
            && let Some(sub) = subfolder.filter(|s| !s.is_empty())
        {
            candidate.push(sanitize_file_name(sub));
        }
        candidate.push(&safe_name);

        let normalized = normalize(&candidate);
        if normalized.starts_with(&handle.root_path) && normalized != handle.root_path {
            normalized
        } else {
            warn!(
                requested = filename,
                "path escapes project directory, falling back to project root"
            );
            handle.root_path.join(safe_name)
        }
    }

    /// Write `content` to `path`, creating parent directories.
    pub fn write(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "wrote workspace file");
        Ok(())
    }

    /// Remove the whole project directory.
    pub fn cleanup(&self, handle: &ProjectHandle) -> Result<()> {
        if handle.root_path.exists() {
            fs::remove_dir_all(&handle.root_path)
                .with_context(|| format!("remove project dir {}", handle.root_path.display()))?;
            info!(path = %handle.root_path.display(), "project workspace removed");
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("resolve workspace root {}", path.display()))?;
    Ok(normalize(&abs))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(root: &Path, timestamp: bool, subfolders: bool) -> WorkspaceManager {
        WorkspaceManager::new(WorkspaceSettings {
            root: root.to_path_buf(),
            timestamp_folders: timestamp,
            project_subfolders: subfolders,
        })
    }

    #[test]
    fn initialize_creates_layout_from_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = manager(temp.path(), false, true);
        let handle = ws
            .initialize(None, "Create a CSV parser with validation")
            .expect("init");
        assert_eq!(handle.name, "csv_parser");
        assert!(handle.initialized);
        assert!(handle.root_path.ends_with("codegen/projects/csv_parser"));
        for sub in SUBFOLDERS {
            assert!(handle.root_path.join(sub).is_dir(), "missing {sub}");
        }
    }

    #[test]
    fn initialize_uses_hint_and_timestamp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = manager(temp.path(), true, false);
        let handle = ws.initialize(Some("my app"), "ignored").expect("init");
        assert_eq!(handle.name, "my_app");
        let folder = handle
            .root_path
            .file_name()
            .and_then(|f| f.to_str())
            .expect("folder name");
        assert!(folder.starts_with("my_app_"));
        assert_eq!(folder.len(), "my_app_".len() + "20240101_120000".len());
        assert!(!handle.root_path.join("src").exists());
    }

    #[test]
    fn safe_path_stays_inside_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = manager(temp.path(), false, true);
        let handle = ws.initialize(Some("proj"), "").expect("init");

        let normal = ws.safe_path(&handle, "main.py", Some("src"));
        assert_eq!(normal, handle.root_path.join("src").join("main.py"));

        let traversal = ws.safe_path(&handle, "../../etc/passwd", None);
        assert!(traversal.starts_with(&handle.root_path));
        assert_eq!(traversal, handle.root_path.join(".._.._etc_passwd"));

        let dots = ws.safe_path(&handle, "..", Some(".."));
        assert!(dots.starts_with(&handle.root_path));
        assert_ne!(dots, handle.root_path);
    }

    #[test]
    fn safe_path_flattens_without_subfolders() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = manager(temp.path(), false, false);
        let handle = ws.initialize(Some("flat"), "").expect("init");
        assert_eq!(
            ws.safe_path(&handle, "README.md", Some("docs")),
            handle.root_path.join("README.md")
        );
    }

    #[test]
    fn write_then_cleanup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = manager(temp.path(), false, true);
        let handle = ws.initialize(Some("gone"), "").expect("init");
        let path = ws.safe_path(&handle, "notes.txt", Some("docs"));
        ws.write(&path, "hello").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "hello");

        ws.cleanup(&handle).expect("cleanup");
        assert!(!handle.root_path.exists());
    }

    #[test]
    fn normalize_resolves_parent_components() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
