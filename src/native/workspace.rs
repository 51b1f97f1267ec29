use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::core::domain::Language;

const INPUT_EXTENSION: &str = "input";
const EXECUTABLE_EXTENSION: &str = "out";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("scratch root {path} is unusable: {source}")]
    ScratchRoot { path: PathBuf, source: io::Error },
    #[error("failed to write {artifact} file: {source}")]
    Write {
        artifact: &'static str,
        source: io::Error,
    },
}

/// Hands out collision-free workspaces under a single scratch root.
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|source| WorkspaceError::ScratchRoot {
            path: root.to_path_buf(),
            source,
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a fresh identity. Nothing but the scratch root itself is
    /// created until content is written.
    pub async fn allocate(&self, language: Language) -> Result<Workspace, WorkspaceError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::ScratchRoot {
                path: self.root.clone(),
                source,
            })?;

        let id = Uuid::new_v4();
        let artifact = |extension: &str| self.root.join(format!("{}.{}", id, extension));

        let workspace = Workspace {
            id,
            dir: self.root.clone(),
            source: artifact(language.source_extension()),
            input: artifact(INPUT_EXTENSION),
            executable: artifact(EXECUTABLE_EXTENSION),
            released: false,
        };
        tracing::debug!("Allocated workspace {}", workspace.id);

        Ok(workspace)
    }
}

/// Source, input and executable files of one submission, all named after
/// the same random token.
///
/// `release` removes them; a workspace dropped without being released
/// removes them synchronously in `Drop`.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    source: PathBuf,
    input: PathBuf,
    executable: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub async fn write_source(&self, code: &str) -> Result<(), WorkspaceError> {
        fs::write(&self.source, code)
            .await
            .map_err(|source| WorkspaceError::Write {
                artifact: "source",
                source,
            })
    }

    pub async fn write_input(&self, stdin: &str) -> Result<(), WorkspaceError> {
        fs::write(&self.input, stdin)
            .await
            .map_err(|source| WorkspaceError::Write {
                artifact: "input",
                source,
            })
    }

    /// Replaces artifact paths in toolchain or program output with neutral
    /// names, so nothing about the host filesystem reaches the caller.
    pub fn redact(&self, text: &str) -> String {
        let extension = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let replacements = [
            (&self.source, format!("solution.{}", extension)),
            (&self.input, "input".to_string()),
            (&self.executable, "solution".to_string()),
        ];

        let mut redacted = text.to_string();
        for (path, name) in replacements {
            redacted = redacted.replace(&*path.to_string_lossy(), &name);
        }
        redacted.replace(&*self.dir.to_string_lossy(), ".")
    }

    fn artifacts(&self) -> [&Path; 3] {
        [&self.source, &self.input, &self.executable]
    }

    /// Removes every artifact of this workspace. Missing files are expected
    /// (a failed compile leaves no executable); other errors are logged and
    /// swallowed. Calling it again is a no-op.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }

        for path in self.artifacts() {
            if let Err(e) = fs::remove_file(path).await {
                log_removal_error(self.id, path, e);
            }
        }
        self.released = true;
        tracing::debug!("Released workspace {}", self.id);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        tracing::warn!("Workspace {} dropped without release", self.id);
        for path in self.artifacts() {
            if let Err(e) = std::fs::remove_file(path) {
                log_removal_error(self.id, path, e);
            }
        }
    }
}

fn log_removal_error(id: Uuid, path: &Path, e: io::Error) {
    if e.kind() != io::ErrorKind::NotFound {
        tracing::warn!(
            "Failed to remove {} of workspace {}: {}",
            path.display(),
            id,
            e
        );
    }
}
