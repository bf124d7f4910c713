//! Registry of every file handed out by a workflow.
//!
//! All mutation goes through a single `parking_lot::Mutex`, so concurrent
//! chains sharing one workflow never race on sequence numbers or state.

use gisflow_shared::errors::{GisflowError, GisflowResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Lifecycle state of a workflow context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, workspace not yet created.
    Idle,
    /// Accepting acquisitions.
    Active,
    /// Purged. Terminal.
    Closed,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

/// One registered location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub seq: u64,
    pub path: PathBuf,
    /// Owned entries are deleted on close; unowned ones are never touched.
    pub owned: bool,
}

/// Naming hints for a freshly acquired location.
#[derive(Debug, Clone, Default)]
pub struct PathHint {
    label: Option<String>,
    file_name: Option<String>,
    extension: Option<String>,
}

impl PathHint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short label embedded in the generated name (usually the command).
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Keep this exact file name after the sequence prefix.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Extension without the leading dot.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        let ext = extension.into();
        let ext = ext.trim_start_matches('.').to_string();
        self.extension = if ext.is_empty() { None } else { Some(ext) };
        self
    }

    pub(crate) fn render(&self, seq: u64) -> String {
        if let Some(name) = &self.file_name {
            return format!("{:04}-{}", seq, sanitize_component(name));
        }

        let label = self
            .label
            .as_deref()
            .map(sanitize_component)
            .unwrap_or_else(|| "tmp".to_string());
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let mut name = format!("{:04}-{}-{}", seq, label, &nonce[..8]);
        if let Some(ext) = &self.extension {
            name.push('.');
            name.push_str(&sanitize_component(ext));
        }
        name
    }
}

fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "tmp".to_string()
    } else {
        trimmed.to_string()
    }
}

struct RegistryState {
    state: LifecycleState,
    entries: Vec<RegistryEntry>,
    next_seq: u64,
}

pub(crate) struct Registry {
    inner: Mutex<RegistryState>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                state: LifecycleState::Idle,
                entries: Vec::new(),
                next_seq: 1,
            }),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Idle → Active. Creates the workspace directory while holding the lock so
    /// no acquisition can observe an Active registry without its directory.
    pub(crate) fn activate(&self, workspace: &Path) -> GisflowResult<bool> {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Active => Ok(false),
            LifecycleState::Closed => Err(GisflowError::ContextClosed(format!(
                "cannot re-enter closed workflow at {}",
                workspace.display()
            ))),
            LifecycleState::Idle => {
                std::fs::create_dir_all(workspace).map_err(|e| {
                    GisflowError::Storage(format!(
                        "Failed to create workspace {}: {}",
                        workspace.display(),
                        e
                    ))
                })?;
                inner.state = LifecycleState::Active;
                Ok(true)
            }
        }
    }

    /// Reserve a new owned location. The file itself is not created.
    pub(crate) fn reserve(&self, workspace: &Path, hint: &PathHint) -> GisflowResult<RegistryEntry> {
        let mut inner = self.inner.lock();
        ensure_active(inner.state)?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = RegistryEntry {
            seq,
            path: workspace.join(hint.render(seq)),
            owned: true,
        };
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    /// Record a location the workflow must never delete.
    ///
    /// A path that is already registered resolves to its existing entry, so
    /// reopening a workflow output keeps it owned.
    pub(crate) fn adopt(&self, path: PathBuf) -> GisflowResult<RegistryEntry> {
        let mut inner = self.inner.lock();
        ensure_active(inner.state)?;

        if let Some(existing) = inner.entries.iter().find(|e| e.path == path) {
            return Ok(existing.clone());
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let entry = RegistryEntry {
            seq,
            path,
            owned: false,
        };
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    /// Transition to Closed and hand back the entries to purge.
    ///
    /// Returns `None` when already closed, so purging happens exactly once.
    pub(crate) fn close(&self) -> Option<Vec<RegistryEntry>> {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Closed => None,
            LifecycleState::Idle | LifecycleState::Active => {
                inner.state = LifecycleState::Closed;
                Some(std::mem::take(&mut inner.entries))
            }
        }
    }

    pub(crate) fn entries(&self) -> Vec<RegistryEntry> {
        self.inner.lock().entries.clone()
    }
}

fn ensure_active(state: LifecycleState) -> GisflowResult<()> {
    match state {
        LifecycleState::Active => Ok(()),
        LifecycleState::Idle => Err(GisflowError::ContextClosed(
            "workflow has not been entered".into(),
        )),
        LifecycleState::Closed => Err(GisflowError::ContextClosed(
            "workflow already closed".into(),
        )),
    }
}
