// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration file linking.
//!
//! Files listed for linking are symlinked from the dotfiles repository into
//! the home directory. Whatever already sits at a link target is moved aside
//! to `<name>.backup` first. That includes symlinks, even dangling ones, so a
//! second run backs up the link made by the first run and then recreates it.
//! An older backup of the same name is overwritten.
//!
//! Linking happens in two phases. [`ConfigLinker::plan`] only inspects the
//! filesystem, and [`ConfigLinker::apply`] performs the moves and links. This
//! lets a dry run show what would happen without touching anything.

use std::{
    ffi::OsString,
    fs::{rename, symlink_metadata},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// One planned link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAction {
    /// File inside dotfiles repository.
    pub source: PathBuf,

    /// Path inside home directory that will point at source.
    pub target: PathBuf,

    /// Where existing target will be moved, if anything exists there.
    pub backup: Option<PathBuf>,
}

/// Full set of planned links.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    pub actions: Vec<LinkAction>,

    /// Listed names that do not exist in dotfiles repository.
    pub skipped: Vec<String>,
}

/// Link configuration files from dotfiles repository into home directory.
#[derive(Debug, Clone)]
pub struct ConfigLinker {
    source_dir: PathBuf,
    target_dir: PathBuf,
}

impl ConfigLinker {
    /// Construct new linker from dotfiles repository to home directory.
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    /// Determine what linking the given names would do.
    pub fn plan(&self, names: impl IntoIterator<Item = impl AsRef<str>>) -> LinkPlan {
        let mut plan = LinkPlan::default();
        for name in names {
            let name = name.as_ref();
            let source = self.source_dir.join(name);
            if !source.exists() {
                debug!("{name} not found in {}", self.source_dir.display());
                plan.skipped.push(name.to_string());
                continue;
            }

            let target = self.target_dir.join(name);
            let backup = symlink_metadata(&target)
                .is_ok()
                .then(|| backup_path(&target));
            plan.actions.push(LinkAction {
                source,
                target,
                backup,
            });
        }

        plan
    }

    /// Perform planned links.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError::Backup`] if existing target cannot be moved.
    /// - Return [`LinkError::CreateParent`] if target's parent directory
    ///   cannot be created.
    /// - Return [`LinkError::Symlink`] if symlink cannot be created.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn apply(&self, plan: &LinkPlan) -> Result<()> {
        for name in &plan.skipped {
            warn!("skip {name}, not present in dotfiles repository");
        }

        for action in &plan.actions {
            link(action)?;
        }

        Ok(())
    }

    /// Plan and perform links in one go.
    ///
    /// # Errors
    ///
    /// - Return [`LinkError`] if any link cannot be made.
    pub fn link_all(&self, names: impl IntoIterator<Item = impl AsRef<str>>) -> Result<LinkPlan> {
        let plan = self.plan(names);
        self.apply(&plan)?;
        Ok(plan)
    }
}

fn link(action: &LinkAction) -> Result<()> {
    if let Some(backup) = &action.backup {
        info!("back up {} to {}", action.target.display(), backup.display());
        rename(&action.target, backup).map_err(|source| LinkError::Backup {
            source,
            path: action.target.clone(),
        })?;
    }

    if let Some(parent) = action.target.parent() {
        mkdirp::mkdirp(parent).map_err(|source| LinkError::CreateParent {
            source,
            path: parent.to_path_buf(),
        })?;
    }

    info!("link {} -> {}", action.target.display(), action.source.display());
    symlink(&action.source, &action.target).map_err(|source| LinkError::Symlink {
        source,
        path: action.target.clone(),
    })
}

fn backup_path(target: &Path) -> PathBuf {
    let mut backup = OsString::from(target.as_os_str());
    backup.push(".backup");
    PathBuf::from(backup)
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}

/// Link error types.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Existing target cannot be moved to backup.
    #[error("failed to back up {:?}", path.display())]
    Backup {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Parent directory of target cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateParent {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Symlink cannot be created.
    #[error("failed to create symlink at {:?}", path.display())]
    Symlink {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LinkError> = std::result::Result<T, E>;
