// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell framework installation.
//!
//! The shell framework is installed by fetching its installer script over the
//! network and running it unattended. Once installed, later runs call the
//! framework's own upgrade script instead.
//!
//! Either way, the framework defines the __custom extensions directory__ that
//! third-party plugins and themes are cloned into. That directory is handed
//! back as a [`CustomDir`] value so later steps receive it explicitly.

use crate::{
    config::FrameworkSettings,
    syscall::{Invocation, Syscall, SyscallError},
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Custom extensions directory of the shell framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomDir(PathBuf);

impl CustomDir {
    /// Construct new custom extensions directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Directory that plugins are cloned into.
    pub fn plugins(&self) -> PathBuf {
        self.0.join("plugins")
    }

    /// Directory that themes are cloned into.
    pub fn themes(&self) -> PathBuf {
        self.0.join("themes")
    }

    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

/// What happened to the shell framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkOutcome {
    Installed,
    Upgraded,
    UpgradeSkipped,
}

/// Install or upgrade the shell framework.
pub struct FrameworkInstaller<'a> {
    settings: &'a FrameworkSettings,
    syscall: &'a dyn Syscall,
}

impl<'a> FrameworkInstaller<'a> {
    /// Construct new framework installer.
    pub fn new(settings: &'a FrameworkSettings, syscall: &'a dyn Syscall) -> Self {
        Self { settings, syscall }
    }

    /// Custom extensions directory the framework uses.
    pub fn custom_dir(&self) -> CustomDir {
        match &self.settings.custom {
            Some(custom) => CustomDir::new(custom),
            None => CustomDir::new(self.settings.path.join("custom")),
        }
    }

    /// Install framework if missing, otherwise upgrade it.
    ///
    /// # Errors
    ///
    /// - Return [`FrameworkError::Fetch`] if installer cannot be downloaded.
    /// - Return [`FrameworkError::Install`] if installer fails.
    /// - Return [`FrameworkError::Upgrade`] if upgrade fails and failure is
    ///   not tolerated.
    #[instrument(skip(self), level = "debug")]
    pub fn install_or_upgrade(&self) -> Result<(FrameworkOutcome, CustomDir)> {
        let custom = self.custom_dir();
        let outcome = if self.settings.path.exists() {
            self.upgrade(&custom)?
        } else {
            self.install(&custom)?
        };

        Ok((outcome, custom))
    }

    fn install(&self, custom: &CustomDir) -> Result<FrameworkOutcome> {
        info!("install shell framework into {}", self.settings.path.display());
        let fetch = Invocation::new("curl").args(["-fsSL", self.settings.installer.as_str()]);
        let script = self
            .syscall
            .captured(&fetch)
            .map_err(|source| FrameworkError::Fetch {
                source,
                url: self.settings.installer.clone(),
            })?;

        let run = Invocation::new("sh")
            .args(["-c", script.as_str(), "sh", "--unattended"])
            .env("ZSH", &self.settings.path)
            .env("ZSH_CUSTOM", custom.as_path());
        self.syscall.interactive(&run).map_err(FrameworkError::Install)?;

        Ok(FrameworkOutcome::Installed)
    }

    fn upgrade(&self, custom: &CustomDir) -> Result<FrameworkOutcome> {
        info!("upgrade shell framework at {}", self.settings.path.display());
        let run = Invocation::new("sh")
            .arg(self.settings.path.join(&self.settings.upgrade))
            .env("ZSH", &self.settings.path)
            .env("ZSH_CUSTOM", custom.as_path());

        match self.syscall.interactive(&run) {
            Ok(()) => Ok(FrameworkOutcome::Upgraded),
            Err(error) if self.settings.on_upgrade_failure.is_tolerated() => {
                warn!("ignoring failed shell framework upgrade: {error}");
                Ok(FrameworkOutcome::UpgradeSkipped)
            }
            Err(error) => Err(FrameworkError::Upgrade(error)),
        }
    }
}

/// Shell framework error types.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// Installer script cannot be downloaded.
    #[error("failed to fetch shell framework installer from {url}")]
    Fetch {
        #[source]
        source: SyscallError,
        url: String,
    },

    /// Installer script failed.
    #[error("shell framework installer failed")]
    Install(#[source] SyscallError),

    /// Upgrade script failed.
    #[error("shell framework upgrade failed")]
    Upgrade(#[source] SyscallError),
}

impl FrameworkError {
    /// Exit code of the failed program, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Fetch { source, .. } | Self::Install(source) | Self::Upgrade(source) => {
                source.exit_code()
            }
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = FrameworkError> = std::result::Result<T, E>;
