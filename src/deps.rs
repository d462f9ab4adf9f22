// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Required tool detection and installation.

use crate::{
    config::DependencySettings,
    syscall::{Invocation, Syscall, SyscallError},
};

use tracing::{info, instrument};

/// Detect and install missing tools.
pub struct DependencyChecker<'a> {
    settings: &'a DependencySettings,
    syscall: &'a dyn Syscall,
}

impl<'a> DependencyChecker<'a> {
    /// Construct new dependency checker.
    pub fn new(settings: &'a DependencySettings, syscall: &'a dyn Syscall) -> Self {
        Self { settings, syscall }
    }

    /// List tools that do not resolve on the search path, in configured order.
    pub fn missing(&self) -> Vec<String> {
        self.settings
            .tools
            .iter()
            .filter(|tool| self.syscall.locate(tool).is_none())
            .cloned()
            .collect()
    }

    /// Install every missing tool through one package manager call.
    ///
    /// Does nothing if no tool is missing. Otherwise runs the refresh command
    /// if one is configured, followed by the install command with all missing
    /// tool names appended. Returns the tools that were installed.
    ///
    /// # Errors
    ///
    /// - Return [`DependencyError::NoInstallCommand`] if install command is
    ///   empty.
    /// - Return [`DependencyError::Install`] if package manager fails.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_installed(&self) -> Result<Vec<String>> {
        let missing = self.missing();
        if missing.is_empty() {
            info!("all required tools are present");
            return Ok(missing);
        }

        info!("install missing tools: {}", missing.join(", "));
        let install = Invocation::from_command_line(&self.settings.install)
            .ok_or(DependencyError::NoInstallCommand)?
            .args(&missing);

        if let Some(refresh) = self
            .settings
            .refresh
            .as_ref()
            .and_then(|line| Invocation::from_command_line(line))
        {
            self.syscall.interactive(&refresh)?;
        }
        self.syscall.interactive(&install)?;

        Ok(missing)
    }
}

/// Dependency installation error types.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// No package manager command configured.
    #[error("no install command configured for missing tools")]
    NoInstallCommand,

    /// Package manager failed.
    #[error(transparent)]
    Install(#[from] SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = DependencyError> = std::result::Result<T, E>;
