// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap a shell environment from a dotfiles repository.
//!
//! A run installs missing tools, clones or updates the dotfiles repository,
//! sets up a shell framework with its plugins and prompt theme, installs the
//! terminal multiplexer's plugin manager, links configuration files into the
//! home directory, and finally switches the login shell. See
//! [`bootstrap`] for how the steps fit together.

pub mod bootstrap;
pub mod config;
pub mod deps;
pub mod framework;
pub mod link;
pub mod path;
pub mod repo;
pub mod shell;
pub mod syscall;

pub use bootstrap::{Bootstrap, BootstrapError, Report, Step};
pub use config::BootstrapConfig;
