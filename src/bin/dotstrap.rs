// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstrap::{
    config::{BootstrapConfig, GitBackend},
    path::{default_config_path, home_dir},
    repo::{Git2Syncer, GitCli, SyncOutcome, Syncer},
    shell::{Session, ShellOutcome},
    syscall::{DryRun, SystemCall, Syscall},
    Bootstrap, BootstrapError, Report,
};

use anyhow::Result;
use clap::Parser;
use std::{io::IsTerminal, path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Bootstrap a shell environment from a dotfiles repository.
#[derive(Debug, Clone, Parser)]
#[command(about, override_usage = "dotstrap [options]", version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Log what would be done without doing it.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Print effective configuration and exit.
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => BootstrapConfig::load(path)?,
            None => BootstrapConfig::load_or_default(default_config_path()?)?,
        };

        if self.print_config {
            print!("{config}");
            return Ok(());
        }

        let syscall: Box<dyn Syscall> = if self.dry_run {
            Box::new(DryRun)
        } else {
            Box::new(SystemCall)
        };

        // INVARIANT: Dry runs route git through the syscall layer, so nothing
        // gets cloned behind its back.
        let syncer: Box<dyn Syncer + '_> = match (self.dry_run, config.git.backend) {
            (false, GitBackend::Libgit2) if std::io::stderr().is_terminal() => {
                Box::new(Git2Syncer::new())
            }
            (false, GitBackend::Libgit2) => Box::new(Git2Syncer::hidden()),
            _ => Box::new(GitCli::new(syscall.as_ref())),
        };

        let report = Bootstrap::new(
            &config,
            syscall.as_ref(),
            syncer.as_ref(),
            home_dir()?,
            Session::from_env(),
        )
        .dry_run(self.dry_run)
        .run()?;
        summarize(&report);

        Ok(())
    }
}

fn main() {
    let layer = fmt::layer().compact().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:#}");
        let code = error
            .downcast_ref::<BootstrapError>()
            .map(BootstrapError::exit_code)
            .unwrap_or(1);
        exit(code);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn summarize(report: &Report) {
    if !report.installed.is_empty() {
        info!("installed {}", report.installed.join(", "));
    }

    info!("dotfiles {}", report.dotfiles);
    let cloned = report
        .plugins
        .iter()
        .filter(|(_, outcome)| *outcome == SyncOutcome::Cloned)
        .count();
    info!("{} plugins synced, {cloned} newly cloned", report.plugins.len());
    info!("theme {}, multiplexer plugins {}", report.theme, report.multiplexer);
    info!(
        "{} files linked, {} not in dotfiles",
        report.links.actions.len(),
        report.links.skipped.len()
    );
    match &report.shell {
        ShellOutcome::Changed(shell) => info!("login shell changed to {}", shell.display()),
        ShellOutcome::Pending(shell) => info!("login shell would change to {shell}"),
        ShellOutcome::Unchanged => {}
    }
}
