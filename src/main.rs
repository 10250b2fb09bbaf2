mod cmd;
mod config;
mod error;
mod filter;
mod form;
mod logger;
mod lsblk;
mod menu;
mod pipeline;
mod profile;
mod steps;
mod term;
#[cfg(test)]
mod testing;
mod ui;

use clap::Parser;

use cmd::{Executor, SystemRunner};
use config::{Answers, Config};
use error::InstallerError;
use filter::FzfFilter;
use logger::LogSink;
use pipeline::InstallContext;
use profile::PROFILES;
use steps::{disk, network, uefi::BootMode};
use term::{Terminal, TerminalSession};

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let config = Config::parse();

    if let Err(e) = run(&config) {
        println!();
        match e {
            InstallerError::Cancelled => ui::print_warning(&e.to_string()),
            _ => ui::print_error(&e.to_string()),
        }
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), InstallerError> {
    check_root(config.dry_run)?;

    if config.dry_run {
        ui::print_warning("Dry run: commands and file writes are only logged.");
    }

    let log = LogSink::open(&config.log_file)?;
    log.info("Tonarchy installer started");

    // SIGINT/SIGTERM must not leave the console in raw mode.
    if let Err(e) = ctrlc::set_handler(|| {
        term::restore_original();
        std::process::exit(130);
    }) {
        log.warn(format!("Failed to install termination handler: {}", e));
    }

    let mut session = TerminalSession::enter()?;
    let result = wizard(&mut session, config, &log);
    session.leave();

    if let Err(e) = &result {
        log.error(format!("Installer stopped: {}", e));
    }
    result?;

    ui::print_info(&format!("Log written to {}", config.log_file.display()));
    Ok(())
}

/// Network, setup form, profile, disk, then the install itself.
fn wizard<T: Terminal>(term: &mut T, config: &Config, log: &LogSink) -> Result<(), InstallerError> {
    let mut exec = Executor::new(log, Box::new(SystemRunner), config.target.clone())
        .with_dry_run(config.dry_run);

    if config.skip_network {
        log.info("Skipping connectivity check");
    } else {
        network::ensure_online(term, &mut exec)?;
    }

    let mut filter = FzfFilter::new(config.filter.as_str());
    let values = form::collect(term, &mut filter, Answers::fields(config.root_password))?;
    let answers = Answers::from_values(&values);
    log.info(format!("Setup answers: {:?}", answers));

    let profile = &PROFILES[menu::select(term, &profile::labels())?];
    log.info(format!("Selected profile: {}", profile.name));

    let disk = disk::choose(term, &mut exec)?;
    let boot = BootMode::detect(config.dry_run);
    log.info(format!("Boot mode: {}", boot));

    let mut ctx = InstallContext {
        exec,
        answers,
        disk,
        boot,
        profile,
        assets: config.assets.clone(),
    };
    pipeline::run_profile(term, &mut ctx, &config.log_file)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Checks that the process is running as root (UID 0).
/// Skipped in dry-run mode.
fn check_root(dry_run: bool) -> Result<(), InstallerError> {
    if dry_run {
        return Ok(());
    }

    let uid = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| parse_uid(&s))
        .unwrap_or(1);

    if uid != 0 {
        return Err(InstallerError::NotRoot);
    }
    Ok(())
}

/// Real UID from the `Uid:` line of `/proc/<pid>/status`.
fn parse_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find(|l| l.starts_with("Uid:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|v| v.parse().ok())
}
