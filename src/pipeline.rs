use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    cmd::{CommandRequest, Executor},
    config::Answers,
    error::InstallerError,
    logger::LogSink,
    lsblk::Disk,
    profile::InstallProfile,
    steps::{
        bootloader::BootloaderStage, desktop::DesktopStage, packages::PackagesStage,
        partition::PartitionStage, system::SystemStage, uefi::BootMode,
    },
    term::{Key, Terminal},
    ui::{self, paint, CONTENT_ROW},
};

const INSTALLED_LOG: &str = "/var/log/tonarchy-install.log";

// ── Stages ────────────────────────────────────────────────────────────────────

/// Operator-facing reason a stage stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure(pub String);

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a failed sub-step into the stage's failure.
pub fn check(ok: bool, failure: &str) -> Result<(), StageFailure> {
    if ok {
        Ok(())
    } else {
        Err(StageFailure::new(failure))
    }
}

/// One named, fail-fast unit of privileged work. Stages hold no state; all
/// they touch is reached through the context.
pub trait Stage {
    fn name(&self) -> &str;
    fn run(&self, ctx: &mut InstallContext<'_>) -> Result<(), StageFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Partition,
    InstallPackages,
    ConfigureSystem,
    InstallBootloader,
    ProvisionDesktop,
}

impl StageKind {
    pub fn stage(self) -> Box<dyn Stage> {
        match self {
            StageKind::Partition => Box::new(PartitionStage),
            StageKind::InstallPackages => Box::new(PackagesStage),
            StageKind::ConfigureSystem => Box::new(SystemStage),
            StageKind::InstallBootloader => Box::new(BootloaderStage),
            StageKind::ProvisionDesktop => Box::new(DesktopStage),
        }
    }
}

/// Everything a run has decided before the first stage starts.
pub struct InstallContext<'a> {
    pub exec: Executor<'a>,
    pub answers: Answers,
    pub disk: Disk,
    pub boot: BootMode,
    pub profile: &'static InstallProfile,
    /// Themes, wallpapers and configuration trees on the live medium.
    pub assets: PathBuf,
}

impl<'a> InstallContext<'a> {
    pub fn log(&self) -> &'a LogSink {
        self.exec.log()
    }

    /// Runs `req`; a failure ends the stage with `failure`.
    pub fn require(&mut self, req: &CommandRequest, failure: &str) -> Result<(), StageFailure> {
        check(self.exec.run(req), failure)
    }

    pub fn asset(&self, name: &str) -> PathBuf {
        self.assets.join(name)
    }

    pub fn home(&self) -> String {
        format!("/home/{}", self.answers.username)
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs `stages` strictly in order. The first failure is shown to the
/// operator, logged and returned; no later stage runs and nothing is retried.
pub fn run_stages<T: Terminal>(
    term: &mut T,
    stages: &[Box<dyn Stage>],
    ctx: &mut InstallContext<'_>,
) -> Result<(), InstallerError> {
    let log = ctx.log();
    let total = stages.len();

    for (i, stage) in stages.iter().enumerate() {
        let title = format!("[{}/{}] {}...", i + 1, total, stage.name());
        log.info(format!("Starting stage: {}", stage.name()));
        ui::show_status(term, &[&title])?;

        let pb = ui::spinner(stage.name());
        let outcome = stage.run(ctx);
        pb.finish_and_clear();

        if let Err(failure) = outcome {
            log.error(format!("Stage '{}' failed: {}", stage.name(), failure));
            ui::show_message(term, &failure.0)?;
            return Err(InstallerError::StageFailed {
                stage: stage.name().to_string(),
                message: failure.0,
            });
        }
        log.info(format!("Stage completed: {}", stage.name()));
    }
    Ok(())
}

/// Runs the active profile's stage list, then keeps the log on the new
/// system and reboots once the operator presses Enter.
pub fn run_profile<T: Terminal>(
    term: &mut T,
    ctx: &mut InstallContext<'_>,
    log_file: &Path,
) -> Result<(), InstallerError> {
    let profile = ctx.profile;
    ctx.log().info(format!(
        "Installing profile '{}' to {} ({} mode)",
        profile.name,
        ctx.disk.device(),
        ctx.boot
    ));

    let stages: Vec<Box<dyn Stage>> = profile.stages.iter().map(|kind| kind.stage()).collect();
    run_stages(term, &stages, ctx)?;
    finish(term, ctx, log_file)
}

fn finish<T: Terminal>(
    term: &mut T,
    ctx: &mut InstallContext<'_>,
    log_file: &Path,
) -> Result<(), InstallerError> {
    ctx.log().info("Installation completed successfully");
    let kept = ctx.exec.target_path(INSTALLED_LOG);
    ctx.exec.run_best_effort(
        &CommandRequest::host("cp")
            .arg(log_file.display().to_string())
            .arg(kept.display().to_string()),
    );

    let left = ui::draw_frame(term)?;
    term.move_to(CONTENT_ROW, left)?;
    write!(term, "{}", paint("Installation complete!").green().bold())?;
    term.move_to(CONTENT_ROW + 2, left)?;
    write!(term, "{}", paint("Press Enter to reboot...").white())?;
    term.flush()?;

    loop {
        match term.read_key()? {
            Some(Key::Enter) => break,
            Some(_) => {}
            None => return Err(InstallerError::Cancelled),
        }
    }

    ctx.log().info("Tonarchy installer finished, rebooting");
    ctx.exec.run_best_effort(&CommandRequest::host("sync"));
    ctx.exec
        .run_best_effort(&CommandRequest::host("systemctl").arg("reboot"));
    Ok(())
}
