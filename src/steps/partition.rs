use std::path::Path;

use crate::{
    cmd::CommandRequest,
    lsblk::Disk,
    pipeline::{InstallContext, Stage, StageFailure},
    steps::uefi::BootMode,
};

/// One command of the disk-preparation sequence.
#[derive(Debug, Clone)]
pub struct SubStep {
    pub request: CommandRequest,
    /// Stage failure message; `None` marks a best-effort step.
    pub failure: Option<&'static str>,
}

fn step(request: CommandRequest, failure: &'static str) -> SubStep {
    SubStep {
        request,
        failure: Some(failure),
    }
}

/// Wipe, partition, format, then mount root, EFI and swap, in that order.
///
/// The sequence starts with a wipe every time: there is no resume, so a
/// second run after a partial failure erases and re-partitions the disk.
pub fn plan(disk: &Disk, boot: BootMode, target: &Path) -> Vec<SubStep> {
    let device = disk.device();
    let target = target.display().to_string();
    let mut steps = vec![step(
        CommandRequest::host("wipefs").args(["-af", device.as_str()]),
        "Failed to wipe disk",
    )];

    match boot {
        BootMode::Uefi => {
            let (efi, swap, root) = (disk.partition(1), disk.partition(2), disk.partition(3));
            let boot_dir = format!("{}/boot", target);
            steps.extend([
                step(
                    CommandRequest::host("sgdisk").args(["--zap-all", device.as_str()]),
                    "Failed to zap disk",
                ),
                step(
                    CommandRequest::host("sgdisk").args([
                        "--clear",
                        "--new=1:0:+1G",
                        "--typecode=1:ef00",
                        "--change-name=1:EFI",
                        "--new=2:0:+4G",
                        "--typecode=2:8200",
                        "--change-name=2:swap",
                        "--new=3:0:0",
                        "--typecode=3:8300",
                        "--change-name=3:root",
                        device.as_str(),
                    ]),
                    "Failed to create partitions",
                ),
                step(
                    CommandRequest::host("mkfs.fat").args(["-F32", efi.as_str()]),
                    "Failed to format EFI partition",
                ),
                step(
                    CommandRequest::host("mkswap").arg(swap.as_str()),
                    "Failed to format swap partition",
                ),
                step(
                    CommandRequest::host("mkfs.ext4").args(["-F", root.as_str()]),
                    "Failed to format root partition",
                ),
                step(
                    CommandRequest::host("mount").args([root.as_str(), target.as_str()]),
                    "Failed to mount root partition",
                ),
                SubStep {
                    request: CommandRequest::host("mkdir").args(["-p", boot_dir.as_str()]),
                    failure: None,
                },
                step(
                    CommandRequest::host("mount").args([efi.as_str(), boot_dir.as_str()]),
                    "Failed to mount EFI partition",
                ),
                step(
                    CommandRequest::host("swapon").arg(swap.as_str()),
                    "Failed to enable swap",
                ),
            ]);
        }
        BootMode::Bios => {
            let (swap, root) = (disk.partition(1), disk.partition(2));
            steps.extend([
                step(
                    CommandRequest::host("parted").args([
                        "-s",
                        device.as_str(),
                        "mklabel",
                        "msdos",
                        "mkpart",
                        "primary",
                        "linux-swap",
                        "1MiB",
                        "4GiB",
                        "mkpart",
                        "primary",
                        "ext4",
                        "4GiB",
                        "100%",
                        "set",
                        "2",
                        "boot",
                        "on",
                    ]),
                    "Failed to create partitions",
                ),
                step(
                    CommandRequest::host("mkswap").arg(swap.as_str()),
                    "Failed to format swap partition",
                ),
                step(
                    CommandRequest::host("mkfs.ext4").args(["-F", root.as_str()]),
                    "Failed to format root partition",
                ),
                step(
                    CommandRequest::host("mount").args([root.as_str(), target.as_str()]),
                    "Failed to mount root partition",
                ),
                step(
                    CommandRequest::host("swapon").arg(swap.as_str()),
                    "Failed to enable swap",
                ),
            ]);
        }
    }
    steps
}

pub struct PartitionStage;

impl Stage for PartitionStage {
    fn name(&self) -> &str {
        "Partition disk"
    }

    fn run(&self, ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
        ctx.log().info(format!(
            "Starting disk partitioning: {} (mode: {})",
            ctx.disk.device(),
            ctx.boot
        ));

        for sub in plan(&ctx.disk, ctx.boot, ctx.exec.target()) {
            match sub.failure {
                Some(failure) => ctx.require(&sub.request, failure)?,
                None => ctx.exec.run_best_effort(&sub.request),
            }
        }

        ctx.log().info("Disk partitioning completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        logger::LogSink,
        testing::{install_context, RecordingRunner, SharedBuf},
    };

    fn run(runner: &RecordingRunner, boot: BootMode) -> Result<(), StageFailure> {
        let log = LogSink::from_writer(Box::new(SharedBuf::default()));
        let mut ctx = install_context(&log, runner.clone(), "/mnt", boot);
        PartitionStage.run(&mut ctx)
    }

    #[test]
    fn uefi_sequence_order() {
        let runner = RecordingRunner::default();
        run(&runner, BootMode::Uefi).unwrap();

        let argv: Vec<String> = runner.calls().iter().map(|c| c.argv.join(" ")).collect();
        assert_eq!(argv.len(), 10);
        assert_eq!(argv[0], "wipefs -af /dev/sda");
        assert_eq!(argv[1], "sgdisk --zap-all /dev/sda");
        assert!(argv[2].starts_with("sgdisk --clear --new=1:0:+1G --typecode=1:ef00"));
        assert_eq!(argv[3], "mkfs.fat -F32 /dev/sda1");
        assert_eq!(argv[4], "mkswap /dev/sda2");
        assert_eq!(argv[5], "mkfs.ext4 -F /dev/sda3");
        assert_eq!(argv[6], "mount /dev/sda3 /mnt");
        assert_eq!(argv[7], "mkdir -p /mnt/boot");
        assert_eq!(argv[8], "mount /dev/sda1 /mnt/boot");
        assert_eq!(argv[9], "swapon /dev/sda2");
    }

    #[test]
    fn bios_uses_msdos_swap_then_root() {
        let runner = RecordingRunner::default();
        run(&runner, BootMode::Bios).unwrap();

        assert_eq!(
            runner.programs(),
            ["wipefs", "parted", "mkswap", "mkfs.ext4", "mount", "swapon"]
        );
        let calls = runner.calls();
        assert_eq!(calls[3].argv, ["mkfs.ext4", "-F", "/dev/sda2"]);
        assert_eq!(calls[5].argv, ["swapon", "/dev/sda1"]);
    }

    #[test]
    fn nvme_partitions_take_p_infix() {
        let disk = Disk {
            name: "nvme0n1".into(),
            size: "1T".into(),
            model: String::new(),
        };
        let steps = plan(&disk, BootMode::Uefi, Path::new("/mnt"));
        let mkfs = steps.iter().find(|s| s.request.program() == "mkfs.fat").unwrap();
        assert_eq!(mkfs.request.argv(Path::new("/mnt")), ["mkfs.fat", "-F32", "/dev/nvme0n1p1"]);
    }

    #[test]
    fn failed_root_format_skips_every_later_step() {
        let runner = RecordingRunner::default().fail_on("mkfs.ext4", 1);
        let failure = run(&runner, BootMode::Uefi).unwrap_err();

        assert_eq!(failure.0, "Failed to format root partition");
        assert!(!runner.programs().iter().any(|p| p == "mount" || p == "swapon"));
    }

    #[test]
    fn boot_dir_creation_is_best_effort() {
        let runner = RecordingRunner::default().fail_on("mkdir", 1);
        run(&runner, BootMode::Uefi).unwrap();
        assert_eq!(runner.programs().last().map(String::as_str), Some("swapon"));
    }

    #[test]
    fn rerun_after_failure_wipes_again() {
        let broken = RecordingRunner::default().fail_on("mkswap", 1);
        assert!(run(&broken, BootMode::Uefi).is_err());

        // No resume point: the next attempt starts over with a wipe.
        let retry = RecordingRunner::default();
        run(&retry, BootMode::Uefi).unwrap();
        assert_eq!(retry.programs()[..3], ["wipefs", "sgdisk", "sgdisk"]);
    }
}
