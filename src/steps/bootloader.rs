use crate::{
    cmd::CommandRequest,
    pipeline::{check, InstallContext, Stage, StageFailure},
    steps::uefi::BootMode,
};

const LOADER_CONF: &str = "default arch.conf\ntimeout 3\nconsole-mode max\neditor no\n";
const ENTRIES_DIR: &str = "/boot/loader/entries";
const ENTRY: &str = "/boot/loader/entries/arch.conf";

fn boot_entry(root_uuid: &str) -> String {
    format!(
        "title   Tonarchy\nlinux   /vmlinuz-linux\ninitrd  /initramfs-linux.img\noptions root=UUID={} rw\n",
        root_uuid
    )
}

/// systemd-boot on UEFI machines, GRUB in the MBR otherwise.
pub struct BootloaderStage;

impl Stage for BootloaderStage {
    fn name(&self) -> &str {
        "Install bootloader"
    }

    fn run(&self, ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
        match ctx.boot {
            BootMode::Uefi => systemd_boot(ctx),
            BootMode::Bios => grub(ctx),
        }
    }
}

fn systemd_boot(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    ctx.log().info("Installing systemd-boot");
    ctx.require(
        &CommandRequest::chroot("bootctl").arg("install"),
        "Failed to install bootloader",
    )?;

    let root = ctx.disk.partition(3);
    let uuid = ctx
        .exec
        .capture(&CommandRequest::host("blkid").args(["-s", "UUID", "-o", "value", root.as_str()]))
        .ok_or_else(|| {
            ctx.log().error(format!("Failed to read UUID for {}", root));
            StageFailure::new("Failed to get root partition UUID")
        })?;
    ctx.log().info(format!("Root partition UUID: {}", uuid));

    check(
        ctx.exec.create_dir(ENTRIES_DIR, 0o755),
        "Failed to create boot entries directory",
    )?;
    check(
        ctx.exec.write_file("/boot/loader/loader.conf", LOADER_CONF),
        "Failed to create loader config",
    )?;
    check(
        ctx.exec.write_file(ENTRY, &boot_entry(&uuid)),
        "Failed to create boot entry",
    )?;
    if !ctx.exec.is_dry_run() && !ctx.exec.target_path(ENTRY).exists() {
        ctx.log().error("Boot entry file missing after creation");
        return Err(StageFailure::new("Boot entry verification failed"));
    }

    ctx.exec.run_best_effort(&CommandRequest::host("sync"));
    ctx.exec.run_best_effort(&CommandRequest::chroot("sync"));
    ctx.log().info("systemd-boot installation completed");
    Ok(())
}

fn grub(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    ctx.log().info("Installing GRUB");
    ctx.require(
        &CommandRequest::chroot("pacman").args(["-S", "--noconfirm", "grub"]),
        "Failed to install GRUB package",
    )?;
    ctx.require(
        &CommandRequest::chroot("grub-install")
            .arg("--target=i386-pc")
            .arg(ctx.disk.device()),
        "Failed to install GRUB",
    )?;
    ctx.require(
        &CommandRequest::chroot("grub-mkconfig").args(["-o", "/boot/grub/grub.cfg"]),
        "Failed to generate GRUB config",
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        logger::LogSink,
        testing::{install_context, prepare_target, RecordingRunner, SharedBuf},
    };

    #[test]
    fn uefi_entry_points_at_root_uuid() {
        let dir = tempfile::tempdir().unwrap();
        prepare_target(dir.path());
        let log = LogSink::from_writer(Box::new(SharedBuf::default()));
        let runner = RecordingRunner::default().respond("blkid", "0a1b-2c3d\n");
        let mut ctx = install_context(&log, runner.clone(), dir.path(), BootMode::Uefi);

        BootloaderStage.run(&mut ctx).unwrap();

        let read = |p: &str| fs::read_to_string(dir.path().join(p)).unwrap();
        assert_eq!(read("boot/loader/loader.conf"), LOADER_CONF);
        assert_eq!(
            read("boot/loader/entries/arch.conf"),
            "title   Tonarchy\nlinux   /vmlinuz-linux\ninitrd  /initramfs-linux.img\noptions root=UUID=0a1b-2c3d rw\n"
        );
        let blkid = runner.calls().into_iter().find(|c| c.program() == "blkid").unwrap();
        assert_eq!(blkid.argv.last().map(String::as_str), Some("/dev/sda3"));
    }

    #[test]
    fn missing_uuid_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        prepare_target(dir.path());
        let log = LogSink::from_writer(Box::new(SharedBuf::default()));
        let runner = RecordingRunner::default().respond("blkid", "\n");
        let mut ctx = install_context(&log, runner, dir.path(), BootMode::Uefi);

        assert_eq!(
            BootloaderStage.run(&mut ctx).unwrap_err().0,
            "Failed to get root partition UUID"
        );
        assert!(!dir.path().join("boot/loader/entries/arch.conf").exists());
    }

    #[test]
    fn bios_installs_grub_to_the_disk() {
        let log = LogSink::from_writer(Box::new(SharedBuf::default()));
        let runner = RecordingRunner::default();
        let mut ctx = install_context(&log, runner.clone(), "/mnt", BootMode::Bios);

        BootloaderStage.run(&mut ctx).unwrap();

        assert_eq!(runner.programs(), ["pacman", "grub-install", "grub-mkconfig"]);
        assert_eq!(
            runner.calls()[1].argv,
            ["arch-chroot", "/mnt", "grub-install", "--target=i386-pc", "/dev/sda"]
        );
    }

    #[test]
    fn grub_package_failure_stops_before_install() {
        let log = LogSink::from_writer(Box::new(SharedBuf::default()));
        let runner = RecordingRunner::default().fail_on("pacman", 1);
        let mut ctx = install_context(&log, runner.clone(), "/mnt", BootMode::Bios);

        assert_eq!(
            BootloaderStage.run(&mut ctx).unwrap_err().0,
            "Failed to install GRUB package"
        );
        assert_eq!(runner.programs(), ["pacman"]);
    }
}
