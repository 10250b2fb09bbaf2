use crate::{
    cmd::CommandRequest,
    pipeline::{check, InstallContext, Stage, StageFailure},
};

const LOCALE: &str = "en_US.UTF-8";
const SUDOERS_WHEEL: &str = "%wheel ALL=(ALL:ALL) ALL\n";

fn hosts(hostname: &str) -> String {
    format!(
        "127.0.0.1   localhost\n::1         localhost\n127.0.1.1   {h}.localdomain {h}\n",
        h = hostname
    )
}

/// fstab, clock, locale, identity, accounts, sudo and services.
pub struct SystemStage;

impl Stage for SystemStage {
    fn name(&self) -> &str {
        "Configure system"
    }

    fn run(&self, ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
        let answers = ctx.answers.clone();
        ctx.log().info("Starting system configuration");
        ctx.log().info(format!(
            "User: {}, Hostname: {}, Timezone: {}, Keyboard: {}",
            answers.username, answers.hostname, answers.timezone, answers.keyboard
        ));

        let genfstab = CommandRequest::host("genfstab")
            .arg("-U")
            .arg(ctx.exec.target().display().to_string());
        check(
            ctx.exec.append_output(&genfstab, "/etc/fstab"),
            "Failed to generate fstab",
        )?;

        ctx.require(
            &CommandRequest::chroot("ln").args([
                "-sf".to_string(),
                format!("/usr/share/zoneinfo/{}", answers.timezone),
                "/etc/localtime".to_string(),
            ]),
            "Failed to configure timezone",
        )?;
        ctx.exec
            .run_best_effort(&CommandRequest::chroot("hwclock").arg("--systohc"));

        check(
            ctx.exec
                .write_file("/etc/locale.gen", &format!("{} UTF-8\n", LOCALE)),
            "Failed to write locale.gen",
        )?;
        ctx.require(&CommandRequest::chroot("locale-gen"), "Failed to generate locales")?;
        check(
            ctx.exec
                .write_file("/etc/locale.conf", &format!("LANG={}\n", LOCALE)),
            "Failed to write locale.conf",
        )?;
        check(
            ctx.exec
                .write_file("/etc/vconsole.conf", &format!("KEYMAP={}\n", answers.keyboard)),
            "Failed to write vconsole.conf",
        )?;
        check(
            ctx.exec
                .write_file("/etc/hostname", &format!("{}\n", answers.hostname)),
            "Failed to write hostname",
        )?;
        check(
            ctx.exec.write_file("/etc/hosts", &hosts(&answers.hostname)),
            "Failed to write hosts file",
        )?;

        ctx.require(
            &CommandRequest::chroot("useradd")
                .args(["-m", "-G", "wheel", "-s", "/bin/bash"])
                .arg(answers.username.as_str()),
            "Failed to create user",
        )?;
        set_passwords(ctx)?;

        check(
            ctx.exec.create_dir("/etc/sudoers.d", 0o750)
                && ctx.exec.write_file("/etc/sudoers.d/wheel", SUDOERS_WHEEL)
                && ctx.exec.set_mode("/etc/sudoers.d/wheel", 0o440),
            "Failed to configure sudo",
        )?;

        ctx.require(
            &CommandRequest::chroot("systemctl").args(["enable", "NetworkManager"]),
            "Failed to enable NetworkManager",
        )?;
        ctx.require(
            &CommandRequest::chroot("systemctl").args(["enable", "dbus"]),
            "Failed to enable dbus",
        )?;
        if ctx.profile.display_manager {
            ctx.require(
                &CommandRequest::chroot("systemctl").args(["enable", "lightdm"]),
                "Failed to enable display manager",
            )?;
        }

        ctx.log().info("System configuration completed successfully");
        Ok(())
    }
}

/// Passwords travel on `chpasswd`'s stdin only, one `user:password` line each.
fn set_passwords(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    let answers = &ctx.answers;
    let user_line = format!("{}:{}\n", answers.username, answers.password);
    let root_line = format!("root:{}\n", answers.root_password());

    let requests = match answers.root_password {
        None => vec![CommandRequest::chroot("chpasswd").stdin(user_line + &root_line)],
        Some(_) => vec![
            CommandRequest::chroot("chpasswd").stdin(user_line),
            CommandRequest::chroot("chpasswd").stdin(root_line),
        ],
    };
    for request in &requests {
        ctx.require(request, "Failed to set passwords")?;
    }
    Ok(())
}
