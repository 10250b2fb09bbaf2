use std::path::Path;

use crate::{
    cmd::{CommandRequest, DotFile, DropIn},
    logger::LogSink,
    pipeline::{check, InstallContext, Stage, StageFailure},
};

const GITHUB: &str = "https://github.com/tonybanters";
const WALLPAPER: &str = "/usr/share/wallpapers/wall1.jpg";

const BASH_PROFILE: &str = "if [ -z $DISPLAY ] && [ $XDG_VTNR = 1 ]; then\n  exec startx\nfi\n";

const BASHRC: &str = r#"export PATH="$HOME/.local/bin:$PATH"
export EDITOR="nvim"

alias ls='ls --color=auto'
alias la='ls -a'
alias ll='ls -la'
alias ..='cd ..'
alias ...='cd ../..'
alias grep='grep --color=auto'

export PS1="\[\e[38;5;75m\]\u@\h \[\e[38;5;113m\]\w \[\e[38;5;189m\]\$ \[\e[0m\]"

fastfetch
"#;

const FIREFOX_DESKTOP: &str = "[Desktop Entry]
Name=Firefox
GenericName=Web Browser
Exec=sh -c 'firefox --profile $HOME/.config/firefox'
Type=Application
Icon=firefox
Categories=Network;WebBrowser;
MimeType=text/html;text/xml;application/xhtml+xml;application/vnd.mozilla.xul+xml;
";

const OXWM_XINITRC: &str = "export GTK_THEME=Adwaita-dark
xset r rate 200 35 &
picom --config ~/.config/picom/picom.conf &
xwallpaper --zoom /usr/share/wallpapers/wall1.jpg &
exec oxwm
";

/// Desktop environment a profile provisions for the new user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desktop {
    /// XFCE from packages.
    Xfce,
    /// dwm, st and dmenu built from source.
    Suckless,
    /// OXWM built from source with cargo.
    Oxwm,
}

pub struct DesktopStage;

impl Stage for DesktopStage {
    fn name(&self) -> &str {
        "Provision desktop"
    }

    fn run(&self, ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
        ctx.log().info(format!(
            "Provisioning {:?} desktop for user: {}",
            ctx.profile.desktop, ctx.answers.username
        ));
        match ctx.profile.desktop {
            Desktop::Xfce => xfce(ctx)?,
            Desktop::Suckless => suckless(ctx)?,
            Desktop::Oxwm => oxwm(ctx)?,
        }
        ctx.log().info("Desktop provisioning completed successfully");
        Ok(())
    }
}

// ── Profiles ──────────────────────────────────────────────────────────────────

fn xfce(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    common_assets(ctx);
    let home = ctx.home();
    let source = ctx.asset("xfce4");
    soft(
        ctx.log(),
        ctx.exec.copy_in(&source, &format!("{}/.config/xfce4", home)),
        "XFCE configuration",
    );
    own_config(ctx);

    install_dotfiles(ctx, &[xinitrc("exec startxfce4\n"), bash_profile(), bashrc()])?;
    autologin(ctx)
}

fn suckless(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    let user = ctx.answers.username.clone();
    let home = ctx.home();

    for tool in ["dwm", "st", "dmenu"] {
        let dest = format!("{}/{}", home, tool);
        check(
            ctx.exec
                .clone_as_user(&user, &format!("{}/{}", GITHUB, tool), &dest),
            "Failed to clone repositories",
        )?;
        ctx.log().info(format!("Building and installing from {}", dest));
        ctx.require(
            &CommandRequest::chroot("make").args(["-C", dest.as_str(), "clean", "install"]),
            "Failed to build suckless tools",
        )?;
    }

    wallpaper(ctx);
    install_dotfiles(
        ctx,
        &[
            xinitrc(&format!("xwallpaper --zoom {} &\nexec dwm\n", WALLPAPER)),
            bash_profile(),
            bashrc(),
        ],
    )?;
    autologin(ctx)
}

fn oxwm(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    let user = ctx.answers.username.clone();
    let home = ctx.home();
    let src = format!("{}/oxwm", home);

    check(
        ctx.exec
            .clone_as_user(&user, &format!("{}/oxwm", GITHUB), &src),
        "Failed to clone OXWM",
    )?;
    ctx.require(
        &CommandRequest::as_user(user.as_str(), "cargo").args([
            "build".to_string(),
            "--release".to_string(),
            "--manifest-path".to_string(),
            format!("{}/Cargo.toml", src),
        ]),
        "Failed to build OXWM",
    )?;
    ctx.require(
        &CommandRequest::chroot("install").args([
            "-m".to_string(),
            "0755".to_string(),
            format!("{}/target/release/oxwm", src),
            "/usr/bin/oxwm".to_string(),
        ]),
        "Failed to install OXWM",
    )?;

    common_assets(ctx);
    for (asset, dest) in [
        ("gtk-3.0", ".config/gtk-3.0"),
        ("gtk-4.0", ".config/gtk-4.0"),
        ("gtkrc-2.0", ".gtkrc-2.0"),
    ] {
        let source = ctx.asset(asset);
        soft(
            ctx.log(),
            ctx.exec.copy_in(&source, &format!("{}/{}", home, dest)),
            asset,
        );
    }

    let config_dir = format!("{}/.config/oxwm", home);
    soft(
        ctx.log(),
        ctx.exec.create_dir(&config_dir, 0o755)
            && ctx.exec.run(&CommandRequest::chroot("cp").args([
                format!("{}/templates/tonarchy-config.lua", src),
                format!("{}/config.lua", config_dir),
            ])),
        "OXWM configuration",
    );
    own_config(ctx);
    soft(
        ctx.log(),
        ctx.exec.chown(&format!("{}/.gtkrc-2.0", home), &user, false),
        "GTK 2 settings ownership",
    );

    install_dotfiles(ctx, &[xinitrc(OXWM_XINITRC), bash_profile(), bashrc()])?;
    autologin(ctx)
}

// ── Shared pieces ─────────────────────────────────────────────────────────────

/// Logs a skipped best-effort step.
fn soft(log: &LogSink, ok: bool, what: &str) {
    if !ok {
        log.warn(format!("Skipped {}", what));
    }
}

fn wallpaper(ctx: &mut InstallContext<'_>) {
    soft(
        ctx.log(),
        ctx.exec.create_dir("/usr/share/wallpapers", 0o755)
            && ctx.exec.copy_in(Path::new(WALLPAPER), WALLPAPER),
        "wallpaper",
    );
}

/// Theme, browser profile, terminal and launcher configs, editor config.
/// Everything here is optional: a missing asset never fails the install.
fn common_assets(ctx: &mut InstallContext<'_>) {
    let user = ctx.answers.username.clone();
    let home = ctx.home();
    let log = ctx.log();

    wallpaper(ctx);

    let copies = [
        ("/usr/share/tonarchy", "favicon.png", "/usr/share/tonarchy/favicon.png".to_string()),
        ("/usr/share/themes", "Tokyonight-Dark", "/usr/share/themes/Tokyonight-Dark".to_string()),
        (
            "/usr/lib/firefox/distribution",
            "firefox-policies/policies.json",
            "/usr/lib/firefox/distribution/policies.json".to_string(),
        ),
    ];
    for (dir, asset, dest) in copies {
        let source = ctx.asset(asset);
        soft(
            log,
            ctx.exec.create_dir(dir, 0o755) && ctx.exec.copy_in(&source, &dest),
            asset,
        );
    }

    soft(
        log,
        ctx.exec.create_dir("/usr/share/applications", 0o755)
            && ctx
                .exec
                .write_file("/usr/share/applications/firefox.desktop", FIREFOX_DESKTOP),
        "Firefox launcher",
    );

    let firefox = format!("{}/.config/firefox", home);
    let source = ctx.asset("firefox/default-release");
    soft(
        log,
        ctx.exec.create_dir(&firefox, 0o755) && ctx.exec.copy_in(&source, &firefox),
        "Firefox profile",
    );

    for app in ["alacritty", "rofi", "fastfetch", "picom"] {
        let source = ctx.asset(app);
        soft(
            log,
            ctx.exec.copy_in(&source, &format!("{}/.config/{}", home, app)),
            app,
        );
    }

    // the editor config is cloned by the user into ~/.config
    own_config(ctx);
    soft(
        log,
        ctx.exec.clone_as_user(
            &user,
            &format!("{}/nvim", GITHUB),
            &format!("{}/.config/nvim", home),
        ),
        "Neovim configuration",
    );
}

fn own_config(ctx: &mut InstallContext<'_>) {
    let user = ctx.answers.username.clone();
    let config = format!("{}/.config", ctx.home());
    soft(
        ctx.log(),
        ctx.exec.chown(&config, &user, true),
        "~/.config ownership",
    );
}

fn xinitrc(content: &str) -> DotFile {
    DotFile {
        name: ".xinitrc",
        content: content.to_string(),
        mode: 0o755,
    }
}

fn bash_profile() -> DotFile {
    DotFile {
        name: ".bash_profile",
        content: BASH_PROFILE.to_string(),
        mode: 0o644,
    }
}

fn bashrc() -> DotFile {
    DotFile {
        name: ".bashrc",
        content: BASHRC.to_string(),
        mode: 0o644,
    }
}

fn install_dotfiles(ctx: &mut InstallContext<'_>, dotfiles: &[DotFile]) -> Result<(), StageFailure> {
    let user = ctx.answers.username.clone();
    for dotfile in dotfiles {
        if !ctx.exec.install_dotfile(&user, dotfile) {
            ctx.log()
                .error(format!("Failed to create dotfile: {}", dotfile.name));
            return Err(StageFailure::new("Failed to create dotfiles"));
        }
    }
    Ok(())
}

/// Logs the user straight into tty1, where `.bash_profile` starts X.
fn autologin_drop_in(user: &str) -> DropIn {
    DropIn {
        unit_dir: "getty@tty1.service.d".to_string(),
        file: "autologin.conf".to_string(),
        entries: vec![
            ("[Service]".to_string(), None),
            ("ExecStart".to_string(), Some(String::new())),
            (
                "ExecStart".to_string(),
                Some(format!(
                    "-/sbin/agetty -o \"-p -f -- \\\\u\" --noclear --autologin {} %I $TERM",
                    user
                )),
            ),
        ],
    }
}

fn autologin(ctx: &mut InstallContext<'_>) -> Result<(), StageFailure> {
    let drop_in = autologin_drop_in(&ctx.answers.username);
    check(ctx.exec.write_drop_in(&drop_in), "Failed to setup autologin")
}
