use crate::{pipeline::StageKind, steps::desktop::Desktop};

/// What one installation flavor installs and in which order.
#[derive(Debug, Clone)]
pub struct InstallProfile {
    pub name: &'static str,
    /// Menu entry.
    pub label: &'static str,
    /// Installed on top of [`BASE_PACKAGES`].
    pub extra_packages: &'static [&'static str],
    /// Enables `lightdm` instead of starting X from the tty1 autologin.
    pub display_manager: bool,
    pub desktop: Desktop,
    pub stages: &'static [StageKind],
}

impl InstallProfile {
    pub fn packages(&self) -> Vec<&'static str> {
        let mut packages = BASE_PACKAGES.to_vec();
        for pkg in self.extra_packages {
            if !packages.contains(pkg) {
                packages.push(*pkg);
            }
        }
        packages
    }
}

pub const BASE_PACKAGES: &[&str] = &[
    "base",
    "base-devel",
    "linux",
    "linux-firmware",
    "linux-headers",
    "networkmanager",
    "git",
    "vim",
    "neovim",
    "curl",
    "wget",
    "htop",
    "btop",
    "man-db",
    "man-pages",
    "openssh",
    "sudo",
    "xorg-server",
    "xorg-xinit",
    "xorg-xrandr",
    "firefox",
    "rofi",
    "fastfetch",
    "pavucontrol",
];

const STANDARD_STAGES: &[StageKind] = &[
    StageKind::Partition,
    StageKind::InstallPackages,
    StageKind::ConfigureSystem,
    StageKind::InstallBootloader,
    StageKind::ProvisionDesktop,
];

pub static PROFILES: [InstallProfile; 3] = [
    InstallProfile {
        name: "beginner",
        label: "Beginner (XFCE desktop - perfect for starters)",
        extra_packages: &[
            "xorg-xset",
            "xfce4",
            "xfce4-goodies",
            "xfce4-session",
            "xfce4-whiskermenu-plugin",
            "thunar",
            "thunar-archive-plugin",
            "file-roller",
            "alacritty",
            "vlc",
            "evince",
            "eog",
            "ripgrep",
            "fd",
            "ttf-iosevka-nerd",
            "ttf-jetbrains-mono-nerd",
        ],
        display_manager: false,
        desktop: Desktop::Xfce,
        stages: STANDARD_STAGES,
    },
    InstallProfile {
        name: "suckless",
        label: "Tony-Suckless (dwm + minimal setup)",
        extra_packages: &[
            "xorg-xsetroot",
            "libx11",
            "libxft",
            "libxinerama",
            "picom",
            "xclip",
            "xwallpaper",
            "ttf-jetbrains-mono-nerd",
            "slock",
            "maim",
            "alsa-utils",
            "pulseaudio",
            "pulseaudio-alsa",
        ],
        display_manager: false,
        desktop: Desktop::Suckless,
        stages: STANDARD_STAGES,
    },
    InstallProfile {
        name: "oxidized",
        label: "Oxidized (OXWM Beta)",
        extra_packages: &[
            "xorg-xsetroot",
            "xorg-xset",
            "libx11",
            "libxft",
            "freetype2",
            "fontconfig",
            "pkg-config",
            "lua",
            "alacritty",
            "vlc",
            "evince",
            "eog",
            "cargo",
            "ttf-iosevka-nerd",
            "ttf-jetbrains-mono-nerd",
            "picom",
            "xclip",
            "xwallpaper",
            "maim",
            "pulseaudio",
            "pulseaudio-alsa",
            "alsa-utils",
            "ripgrep",
            "fd",
            "pcmanfm",
            "lxappearance",
            "papirus-icon-theme",
            "gnome-themes-extra",
        ],
        display_manager: false,
        desktop: Desktop::Oxwm,
        stages: STANDARD_STAGES,
    },
];

pub fn labels() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.label).collect()
}
