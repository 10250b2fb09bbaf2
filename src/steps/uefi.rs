use std::{fmt, path::Path};

const EFI_FIRMWARE_DIR: &str = "/sys/firmware/efi";

/// Firmware interface the live system was booted with. It decides the
/// partition table, the partition roles and the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Uefi,
    Bios,
}

impl BootMode {
    /// Dry runs always report UEFI so every sub-step is exercised.
    pub fn detect(dry_run: bool) -> Self {
        if dry_run {
            return BootMode::Uefi;
        }
        Self::detect_at(Path::new(EFI_FIRMWARE_DIR))
    }

    fn detect_at(firmware_dir: &Path) -> Self {
        if firmware_dir.exists() {
            BootMode::Uefi
        } else {
            BootMode::Bios
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootMode::Uefi => "UEFI",
            BootMode::Bios => "BIOS",
        })
    }
}
