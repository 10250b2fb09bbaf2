pub mod bootloader;
pub mod desktop;
pub mod disk;
pub mod network;
pub mod packages;
pub mod partition;
pub mod system;
pub mod uefi;
