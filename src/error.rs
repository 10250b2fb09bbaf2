use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("This installer must be run as root (sudo)")]
    NotRoot,

    #[error("Standard input is not an interactive terminal")]
    NotATerminal,

    #[error("Invalid form definition: {0}")]
    InvalidForm(String),

    #[error("No installable disks were found")]
    NoDisks,

    #[error("No internet connection: {0}")]
    Offline(String),

    #[error("{message} (stage: {stage})")]
    StageFailed { stage: String, message: String },
}

impl From<nix::Error> for InstallerError {
    fn from(err: nix::Error) -> Self {
        InstallerError::Io(std::io::Error::from(err))
    }
}
