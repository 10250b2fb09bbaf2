use std::{fmt, path::PathBuf};

use clap::{Parser, ValueEnum};

use crate::{
    filter::ChoiceSource,
    form::{is_identifier, FieldSpec, FieldValues},
};

const USERNAME: &str = "Username";
const PASSWORD: &str = "Password";
const CONFIRM_PASSWORD: &str = "Confirm Password";
const ROOT_PASSWORD: &str = "Root Password";
const CONFIRM_ROOT_PASSWORD: &str = "Confirm Root Password";
const HOSTNAME: &str = "Hostname";
const KEYBOARD: &str = "Keyboard";
const TIMEZONE: &str = "Timezone";

/// Command-line settings, parsed once in `main` and passed down by reference.
#[derive(Debug, Clone, Parser)]
#[command(name = "tonarchy", version, about = "Guided Arch Linux installer")]
pub struct Config {
    /// Log every command and file write without performing it
    #[arg(long)]
    pub dry_run: bool,

    /// Installation log
    #[arg(long, default_value = "/tmp/tonarchy-install.log")]
    pub log_file: PathBuf,

    /// Mount point of the system being installed
    #[arg(long, default_value = "/mnt")]
    pub target: PathBuf,

    /// Directory holding themes, wallpapers and desktop configuration
    #[arg(long, default_value = "/usr/share/tonarchy")]
    pub assets: PathBuf,

    /// Fuzzy picker used for keyboard layout and timezone
    #[arg(long, default_value = "fzf")]
    pub filter: String,

    /// How the root account's password is chosen
    #[arg(long, value_enum, default_value_t = RootPasswordPolicy::SameAsUser)]
    pub root_password: RootPasswordPolicy,

    /// Assume the live system is already online
    #[arg(long)]
    pub skip_network: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RootPasswordPolicy {
    /// root gets the primary user's password
    SameAsUser,
    /// root's password is asked for separately
    Separate,
}

/// Everything the operator entered in the setup form.
#[derive(Clone, PartialEq, Eq)]
pub struct Answers {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub keyboard: String,
    pub timezone: String,
    /// `None` when root shares the user's password.
    pub root_password: Option<String>,
}

impl Answers {
    /// The setup form, in the order the operator fills it in.
    pub fn fields(policy: RootPasswordPolicy) -> Vec<FieldSpec> {
        let mut fields = vec![
            FieldSpec::text(USERNAME)
                .validate(is_identifier, "Username must be alphanumeric")
                .missing_message("Username is required"),
            FieldSpec::password(PASSWORD),
            FieldSpec::confirm(CONFIRM_PASSWORD),
        ];
        if policy == RootPasswordPolicy::Separate {
            fields.push(FieldSpec::password(ROOT_PASSWORD));
            fields.push(FieldSpec::confirm(CONFIRM_ROOT_PASSWORD));
        }
        fields.extend([
            FieldSpec::text(HOSTNAME)
                .default_value("tonarchy")
                .validate(is_identifier, "Hostname must be alphanumeric"),
            FieldSpec::choice(KEYBOARD, ChoiceSource::keymaps()).default_value("us"),
            FieldSpec::choice(TIMEZONE, ChoiceSource::timezones())
                .missing_message("Timezone is required"),
        ]);
        fields
    }

    pub fn from_values(values: &FieldValues) -> Self {
        let get = |label| values.get(label).unwrap_or_default().to_string();
        Self {
            username: get(USERNAME),
            password: get(PASSWORD),
            hostname: get(HOSTNAME),
            keyboard: get(KEYBOARD),
            timezone: get(TIMEZONE),
            root_password: values.get(ROOT_PASSWORD).map(str::to_string),
        }
    }

    pub fn root_password(&self) -> &str {
        self.root_password.as_deref().unwrap_or(&self.password)
    }
}

impl fmt::Debug for Answers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Answers")
            .field("username", &self.username)
            .field("password", &"********")
            .field("hostname", &self.hostname)
            .field("keyboard", &self.keyboard)
            .field("timezone", &self.timezone)
            .field("root_password", &self.root_password.as_ref().map(|_| "********"))
            .finish()
    }
}
