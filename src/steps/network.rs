use std::time::Duration;

use crate::{
    cmd::{CommandRequest, Executor},
    error::InstallerError,
    menu,
    term::{Echo, Terminal},
    ui::{self, paint, CONTENT_ROW},
};

const MAX_NETWORKS: usize = 20;
const PROBE_HOST: &str = "1.1.1.1";

/// One scanned WiFi network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub ssid: String,
    pub signal: String,
    pub security: String,
}

impl Network {
    pub fn label(&self) -> String {
        let security = if self.security.is_empty() {
            "Open"
        } else {
            self.security.as_str()
        };
        format!("{} ({}%) [{}]", self.ssid, self.signal, security)
    }
}

/// Makes sure the live system can reach the mirrors, walking the operator
/// through a WiFi connection when it cannot. Any failure ends the run.
pub fn ensure_online<T: Terminal>(term: &mut T, exec: &mut Executor) -> Result<(), InstallerError> {
    if is_online(exec) {
        exec.log().info("Internet connection detected");
        return Ok(());
    }

    exec.log().warn("No internet connection, starting WiFi setup");
    ui::show_status(
        term,
        &["No internet connection detected.", "Scanning for WiFi networks..."],
    )?;
    exec.run_best_effort(&CommandRequest::host("nmcli").args(["radio", "wifi", "on"]));
    term.pause(Duration::from_secs(1));

    let networks = scan(exec);
    if networks.is_empty() {
        ui::show_message(term, "No WiFi networks found. Please check your connection.")?;
        return Err(InstallerError::Offline("no WiFi networks found".into()));
    }

    let labels: Vec<String> = networks.iter().map(Network::label).collect();
    let index = match menu::select(term, &labels) {
        Ok(index) => index,
        Err(InstallerError::Cancelled) => {
            ui::show_message(term, "WiFi setup cancelled. Installation requires internet.")?;
            return Err(InstallerError::Cancelled);
        }
        Err(e) => return Err(e),
    };

    connect(term, exec, &networks[index])
}

fn is_online(exec: &mut Executor) -> bool {
    exec.query(&CommandRequest::host("ping").args(["-c", "1", "-W", "2", PROBE_HOST]))
        .is_some()
}

fn scan(exec: &mut Executor) -> Vec<Network> {
    exec.query(&CommandRequest::host("nmcli").args([
        "-t",
        "-f",
        "SSID,SIGNAL,SECURITY",
        "device",
        "wifi",
        "list",
    ]))
    .map(|out| parse_networks(&out))
    .unwrap_or_default()
}

fn connect<T: Terminal>(
    term: &mut T,
    exec: &mut Executor,
    network: &Network,
) -> Result<(), InstallerError> {
    let left = ui::draw_frame(term)?;
    term.move_to(CONTENT_ROW, left)?;
    write!(term, "{}", paint(format!("Connecting to: {}", network.ssid)).white())?;
    term.move_to(CONTENT_ROW + 2, left)?;
    write!(term, "{}", paint("Enter password (leave empty if open): ").white())?;
    term.flush()?;

    let Some(password) = term.read_line(Echo::Hidden)? else {
        return Err(InstallerError::Cancelled);
    };

    ui::show_status(term, &["Connecting..."])?;
    let mut request = CommandRequest::host("nmcli").args(["device", "wifi", "connect", network.ssid.as_str()]);
    if !password.is_empty() {
        request = request.arg("password").secret_arg(password);
    }
    let connected = exec.run(&request);
    term.pause(Duration::from_secs(2));

    if connected && is_online(exec) {
        exec.log().info(format!("Connected to {}", network.ssid));
        ui::show_message(term, "Connected successfully!")?;
        Ok(())
    } else {
        ui::show_message(term, "Connection failed. Please try again.")?;
        Err(InstallerError::Offline(format!("could not connect to {}", network.ssid)))
    }
}

/// Parses `nmcli -t` output: colon-separated fields, with literal colons and
/// backslashes escaped by a backslash.
fn parse_networks(output: &str) -> Vec<Network> {
    output
        .lines()
        .take(MAX_NETWORKS)
        .filter_map(|line| {
            let mut fields = split_terse(line).into_iter();
            let ssid = fields.next().unwrap_or_default();
            if ssid.is_empty() || ssid == "--" {
                return None;
            }
            Some(Network {
                ssid,
                signal: fields.next().unwrap_or_default(),
                security: fields.next().unwrap_or_default(),
            })
        })
        .collect()
}

fn split_terse(line: &str) -> Vec<String> {
    let mut fields = vec![String::new()];
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let (Some(next), Some(field)) = (chars.next(), fields.last_mut()) {
                    field.push(next);
                }
            }
            ':' => fields.push(String::new()),
            _ => {
                if let Some(field) = fields.last_mut() {
                    field.push(c);
                }
            }
        }
    }
    fields
}
