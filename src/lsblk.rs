use std::collections::HashMap;

use crate::cmd::{CommandRequest, Executor};

// Names that are never installation targets: loop devices, optical drives,
// compressed swap and the live medium itself.
const EXCLUDED_PREFIXES: [&str; 4] = ["loop", "sr", "zram", "airoot"];

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub name: String,  // sda, nvme0n1
    pub size: String,  // 20G
    pub model: String, // SAMSUNG SSD 870
}

impl Disk {
    /// One-line label shown in the disk menu.
    pub fn label(&self) -> String {
        format!("{} ({}) {}", self.name, self.size, self.model)
            .trim_end()
            .to_string()
    }

    pub fn device(&self) -> String {
        format!("/dev/{}", self.name)
    }

    /// Device path of partition `number`; NVMe-style names ending in a
    /// digit take a `p` separator.
    pub fn partition(&self, number: u8) -> String {
        if self.name.ends_with(|c: char| c.is_ascii_digit()) {
            format!("/dev/{}p{}", self.name, number)
        } else {
            format!("/dev/{}{}", self.name, number)
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Returns every whole disk that can be installed to.
/// An unavailable `lsblk` reads as no disks.
pub fn list_disks(exec: &mut Executor) -> Vec<Disk> {
    let request = CommandRequest::host("lsblk").args([
        "--pairs",
        "--nodeps",
        "--output",
        "NAME,SIZE,TYPE,MODEL",
    ]);
    exec.query(&request)
        .map(|out| parse_disks(&out))
        .unwrap_or_default()
}

fn parse_disks(output: &str) -> Vec<Disk> {
    output
        .lines()
        .filter_map(|line| {
            let m = parse_pairs(line);
            if m.get("TYPE").map(String::as_str) != Some("disk") {
                return None;
            }
            let name = m.get("NAME").cloned().unwrap_or_default();
            if name.is_empty() || EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p)) {
                return None;
            }
            Some(Disk {
                name,
                size: m.get("SIZE").cloned().unwrap_or_default(),
                model: m.get("MODEL").map(|s| s.trim().to_string()).unwrap_or_default(),
            })
        })
        .collect()
}

// ── lsblk --pairs parser ──────────────────────────────────────────────────────
//
// Each line looks like:   NAME="sda" SIZE="20G" TYPE="disk" MODEL="QEMU HARDDISK"

fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].split_whitespace().last().unwrap_or("").to_string();
        rest = &rest[eq + 1..];

        if !rest.starts_with('"') {
            break;
        }
        rest = &rest[1..];

        let Some(close) = rest.find('"') else { break };
        let value = rest[..close].to_string();
        rest = &rest[close + 1..];

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}
