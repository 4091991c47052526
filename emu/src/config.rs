use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};

use b33arch::parse_address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hooks::dump::DumpEntry;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to open config {0}: {1}")]
    Open(String, #[source] io::Error),
    #[error("Invalid config {0}: {1}")]
    Parse(String, #[source] serde_yaml::Error),
}

/// Address written in YAML as an integer or as `$4000`, `0x4000` or `&H4000` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "AddrRepr", into = "u16")]
pub struct Addr(pub u16);

#[derive(Deserialize)]
#[serde(untagged)]
enum AddrRepr {
    Num(u16),
    Text(String),
}

impl TryFrom<AddrRepr> for Addr {
    type Error = String;

    fn try_from(repr: AddrRepr) -> Result<Self, Self::Error> {
        match repr {
            AddrRepr::Num(n) => Ok(Addr(n)),
            AddrRepr::Text(s) => parse_address(&s).map(Addr),
        }
    }
}

impl From<Addr> for u16 {
    fn from(addr: Addr) -> u16 {
        addr.0
    }
}

/// Emulator run settings, read from YAML.
///
/// ```yaml
/// speed: 0
/// breakpoints: [$4010]
/// store_breakpoints: [$E000]
/// keys: "hello\n"
/// timeout_secs: 5
/// dump:
///   $4003: { stack: true, memory: [$2000, $2001] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmuConfig {
    /// Milliseconds per instruction; 0 runs unthrottled.
    pub speed: u64,
    pub breakpoints: Vec<Addr>,
    pub store_breakpoints: Vec<Addr>,
    /// Typed into the keyboard buffer before the program starts.
    pub keys: Option<String>,
    pub timeout_secs: Option<u64>,
    pub dump: HashMap<Addr, DumpEntry>,
}

impl EmuConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|e| ConfigError::Open(path.to_string(), e))?;
        serde_yaml::from_reader(BufReader::new(file))
            .map_err(|e| ConfigError::Parse(path.to_string(), e))
    }

    /// Dump entries keyed by plain address.
    pub fn dump_list(&self) -> HashMap<u16, DumpEntry> {
        self.dump.iter().map(|(a, e)| (a.0, e.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        assert_eq!(EmuConfig::from_yaml("{}").unwrap(), EmuConfig::default());
    }

    #[test]
    fn full_config() {
        let cfg = EmuConfig::from_yaml(
            r#"
speed: 5
breakpoints: [16400, "$4010"]
store_breakpoints: ["0xE000"]
keys: "hi"
timeout_secs: 3
dump:
  "$4003":
    stack: true
    memory: ["$2000", 8193]
  16384: {}
"#,
        )
        .unwrap();
        assert_eq!(cfg.speed, 5);
        assert_eq!(cfg.breakpoints, vec![Addr(0x4010), Addr(0x4010)]);
        assert_eq!(cfg.store_breakpoints, vec![Addr(0xE000)]);
        assert_eq!(cfg.keys.as_deref(), Some("hi"));
        assert_eq!(cfg.timeout_secs, Some(3));

        let list = cfg.dump_list();
        let entry = &list[&0x4003];
        assert!(entry.registers && entry.stack);
        assert_eq!(entry.memory, vec![Addr(0x2000), Addr(0x2001)]);
        assert_eq!(list[&0x4000], DumpEntry::default());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(EmuConfig::from_yaml("speeed: 1").is_err());
        assert!(EmuConfig::from_yaml("breakpoints: [\"start\"]").is_err());
        assert!(EmuConfig::from_yaml("breakpoints: [70000]").is_err());
    }
}
