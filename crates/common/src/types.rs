use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a client install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identity previously rendered with `to_string`.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Windows,
    Mac,
    Linux,
    #[default]
    Unknown,
}

impl PlatformFamily {
    /// Map a `std::env::consts::OS` style string onto a family.
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "macos" | "ios" => Self::Mac,
            "linux" | "android" | "freebsd" | "openbsd" | "netbsd" => Self::Linux,
            _ => Self::Unknown,
        }
    }
}

/// Result of the startup system probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    pub platform: PlatformFamily,
    /// Whether specialized hardware (e.g. a dedicated input device) was found.
    pub specialized_hardware: bool,
}
