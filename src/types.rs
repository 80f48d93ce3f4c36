// Small shared enums. Identity types (ArtifactPlacement, Revision) live in
// `primitives.rs`.

use std::fmt;
use std::str::FromStr;

/// The two swappable boot-critical artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Kernel,
    Base,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Kernel => "kernel",
            TargetKind::Base => "base",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kernel" => Ok(TargetKind::Kernel),
            "base" => Ok(TargetKind::Base),
            _ => Err(format!("cannot manage boot state for artifact type {s:?}")),
        }
    }
}

/// Try/commit status shared by the kernel (`kernel_status` boot variable) and
/// the base (`base_status` in the modeenv).
///
/// `Default -> Try` is done by this crate when staging, `Try -> Trying` only by
/// the boot script, and anything `-> Default` by this crate when marking a boot
/// successful (or when re-asserting the current artifact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootStatus {
    /// Nothing pending.
    #[default]
    #[serde(alias = "")]
    Default,
    /// A candidate is staged; the next boot attempts it.
    Try,
    /// The boot script booted the candidate and awaits a verdict.
    Trying,
}

impl BootStatus {
    /// Encoding used in the bootloader's boot variables.
    pub fn as_boot_var(&self) -> &'static str {
        match self {
            BootStatus::Default => "",
            BootStatus::Try => "try",
            BootStatus::Trying => "trying",
        }
    }

    /// Decodes a boot-variable value. Unknown values are rejected rather than
    /// treated as `Default`.
    pub fn from_boot_var(value: &str) -> Result<Self, String> {
        match value {
            "" => Ok(BootStatus::Default),
            "try" => Ok(BootStatus::Try),
            "trying" => Ok(BootStatus::Trying),
            other => Err(format!("unknown boot status {other:?}")),
        }
    }
}

impl fmt::Display for BootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootStatus::Default => f.write_str("default"),
            other => f.write_str(other.as_boot_var()),
        }
    }
}
