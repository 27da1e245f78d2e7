//! Host operating system.

use serde::{Deserialize, Serialize};

/// Operating system family the agent is running on.
///
/// Selects which process-name list of a catalog entry applies and which
/// system-library tree is excluded from executable-path matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Macos,
    Windows,
    Linux,
}

impl HostOs {
    /// OS of the running binary
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::Macos
        } else {
            HostOs::Linux
        }
    }

    /// Lowercase key used in config files
    pub fn as_str(self) -> &'static str {
        match self {
            HostOs::Macos => "macos",
            HostOs::Windows => "windows",
            HostOs::Linux => "linux",
        }
    }

    /// Lowercased prefix of the system-library tree whose executables are
    /// never matched by path (OS shims that share names with app helpers).
    pub fn protected_path_prefix(self) -> Option<&'static str> {
        match self {
            HostOs::Macos => Some("/system/library/"),
            HostOs::Windows => Some("c:\\windows\\system32\\"),
            HostOs::Linux => None,
        }
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_lowercase_keys() {
        let os: HostOs = serde_json::from_str("\"windows\"").unwrap();
        assert_eq!(os, HostOs::Windows);
        assert_eq!(serde_json::to_string(&HostOs::Macos).unwrap(), "\"macos\"");
    }

    #[test]
    fn linux_has_no_protected_tree() {
        assert!(HostOs::Linux.protected_path_prefix().is_none());
        assert_eq!(
            HostOs::Macos.protected_path_prefix(),
            Some("/system/library/")
        );
    }
}
