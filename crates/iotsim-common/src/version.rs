//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Shared primitives and utilities for the simulator runtime."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use serde::Serialize;

/// Build metadata reported by `iotsimd version` and at startup.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub semver: String,
    pub profile: String,
    pub git_sha: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
            git_sha: option_env!("IOTSIM_GIT_SHA").unwrap_or("unknown").to_owned(),
        }
    }

    pub fn cli_string(&self) -> String {
        format!("{} ({})", self.semver, self.git_sha)
    }

    pub fn extended(&self) -> String {
        format!(
            "iotsim {}\nprofile: {}\ngit: {}",
            self.semver, self.profile, self.git_sha
        )
    }
}
