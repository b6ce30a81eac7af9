use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::storage::default_db_path;
use crate::sync::profile::ScriptProfile;

const DEFAULT_PROFILE: &str = "weibo";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonConfig {
    pub profile_name: String,
    pub database_path: PathBuf,
    pub version_override: Option<String>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let profile_name =
            read_string_env("BLOCKSYNC_PROFILE").unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let database_path = match read_string_env("BLOCKSYNC_DB") {
            Some(value) => {
                let home = dirs::home_dir().context("home directory is unavailable")?;
                expand_with_home(&value, &home)
            }
            None => default_db_path().context("cannot locate default state database")?,
        };
        let version_override = read_string_env("BLOCKSYNC_SCRIPT_VERSION");

        Ok(Self {
            profile_name,
            database_path,
            version_override,
        })
    }

    pub fn with_overrides(mut self, profile: Option<String>, database_path: Option<PathBuf>) -> Self {
        if let Some(profile) = profile {
            self.profile_name = profile;
        }
        if let Some(path) = database_path {
            self.database_path = path;
        }
        self
    }

    pub fn script_profile(&self) -> anyhow::Result<ScriptProfile> {
        let profile = ScriptProfile::preset(&self.profile_name).with_context(|| {
            format!(
                "unknown profile {:?} (expected weibo, heybox or zhihu)",
                self.profile_name
            )
        })?;
        Ok(match &self.version_override {
            Some(version) => profile.with_version(version.clone()),
            None => profile,
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
