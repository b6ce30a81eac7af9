use blocksync_core::{DocumentLocation, WebdavError};

const DOCUMENT_FILE_NAME: &str = "config.json";

/// Identity of one blocker script: where its state lives locally, where its
/// document lives remotely, which lists it owns and which release is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProfile {
    pub name: String,
    pub key_prefix: String,
    pub remote_folder: String,
    pub file_name: String,
    pub list_names: Vec<String>,
    pub version: String,
}

impl ScriptProfile {
    pub fn new(
        name: impl Into<String>,
        remote_folder: impl Into<String>,
        list_names: &[&str],
        version: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            key_prefix: name.clone(),
            name,
            remote_folder: remote_folder.into(),
            file_name: DOCUMENT_FILE_NAME.to_string(),
            list_names: list_names.iter().map(|n| n.to_string()).collect(),
            version: version.into(),
        }
    }

    pub fn weibo() -> Self {
        Self::new("weibo", "WeiboBlocker", &["keywords", "authors"], "0.8")
    }

    pub fn heybox() -> Self {
        Self::new(
            "heybox",
            "HeyboxBlocker",
            &["keywords", "authors", "blockedIds"],
            "1.2",
        )
    }

    pub fn zhihu() -> Self {
        Self::new(
            "zhihu",
            "ZhihuBlocker",
            &["keywords", "authors", "blockedIds"],
            "0.15",
        )
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "weibo" => Some(Self::weibo()),
            "heybox" | "xiaoheihe" => Some(Self::heybox()),
            "zhihu" => Some(Self::zhihu()),
            _ => None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn has_list(&self, name: &str) -> bool {
        self.list_names.iter().any(|n| n == name)
    }

    pub fn list_key(&self, list: &str) -> String {
        format!("{}.lists.{}", self.key_prefix, list)
    }

    pub fn webdav_key(&self) -> String {
        format!("{}.webdavConfig", self.key_prefix)
    }

    pub fn location(&self, base_url: &str) -> Result<DocumentLocation, WebdavError> {
        DocumentLocation::new(base_url, &self.remote_folder, &self.file_name)
    }
}
