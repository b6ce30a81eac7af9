use std::fmt;

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Downloaded,
    Pushed {
        reason: String,
    },
    PushFailed {
        reason: String,
    },
    UpgradeRequired {
        remote_version: String,
        running_version: String,
    },
    PullFailed {
        status: u16,
    },
}

impl Notice {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notice::PushFailed { .. } | Notice::PullFailed { .. } | Notice::UpgradeRequired { .. }
        )
    }

    pub fn message(&self) -> String {
        match self {
            Notice::Downloaded => "已从 WebDAV 同步最新配置".to_string(),
            Notice::Pushed { reason } => format!("配置已上传到 WebDAV（{reason}）"),
            Notice::PushFailed { reason } => format!("配置上传失败（{reason}）"),
            Notice::UpgradeRequired {
                remote_version,
                running_version,
            } => format!(
                "云端配置由更新的脚本版本 {remote_version} 写入，当前版本 {running_version}，请升级脚本"
            ),
            Notice::PullFailed { status: 0 } => "无法连接 WebDAV 服务器".to_string(),
            Notice::PullFailed { status } => format!("从 WebDAV 拉取配置失败（HTTP {status}）"),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// User-facing sink for sync results.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_failure() {
            warn!(target: "blocksync::notice", "{notice}");
        } else {
            info!(target: "blocksync::notice", "{notice}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_mention_versions() {
        let notice = Notice::UpgradeRequired {
            remote_version: "0.9".into(),
            running_version: "0.8".into(),
        };
        assert!(notice.message().contains("0.9"));
        assert!(notice.message().contains("0.8"));
        assert!(notice.is_failure());
    }

    #[test]
    fn transport_failures_have_their_own_message() {
        assert_eq!(
            Notice::PullFailed { status: 0 }.to_string(),
            "无法连接 WebDAV 服务器"
        );
        assert!(Notice::PullFailed { status: 500 }.message().contains("500"));
        assert!(!Notice::Downloaded.is_failure());
    }
}
