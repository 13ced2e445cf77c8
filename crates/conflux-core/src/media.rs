//! File download policy and side-payload notices.

use regex::Regex;
use tracing::{debug, warn};

use crate::message::{Message, Payload};

/// Username used for notices the relay itself authors.
pub const SYSTEM_NOTICE_USERNAME: &str = "<system> ";

/// Why a file was not downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRejection {
    /// The file name matched a blacklist entry.
    Blacklisted {
        /// The pattern that matched.
        pattern: String,
    },
    /// The file is larger than the configured limit.
    TooLarge {
        /// Declared size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },
}

impl std::fmt::Display for MediaRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blacklisted { pattern } => write!(f, "matching blacklist {pattern}"),
            Self::TooLarge { size, limit } => {
                write!(f, "too large to download ({size} > {limit})")
            }
        }
    }
}

/// Decides whether an inbound file may be downloaded.
pub trait MediaPolicy: Send + Sync {
    /// Checks a file by name and declared size.
    fn check(&self, name: &str, size: u64) -> Result<(), MediaRejection>;
}

/// Size limit plus name blacklist.
#[derive(Debug, Clone)]
pub struct SizePolicy {
    max_size: u64,
    blacklist: Vec<Regex>,
}

impl SizePolicy {
    /// Creates a policy. Blacklist entries that are empty or fail to compile
    /// are logged and ignored.
    pub fn new(max_size: u64, blacklist: &[String]) -> Self {
        let blacklist = blacklist
            .iter()
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match Regex::new(entry) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %entry, error = %e, "Ignoring invalid media blacklist entry");
                    None
                }
            })
            .collect();
        Self {
            max_size,
            blacklist,
        }
    }

    /// Returns the size limit in bytes.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

impl MediaPolicy for SizePolicy {
    fn check(&self, name: &str, size: u64) -> Result<(), MediaRejection> {
        if let Some(re) = self.blacklist.iter().find(|re| re.is_match(name)) {
            return Err(MediaRejection::Blacklisted {
                pattern: re.as_str().to_string(),
            });
        }
        debug!(file = %name, size, "Trying to download file");
        if size > self.max_size {
            return Err(MediaRejection::TooLarge {
                size,
                limit: self.max_size,
            });
        }
        Ok(())
    }
}

/// Builds the notice messages for side payloads that cannot be delivered as
/// such, one per too-large file.
pub fn side_payload_notices(msg: &Message) -> Vec<Message> {
    msg.extra
        .iter()
        .filter_map(|payload| match payload {
            Payload::FileTooLarge(failure) => Some(Message {
                text: format!(
                    "file {} too big to download ({} > allowed size: {})",
                    failure.name, failure.size, failure.limit
                ),
                username: SYSTEM_NOTICE_USERNAME.to_string(),
                channel: msg.channel.clone(),
                account: msg.account.clone(),
                ..Default::default()
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{FileFailure, FileInfo};

    #[test]
    fn test_blacklist_wins_over_size() {
        let policy = SizePolicy::new(10, &[r"\.exe$".to_string(), String::new()]);
        assert_eq!(
            policy.check("setup.exe", 1),
            Err(MediaRejection::Blacklisted {
                pattern: r"\.exe$".to_string()
            })
        );
        assert!(policy.check("cat.png", 10).is_ok());
        assert_eq!(
            policy.check("cat.png", 11),
            Err(MediaRejection::TooLarge { size: 11, limit: 10 })
        );
    }

    #[test]
    fn test_invalid_blacklist_entry_ignored() {
        let policy = SizePolicy::new(100, &["(".to_string()]);
        assert!(policy.check("(", 1).is_ok());
    }

    #[test]
    fn test_notices_only_for_too_large_files() {
        let msg = Message {
            channel: "general".into(),
            account: "slack.work".into(),
            extra: vec![
                Payload::File(FileInfo::default()),
                Payload::FileTooLarge(FileFailure {
                    name: "big.mov".into(),
                    size: 2000,
                    limit: 1000,
                    comment: String::new(),
                }),
            ],
            ..Default::default()
        };
        let notices = side_payload_notices(&msg);
        assert_eq!(notices.len(), 1);
        assert_eq!(
            notices[0].text,
            "file big.mov too big to download (2000 > allowed size: 1000)"
        );
        assert_eq!(notices[0].username, SYSTEM_NOTICE_USERNAME);
        assert_eq!(notices[0].channel, "general");
    }
}
