use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Severity of a cluster log entry. Ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "err" | "error" => Ok(Self::Error),
            other => Err(TypeError::UnknownLogLevel(other.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured entry of the cluster log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub stamp: DateTime<Utc>,
    /// Component that produced the entry.
    pub who: String,
    pub level: LogLevel,
    pub msg: String,
}

impl LogEntry {
    /// Single formatted line: `<stamp> <who> <seq> : [<level>] <msg>`.
    pub fn line(&self) -> String {
        format!(
            "{} {} {} : [{}] {}",
            self.stamp.to_rfc3339(),
            self.who,
            self.seq,
            self.level,
            self.msg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("err".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!(matches!(
            "loud".parse::<LogLevel>(),
            Err(TypeError::UnknownLogLevel(_))
        ));
    }

    #[test]
    fn levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn line_contains_all_fields() {
        let entry = LogEntry {
            seq: 12,
            stamp: DateTime::<Utc>::UNIX_EPOCH,
            who: "cluster.local".into(),
            level: LogLevel::Info,
            msg: "pool created".into(),
        };
        let line = entry.line();
        assert!(line.contains("cluster.local 12"));
        assert!(line.ends_with("[info] pool created"));
    }
}
