use crate::domain::model::{CommandStatus, InboundMessage, OutboundMessage};
use crate::domain::ports::MessageLog;
use crate::utils::error::Result;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// 純文字、追加式的簡訊收發紀錄
#[derive(Debug, Clone)]
pub struct FileMessageLog {
    path: PathBuf,
}

impl FileMessageLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), line)?;
        Ok(())
    }
}

impl MessageLog for FileMessageLog {
    fn record_sent(&mut self, message: &OutboundMessage, status: CommandStatus) -> Result<()> {
        self.append(&format!(
            "SEND to={} status={} message={:?}",
            message.number, status, message.message
        ))
    }

    fn record_received(&mut self, message: &InboundMessage) -> Result<()> {
        self.append(&format!(
            "RECEIVED from={} at={} {} message={:?}",
            message.sender, message.date, message.time, message.body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_events_are_appended_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut log = FileMessageLog::new(temp_dir.path().join("logs/messages.log"));

        log.record_sent(&OutboundMessage::new("+15550001", "ping"), CommandStatus::Ok)
            .unwrap();
        log.record_received(&InboundMessage {
            sender: "+15550002".to_string(),
            date: "23/01/01".to_string(),
            time: "12:00:00".to_string(),
            body: "pong".to_string(),
        })
        .unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("SEND to=+15550001 status=OK message=\"ping\""));
        assert!(lines[1].ends_with("RECEIVED from=+15550002 at=23/01/01 12:00:00 message=\"pong\""));
    }
}
