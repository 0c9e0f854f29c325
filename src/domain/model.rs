use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 每一次讀取最終都歸納為其中一種狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandStatus {
    Ok,
    Prompt,
    Timeout,
    Error,
    ErrorSimPuk,
    Unknown,
}

impl CommandStatus {
    /// 由回應的最後一個 token 判斷狀態
    pub fn from_token(token: &str) -> Self {
        match token {
            "OK" => CommandStatus::Ok,
            "ERROR" => CommandStatus::Error,
            t if t.trim_end() == ">" => CommandStatus::Prompt,
            t if t.starts_with("+CME ERROR") || t.starts_with("+CMS ERROR") => {
                CommandStatus::Error
            }
            _ => CommandStatus::Unknown,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandStatus::Ok)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandStatus::Ok => "OK",
            CommandStatus::Prompt => "PROMPT",
            CommandStatus::Timeout => "TIMEOUT",
            CommandStatus::Error => "ERROR",
            CommandStatus::ErrorSimPuk => "ERROR_SIM_PUK",
            CommandStatus::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// AT+CMGL 使用的簡訊分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmsGroup {
    #[default]
    Unread,
    Read,
    StoredUnsent,
    StoredSent,
    All,
}

impl SmsGroup {
    pub fn as_at_str(&self) -> &'static str {
        match self {
            SmsGroup::Unread => "REC UNREAD",
            SmsGroup::Read => "REC READ",
            SmsGroup::StoredUnsent => "STO UNSENT",
            SmsGroup::StoredSent => "STO SENT",
            SmsGroup::All => "ALL",
        }
    }
}

impl fmt::Display for SmsGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_at_str())
    }
}

impl FromStr for SmsGroup {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unread" | "rec unread" => Ok(SmsGroup::Unread),
            "read" | "rec read" => Ok(SmsGroup::Read),
            "unsent" | "sto unsent" => Ok(SmsGroup::StoredUnsent),
            "sent" | "sto sent" => Ok(SmsGroup::StoredSent),
            "all" => Ok(SmsGroup::All),
            other => Err(format!(
                "unknown SMS group '{}', expected one of: unread, read, unsent, sent, all",
                other
            )),
        }
    }
}

/// 從 TCP 客戶端收到、等待送出的簡訊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub number: String,
    pub message: String,
}

impl OutboundMessage {
    pub fn new(number: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            message: message.into(),
        }
    }
}

/// 從數據機讀出、等待轉送到 API 的簡訊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub sender: String,
    pub date: String,
    pub time: String,
    pub body: String,
}
