use crate::domain::model::CommandStatus;
use crate::domain::ports::Transport;
use std::thread;
use std::time::{Duration, Instant};

/// 回應以其中之一結尾時即視為完整
pub const TERMINATORS: [&str; 3] = ["\r\nOK\r\n", "\r\nERROR\r\n", "> "];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 一次讀取週期的結果
///
/// 完整的回應以 token 形式保存，最後一個 token 決定狀態；逾時或解碼失敗時
/// 只有一個 token，內容是讀到一半的原始文字。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    tokens: Vec<String>,
    status: CommandStatus,
}

impl Response {
    pub fn framed(tokens: Vec<String>) -> Self {
        let status = tokens
            .last()
            .map(|token| CommandStatus::from_token(token))
            .unwrap_or(CommandStatus::Unknown);
        Self { tokens, status }
    }

    pub fn incomplete(raw: String, status: CommandStatus) -> Self {
        Self {
            tokens: vec![raw],
            status,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.tokens.iter().any(|token| token.contains(needle))
    }
}

/// 判斷目前累積的文字是否已構成完整回應
pub fn has_terminator(text: &str, stop: Option<&str>) -> bool {
    let stopped = matches!(stop, Some(s) if !s.is_empty() && text.contains(s));
    stopped || TERMINATORS.iter().any(|term| text.ends_with(term))
}

/// 依換行切分，移除 '\r'，丟棄空字串，保留順序
pub fn tokenize(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.replace('\r', ""))
        .filter(|line| !line.is_empty())
        .collect()
}

/// 以固定間隔輪詢 transport，把位元組組合成完整回應
#[derive(Debug, Clone)]
pub struct ResponseReader {
    poll_interval: Duration,
}

impl Default for ResponseReader {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl ResponseReader {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn read<T: Transport>(
        &self,
        transport: &mut T,
        timeout: Duration,
        stop: Option<&str>,
    ) -> Response {
        let mut raw: Vec<u8> = Vec::new();
        let start = Instant::now();

        loop {
            match self.poll(transport, &mut raw) {
                Ok(true) => match std::str::from_utf8(&raw) {
                    Ok(text) => {
                        if has_terminator(text, stop) {
                            tracing::debug!("READ: {:?}", text);
                            return Response::framed(tokenize(text));
                        }
                    }
                    // 多位元組字元被切成兩段，等下一次輪詢補齊
                    Err(e) if e.error_len().is_none() => {}
                    Err(_) => {
                        let partial = String::from_utf8_lossy(&raw).into_owned();
                        tracing::debug!("READ (undecodable): {:?}", partial);
                        return Response::incomplete(partial, CommandStatus::Error);
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Serial read failed: {}", e);
                    let partial = String::from_utf8_lossy(&raw).into_owned();
                    return Response::incomplete(partial, CommandStatus::Error);
                }
            }

            if start.elapsed() > timeout {
                let partial = String::from_utf8_lossy(&raw).into_owned();
                tracing::debug!("READ (timeout): {:?}", partial);
                return Response::incomplete(partial, CommandStatus::Timeout);
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn poll<T: Transport>(&self, transport: &mut T, raw: &mut Vec<u8>) -> crate::Result<bool> {
        let available = transport.bytes_available()?;
        if available == 0 {
            return Ok(false);
        }
        let mut buf = vec![0u8; available];
        let n = transport.read_bytes(&mut buf)?;
        raw.extend_from_slice(&buf[..n]);
        Ok(n > 0)
    }
}
