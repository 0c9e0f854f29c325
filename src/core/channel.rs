use crate::core::reader::{Response, ResponseReader, DEFAULT_POLL_INTERVAL};
use crate::domain::model::CommandStatus;
use crate::domain::ports::Transport;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 讀取與同步用的時間參數
#[derive(Debug, Clone)]
pub struct ChannelTimings {
    /// 一般指令等待完整回應的上限
    pub read_timeout: Duration,
    /// 每次 baud 同步探測的上限
    pub sync_timeout: Duration,
    pub poll_interval: Duration,
    /// `retry = false` 時最多嘗試的同步次數
    pub sync_attempts: usize,
    pub reset_probes: usize,
}

impl Default for ChannelTimings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            sync_timeout: Duration::from_secs(5),
            poll_interval: DEFAULT_POLL_INTERVAL,
            sync_attempts: 3,
            reset_probes: 10,
        }
    }
}

/// 在 transport 上送出 AT 指令並把回應歸納為狀態
pub struct CommandChannel<T: Transport> {
    transport: T,
    reader: ResponseReader,
    timings: ChannelTimings,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timings(transport, ChannelTimings::default())
    }

    pub fn with_timings(transport: T, timings: ChannelTimings) -> Self {
        Self {
            transport,
            reader: ResponseReader::new(timings.poll_interval),
            timings,
        }
    }

    pub fn timings(&self) -> &ChannelTimings {
        &self.timings
    }

    /// 寫入一行指令，自動補上 `\r\n`
    pub fn write(&mut self, line: &str) -> CommandStatus {
        tracing::debug!("WRITE: {}", line);
        self.send(format!("{}\r\n", line).as_bytes())
    }

    /// 寫入不帶結尾的文字，用於簡訊內容
    pub fn write_raw(&mut self, text: &str) -> CommandStatus {
        tracing::debug!("WRITE: {:?}", text);
        self.send(text.as_bytes())
    }

    pub fn write_control_byte(&mut self, byte: u8) -> CommandStatus {
        tracing::debug!("WRITE: control byte 0x{:02X}", byte);
        self.send(&[byte])
    }

    fn send(&mut self, data: &[u8]) -> CommandStatus {
        match self.transport.write_bytes(data) {
            Ok(()) => CommandStatus::Ok,
            Err(e) => {
                tracing::warn!("Serial write failed: {}", e);
                CommandStatus::Error
            }
        }
    }

    pub fn read(&mut self, timeout: Duration, stop: Option<&str>) -> Response {
        self.reader.read(&mut self.transport, timeout, stop)
    }

    pub fn read_response(&mut self) -> Response {
        let timeout = self.timings.read_timeout;
        self.read(timeout, None)
    }

    /// 只回傳最新回應的最後狀態
    pub fn read_status(&mut self, context: &str) -> CommandStatus {
        let status = self.read_response().status();
        if !matches!(status, CommandStatus::Ok | CommandStatus::Prompt) {
            tracing::debug!("Status {}: {}", status, context);
        }
        status
    }

    /// 寫入指令後讀取狀態；寫入失敗時不再等待回應
    pub fn command(&mut self, line: &str, context: &str) -> CommandStatus {
        match self.write(line) {
            CommandStatus::Ok => self.read_status(context),
            failed => failed,
        }
    }

    /// 反覆送出 `AT` 直到收到 OK
    ///
    /// `retry = true` 時只有 `cancel` 能結束重試；`retry = false` 時最多嘗試
    /// `sync_attempts` 次，回傳最後的非 OK 狀態。
    pub fn sync_baud_rate(&mut self, retry: bool, cancel: &CancellationToken) -> CommandStatus {
        tracing::debug!("Performing baudrate sync, retry={}", retry);
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            self.write("AT");
            let timeout = self.timings.sync_timeout;
            let status = self.read(timeout, None).status();

            if status.is_ok() {
                tracing::debug!("Baudrate sync successful after {} attempt(s)", attempts);
                return status;
            }
            if cancel.is_cancelled() {
                tracing::warn!("Baudrate sync cancelled after {} attempt(s)", attempts);
                return status;
            }
            if !retry && attempts >= self.timings.sync_attempts.max(1) {
                tracing::warn!(
                    "Failure to sync baudrate after {} attempt(s): {}",
                    attempts,
                    status
                );
                return status;
            }
            tracing::debug!("-> Retrying sync ({})", status);
        }
    }

    /// 清掉未讀的位元組，再以 `AT` 探測直到回 OK，容忍上一個 session 殘留的回顯
    pub fn reset_state(&mut self) -> CommandStatus {
        if let Err(e) = self.transport.discard_input() {
            tracing::warn!("Failed to discard pending serial input: {}", e);
        }

        let mut status = CommandStatus::Unknown;
        for _ in 0..self.timings.reset_probes {
            status = self.command("AT", "Reset probe");
            if status.is_ok() {
                break;
            }
        }
        status
    }
}
