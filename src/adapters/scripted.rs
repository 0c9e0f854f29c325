use crate::core::session::CTRL_Z;
use crate::domain::ports::Transport;
use crate::utils::error::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 記憶體內的數據機替身：依寫入的指令回放預先登記的回應
///
/// 每個回應可以拆成多個 chunk，每次輪詢只會看到一個 chunk，
/// 用來模擬分段抵達的序列埠資料。`Clone` 共享同一份狀態，
/// 所以交給 session 之後仍可檢查寫入紀錄。
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    echo: bool,
    replies: HashMap<String, VecDeque<Vec<Vec<u8>>>>,
    rx: VecDeque<Vec<u8>>,
    pending: Vec<u8>,
    written: Vec<String>,
    discarded: usize,
}

impl ScriptedTransport {
    /// 會回顯指令的數據機，與 ATE1 預設行為相同
    pub fn new() -> Self {
        let transport = Self::default();
        transport.state().echo = true;
        transport
    }

    pub fn without_echo() -> Self {
        Self::default()
    }

    /// 對 `AT` 與 `AT+CMGF=1` 回 OK 的數據機
    pub fn responsive() -> Self {
        let transport = Self::new();
        transport.respond("AT", "\r\nOK\r\n");
        transport.respond("AT+CMGF=1", "\r\nOK\r\n");
        transport
    }

    /// 登記指令的回應；同一指令登記多次時依序使用，最後一個會一直重複
    pub fn respond(&self, command: &str, reply: &str) {
        self.respond_chunks(command, &[reply]);
    }

    pub fn respond_chunks(&self, command: &str, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| c.as_bytes().to_vec()).collect();
        self.state()
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(chunks);
    }

    /// 放入未經要求的資料，例如開機訊息或殘留的回顯
    pub fn inject(&self, data: &[u8]) {
        self.state().rx.push_back(data.to_vec());
    }

    /// 所有完整寫入的行，Ctrl-Z 記為 `<CTRL-Z>`
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    pub fn written_matching(&self, prefix: &str) -> Vec<String> {
        self.state()
            .written
            .iter()
            .filter(|line| line.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn discard_count(&self) -> usize {
        self.state().discarded
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScriptState {
    fn complete(&mut self, key: String) {
        let reply = match self.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        if let Some(chunks) = reply {
            if self.echo && key != "<CTRL-Z>" {
                self.rx.push_back(format!("{}\r", key).into_bytes());
            }
            self.rx.extend(chunks);
        }

        self.written.push(key);
    }
}

impl Transport for ScriptedTransport {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        for &byte in data {
            if byte == CTRL_Z {
                if !state.pending.is_empty() {
                    let line = String::from_utf8_lossy(&state.pending).into_owned();
                    state.pending.clear();
                    state.complete(line);
                }
                state.complete("<CTRL-Z>".to_string());
                continue;
            }
            state.pending.push(byte);
            if state.pending.ends_with(b"\r\n") {
                let len = state.pending.len() - 2;
                let line = String::from_utf8_lossy(&state.pending[..len]).into_owned();
                state.pending.clear();
                state.complete(line);
            }
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.state().rx.front().map(Vec::len).unwrap_or(0))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        let Some(chunk) = state.rx.front_mut() else {
            return Ok(0);
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            state.rx.pop_front();
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> Result<()> {
        let mut state = self.state();
        state.rx.clear();
        state.discarded += 1;
        Ok(())
    }
}
