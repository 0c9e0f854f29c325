use crate::domain::model::{CommandStatus, InboundMessage, OutboundMessage};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 位元組層級的序列埠介面；只有 dispatch 執行緒會持有
pub trait Transport: Send {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;
    /// 非阻塞，回傳目前可讀的位元組數
    fn bytes_available(&mut self) -> Result<usize>;
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn discard_input(&mut self) -> Result<()>;
}

/// 收到的簡訊最終送往的外部系統
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &InboundMessage) -> Result<()>;
}

/// 追加式的收發紀錄，與 tracing 日誌分開
pub trait MessageLog: Send {
    fn record_sent(&mut self, message: &OutboundMessage, status: CommandStatus) -> Result<()>;
    fn record_received(&mut self, message: &InboundMessage) -> Result<()>;
}
