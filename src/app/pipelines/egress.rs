use crate::core::queue::{QueueReceiver, Signal};
use crate::domain::model::InboundMessage;
use crate::domain::ports::MessageSink;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// 把收到的簡訊轉送到外部 API；失敗只記錄，不重送
pub struct EgressDelivery<S: MessageSink> {
    sink: S,
    inbound: QueueReceiver<InboundMessage>,
    receive_signal: Signal,
    receive_wait: Duration,
}

impl<S: MessageSink> EgressDelivery<S> {
    pub fn new(
        sink: S,
        inbound: QueueReceiver<InboundMessage>,
        receive_signal: Signal,
        receive_wait: Duration,
    ) -> Self {
        Self {
            sink,
            inbound,
            receive_signal,
            receive_wait,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("🌐 Egress worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.receive_signal.wait(self.receive_wait) => {}
            }
            self.drain_once().await;
        }

        tracing::info!("Egress worker stopped");
    }

    /// 依 FIFO 順序送出目前佇列中的所有簡訊
    pub async fn drain_once(&mut self) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        while let Some(message) = self.inbound.pop() {
            match self.sink.deliver(&message).await {
                Ok(()) => {
                    tracing::info!("✅ Delivered SMS from {} to API", message.sender);
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::error!("❌ Error posting SMS from {}: {}", message.sender, e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
