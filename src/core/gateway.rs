use crate::app::pipelines::dispatch::{DispatchLoop, DispatchSettings};
use crate::app::pipelines::egress::EgressDelivery;
use crate::app::pipelines::ingress::IngressListener;
use crate::core::queue::{message_queue, Signal};
use crate::core::session::ModemSession;
use crate::domain::ports::{MessageLog, MessageSink, Transport};
use crate::utils::error::{GatewayError, Result};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub dispatch: DispatchSettings,
    /// egress 等待接收訊號的上限
    pub receive_wait: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            receive_wait: Duration::from_secs(10),
        }
    }
}

/// 組合三個 worker：ingress、dispatch、egress
///
/// 兩個佇列與兩個訊號在 `run` 中建立，任一 worker 結束都會取消其餘的 worker。
pub struct Gateway<T, S>
where
    T: Transport + 'static,
    S: MessageSink + 'static,
{
    session: ModemSession<T>,
    sink: S,
    message_log: Box<dyn MessageLog>,
    settings: GatewaySettings,
}

impl<T, S> Gateway<T, S>
where
    T: Transport + 'static,
    S: MessageSink + 'static,
{
    pub fn new(
        session: ModemSession<T>,
        sink: S,
        message_log: Box<dyn MessageLog>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            session,
            sink,
            message_log,
            settings,
        }
    }

    pub async fn run(self, listener: IngressListener, cancel: CancellationToken) -> Result<()> {
        tracing::info!("🚀 Starting SMS gateway workers");

        let (outbound_tx, outbound_rx) = message_queue();
        let (inbound_tx, inbound_rx) = message_queue();
        let send_signal = Signal::new();
        let receive_signal = Signal::new();

        let ingress = {
            let guard = cancel.clone().drop_guard();
            let worker = listener.run(outbound_tx, send_signal.clone(), cancel.clone());
            tokio::spawn(async move {
                worker.await;
                drop(guard);
            })
        };

        let egress = {
            let guard = cancel.clone().drop_guard();
            let worker = EgressDelivery::new(
                self.sink,
                inbound_rx,
                receive_signal.clone(),
                self.settings.receive_wait,
            )
            .run(cancel.clone());
            tokio::spawn(async move {
                worker.await;
                drop(guard);
            })
        };

        let dispatch = {
            let guard = cancel.clone().drop_guard();
            let worker = DispatchLoop::new(
                self.session,
                outbound_rx,
                inbound_tx,
                send_signal,
                receive_signal,
                self.message_log,
                self.settings.dispatch,
            );
            let handle = Handle::current();
            let cancel = cancel.clone();
            // 序列埠 I/O 是阻塞的，放在專用執行緒上
            tokio::task::spawn_blocking(move || {
                worker.run(handle, cancel);
                drop(guard);
            })
        };

        let (ingress, dispatch, egress) = tokio::join!(ingress, dispatch, egress);
        ingress.map_err(worker_failure)?;
        dispatch.map_err(worker_failure)?;
        egress.map_err(worker_failure)?;

        tracing::info!("✅ SMS gateway stopped");
        Ok(())
    }
}

fn worker_failure(e: JoinError) -> GatewayError {
    GatewayError::IoError(std::io::Error::other(format!("worker task failed: {}", e)))
}
