use crate::core::queue::{QueueSender, Signal};
use crate::core::session::has_prompt_control;
use crate::domain::model::OutboundMessage;
use crate::utils::error::{GatewayError, Result};
use crate::utils::validation::validate_phone_number;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// 單一請求的大小上限
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct IngressRequest {
    messages: Vec<OutboundMessage>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngressReply {
    pub message: String,
}

/// 接收 JSON 批次簡訊的 TCP 服務，一次只處理一個連線
pub struct IngressListener {
    listener: TcpListener,
}

impl IngressListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(
        self,
        outbound: QueueSender<OutboundMessage>,
        send_signal: Signal,
        cancel: CancellationToken,
    ) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("🔌 Ingress listening on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            tracing::debug!("Connection from {}", peer);
            match handle_connection(stream, &outbound, &send_signal).await {
                Ok(count) => tracing::info!("📨 Queued {} message(s) from {}", count, peer),
                Err(e) => tracing::warn!("⚠️ Dropped request from {}: {}", peer, e),
            }
        }

        tracing::info!("Ingress listener stopped");
    }
}

/// 讀取一個請求、放入送出佇列並回覆確認，回傳排入的數量
pub async fn handle_connection(
    mut stream: TcpStream,
    outbound: &QueueSender<OutboundMessage>,
    send_signal: &Signal,
) -> Result<usize> {
    let request = read_request(&mut stream).await?;

    for message in &request.messages {
        validate_phone_number("number", &message.number).map_err(|e| {
            GatewayError::MalformedIngress {
                message: e.to_string(),
            }
        })?;
        if has_prompt_control(&message.message) {
            return Err(GatewayError::MalformedIngress {
                message: format!("message to {} contains modem control bytes", message.number),
            });
        }
    }

    let count = request.messages.len();
    for message in request.messages {
        outbound.push(message);
    }
    if count > 0 {
        send_signal.raise();
    }

    let reply = IngressReply {
        message: format!("Queued {} message(s)", count),
    };
    stream.write_all(&serde_json::to_vec(&reply)?).await?;
    stream.shutdown().await?;

    Ok(count)
}

/// 讀到可解析的 JSON、連線關閉或超過大小上限為止
async fn read_request(stream: &mut TcpStream) -> Result<IngressRequest> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
            Ok(read) => read?,
            Err(_) => {
                return Err(GatewayError::MalformedIngress {
                    message: "timed out waiting for request".to_string(),
                })
            }
        };
        if n == 0 && data.is_empty() {
            return Err(GatewayError::MalformedIngress {
                message: "connection closed without a request".to_string(),
            });
        }
        data.extend_from_slice(&buf[..n]);

        match serde_json::from_slice::<IngressRequest>(&data) {
            Ok(request) => return Ok(request),
            Err(e) if e.is_eof() && n > 0 && data.len() < MAX_REQUEST_BYTES => continue,
            Err(e) => {
                return Err(GatewayError::MalformedIngress {
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::message_queue;

    async fn exchange(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(payload).await.unwrap();
        let mut reply = Vec::new();
        // 被拒絕的連線可能以 reset 結束
        let _ = client.read_to_end(&mut reply).await;
        reply
    }

    #[tokio::test]
    async fn test_valid_batch_is_queued_and_acknowledged() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut rx) = message_queue();
        let signal = Signal::new();

        let server = {
            let signal = signal.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                handle_connection(stream, &tx, &signal).await
            })
        };

        let reply = exchange(
            addr,
            br#"{"messages":[{"number":"+15550001","message":"one"},{"number":"15550002","message":"two"}]}"#,
        )
        .await;

        assert_eq!(server.await.unwrap().unwrap(), 2);
        let reply: IngressReply = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply.message, "Queued 2 message(s)");
        assert_eq!(
            rx.drain(),
            vec![
                OutboundMessage::new("+15550001", "one"),
                OutboundMessage::new("15550002", "two")
            ]
        );
        assert!(signal.wait(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_raise_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = message_queue();
        let signal = Signal::new();

        let server = {
            let signal = signal.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                handle_connection(stream, &tx, &signal).await
            })
        };

        exchange(addr, br#"{"messages":[]}"#).await;

        assert_eq!(server.await.unwrap().unwrap(), 0);
        assert!(rx.is_empty());
        assert!(!signal.wait(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_rejected_without_queueing() {
        let payloads: [&[u8]; 6] = [
            b"not json at all",
            br#"{"messages":[{"number":"+1555"}]}"#,
            br#"{"msgs":[]}"#,
            br#"{"messages":[{"number":"AT+CFUN=0","message":"x"}]}"#,
            br#"{"messages":[{"number":"+1555","message":"hi\u001aAT+CFUN=1,1\r\n"}]}"#,
            br#"{"messages":[{"number":"+1555","message":"ok"},{"number":"+1556","message":"\u001b"}]}"#,
        ];

        for payload in payloads {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = message_queue();
            let signal = Signal::new();

            let server = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                handle_connection(stream, &tx, &signal).await
            });

            let reply = exchange(addr, payload).await;

            let result = server.await.unwrap();
            assert!(matches!(result, Err(GatewayError::MalformedIngress { .. })));
            assert!(reply.is_empty());
            assert!(rx.is_empty());
        }
    }

    #[tokio::test]
    async fn test_listener_survives_bad_request() {
        let ingress = IngressListener::bind("127.0.0.1:0").await.unwrap();
        let addr = ingress.local_addr().unwrap();
        let (tx, mut rx) = message_queue();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(ingress.run(tx, Signal::new(), cancel.clone()));

        let reply = exchange(addr, b"{broken").await;
        assert!(reply.is_empty());

        let reply = exchange(
            addr,
            br#"{"messages":[{"number":"+15550003","message":"after"}]}"#,
        )
        .await;
        let reply: IngressReply = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply.message, "Queued 1 message(s)");
        assert_eq!(rx.drain().len(), 1);

        cancel.cancel();
        worker.await.unwrap();
    }
}
