use crate::core::queue::{QueueReceiver, QueueSender, Signal};
use crate::core::session::ModemSession;
use crate::domain::model::{CommandStatus, InboundMessage, OutboundMessage, SmsGroup};
use crate::domain::ports::{MessageLog, Transport};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// 分段時附在非最後一段結尾的標記
pub const CONTINUATION_MARKER: &str = "..";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// 等待送出訊號的上限，逾時後照常輪詢收件匣
    pub send_wait: Duration,
    /// 單則簡訊的字元上限
    pub max_message_length: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            send_wait: Duration::from_secs(5),
            max_message_length: 160,
        }
    }
}

/// 一次 dispatch 週期的統計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sent: usize,
    pub failed: usize,
    pub received: usize,
}

/// 唯一持有 ModemSession 的 worker：送出佇列中的簡訊、輪詢收件匣、刪除已處理的簡訊
pub struct DispatchLoop<T: Transport> {
    session: ModemSession<T>,
    outbound: QueueReceiver<OutboundMessage>,
    inbound: QueueSender<InboundMessage>,
    send_signal: Signal,
    receive_signal: Signal,
    message_log: Box<dyn MessageLog>,
    settings: DispatchSettings,
}

impl<T: Transport> DispatchLoop<T> {
    pub fn new(
        session: ModemSession<T>,
        outbound: QueueReceiver<OutboundMessage>,
        inbound: QueueSender<InboundMessage>,
        send_signal: Signal,
        receive_signal: Signal,
        message_log: Box<dyn MessageLog>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            session,
            outbound,
            inbound,
            send_signal,
            receive_signal,
            message_log,
            settings,
        }
    }

    /// 在阻塞執行緒上執行，直到 `cancel` 觸發
    pub fn run(mut self, handle: Handle, cancel: CancellationToken) {
        tracing::info!("📡 Dispatch worker started");

        while !cancel.is_cancelled() {
            let woke = handle.block_on(self.send_signal.wait(self.settings.send_wait));
            if woke {
                tracing::debug!("Dispatch woken by send signal");
            }
            if cancel.is_cancelled() {
                break;
            }
            self.run_cycle();
        }

        tracing::info!("Dispatch worker stopped");
    }

    /// 送出佇列 → 輪詢未讀 → 放入接收佇列 → 刪除已處理
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        while let Some(message) = self.outbound.pop() {
            if self.send(&message) {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        match self.session.receive_sms(SmsGroup::Unread) {
            Ok(messages) => {
                for message in messages {
                    tracing::info!("📥 Received SMS from {}", message.sender);
                    if let Err(e) = self.message_log.record_received(&message) {
                        tracing::warn!("Failed to write message log: {}", e);
                    }
                    if !self.inbound.push(message) {
                        tracing::error!("Receive queue is closed, inbound message dropped");
                        continue;
                    }
                    report.received += 1;
                }
            }
            // 接下來的 AT+CMGD=1,3 會刪掉這批已被標為已讀的簡訊
            Err(e) => tracing::error!(
                "❌ Polling inbound SMS failed, messages listed in this cycle will be deleted without forwarding: {}",
                e
            ),
        }

        let status = self.session.delete_read_sms();
        if !status.is_ok() {
            tracing::warn!("Deleting processed SMS returned {}", status);
        }

        if report.received > 0 {
            self.receive_signal.raise();
        }

        if report.sent + report.failed + report.received > 0 {
            tracing::debug!(
                "Dispatch cycle: sent={}, failed={}, received={}",
                report.sent,
                report.failed,
                report.received
            );
        }
        report
    }

    fn send(&mut self, message: &OutboundMessage) -> bool {
        let parts = split_message(&message.message, self.settings.max_message_length);
        let total = parts.len();

        for (index, part) in parts.into_iter().enumerate() {
            let status = self.session.send_sms(&message.number, &part);

            let record = OutboundMessage::new(message.number.clone(), part);
            if let Err(e) = self.message_log.record_sent(&record, status) {
                tracing::warn!("Failed to write message log: {}", e);
            }

            if status != CommandStatus::Ok {
                tracing::error!(
                    "❌ Error sending SMS to {} (part {}/{}): {}",
                    message.number,
                    index + 1,
                    total,
                    status
                );
                return false;
            }
        }

        tracing::info!("📤 SMS sent to {} ({} part(s))", message.number, total);
        true
    }
}

/// 把過長的內容切成多段；除最後一段外都以 [`CONTINUATION_MARKER`] 結尾，且不超過上限
pub fn split_message(body: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    if limit == 0 || chars.len() <= limit {
        return vec![body.to_string()];
    }

    let marker_len = CONTINUATION_MARKER.chars().count();
    let (step, marker) = if limit > marker_len {
        (limit - marker_len, CONTINUATION_MARKER)
    } else {
        (limit, "")
    };

    let mut parts = Vec::new();
    let mut rest = &chars[..];
    while rest.len() > limit {
        let (head, tail) = rest.split_at(step);
        parts.push(format!("{}{}", head.iter().collect::<String>(), marker));
        rest = tail;
    }
    parts.push(rest.iter().collect());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FileMessageLog, ScriptedTransport};
    use crate::core::channel::ChannelTimings;
    use crate::core::queue::message_queue;
    use tempfile::TempDir;

    #[test]
    fn test_short_message_is_not_split() {
        assert_eq!(split_message("hello", 160), vec!["hello"]);
        assert_eq!(split_message("", 160), vec![""]);
    }

    #[test]
    fn test_long_message_is_split_with_marker() {
        let parts = split_message("abcdefghij", 6);
        assert_eq!(parts, vec!["abcd..", "efghij"]);

        let parts = split_message(&"x".repeat(400), 160);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 160));
        assert!(parts[0].ends_with(".."));
        assert!(!parts[2].ends_with(".."));
        let rejoined: String = parts
            .iter()
            .map(|p| p.trim_end_matches(CONTINUATION_MARKER))
            .collect();
        assert_eq!(rejoined, "x".repeat(400));
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let body = "é".repeat(10);
        let parts = split_message(&body, 5);
        assert!(parts.iter().all(|p| p.chars().count() <= 5));
        assert_eq!(parts.len(), 3);
    }

    struct Harness {
        transport: ScriptedTransport,
        outbound: QueueSender<OutboundMessage>,
        inbound: QueueReceiver<InboundMessage>,
        receive_signal: Signal,
        dispatch: DispatchLoop<ScriptedTransport>,
        log_path: std::path::PathBuf,
        _temp_dir: TempDir,
    }

    fn harness(max_message_length: usize) -> Harness {
        let transport = ScriptedTransport::responsive();
        transport.respond("<CTRL-Z>", "\r\n+CMGS: 1\r\n\r\nOK\r\n");
        transport.respond("AT+CMGD=1,3", "\r\nOK\r\n");

        let timings = ChannelTimings {
            read_timeout: Duration::from_millis(200),
            sync_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            sync_attempts: 1,
            reset_probes: 2,
        };
        let session = ModemSession::with_timings(transport.clone(), timings);

        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("messages.log");
        let (outbound_tx, outbound_rx) = message_queue();
        let (inbound_tx, inbound_rx) = message_queue();
        let receive_signal = Signal::new();

        let dispatch = DispatchLoop::new(
            session,
            outbound_rx,
            inbound_tx,
            Signal::new(),
            receive_signal.clone(),
            Box::new(FileMessageLog::new(&log_path)),
            DispatchSettings {
                send_wait: Duration::from_millis(10),
                max_message_length,
            },
        );

        Harness {
            transport,
            outbound: outbound_tx,
            inbound: inbound_rx,
            receive_signal,
            dispatch,
            log_path,
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_cycle_drains_outbound_in_fifo_order() {
        let mut h = harness(160);
        h.transport.respond("AT+CMGL=\"REC UNREAD\"", "\r\nOK\r\n");
        for i in 0..5 {
            h.transport
                .respond(&format!("AT+CMGS=\"+1555000{}\"", i), "\r\n> ");
            h.outbound
                .push(OutboundMessage::new(format!("+1555000{}", i), format!("msg {}", i)));
        }

        let report = h.dispatch.run_cycle();

        assert_eq!(
            report,
            CycleReport {
                sent: 5,
                failed: 0,
                received: 0
            }
        );
        let numbers = h.transport.written_matching("AT+CMGS=");
        let expected: Vec<String> = (0..5)
            .map(|i| format!("AT+CMGS=\"+1555000{}\"", i))
            .collect();
        assert_eq!(numbers, expected);
        let bodies = h.transport.written_matching("msg ");
        assert_eq!(bodies, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);

        let log = std::fs::read_to_string(&h.log_path).unwrap();
        assert_eq!(log.lines().filter(|l| l.contains(" SEND ")).count(), 5);
    }

    #[test]
    fn test_failed_send_is_not_retried() {
        let mut h = harness(160);
        h.transport.respond("AT+CMGL=\"REC UNREAD\"", "\r\nOK\r\n");
        h.transport.respond("AT+CMGS=\"+10\"", "\r\nERROR\r\n");
        h.transport.respond("AT+CMGS=\"+11\"", "\r\n> ");
        h.outbound.push(OutboundMessage::new("+10", "first"));
        h.outbound.push(OutboundMessage::new("+11", "second"));

        let report = h.dispatch.run_cycle();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);

        let report = h.dispatch.run_cycle();
        assert_eq!(report, CycleReport::default());
        assert_eq!(h.transport.written_matching("AT+CMGS=\"+10\"").len(), 1);
    }

    #[test]
    fn test_long_message_parts_are_sent_back_to_back() {
        let mut h = harness(6);
        h.transport.respond("AT+CMGL=\"REC UNREAD\"", "\r\nOK\r\n");
        h.transport.respond("AT+CMGS=\"+1\"", "\r\n> ");
        h.outbound.push(OutboundMessage::new("+1", "abcdefghij"));

        let report = h.dispatch.run_cycle();

        assert_eq!(report.sent, 1);
        let written = h.transport.written();
        let bodies: Vec<&String> = written
            .iter()
            .filter(|l| l.as_str() == "abcd.." || l.as_str() == "efghij")
            .collect();
        assert_eq!(bodies, vec!["abcd..", "efghij"]);
    }

    #[test]
    fn test_inbound_messages_are_queued_logged_and_deleted() {
        let mut h = harness(160);
        h.transport.respond(
            "AT+CMGL=\"REC UNREAD\"",
            "\r\n+CMGL: 1,\"REC UNREAD\",\"+15551234567\",,\"23/01/01,12:00:00+00\"\r\nHello\r\n\r\nOK\r\n",
        );
        h.transport.respond("AT+CMGL=\"REC UNREAD\"", "\r\nOK\r\n");

        let report = h.dispatch.run_cycle();

        assert_eq!(report.received, 1);
        let queued = h.inbound.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].sender, "+15551234567");
        assert_eq!(queued[0].body, "Hello");
        assert_eq!(h.transport.written_matching("AT+CMGD=1,3").len(), 1);

        let log = std::fs::read_to_string(&h.log_path).unwrap();
        assert!(log.contains("RECEIVED from=+15551234567"));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        assert!(runtime.block_on(h.receive_signal.wait(Duration::from_millis(50))));

        // 第二次輪詢沒有新簡訊，但仍然刪除
        let report = h.dispatch.run_cycle();
        assert_eq!(report.received, 0);
        assert_eq!(h.transport.written_matching("AT+CMGD=1,3").len(), 2);
    }

    #[test]
    fn test_malformed_listing_does_not_stop_the_cycle() {
        let mut h = harness(160);
        h.transport.respond(
            "AT+CMGL=\"REC UNREAD\"",
            "\r\n+CMGL: 1,\"REC UNREAD\"\r\nHello\r\n\r\nOK\r\n",
        );

        let report = h.dispatch.run_cycle();

        assert_eq!(report.received, 0);
        assert!(h.inbound.is_empty());
        assert_eq!(h.transport.written_matching("AT+CMGD=1,3").len(), 1);
    }
}
