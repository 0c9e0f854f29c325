use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// 邊緣觸發的喚醒訊號
///
/// 生產者 `raise` 最多留下一個 permit，消費者醒來時即清除；
/// 只用來縮短閒置輪詢的延遲，不提供互斥。
#[derive(Debug, Clone, Default)]
pub struct Signal {
    notify: Arc<Notify>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// 等待訊號或逾時；回傳是否因訊號而醒來
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}

/// 無界 FIFO 佇列，插入順序即處理順序
pub fn message_queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// 消費端已關閉時回傳 false
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }
}

#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> QueueReceiver<T> {
    pub fn pop(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// 取出目前所有項目
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
