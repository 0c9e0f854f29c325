// ports 的具體實作：序列埠、HTTP、收發紀錄

pub mod http;
pub mod message_log;
pub mod scripted;
pub mod serial;

pub use http::HttpApiSink;
pub use message_log::FileMessageLog;
pub use scripted::ScriptedTransport;
pub use serial::SerialTransport;
