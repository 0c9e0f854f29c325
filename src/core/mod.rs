pub mod channel;
pub mod gateway;
pub mod queue;
pub mod reader;
pub mod session;

pub use crate::domain::model::{CommandStatus, InboundMessage, OutboundMessage, SmsGroup};
pub use crate::domain::ports::{MessageLog, MessageSink, Transport};
pub use crate::utils::error::Result;
pub use channel::{ChannelTimings, CommandChannel};
pub use gateway::{Gateway, GatewaySettings};
pub use session::ModemSession;
