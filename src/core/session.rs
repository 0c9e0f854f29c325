use crate::core::channel::{ChannelTimings, CommandChannel};
use crate::domain::model::{CommandStatus, InboundMessage, SmsGroup};
use crate::domain::ports::Transport;
use crate::utils::error::{GatewayError, Result};
use tokio_util::sync::CancellationToken;

/// 結束簡訊輸入提示的 Ctrl-Z
pub const CTRL_Z: u8 = 0x1A;

/// 取消簡訊輸入提示的 ESC
pub const ESC: u8 = 0x1B;

/// 內容含有會提早結束或取消輸入提示的控制字元
pub fn has_prompt_control(body: &str) -> bool {
    body.bytes().any(|b| b == CTRL_Z || b == ESC)
}

/// SIM 解鎖完成後數據機主動送出的訊息
pub const READY_BANNER: &str = "SMS Ready";

// AT+CMGL 文字模式標頭以逗號切開後的欄位位置，例如
// +CMGL: 1,"REC UNREAD","+15551234567",,"23/01/01,12:00:00+00"
// [0] +CMGL: <index>  [1] <stat>  [2] <oa>  [3] <alpha>  [4] <scts 日期>  [5] <scts 時間+時區>
// 換韌體時這裡的位置可能不同，必須連同測試一起修改。
pub const CMGL_PREFIX: &str = "+CMGL:";
pub const CMGL_SENDER_FIELD: usize = 2;
pub const CMGL_DATE_FIELD: usize = 4;
pub const CMGL_TIME_FIELD: usize = 5;

/// 建立在 CommandChannel 之上的 GSM 功能：SIM 解鎖、收發與刪除簡訊
pub struct ModemSession<T: Transport> {
    channel: CommandChannel<T>,
}

impl<T: Transport> ModemSession<T> {
    pub fn new(channel: CommandChannel<T>) -> Self {
        Self { channel }
    }

    pub fn with_timings(transport: T, timings: ChannelTimings) -> Self {
        Self::new(CommandChannel::with_timings(transport, timings))
    }

    pub fn channel_mut(&mut self) -> &mut CommandChannel<T> {
        &mut self.channel
    }

    /// 重新啟動數據機，不等待重新連線
    pub fn reboot(&mut self) -> CommandStatus {
        tracing::info!("Rebooting GSM device");
        self.channel.command("AT+CFUN=1,1", "Rebooting")
    }

    pub fn sim_status(&mut self) -> CommandStatus {
        self.channel.reset_state();
        if !self.channel.write("AT+CPIN?").is_ok() {
            return CommandStatus::Error;
        }
        let response = self.channel.read_response();

        let body = response
            .tokens()
            .iter()
            .find(|token| token.starts_with("+CPIN:"));
        match body {
            Some(line) if line.contains("READY") => CommandStatus::Ok,
            Some(line) if line.contains("SIM PUK") => CommandStatus::ErrorSimPuk,
            _ => CommandStatus::Unknown,
        }
    }

    /// 以 PIN 解鎖 SIM
    ///
    /// PIN 被接受後會一直等到數據機送出 [`READY_BANNER`]，只有 `cancel` 能中斷，
    /// 此時回傳 `Timeout`。
    pub fn unlock_sim(&mut self, pin: &str, cancel: &CancellationToken) -> CommandStatus {
        match self.sim_status() {
            CommandStatus::Ok => return CommandStatus::Ok,
            // 在 PUK 鎖定下送 PIN 不會成功，只會消耗剩餘的 PUK 次數，
            // 所以不送 PIN，直接回報 ErrorSimPuk 交給人工處理
            CommandStatus::ErrorSimPuk => {
                tracing::error!("SIM requires a PUK code, refusing to submit the PIN");
                return CommandStatus::ErrorSimPuk;
            }
            _ => {}
        }

        tracing::debug!("Submitting SIM pin");
        let status = self
            .channel
            .command(&format!("AT+CPIN={}", pin), "Setting pin");
        if !status.is_ok() {
            return status;
        }

        tracing::info!("Awaiting '{}' from modem", READY_BANNER);
        loop {
            let timeout = self.channel.timings().read_timeout;
            let response = self.channel.read(timeout, Some(READY_BANNER));
            if response.contains(READY_BANNER) {
                break;
            }
            if cancel.is_cancelled() {
                tracing::warn!("Stopped waiting for '{}'", READY_BANNER);
                return CommandStatus::Timeout;
            }
        }
        tracing::info!("SIM unlocked");
        CommandStatus::Ok
    }

    /// 送出一則文字簡訊，回傳最後狀態
    ///
    /// `AT+CMGS` 必須以輸入提示回應才會寫入內容；不做分段。
    /// 內容含 Ctrl-Z 或 ESC 時不寫入任何東西，回傳 `Error`。
    pub fn send_sms(&mut self, number: &str, message: &str) -> CommandStatus {
        if has_prompt_control(message) {
            tracing::warn!("Refusing SMS to {}: body contains prompt control bytes", number);
            return CommandStatus::Error;
        }

        self.channel.reset_state();
        tracing::debug!("Sending {:?} to {}", message, number);

        let status = self.channel.command("AT+CMGF=1", "Text mode");
        if !status.is_ok() {
            return status;
        }

        let status = self
            .channel
            .command(&format!("AT+CMGS=\"{}\"", number), "Set number");
        if status != CommandStatus::Prompt {
            tracing::debug!("Expected input prompt, got {}", status);
            return if status.is_ok() {
                CommandStatus::Unknown
            } else {
                status
            };
        }

        if !self.channel.write_raw(message).is_ok() {
            return CommandStatus::Error;
        }
        if !self.channel.write_control_byte(CTRL_Z).is_ok() {
            return CommandStatus::Error;
        }
        self.channel.read_status("Sending message")
    }

    /// 列出指定分類的簡訊；標頭格式不符時回傳錯誤而不是略過
    pub fn receive_sms(&mut self, group: SmsGroup) -> Result<Vec<InboundMessage>> {
        self.channel.reset_state();
        tracing::debug!("Scanning {} messages...", group);

        let status = self.channel.command("AT+CMGF=1", "Text mode");
        if !status.is_ok() {
            return Err(GatewayError::ModemStatus {
                command: "AT+CMGF=1".to_string(),
                status,
            });
        }

        let command = format!("AT+CMGL=\"{}\"", group.as_at_str());
        let status = self.channel.write(&command);
        if !status.is_ok() {
            return Err(GatewayError::ModemStatus { command, status });
        }
        let response = self.channel.read_response();
        if !response.status().is_ok() {
            return Err(GatewayError::ModemStatus {
                command,
                status: response.status(),
            });
        }

        parse_listing(response.tokens())
    }

    /// 刪除所有已讀、已送出與未送出的草稿，保留未讀
    pub fn delete_read_sms(&mut self) -> CommandStatus {
        self.channel.reset_state();
        self.channel.command("AT+CMGD=1,3", "Deleting messages")
    }
}

/// 解析 `AT+CMGL` 的 token：回顯、成對的標頭與內容、最後的狀態
pub fn parse_listing(tokens: &[String]) -> Result<Vec<InboundMessage>> {
    if tokens.len() < 2 {
        return Err(GatewayError::MalformedListing {
            message: format!("expected echo and status, got {} token(s)", tokens.len()),
        });
    }

    let start = if tokens[0].starts_with("AT") { 1 } else { 0 };
    let records = &tokens[start..tokens.len() - 1];
    if records.is_empty() {
        tracing::debug!("No messages on SIM");
        return Ok(Vec::new());
    }
    if records.len() % 2 != 0 {
        return Err(GatewayError::MalformedListing {
            message: format!(
                "{} line(s) between echo and status do not form header/body pairs",
                records.len()
            ),
        });
    }

    records
        .chunks(2)
        .map(|pair| parse_header(&pair[0], &pair[1]))
        .collect()
}

fn parse_header(header: &str, body: &str) -> Result<InboundMessage> {
    if !header.starts_with(CMGL_PREFIX) {
        return Err(GatewayError::MalformedListing {
            message: format!("not a {} header: {:?}", CMGL_PREFIX, header),
        });
    }

    let fields: Vec<&str> = header.split(',').collect();
    if fields.len() <= CMGL_TIME_FIELD {
        return Err(GatewayError::MalformedListing {
            message: format!("header has {} field(s): {:?}", fields.len(), header),
        });
    }

    let time_field = fields[CMGL_TIME_FIELD].replace('"', "");
    let time = time_field
        .split(|c: char| c == '+' || c == '-')
        .next()
        .unwrap_or_default()
        .to_string();

    Ok(InboundMessage {
        sender: fields[CMGL_SENDER_FIELD].replace('"', ""),
        date: fields[CMGL_DATE_FIELD].replace('"', ""),
        time,
        body: body.to_string(),
    })
}
