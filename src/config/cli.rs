use crate::domain::model::SmsGroup;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "sms-gateway")]
#[command(about = "Bridge a GSM modem to a JSON-over-TCP intake and an HTTP API")]
pub struct CliConfig {
    #[arg(long, default_value = "gateway.toml", help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// 啟動 gateway（預設）
    Serve,
    /// 直接送出一則簡訊
    Send {
        #[arg(long)]
        number: String,
        #[arg(long)]
        message: String,
    },
    /// 列出數據機中的簡訊，不刪除
    Inbox {
        #[arg(long, default_value = "unread")]
        group: SmsGroup,
    },
    /// 查詢 SIM 狀態
    SimStatus,
    /// 重新啟動數據機
    Reboot,
}

impl CliConfig {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = CliConfig::try_parse_from(["sms-gateway"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("gateway.toml"));
        assert!(!cli.verbose);
        assert!(matches!(cli.command(), Command::Serve));
    }

    #[test]
    fn test_send_subcommand() {
        let cli = CliConfig::try_parse_from([
            "sms-gateway",
            "--config",
            "/etc/sms.toml",
            "-v",
            "send",
            "--number",
            "+15551234567",
            "--message",
            "hello",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/sms.toml"));
        match cli.command() {
            Command::Send { number, message } => {
                assert_eq!(number, "+15551234567");
                assert_eq!(message, "hello");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_inbox_group_parsing() {
        let cli = CliConfig::try_parse_from(["sms-gateway", "inbox"]).unwrap();
        assert!(matches!(
            cli.command(),
            Command::Inbox {
                group: SmsGroup::Unread
            }
        ));

        let cli = CliConfig::try_parse_from(["sms-gateway", "inbox", "--group", "all"]).unwrap();
        assert!(matches!(
            cli.command(),
            Command::Inbox {
                group: SmsGroup::All
            }
        ));

        assert!(CliConfig::try_parse_from(["sms-gateway", "inbox", "--group", "spam"]).is_err());
    }
}
