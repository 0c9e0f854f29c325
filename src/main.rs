use clap::Parser;
use sms_gateway::adapters::{FileMessageLog, HttpApiSink, SerialTransport};
use sms_gateway::app::pipelines::IngressListener;
use sms_gateway::domain::model::{CommandStatus, SmsGroup};
use sms_gateway::utils::error::ErrorSeverity;
use sms_gateway::utils::{logger, validation::Validate};
use sms_gateway::{CliConfig, Command, Gateway, GatewayConfig, GatewayError, ModemSession, Result};
use tokio_util::sync::CancellationToken;

type SerialSession = ModemSession<SerialTransport>;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting sms-gateway");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(cli).await {
        tracing::error!("❌ sms-gateway failed: {} (Severity: {:?})", e, e.severity());
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: CliConfig) -> Result<()> {
    let config = GatewayConfig::from_file(&cli.config)?;
    config.validate()?;
    tracing::info!("📋 Loaded configuration from {}", cli.config.display());

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(cancel.clone()));

    tracing::info!(
        "🔌 Opening {} at {} baud",
        config.sms.gsm_device,
        config.sms.baud_rate
    );
    let transport = SerialTransport::open(&config.sms.gsm_device, config.sms.baud_rate)?;
    let session = ModemSession::with_timings(transport, config.channel_timings());

    match cli.command() {
        Command::Serve => serve(config, session, cancel).await,
        Command::Send { number, message } => send(session, number, message, cancel).await,
        Command::Inbox { group } => inbox(session, group, cancel).await,
        Command::SimStatus => {
            let status = one_shot(session, cancel, |session| Ok(session.sim_status())).await?;
            println!("📶 SIM status: {}", status);
            Ok(())
        }
        Command::Reboot => {
            let status = one_shot(session, cancel, |session| Ok(session.reboot())).await?;
            expect_ok("AT+CFUN=1,1", status)?;
            println!("🔄 Modem reboot requested");
            Ok(())
        }
    }
}

async fn serve(config: GatewayConfig, session: SerialSession, cancel: CancellationToken) -> Result<()> {
    let pin = config.sms.sim_pin.clone();
    let sync_cancel = cancel.clone();

    let session = blocking(move || {
        let mut session = session;
        expect_ok("AT", session.channel_mut().sync_baud_rate(true, &sync_cancel))?;
        tracing::info!("✅ Modem answered baudrate sync");

        if let Some(pin) = pin {
            let status = session.unlock_sim(&pin, &sync_cancel);
            if status == CommandStatus::ErrorSimPuk {
                tracing::error!("🔒 SIM is PUK locked, operator intervention required");
            }
            expect_ok("AT+CPIN", status)?;
        }
        Ok(session)
    })
    .await?;

    let sink = HttpApiSink::new(
        config.api.url.clone(),
        config.api.user.clone(),
        config.api.password.clone(),
        config.api_timeout(),
    )?;
    let message_log = FileMessageLog::new(&config.sms.message_log);
    let listener = IngressListener::bind(&config.bind_addr()).await?;

    Gateway::new(
        session,
        sink,
        Box::new(message_log),
        config.gateway_settings(),
    )
    .run(listener, cancel)
    .await
}

async fn send(
    session: SerialSession,
    number: String,
    message: String,
    cancel: CancellationToken,
) -> Result<()> {
    sms_gateway::utils::validation::validate_phone_number("number", &number)?;
    let target = number.clone();
    let status = one_shot(session, cancel, move |session| {
        Ok(session.send_sms(&number, &message))
    })
    .await?;
    expect_ok("AT+CMGS", status)?;
    println!("📤 SMS sent to {}", target);
    Ok(())
}

async fn inbox(session: SerialSession, group: SmsGroup, cancel: CancellationToken) -> Result<()> {
    let messages = one_shot(session, cancel, move |session| session.receive_sms(group)).await?;

    println!("📥 {} message(s) in {}", messages.len(), group);
    for message in messages {
        println!(
            "{} {} from {}: {}",
            message.date, message.time, message.sender, message.body
        );
    }
    Ok(())
}

/// 單次指令：先做有上限的 baudrate 同步，再執行 `op`
async fn one_shot<R, F>(session: SerialSession, cancel: CancellationToken, op: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce(&mut SerialSession) -> Result<R> + Send + 'static,
{
    blocking(move || {
        let mut session = session;
        expect_ok("AT", session.channel_mut().sync_baud_rate(false, &cancel))?;
        op(&mut session)
    })
    .await
}

async fn blocking<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GatewayError::IoError(std::io::Error::other(e.to_string())))?
}

fn expect_ok(command: &str, status: CommandStatus) -> Result<()> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(GatewayError::ModemStatus {
            command: command.to_string(),
            status,
        })
    }
}

async fn wait_for_shutdown(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("🛑 Received Ctrl-C, shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
    }
    cancel.cancel();
}
