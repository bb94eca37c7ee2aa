//! tapvolt command-line client
//!
//! Connects to the desktop host, authenticates, runs one action, and waits
//! for its outcome.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use tapvolt_engine::{
    ConnectionState, Engine, EngineConfig, EngineObserver, FileIdentity, WsConnector,
};
use tapvolt_protocol::{ErrorCode, ErrorNotice, ExecutionResult, ResultStatus};
use tapvolt_utils::{init_logging, paths, LogConfig, Settings};

use cli::Args;

const LAST_ADDRESS_KEY: &str = "last_address";

/// Session outcomes the main flow waits on.
#[derive(Debug)]
enum SessionEvent {
    Connected,
    AuthSuccess,
    AuthFailure(String),
    Result(ExecutionResult),
    Error(ErrorNotice),
}

struct CliObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EngineObserver for CliObserver {
    fn on_state_change(&mut self, state: ConnectionState, reconnect_attempt: u32) {
        tracing::debug!(%state, attempt = reconnect_attempt, "connection state");
    }

    fn on_connected(&mut self) {
        let _ = self.tx.send(SessionEvent::Connected);
    }

    fn on_auth_success(&mut self) {
        let _ = self.tx.send(SessionEvent::AuthSuccess);
    }

    fn on_auth_failure(&mut self, message: String) {
        let _ = self.tx.send(SessionEvent::AuthFailure(message));
    }

    fn on_action_result(&mut self, result: ExecutionResult) {
        let _ = self.tx.send(SessionEvent::Result(result));
    }

    fn on_error(&mut self, notice: ErrorNotice) {
        let _ = self.tx.send(SessionEvent::Error(notice));
    }

    fn on_warning(&mut self, warning: Option<String>) {
        if let Some(warning) = warning {
            eprintln!("warning: {warning}");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(LogConfig::client()) {
        eprintln!("tapvolt: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("tapvolt: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), String> {
    let mut settings = Settings::load(paths::settings_file()).map_err(|e| e.to_string())?;

    let address = args
        .address
        .clone()
        .or_else(|| settings.get(LAST_ADDRESS_KEY).map(str::to_string))
        .ok_or("no address given and none remembered; pass --address")?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let engine = Engine::spawn(
        EngineConfig::default(),
        Arc::new(WsConnector),
        Arc::new(FileIdentity::new()),
        Box::new(CliObserver { tx: events_tx }),
    );

    engine.connect(&address);
    wait_for(
        &mut events,
        Duration::from_secs(15),
        "connecting",
        |event| matches!(event, SessionEvent::Connected),
    )
    .await?;

    settings.put(LAST_ADDRESS_KEY, address.clone());
    if let Err(e) = settings.save() {
        tracing::warn!(error = %e, "could not persist settings");
    }

    if !engine.authenticate(&args.name).await {
        return Err("authentication could not be sent".to_string());
    }
    wait_for(
        &mut events,
        Duration::from_secs(10),
        "authenticating",
        |event| matches!(event, SessionEvent::AuthSuccess),
    )
    .await?;

    let id = engine
        .send_action(args.action.to_step())
        .await
        .ok_or("action rejected before dispatch")?;
    tracing::info!(action = %id, "action dispatched");

    let event = wait_for(
        &mut events,
        Duration::from_secs(args.wait),
        "waiting for the result",
        |event| matches!(event, SessionEvent::Result(result) if result.id == id),
    )
    .await?;

    engine.disconnect();

    if let SessionEvent::Result(result) = event {
        match result.status {
            ResultStatus::Success => {
                println!("ok: {} ({} ms)", result.id, result.execution_time);
                Ok(())
            }
            ResultStatus::Error => Err(result
                .error
                .unwrap_or_else(|| "action failed on the desktop".to_string())),
        }
    } else {
        Ok(())
    }
}

/// Drains session events until `accept` matches, a fatal event arrives, or
/// `limit` passes.
async fn wait_for<F>(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    limit: Duration,
    what: &str,
    mut accept: F,
) -> Result<SessionEvent, String>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| format!("timed out while {what}"))?
            .ok_or_else(|| format!("engine stopped while {what}"))?;

        if accept(&event) {
            return Ok(event);
        }
        match event {
            SessionEvent::AuthFailure(message) => {
                return Err(format!("authentication rejected: {message}"));
            }
            // a one-shot client gives up on socket failures instead of
            // riding out the reconnect schedule
            SessionEvent::Error(notice) if notice.code == ErrorCode::SocketError => {
                return Err(notice.message);
            }
            other => {
                tracing::debug!(event = ?other, "ignored while {}", what);
            }
        }
    }
}
