// Terminal front end: prints player status and reads commands from stdin.

use anyhow::Result;
use lingocast_core::OrchestratorHandle;
use lingocast_models::{ChannelState, Language, PlayerStatus, StreamKind};
use lingocast_util::validation::validate_language;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start {
        manifest_url: String,
        language: Option<Language>,
    },
    Stop,
    Lang(Language),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start <url> [lang]   translate a live stream
  stop                 end the current session
  lang <code>          language for the next start
  help                 show this message
  quit                 exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => {
            let manifest_url = words.next().unwrap_or_default().to_string();
            let language = words
                .next()
                .map(validate_language)
                .transpose()
                .map_err(|e| e.to_string())?;
            ConsoleCommand::Start {
                manifest_url,
                language,
            }
        }
        "stop" => ConsoleCommand::Stop,
        "lang" => {
            let code = words.next().ok_or("usage: lang <code>")?;
            ConsoleCommand::Lang(validate_language(code).map_err(|e| e.to_string())?)
        }
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(command))
}

/// Human-readable line for a status update, `None` for routine events.
pub fn render_status(status: &PlayerStatus) -> Option<String> {
    let line = match status {
        PlayerStatus::SessionStarted {
            manifest_url,
            language,
            ..
        } => format!(
            "[session] translating {manifest_url} into {}",
            language.label()
        ),
        PlayerStatus::SessionEnded { reason, .. } => format!("[session] ended: {reason}"),
        PlayerStatus::Channel { state } => match state {
            ChannelState::Connecting => "[backend] connecting...".to_string(),
            ChannelState::Open => "[backend] connected".to_string(),
            ChannelState::Closed => "[backend] disconnected".to_string(),
            ChannelState::Idle => return None,
        },
        PlayerStatus::ChannelError { message } => format!("[backend] error: {message}"),
        PlayerStatus::BackendError { message } => format!("[backend] {message}"),
        PlayerStatus::Subtitle { line } => format!("  > {line}"),
        PlayerStatus::FragmentFailed {
            fragment_id,
            message,
        } => format!("[audio] skipped clip #{fragment_id}: {message}"),
        PlayerStatus::FragmentDropped { fragment_id } => {
            format!("[audio] queue full, dropped clip #{fragment_id}")
        }
        PlayerStatus::FragmentStarted { .. } | PlayerStatus::FragmentFinished { .. } => {
            return None
        }
        PlayerStatus::StreamAttached { stream, viewer } => {
            let kind = match stream {
                StreamKind::Adaptive { variants: 0 } => "live playlist".to_string(),
                StreamKind::Adaptive { variants } => format!("adaptive stream, {variants} variants"),
                StreamKind::Direct => "direct media".to_string(),
            };
            match viewer {
                Some(program) => format!("[video] {kind} playing in {program}"),
                None => format!("[video] {kind} (viewer disabled)"),
            }
        }
        PlayerStatus::StreamFailed { message } => format!("[video] {message}"),
        PlayerStatus::Rejected { message } => format!("[error] {message}"),
    };
    Some(line)
}

/// Print every status update until the bus closes.
pub fn spawn_status_printer(mut rx: broadcast::Receiver<PlayerStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(status) => {
                    if let Some(line) = render_status(&status) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Read commands from stdin until `quit`, end of input or Ctrl-C.
pub async fn read_commands(handle: &OrchestratorHandle, mut language: Language) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Start {
                manifest_url,
                language: requested,
            })) => {
                if let Some(requested) = requested {
                    language = requested;
                }
                handle.start(manifest_url, language).await?;
            }
            Ok(Some(ConsoleCommand::Stop)) => handle.stop().await?,
            Ok(Some(ConsoleCommand::Lang(next))) => {
                language = next;
                println!("language set to {} ({})", next.label(), next.code());
            }
            Ok(Some(ConsoleCommand::Help)) => println!("{HELP}"),
            Ok(Some(ConsoleCommand::Quit)) => return Ok(()),
            Err(message) => println!("{message}"),
        }
    }
}
