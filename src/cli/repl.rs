//! Line-oriented chat front-end
//!
//! Each input line is either a prompt or a slash command. Answers are printed
//! as they stream in; Ctrl+C while an answer is streaming or a video is
//! loading cancels it.

use std::{io::Write, path::PathBuf};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    client::{ChatTransport, RelayClient},
    config::ClientConfig,
    error::{Result, VidChatError},
    messages::{ChatMessage, StagedVideo},
    session::ChatSession,
};

const HELP: &str = "\
Commands:
  /video <url>   load a remote video through the relay
  /attach <path> attach a local video file
  /drop          remove the attached video
  /help          show this help
  /quit          exit
Anything else is sent as a prompt. Ctrl+C stops a streaming answer or a video load.";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Prompt(String),
    Video(String),
    Attach(PathBuf),
    Drop,
    Help,
    Quit,
    Empty,
}

impl ReplCommand {
    /// Parse a line of user input
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown commands or missing arguments
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Ok(Self::Prompt(line.to_string()));
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, arg)| (name, arg.trim()));

        let required = |what: &str| {
            if arg.is_empty() {
                Err(VidChatError::Validation(format!("/{name} needs a {what}")))
            } else {
                Ok(arg.to_string())
            }
        };

        match name {
            "video" => required("URL").map(Self::Video),
            "attach" => required("file path").map(|path| Self::Attach(PathBuf::from(path))),
            "drop" => Ok(Self::Drop),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(VidChatError::Validation(format!(
                "Unknown command /{other} (try /help)"
            ))),
        }
    }
}

/// Run the interactive chat until `/quit` or end of input
///
/// # Errors
///
/// Returns an error if the relay client cannot be built or stdin fails
pub async fn run(config: ClientConfig) -> Result<()> {
    let client = RelayClient::new(config.relay_url.clone())?;
    let mut session = ChatSession::new(config.system_instruction);

    println!("vidchat {} - relay at {}", env!("CARGO_PKG_VERSION"), client.base_url());
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker(&session);
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        debug!(?command, "Input");

        match command {
            ReplCommand::Empty => {}
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => break,
            ReplCommand::Drop => match session.clear_staged_video() {
                Some(video) => println!("Removed {}", video.name),
                None => println!("No video attached"),
            },
            ReplCommand::Attach(path) => {
                match StagedVideo::from_file(&path).and_then(|video| {
                    let name = video.name.clone();
                    session.stage_video(video).map(|()| name)
                }) {
                    Ok(name) => println!("Attached {name}"),
                    Err(e) => eprintln!("{e}"),
                }
            }
            ReplCommand::Video(url) => {
                println!("Loading video...");
                let (cancel, watcher) = cancel_on_ctrl_c();
                let result = session.load_video_url(&client, &url, &cancel).await;
                watcher.abort();
                match result {
                    Ok(()) => {
                        if let Some(video) = session.staged_video() {
                            println!("Attached {} ({})", video.name, video.mime_type);
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
            ReplCommand::Prompt(text) => {
                session.set_draft(text);
                ask(&mut session, &client).await;
            }
        }
    }

    Ok(())
}

fn prompt_marker(session: &ChatSession) {
    match session.staged_video() {
        Some(video) => print!("[{}] > ", video.name),
        None => print!("> "),
    }
    let _ = std::io::stdout().flush();
}

/// Send the draft and print the answer as it streams
async fn ask(session: &mut ChatSession, transport: &dyn ChatTransport) {
    let (cancel, watcher) = cancel_on_ctrl_c();

    let mut printed = 0;
    let result = session
        .run_exchange(transport, &cancel, |message| {
            print_delta(message, &mut printed);
        })
        .await;
    watcher.abort();

    match result {
        Ok(()) => {
            println!();
            if let Some(sources) = session.transcript().last().and_then(|m| m.sources.as_ref()) {
                println!("Sources:");
                for (i, source) in sources.iter().enumerate() {
                    println!("  [{}] {} <{}>", i + 1, source.title, source.uri);
                }
            }
        }
        Err(e) => {
            if printed > 0 {
                println!();
            }
            eprintln!("Error: {e}");
        }
    }
}

/// Token cancelled by the next Ctrl+C; abort the handle once the work is done
fn cancel_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    (cancel, watcher)
}

/// Print only the text added since the last update
fn print_delta(message: &ChatMessage, printed: &mut usize) {
    if let Some(delta) = message.text.get(*printed..) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }
    *printed = message.text.len();
}
