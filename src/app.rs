//! Application Coordinator
//!
//! Wires the capture source, decoders, prompt and tally store into a scan
//! controller, and runs the line-oriented operator console on top of it.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info, warn};

use crate::capture::ReplayCapture;
use crate::config::AppConfig;
use crate::prompt::{
    parse_quantity, PromptOutcome, PromptTicket, QuantityPrompt, MAX_QUICK_VALUES,
};
use crate::scan::ScanController;
use crate::shared::{EventSink, ScanEvent};
use crate::storage::{export_to_dir, ExportOutcome, TallyStore};
use crate::vision::RxingFactory;

/// Resolved file locations for a run
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub database: PathBuf,
    pub export_dir: PathBuf,
    pub frames_dir: PathBuf,
}

/// Commands accepted by the operator console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    List,
    Export,
    Clear,
    Status,
    /// Manual add; `None` asks for the quantity
    Add {
        code: String,
        quantity: Option<NonZeroU32>,
    },
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err(String::new());
        };

        let parsed = match command.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "list" | "ls" => Self::List,
            "export" => Self::Export,
            "clear" => Self::Clear,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            "add" => {
                let code = words
                    .next()
                    .ok_or_else(|| "usage: add <code> <qty|?>".to_string())?
                    .to_string();
                let quantity = match words.next() {
                    None | Some("?") => None,
                    Some(text) => Some(parse_quantity(text).map_err(|e| e.to_string())?),
                };
                Self::Add { code, quantity }
            }
            other => return Err(format!("unknown command '{other}', type help")),
        };

        if words.next().is_some() {
            return Err(format!("too many arguments for '{command}'"));
        }
        Ok(parsed)
    }
}

/// Keys for quick values, by position. `x` stays free for cancel.
const QUICK_KEYS: [u8; MAX_QUICK_VALUES] = *b"abcdefgh";

/// Operator reply while a quantity prompt is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    /// Quick value by position
    Quick(usize),
    Text(String),
    Cancel,
    /// Stop scanning, abandoning the prompt
    Stop,
    /// Leave the console
    Quit,
}

impl PromptReply {
    /// `a`, `b`, `c`... pick a quick value; empty or `x` cancels; `stop` and
    /// `quit` keep their console meaning; anything else is quantity text
    pub fn parse(line: &str, quick_count: usize) -> Self {
        let line = line.trim();
        if line.is_empty() || line.eq_ignore_ascii_case("x") {
            return Self::Cancel;
        }
        match line.to_ascii_lowercase().as_str() {
            "stop" => return Self::Stop,
            "quit" | "exit" | "q" => return Self::Quit,
            _ => {}
        }
        if let [key] = line.as_bytes() {
            if let Some(index) = QUICK_KEYS.iter().position(|k| k == key) {
                if index < quick_count {
                    return Self::Quick(index);
                }
            }
        }
        Self::Text(line.to_string())
    }
}

/// Whether the console keeps reading after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Main application coordinator
pub struct ShelfTallyApp {
    controller: Arc<ScanController>,
    export_dir: PathBuf,
    events: Option<Receiver<ScanEvent>>,
}

impl ShelfTallyApp {
    /// Create a new application coordinator
    pub fn new(config: &AppConfig, paths: &AppPaths) -> Result<Self> {
        let tally = Arc::new(
            TallyStore::open(&paths.database)
                .with_context(|| format!("Failed to open tally at {}", paths.database.display()))?,
        );
        let (tx, events) = unbounded();
        let sink = EventSink::new(tx);

        let capture = Arc::new(ReplayCapture::new(
            paths.frames_dir.clone(),
            Duration::from_millis(config.capture.replay_frame_interval_ms.max(1)),
        ));
        info!("Frames directory: {:?}", capture.dir());
        let prompt = QuantityPrompt::new(config.prompt.quick_values(), sink.clone());

        let controller = ScanController::new(
            config.scan_settings(),
            capture,
            Arc::new(RxingFactory),
            Arc::new(config.layout.to_layout()),
            prompt,
            tally,
            sink,
        );

        Ok(Self::with_controller(controller, paths.export_dir.clone(), events))
    }

    fn with_controller(
        controller: ScanController,
        export_dir: PathBuf,
        events: Receiver<ScanEvent>,
    ) -> Self {
        Self {
            controller: Arc::new(controller),
            export_dir,
            events: Some(events),
        }
    }

    /// Run the interactive console until `quit` or end of input
    pub async fn run_console(mut self) -> Result<()> {
        if let Some(events) = self.events.take() {
            std::thread::Builder::new()
                .name("event-printer".to_string())
                .spawn(move || print_events(events))
                .context("Failed to spawn event printer")?;
        }

        println!("shelf-tally ready. Type help for commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            if let Some(ticket) = self.controller.prompt().pending() {
                if self.answer_prompt(&ticket, &line).await == Flow::Quit {
                    break;
                }
                continue;
            }

            match ConsoleCommand::parse(&line) {
                Ok(ConsoleCommand::Quit) => break,
                Ok(command) => self.dispatch(command, &mut lines).await?,
                Err(message) if message.is_empty() => {}
                Err(message) => println!("{message}"),
            }
        }

        self.controller.stop().await;
        info!("Console closed");
        Ok(())
    }

    async fn answer_prompt(&self, ticket: &PromptTicket, line: &str) -> Flow {
        let prompt = self.controller.prompt();
        match PromptReply::parse(line, prompt.quick_values().len()) {
            PromptReply::Quick(index) => {
                prompt.confirm_quick(ticket.id, index);
            }
            PromptReply::Cancel => {
                prompt.cancel(ticket.id);
            }
            // Rejections are reported through the event stream
            PromptReply::Text(text) => {
                let _ = prompt.submit_text(ticket.id, &text);
            }
            PromptReply::Stop => self.controller.stop().await,
            PromptReply::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    async fn dispatch(
        &self,
        command: ConsoleCommand,
        lines: &mut Lines<BufReader<Stdin>>,
    ) -> Result<()> {
        match command {
            ConsoleCommand::Start if self.controller.is_scanning() => println!("Already scanning"),
            ConsoleCommand::Start => {
                let controller = self.controller.clone();
                // Errors reach the operator as alerts
                tokio::spawn(async move {
                    if let Err(e) = controller.start().await {
                        warn!("Start failed: {}", e);
                    }
                });
            }
            ConsoleCommand::Stop => self.controller.stop().await,
            ConsoleCommand::List => print_tally(self.controller.tally())?,
            ConsoleCommand::Export => {
                report_export(export_to_dir(self.controller.tally(), &self.export_dir)?)
            }
            ConsoleCommand::Clear => {
                println!("Clear all entries? [y/N]");
                let answer = lines.next_line().await?.unwrap_or_default();
                if answer.trim().eq_ignore_ascii_case("y") {
                    let removed = self.controller.tally().clear()?;
                    println!("Cleared {removed} entries");
                } else {
                    println!("Clear aborted");
                }
            }
            ConsoleCommand::Add { code, quantity } => {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    match controller.add_manual(&code, quantity).await {
                        Ok(_) => {}
                        Err(e) => {
                            error!("Manual add failed: {}", e);
                            println!("{}", e.operator_message());
                        }
                    }
                });
            }
            ConsoleCommand::Status => println!("{:?}", self.controller.session().phase()),
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}

fn print_events(events: Receiver<ScanEvent>) {
    for event in events.iter() {
        match event {
            ScanEvent::Status(message) => println!("> {message}"),
            ScanEvent::PromptOpened {
                ticket,
                quick_values,
            } => {
                let quick: Vec<String> = quick_values
                    .iter()
                    .zip(QUICK_KEYS)
                    .map(|(v, key)| format!("[{}] {}", char::from(key), v))
                    .collect();
                println!(
                    "Quantity for {}: {}, type a number, x to cancel, stop to end scanning",
                    ticket.code,
                    quick.join("  ")
                );
            }
            ScanEvent::PromptRejected { message, .. } => println!("  {message}"),
            ScanEvent::PromptClosed {
                outcome: PromptOutcome::Cancelled,
                ticket,
            } => println!("  {} skipped", ticket.code),
            ScanEvent::PromptClosed { .. } => {}
            ScanEvent::TallyChanged { code, added, total } => {
                println!("Added {added} to {code} (total {total})")
            }
            ScanEvent::Alert(message) => println!("! {message}"),
            ScanEvent::Stopped => println!("> Stopped"),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start              start scanning");
    println!("  stop               stop scanning and release the camera");
    println!("  add <code> <qty>   add a quantity by hand (use ? to be asked)");
    println!("  list               show the tally");
    println!("  export             write the tally as CSV");
    println!("  clear              remove every entry");
    println!("  status             show the scanner state");
    println!("  quit               stop and exit");
}

/// Print the tally as an aligned table
pub fn print_tally(tally: &TallyStore) -> Result<()> {
    let entries = tally.get()?;
    if entries.is_empty() {
        println!("Tally is empty");
        return Ok(());
    }
    let width = entries.keys().map(|code| code.chars().count()).max().unwrap_or(0);
    for (code, quantity) in &entries {
        println!("{code:<width$}  {quantity}");
    }
    println!("{} codes, {} items", entries.len(), entries.values().sum::<u64>());
    Ok(())
}

pub fn report_export(outcome: ExportOutcome) {
    match outcome {
        ExportOutcome::Empty => println!("Nothing to export yet"),
        ExportOutcome::Written { path, entries } => {
            println!("Exported {} entries to {}", entries, path.display())
        }
    }
}

/// Open the tally store for one-shot commands
pub fn open_tally(database: &Path) -> Result<TallyStore> {
    TallyStore::open(database)
        .with_context(|| format!("Failed to open tally at {}", database.display()))
}
