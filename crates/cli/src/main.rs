mod export;

use std::sync::Arc;

use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wren_core::catalog::Catalog;
use wren_core::cognition::LocalCalculator;
use wren_core::config::EngineCfg;
use wren_core::{Engine, Session};
use wren_tool::{CalculatorBackend, HttpCalculator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing only when asked for; stdout belongs to the conversation.
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    }

    let cfg = EngineCfg::from_env();
    for (key, value, _) in cfg.to_entries() {
        tracing::debug!(key, value = %value, "config");
    }

    let backend: Arc<dyn CalculatorBackend> = match cfg.calculator_url.as_deref() {
        Some(url) => {
            let http = HttpCalculator::new(url);
            tracing::info!(url = http.base_url(), "remote calculator");
            Arc::new(http)
        }
        None => Arc::new(LocalCalculator),
    };
    let engine = Engine::new(cfg, Catalog::builtin(), backend)?;

    let token = CancellationToken::new();
    let sigint = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            sigint.cancel();
        }
    });

    let mut session = engine.new_session();
    run_repl(&engine, &mut session, token).await?;

    if !session.memory().turns().is_empty() {
        let path = export::write_conversation(&session, std::path::Path::new("."))?;
        println!("Conversation saved to {}", path.display());
    }
    Ok(())
}

async fn run_repl(
    engine: &Engine,
    session: &mut Session,
    token: CancellationToken,
) -> anyhow::Result<()> {
    println!("Wren. Ask about calculations, drinkware or our outlets.");
    println!("Commands: quit, reset, summary, debug");

    let mut prompt = Prompt::spawn("You> ");
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = prompt.next() => event,
        };
        match event {
            InputEvent::Line(line) => match Command::parse(&line) {
                Command::Quit => break,
                Command::Reset => {
                    engine.reset(session);
                    println!("Bot: Conversation reset. New session {}.", session.id());
                }
                Command::Summary => {
                    println!("{}", serde_json::to_string_pretty(&engine.summary(session))?);
                }
                Command::Debug => {
                    println!("{}", serde_json::to_string_pretty(&engine.debug_summary(session))?);
                }
                Command::Say(text) => {
                    let reply = tokio::select! {
                        _ = token.cancelled() => break,
                        reply = engine.process_input(session, &text) => reply,
                    };
                    println!("Bot: {reply}");
                }
            },
            InputEvent::Interrupted => {
                token.cancel();
                break;
            }
            InputEvent::Eof => break,
            InputEvent::Error(err) => {
                eprintln!("input error: {err}");
                break;
            }
        }
    }
    println!();
    Ok(())
}

enum Command {
    Quit,
    Reset,
    Summary,
    Debug,
    Say(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim().to_lowercase().as_str() {
            "quit" | "exit" | "/q" | "/quit" | "/exit" => Self::Quit,
            "reset" => Self::Reset,
            "summary" => Self::Summary,
            "debug" => Self::Debug,
            _ => Self::Say(line.to_owned()),
        }
    }
}

#[derive(Debug, PartialEq)]
enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

impl InputEvent {
    fn from_readline(read: Result<String, ReadlineError>) -> Self {
        match read {
            Ok(line) => Self::Line(line),
            Err(ReadlineError::Interrupted) => Self::Interrupted,
            Err(ReadlineError::Eof) => Self::Eof,
            Err(e) => Self::Error(e.to_string()),
        }
    }

    fn ends_input(&self) -> bool {
        !matches!(self, Self::Line(_))
    }
}

/// Line editor on its own thread. Reads one line per `next` call, so the
/// terminal is free while a turn is being processed.
struct Prompt {
    lines: mpsc::UnboundedReceiver<InputEvent>,
    wants: std::sync::mpsc::Sender<()>,
}

impl Prompt {
    fn spawn(prompt: &'static str) -> Self {
        let (line_tx, lines) = mpsc::unbounded_channel();
        let (wants, want_rx) = std::sync::mpsc::channel::<()>();
        std::thread::spawn(move || {
            let mut editor = match rustyline::DefaultEditor::new() {
                Ok(editor) => editor,
                Err(e) => {
                    let _ = line_tx.send(InputEvent::Error(e.to_string()));
                    return;
                }
            };
            while want_rx.recv().is_ok() {
                let event = InputEvent::from_readline(editor.readline(prompt));
                if let InputEvent::Line(line) = &event
                    && !line.trim().is_empty()
                {
                    let _ = editor.add_history_entry(line.as_str());
                }
                let last = event.ends_input();
                if line_tx.send(event).is_err() || last {
                    break;
                }
            }
        });
        Self { lines, wants }
    }

    async fn next(&mut self) -> InputEvent {
        if self.wants.send(()).is_err() {
            return InputEvent::Eof;
        }
        self.lines.recv().await.unwrap_or(InputEvent::Eof)
    }
}
