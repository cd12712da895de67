//! Ragchat - terminal chat client for the regulations assistant.
//!
//! This is the entry point for the `ragchat` binary.

mod app;
mod client;
mod markdown;
mod stream;
mod types;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures::{Stream, StreamExt};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ragchat_core::ChatConfig;

use app::{App, ChatMetrics};
use client::ChatClient;
use stream::StreamEvent;
use types::ServiceHealth;

/// Ragchat - terminal chat client for the regulations assistant.
#[derive(Parser, Debug)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Assistant service URL (overrides the config file).
    #[arg(long, env = "RAGCHAT_SERVER")]
    server: Option<String>,

    /// Restrict answers to one top-level category.
    #[arg(long, env = "RAGCHAT_CATEGORY")]
    category: Option<String>,

    /// JSON config file.
    #[arg(long, env = "RAGCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Play an offline demo reply when the service is unreachable.
    ///
    /// Off by default here; the browser client always falls back to the demo
    /// reply on a connection failure.
    #[arg(long, default_value = "false")]
    demo_fallback: bool,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Log file used with --debug.
    #[arg(long, default_value = "ragchat.log")]
    log_file: PathBuf,
}

impl Args {
    /// Load the config file, if any, and apply command-line overrides.
    fn into_config(self) -> anyhow::Result<ChatConfig> {
        let mut config = match &self.config {
            Some(path) => ChatConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ChatConfig::default(),
        };
        if let Some(server) = self.server {
            config.server_url = server;
        }
        if self.category.is_some() {
            config.category_filter = self.category;
        }
        config.demo_fallback |= self.demo_fallback;
        config.validate()?;
        Ok(config)
    }
}

/// Redraw interval while a smooth scroll is running.
const ANIMATION_TICK: Duration = Duration::from_millis(16);
/// Redraw interval while a response is streaming.
const STREAMING_TICK: Duration = Duration::from_millis(80);
/// Redraw interval when idle.
const IDLE_TICK: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The terminal is owned by the UI, so logs go to a file.
    if args.debug {
        let file = File::create(&args.log_file)
            .with_context(|| format!("failed to create {}", args.log_file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("ragchat=debug,ragchat_core=debug,warn")),
            )
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    let config = args.into_config()?;
    let client = ChatClient::new(&config.server_url, config.connect_timeout())?;
    tracing::info!(server = %client.base_url(), demo_fallback = config.demo_fallback, "Starting");

    let (events_tx, events_rx) = mpsc::channel::<StreamEvent>(256);
    let (health_tx, health_rx) = mpsc::channel::<ServiceHealth>(4);
    let health_task = tokio::spawn(poll_health(client.clone(), config.health_interval(), health_tx));

    // Setup terminal with mouse capture enabled
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(Arc::new(client), config, events_tx);
    let result =
        run_event_loop(&mut terminal, &mut app, EventStream::new(), events_rx, health_rx).await;

    // Restore terminal
    health_task.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Probe the service every `interval` until the receiver is gone.
async fn poll_health(client: ChatClient, interval: Duration, tx: mpsc::Sender<ServiceHealth>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let health = match client.health().await {
            Ok(resp) => ServiceHealth::from(&resp),
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                ServiceHealth::Unreachable
            }
        };
        if tx.send(health).await.is_err() {
            return;
        }
    }
}

/// Draw a frame, then let the app react to the new layout.
fn draw<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> anyhow::Result<()> {
    let mut metrics = ChatMetrics::default();
    terminal.draw(|f| metrics = ui::render(f, app))?;
    if app.on_rendered(metrics, Instant::now()) {
        terminal.draw(|f| {
            ui::render(f, app);
        })?;
    }
    Ok(())
}

/// Main event loop.
///
/// Terminal input, session events and health results each have their own
/// branch, so keys stay live while a response streams. The sleep only paces
/// redraws for animations and deferred scrolls. Every pass draws once.
async fn run_event_loop<B, S>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut terminal_events: S,
    mut events_rx: mpsc::Receiver<StreamEvent>,
    mut health_rx: mpsc::Receiver<ServiceHealth>,
) -> anyhow::Result<()>
where
    B: Backend,
    S: Stream<Item = io::Result<Event>> + Unpin,
{
    loop {
        app.tick_animation();
        draw(terminal, app)?;

        let tick_rate = if app.is_animating() {
            ANIMATION_TICK
        } else if app.needs_immediate_redraw() {
            STREAMING_TICK
        } else {
            IDLE_TICK
        };

        tokio::select! {
            biased;

            maybe_event = terminal_events.next() => match maybe_event {
                Some(Ok(evt)) => handle_input(app, evt),
                Some(Err(e)) => tracing::warn!(error = %e, "Terminal event error"),
                None => break,
            },

            Some(event) = events_rx.recv() => {
                app.handle_stream_event(event);
                // Apply whatever else is queued before the next draw.
                while let Ok(event) = events_rx.try_recv() {
                    app.handle_stream_event(event);
                }
            }

            Some(health) = health_rx.recv() => {
                app.set_health(health);
            }

            () = tokio::time::sleep(tick_rate) => {}
        }

        if app.should_quit {
            break;
        }
    }

    app.cancel_streaming();
    Ok(())
}

/// Handle a terminal event.
fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3, Instant::now()),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3, Instant::now()),
            _ => {}
        },
        _ => {}
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let now = Instant::now();
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('c') if ctrl => app.should_quit = true,
        KeyCode::Esc => {
            if app.conversation.is_streaming() {
                app.cancel_streaming();
            } else if app.error_message.is_some() {
                app.clear_error();
            } else {
                app.clear_input();
            }
        }
        KeyCode::Enter => {
            app.submit_input(now);
        }
        KeyCode::PageUp => app.scroll_chat_up(10, now),
        KeyCode::PageDown => app.scroll_chat_down(10, now),
        KeyCode::Up => app.scroll_chat_up(1, now),
        KeyCode::Down => app.scroll_chat_down(1, now),
        KeyCode::End => app.scroll_to_bottom_now(now),
        KeyCode::Char('g') if ctrl => app.scroll_to_bottom_now(now),
        KeyCode::Char('t') if ctrl => app.show_reasoning = !app.show_reasoning,
        KeyCode::Char('k') if ctrl => app.show_context = !app.show_context,
        KeyCode::Char('a') if ctrl => app.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.move_cursor_end(),
        KeyCode::Char('u') if ctrl => app.clear_input(),
        KeyCode::Char('w') if ctrl => {
            // Delete word
            while app.cursor_position > 0 {
                app.delete_char();
                if app.input_before_cursor().ends_with(' ') {
                    break;
                }
            }
        }
        KeyCode::Char(c) if !ctrl => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        _ => {}
    }
}
