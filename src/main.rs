mod app;
mod cli;
mod config;
mod error;
mod form;
mod input;
mod model;
mod secret;
mod ui;

use anyhow::{Context, Result};
use app::{App, AppCommand, AppOptions};
use clap::Parser;
use cli::CliArgs;
use config::ConfigDocument;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use secret::EnvSecretResolver;
use std::fs::File;
use std::io::{self, Stdout, Write};
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args)?;

    let path = args
        .config
        .clone()
        .or_else(config::discover_config_path)
        .context("no lab config found; pass --config or set LABCFG_CONFIG")?;
    let document = ConfigDocument::load(&path)?;

    let mut app = App::new(
        document,
        Box::new(EnvSecretResolver),
        AppOptions {
            bell_on_error: args.bell,
            flat: args.flat,
            start_app: args.app.clone(),
        },
    );

    run(&mut app).await
}

fn init_tracing(args: &CliArgs) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact();

    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(io::sink).try_init();
        }
    }

    Ok(())
}

async fn run(app: &mut App) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App) -> Result<()> {
    let mut reader = EventStream::new();

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        match reader.next().await {
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                if let Some(action) = input::map_key(app.mode(), key) {
                    debug!("action={action:?}");
                    let command = app.apply_action(action);
                    execute_app_command(terminal, app, command)?;
                }
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                app.set_status(format!("terminal event error: {error}"));
            }
            None => {
                app.set_status("terminal event stream closed");
                break;
            }
        }
    }

    info!("session ended");
    Ok(())
}

fn execute_app_command(terminal: &mut TuiTerminal, app: &mut App, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::None => {}
        AppCommand::SaveConfig => {
            let result = app.document().save();
            app.record_save_result(result);
        }
        AppCommand::RingBell => {
            let backend = terminal.backend_mut();
            backend
                .write_all(b"\x07")
                .and_then(|()| backend.flush())
                .context("failed to ring terminal bell")?;
        }
    }
    Ok(())
}
