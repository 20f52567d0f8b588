//! The binary entry point for the bridge session client.
//!
//! Loads `config.ron`, applies CLI overrides, optionally connects straight
//! away, then reads operator commands from stdin until `quit` or Ctrl-C.

mod app;
mod console;
mod settings;

use bridge_config::{CliArgs, Config, default_config_dir};
use bridge_net::{SessionError, parse_direction};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{App, Reload};
use crate::console::{Command, HELP};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let file_config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Using default config: {e}");
            Config::default()
        }
    };

    let auto_connect = match args.auto_connect() {
        Ok(auto_connect) => auto_connect,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let mut app = App::new(args, config_dir, file_config);

    let log_dir = dirs::data_local_dir().map(|d| d.join("bridge-client").join("logs"));
    bridge_log::init_logging(
        log_dir.as_deref(),
        cfg!(debug_assertions),
        Some(&app.effective_config()),
    );
    tracing::info!("Authority at {}", app.client().config().server_addr());

    if let Some(auto) = auto_connect {
        let result = match parse_direction(&auto.direction) {
            Ok(direction) => {
                app.client()
                    .request_connect(direction, auto.velocity, auto.wait_time)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        report(result);
    }

    println!("{HELP}");
    run_console(&mut app).await;

    app.shutdown().await;
    tracing::info!("Bye");
}

async fn run_console(app: &mut App) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("stdin: {e}");
                return;
            }
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(console::ParseError::Empty) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        let client = app.client().clone();
        match command {
            Command::Connect {
                direction,
                properties,
            } => report(
                client
                    .request_connect(
                        direction,
                        i64::from(properties.velocity),
                        i64::from(properties.wait_time),
                    )
                    .await,
            ),
            Command::Change(properties) => report(
                client
                    .request_property_change(
                        i64::from(properties.velocity),
                        i64::from(properties.wait_time),
                    )
                    .await,
            ),
            Command::End => report(client.request_end_session().await),
            Command::Drop => report(client.request_simulated_drop().await),
            Command::Status => println!("{}", console::render_status(&client)),
            Command::Reload => match app.reload().await {
                Ok(Reload::Applied) => println!("reloaded"),
                Ok(Reload::Unchanged) => println!("config unchanged"),
                Ok(Reload::Deferred) => println!("session in progress; end it before reloading"),
                Err(e) => println!("error: {e}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => return,
        }
    }
}

fn report(result: Result<(), SessionError>) {
    match result {
        Ok(()) => println!("ok"),
        Err(e) => println!("error: {e}"),
    }
}
