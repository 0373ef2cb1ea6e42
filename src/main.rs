use std::sync::Arc;

use lifeday_lib::commands::{handle_command, DAEMON_USAGE, USAGE};
use lifeday_lib::state::AppState;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let state = match AppState::load() {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("Failed to load lifeday config: {e}");
            std::process::exit(1);
        }
    };

    match args.first().map(String::as_str) {
        Some("run") => lifeday_lib::run_daemon(state).await,
        Some("help") | Some("--help") | Some("-h") | None => {
            println!(
                "{USAGE}\n  run                      start the daily scheduler and read commands from stdin\n{DAEMON_USAGE}"
            );
        }
        Some(_) => match handle_command(&state, &args).await {
            Ok(output) => println!("{output}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
    }
}
