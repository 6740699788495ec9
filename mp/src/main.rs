use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

use mcast::config::load_settings;
use mcast::logging::{resolve_level, setup_logging};
use mcast::protocol::reply;
use mcast_participant::cli::Cli;
use mcast_participant::participant::{ALREADY_REGISTERED, Status};
use mcast_participant::{ClientError, ControlClient, MessageLog, Participant, ParticipantConfig, Settings, UserCommand};

fn default_log_file(config: &ParticipantConfig) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mcast")
        .join("logs")
        .join(format!("participant-{}.log", config.id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ParticipantConfig::load(&cli.config)
        .with_context(|| format!("Failed to load participant config from {}", cli.config.display()))?;
    let settings: Settings = load_settings(cli.settings.as_ref())?;

    // Logs go to a file so they don't interleave with the prompt
    let level = resolve_level(cli.log_level.as_deref(), settings.log_level.as_deref());
    let log_file = settings.log_file.clone().unwrap_or_else(|| default_log_file(&config));
    setup_logging(level, Some(log_file.as_path())).context("Failed to setup logging")?;
    debug!(?config, ?settings, "main: configuration loaded");

    if MessageLog::ensure_exists(&config.log_path).await? {
        println!("Created message log file {}", config.log_path.display());
    }

    let client = match ControlClient::connect(
        &config.coordinator_host,
        config.coordinator_port,
        settings.participant.response_timeout(),
    )
    .await
    {
        Ok(client) => client,
        Err(ClientError::Rejected(notice)) => {
            println!("{}", notice.yellow());
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to reach coordinator"),
    };
    println!(
        "Connected to coordinator at {}:{}",
        config.coordinator_host, config.coordinator_port
    );
    info!(participant_id = %config.id, "Connected to coordinator");

    let mut participant = Participant::new(config, client);
    run_repl(&mut participant).await
}

async fn run_repl(participant: &mut Participant) -> Result<()> {
    let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;
    println!(
        "Commands: {}, {}, {}, {}, {}, {}",
        "register <port>".yellow(),
        "deregister".yellow(),
        "disconnect".yellow(),
        "reconnect <port>".yellow(),
        "msend <message>".yellow(),
        "quit".yellow()
    );

    loop {
        participant.refresh_status().await;
        let prompt = format!(
            "participant {} [{}]{} ",
            participant.config().id,
            Status(participant.status()),
            ">".bright_green()
        );

        // Readline blocks; keep delivery tasks running meanwhile
        let line = match tokio::task::block_in_place(|| rl.readline(&prompt)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => return Err(eyre::eyre!("Readline error: {}", err)),
        };

        let input = line.trim_start();
        if input.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let command = match UserCommand::parse(input) {
            Ok(command) => command,
            Err(e) => {
                println!("{} {}", "?".yellow(), e);
                continue;
            }
        };
        if command == UserCommand::Quit {
            break;
        }

        match participant.execute(command).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => match e.downcast_ref::<ClientError>() {
                Some(err) if err.is_fatal() => {
                    println!("{} {}", "error:".red(), err);
                    break;
                }
                _ => println!("{} {:#}", "error:".red(), e),
            },
        }
    }

    participant.execute(UserCommand::Quit).await?;
    println!("Goodbye!");
    Ok(())
}

fn print_answer(answer: &str) {
    if reply::is_success(answer) {
        println!("{}", answer.green());
    } else if answer == ALREADY_REGISTERED {
        println!("{}", answer.yellow());
    } else {
        println!("{}", answer.red());
    }
}
