//! rota -- inspect and exercise the credentials used by rota-client.
//!
//! Loads the configuration, opens the configured credential store and runs a
//! single command against it:
//!   - `show`, `set`, `clear` operate on the stored credential pair
//!   - `get` sends an authenticated GET to a configured service
//!   - `refresh` forces one refresh episode against a configured service

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use rota_client::config::Config;
use rota_client::{ClientFactory, CredentialPair, FnHooks};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Command {
    Show,
    Set { access: String, refresh: String },
    Clear,
    Get { service: String, path: String },
    Refresh { service: String },
}

struct CliArgs {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("rota {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
            _ => positional.push(arg),
        }
    }

    match parse_command(&positional) {
        Ok(command) => CliArgs {
            config_path,
            command,
        },
        Err(msg) => {
            eprintln!("Error: {msg}");
            eprintln!("Run with --help for usage information.");
            std::process::exit(1);
        }
    }
}

fn parse_command(positional: &[String]) -> Result<Command, String> {
    let words: Vec<&str> = positional.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["show"] => Ok(Command::Show),
        ["set", access, refresh] => Ok(Command::Set {
            access: access.to_string(),
            refresh: refresh.to_string(),
        }),
        ["clear"] => Ok(Command::Clear),
        ["get", service, path] => Ok(Command::Get {
            service: service.to_string(),
            path: path.to_string(),
        }),
        ["refresh", service] => Ok(Command::Refresh {
            service: service.to_string(),
        }),
        [] => Err("missing command".to_string()),
        [cmd, ..] => Err(format!("invalid usage of command `{cmd}`")),
    }
}

fn print_usage() {
    println!(
        "\
rota {version} -- credential tool for rota-client

USAGE:
    rota [OPTIONS] <COMMAND>

COMMANDS:
    show                       Show the stored credentials (redacted)
    set <ACCESS> <REFRESH>     Store a credential pair
    clear                      Remove the stored credentials
    get <SERVICE> <PATH>       Send an authenticated GET and print the body
    refresh <SERVICE>          Force a credential refresh through SERVICE

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: rota.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    ROTA_CONFIG            Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    // Allow ROTA_CONFIG env var as alternative to --config flag
    let config_path = cli
        .config_path
        .or_else(|| std::env::var("ROTA_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("rota.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing(&config);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        backend = %config.storage.backend,
        "Starting rota"
    );

    let hooks = FnHooks::new(|| {
        eprintln!("Session ended: stored credentials were cleared, log in again.");
    });
    let factory = ClientFactory::from_config(&config, Arc::new(hooks))?;

    run(cli.command, &config, &factory).await
}

async fn run(command: Command, config: &Config, factory: &ClientFactory) -> anyhow::Result<()> {
    let store = factory.token_store();

    match command {
        Command::Show => {
            println!("backend: {}", store.backend_name());
            println!("access:  {}", display_token(store.get_access().await?));
            println!("refresh: {}", display_token(store.get_refresh().await?));
        }
        Command::Set { access, refresh } => {
            store.set_pair(&CredentialPair::new(access, refresh)).await?;
            println!("Credentials stored.");
        }
        Command::Clear => {
            store.clear().await?;
            println!("Credentials cleared.");
        }
        Command::Get { service, path } => {
            let client = factory.create_default_client(config.service_url(&service)?)?;
            let response = client.get(&path).await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                anyhow::bail!("{service} answered {status}: {body}");
            }
            println!("{body}");
        }
        Command::Refresh { service } => {
            let client = factory.create_default_client(config.service_url(&service)?)?;
            factory
                .coordinator()
                .refresh(client.refresh_url())
                .await
                .context("refresh failed")?;
            println!("Credentials refreshed.");
        }
    }

    Ok(())
}

fn display_token(token: Option<String>) -> String {
    match token {
        Some(token) => redact(&token),
        None => "<none>".to_string(),
    }
}

/// Keep a short prefix so operators can tell credentials apart.
fn redact(token: &str) -> String {
    let count = token.chars().count();
    if count <= 8 {
        return "*".repeat(count);
    }
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}... ({count} chars)")
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("rota_client={level},rota={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
