use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay chat !send commands to the routing gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Dispatch one request read from stdin (JSON object with a "message" key) and print the result.
    Dispatch {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Serve the dispatcher over HTTP: POST / with the raw request body.
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8081)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the acknowledgment stub: 200 with an empty body for any POST /.
    Stub {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Bind address (default from config or 0.0.0.0)
        #[arg(long, short)]
        bind: Option<String>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Dispatch { config }) => {
            if let Err(e) = run_dispatch(config).await {
                log::error!("dispatch failed: {}", e);
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Stub { config, bind, port }) => {
            if let Err(e) = run_stub(config, bind, port).await {
                log::error!("stub failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_dispatch(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let dispatcher = lib::dispatch::Dispatcher::from_config(&config)?;
    let mut raw = Vec::new();
    std::io::stdin().read_to_end(&mut raw)?;
    let out = dispatcher.dispatch(&raw).await?;
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", out)?;
    stdout.flush()?;
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.function.port = p;
    }
    log::info!(
        "starting function on {}:{}",
        config.function.bind,
        config.function.port
    );
    lib::server::run_function(config).await
}

async fn run_stub(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    if let Some(b) = bind {
        config.stub.bind = b;
    }
    if let Some(p) = port {
        config.stub.port = p;
    }
    log::info!("starting stub on {}:{}", config.stub.bind, config.stub.port);
    lib::server::run_stub(config).await
}
