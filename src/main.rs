use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use tokio::io::BufReader;

use pinger_client::style::{self, ANSI_RESET_ALL};
use pinger_client::{ClientConfig, ClientResult, JsonLineClient, Session, SessionSettings};

/// Blocking stdin reads may still be parked when the session ends.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(version, about = "Client for a remote fleet-ping service")]
struct Cli {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Server address
    #[arg(short = 's', long, visible_alias = "S", default_value = "127.0.0.1:5555")]
    server: String,

    /// Configuration overlay as inline JSON
    #[arg(long, default_value = "{}")]
    config: String,

    /// Configuration file
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Batch command; omit for interactive mode
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    if cli.print_config {
        match ClientConfig::default().to_pretty_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                log::error!("{e}");
                process::exit(1);
            }
        }
        return;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("can not start runtime: {e}");
            process::exit(1);
        }
    };
    let code = runtime.block_on(serve(&cli));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    process::exit(code);
}

async fn serve(cli: &Cli) -> i32 {
    let (session, color) = match setup(cli).await {
        Ok(setup) => setup,
        Err(e) => {
            log::error!("{e}");
            return 1;
        }
    };

    let interactive = cli.command.is_empty();
    let termination = if interactive {
        session
            .run_interactive(BufReader::new(tokio::io::stdin()))
            .await
    } else {
        session.run_batch(&cli.command).await
    };
    log::debug!("session ended: {termination:?}");

    let mut stdout = std::io::stdout();
    if color {
        let _ = write!(stdout, "{ANSI_RESET_ALL}");
    }
    if interactive {
        let _ = writeln!(stdout, "\nbye");
    }
    let _ = stdout.flush();
    0
}

async fn setup(cli: &Cli) -> ClientResult<(Session, bool)> {
    let config = ClientConfig::load(cli.config_path.as_deref(), &cli.config)?;
    log::debug!("config: {config:?}");

    let client = JsonLineClient::connect(cli.server.as_str()).await?;
    log::debug!("connected to {}", client.address());

    let color = style::color_supported(cli.no_color);
    let mut settings = SessionSettings::new(cli.server.as_str());
    settings.color = color;

    let session = Session::new(Arc::new(client), config, settings, tokio::io::stdout());
    Ok((session, color))
}
