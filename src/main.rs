use anyhow::Result;
use mon2cam::{
    app,
    cli::{handle_monitors_command, Cli, CliCommand, Options},
    config::Config,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Mon2Cam {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Monitors) => {
            handle_monitors_command(cli.verbose).await?;
            return Ok(());
        }
        None => {}
    }

    let config = Config::load()?;
    let options = Options::resolve(&cli, &config);
    let code = app::run(options).await?;

    // Exit directly: a terminal prompt interrupted by Ctrl-C can leave a
    // blocking thread waiting on stdin, which would stall runtime shutdown.
    std::process::exit(code);
}
