use adrest::config::parse_log_level;
use adrest::{Config, Server};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = adrest::config::CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        parse_log_level(&args.log_level)
    };

    FmtSubscriber::builder().with_max_level(log_level).init();

    let config = Config::from_cli_args(args)?;

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
