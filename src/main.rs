use clap::Parser;
use honeypot_gate::{config::ServerArgs, logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = ServerArgs::parse();

    logging::init_process_log(&args.process_log)?;

    server::run(args).await
}
