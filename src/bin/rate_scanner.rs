use clap::Parser;
use honeypot_gate::{Blocklist, RateScanner, config::ScannerArgs, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ScannerArgs::parse();
    args.validate()?;

    logging::init_console()?;

    // no log root means the honeypot never ran: nothing to do
    let scanner = RateScanner::new(&args.log_root, Blocklist::new(&args.blacklist), args.threshold)?;

    if args.once {
        let report = scanner.scan_pass()?;
        report.log_summary();
        return Ok(());
    }

    scanner.run(args.scan_interval()).await;
    Ok(())
}
