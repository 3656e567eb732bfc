#[path = "mailprobe-cli/args.rs"]
mod args;
#[path = "mailprobe-cli/output.rs"]
mod output;

use std::fs::File;
use std::io::{self, BufReader, Read};

use anyhow::{Context, Result, bail};
use mailprobe::{Prober, SystemResolver, read_identities};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::args::Cli;

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")?;
    Ok(())
}

fn open_input(cli: &Cli) -> Result<Box<dyn Read>> {
    match (&cli.input, cli.stdin) {
        (Some(path), _) => {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        (None, true) => Ok(Box::new(io::stdin().lock())),
        (None, false) => bail!("no identities: pass --input <file> or --stdin"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = cli.probe_config()?;
    let input = open_input(&cli)?;
    let resolver = SystemResolver::from_system_conf().context("loading resolver configuration")?;

    let report = match Prober::new(config, resolver).run(read_identities(input)) {
        Ok(report) => report,
        Err(err) => {
            let domain = err.domain().unwrap_or(cli.domain.as_str()).to_string();
            let condition = err.condition();
            return Err(anyhow::Error::new(err))
                .with_context(|| format!("{condition}: probing {domain} aborted"));
        }
    };

    output::write_report(&report, &cli)?;

    // exit codes: 0 OK, 2 unresolved identities, 1 fatal
    if output::any_unresolved(&report) {
        std::process::exit(2);
    }
    Ok(())
}
