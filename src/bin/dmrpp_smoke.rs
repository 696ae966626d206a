use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dmrpp_smoke::app::App;
use dmrpp_smoke::cmr::CmrHttpClient;
use dmrpp_smoke::config::{
    CatalogEndpoints, DEFAULT_DATA_DIR, DEFAULT_DOI, ENDPOINT_TIMEOUT, RunConfig,
};
use dmrpp_smoke::docker::DockerCli;
use dmrpp_smoke::fetch::HttpFetcher;
use dmrpp_smoke::output::{LogSink, log_report};
use dmrpp_smoke::verify::HttpProbe;

#[derive(Parser)]
#[command(name = "dmrpp-smoke")]
#[command(about = "Test Earthdata granules against Hyrax DMR++ sidecars")]
#[command(version, author)]
struct Cli {
    #[arg(
        short = 'd',
        long,
        help = format!("DOI of the Earthdata collection [default: {DEFAULT_DOI}]")
    )]
    doi: Option<String>,

    #[arg(
        short = 's',
        long,
        help = format!("Local directory for downloaded granules [default: ./{DEFAULT_DATA_DIR}]")
    )]
    data_dir: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunConfig::resolve(cli.doi.as_deref(), cli.data_dir.as_deref())?;

    let catalog = CmrHttpClient::new(CatalogEndpoints::default())?;
    let fetcher = HttpFetcher::new()?;
    let runtime = DockerCli::new()?;
    let probe = HttpProbe::new(ENDPOINT_TIMEOUT)?;

    tracing::info!("starting granule testing for DOI {}", config.doi);
    let app = App::new(config, catalog, fetcher, runtime, probe);
    let report = match app.run(&LogSink) {
        Ok(report) => report,
        Err(err) if err.ends_run_early() => {
            tracing::error!("{:?}", miette::Report::new(err));
            tracing::info!("exiting without testing granules");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    log_report(&report);
    tracing::info!("granule testing complete");
    Ok(())
}
