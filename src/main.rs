//! Command-line entry point: run one simulation and print the final report.

use anyhow::Context as _;

use triage_flow::config::RunConfig;
use triage_flow::sim::Simulation;
use triage_flow::util::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RunConfig::from_cli_args(std::env::args().skip(1))
        .context("usage: triage_flow [CASE_COUNT]")?;
    let simulation = Simulation::new(config).context("configuration rejected")?;
    let report = simulation.run().await.context("simulation failed")?;
    println!("{}", report.render());
    Ok(())
}
