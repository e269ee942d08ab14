use anyhow::Context;

use vendstock_sim::{Simulation, SimulationConfig};

fn main() -> anyhow::Result<()> {
    let config = match SimulationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Still want the failure in the structured log.
            vendstock_observability::init();
            tracing::error!(error = %e, "invalid simulation configuration");
            return Err(e.into());
        }
    };
    vendstock_observability::init_with(config.log_format);

    let mut simulation = Simulation::new(config).context("failed to set up simulation")?;
    let report = simulation.run().context("simulation aborted")?;

    tracing::info!(
        published = report.stats.published,
        delivered = report.stats.delivered,
        handler_faults = report.stats.handler_faults,
        "simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
