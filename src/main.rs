use anyhow::Result;
use dispatch_modeler::config::Config;
use dispatch_modeler::model::{ModelDriver, RunOutcome};
use dispatch_modeler::telemetry::init_tracing;
use tracing::{info, warn};

fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    info!(
        parameters = %cfg.paths.parameters.display(),
        output = %cfg.paths.output_dir.display(),
        "starting Dispatch Modeler"
    );

    let driver = ModelDriver::from_config(cfg)?;
    match driver.run()? {
        RunOutcome::Solved {
            objective,
            results_file,
            solve_time,
        } => {
            info!(
                objective,
                solve_time_ms = solve_time.as_millis() as u64,
                file = %results_file.display(),
                "run complete"
            );
        }
        RunOutcome::NotSolved => {
            warn!("no feasible dispatch schedule for this parameter set");
        }
    }
    Ok(())
}
