use std::process::ExitCode;

use engine::run_app;
use tracing::info;

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let summary = run_app(app.config, app.scene);
    info!(
        ticks_run = summary.ticks_run,
        exit = ?summary.exit,
        "run_finished"
    );

    ExitCode::SUCCESS
}
