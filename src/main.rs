use std::io;
use std::process::ExitCode;

use calo_response::analysis::run_analysis;
use calo_response::config::AnalysisConfig;
use calo_response::AnalysisResult;

fn main() -> ExitCode {
    match run() {
        Ok(()) => {
            println!("Analysis finished successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::from(1)
        }
    }
}

fn run() -> AnalysisResult<()> {
    let config = AnalysisConfig::default().with_env_overrides()?;
    let stdout = io::stdout();
    let mut console = stdout.lock();
    run_analysis(&config, &mut console)?;
    Ok(())
}
