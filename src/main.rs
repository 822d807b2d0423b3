use std::path::PathBuf;
use std::process::ExitCode;

use rusty_arcade::config::PipelineConfig;
use rusty_arcade::data::cache::SourceCache;
use rusty_arcade::pipeline::run;

fn main() -> ExitCode {
    env_logger::init();

    // Usage: rusty-arcade [config.json]
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match PipelineConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e:#}");
                eprintln!("error: {e:#}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            log::info!("no config given, running the synthetic player dashboard");
            PipelineConfig::player_dashboard()
        }
    };

    let mut cache = SourceCache::new();
    let report = run(&config, &mut cache);

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => log::error!("serialising report: {e}"),
    }
    ExitCode::SUCCESS
}
