//! Log output for the client.
//!
//! Lines go to stderr and to `glimmer.log` in the platform's local data directory. The level is
//! read from `GLIMMER_LOG` and defaults to `info`.

use std::path::PathBuf;

use log::LevelFilter;

const LEVEL_VAR: &str = "GLIMMER_LOG";

fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Directory the log file is written to, created if needed.
fn log_dir() -> Option<PathBuf> {
    let dir = dirs::data_local_dir()?.join("glimmer");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

pub fn init() -> Result<(), fern::InitError> {
    let level = level_from(std::env::var(LEVEL_VAR).ok().as_deref());
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {:<5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    let file = log_dir().map(|dir| dir.join("glimmer.log"));
    if let Some(path) = &file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }
    dispatch.apply()?;

    std::panic::set_hook(Box::new(|info| {
        log::error!("{info}");
    }));
    match file {
        Some(path) => log::debug!("Logging to {}", path.display()),
        None => log::warn!("No local data directory, logging to stderr only"),
    }
    Ok(())
}
