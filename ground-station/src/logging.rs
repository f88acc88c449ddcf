use log::LevelFilter;
use std::{fs::OpenOptions, path::Path};

/// 0 → error, 1 → warn, 2 → info, 3 → debug.
pub fn level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Installs the logger. `RUST_LOG` still takes precedence over `verbosity`.
pub fn init(verbosity: u8, file: Option<&Path>) -> anyhow::Result<()> {
    let default_filter = level(verbosity).as_str().to_lowercase();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::new().default_filter_or(default_filter));

    if let Some(path) = file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}
