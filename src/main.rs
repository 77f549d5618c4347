#[macro_use]
extern crate log;

use failure::{err_msg, Error};
use stagecache::{Config, StageCache};
use std::env;
use std::path::PathBuf;
use std::process;

fn default_config_file() -> Result<PathBuf, Error> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("stagecache")?;
    xdg_dirs.find_config_file("stagecache.toml").ok_or_else(|| {
        err_msg(
            "no config file found; pass one explicitly or create \
             $XDG_CONFIG_HOME/stagecache/stagecache.toml",
        )
    })
}

fn run(logical: &str, config_file: Option<&str>) -> Result<(), Error> {
    let config_file = match config_file {
        Some(path) => PathBuf::from(path),
        None => default_config_file()?,
    };
    let config = Config::from_file(&config_file)?;
    if config.debug() {
        debug!("loaded config from {:?}: {:?}", config_file, config);
    }

    let cache = StageCache::with_config(config)?;
    let url = cache.resolve_external_url(logical)?;
    println!("{}", url);
    Ok(())
}

fn main() {
    pretty_env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        println!("Usage: {} <logical-path> [config-file]", &args[0]);
        process::exit(1);
    }

    if let Err(e) = run(&args[1], args.get(2).map(String::as_str)) {
        error!("{}", e);
        process::exit(1);
    }
}
