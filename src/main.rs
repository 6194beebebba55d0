use anyhow::Result;
use mc_install::cli::run;

pub fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    run()
}
