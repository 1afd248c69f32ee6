#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use ntrip_caster::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    simple_logger::init_with_level(config.log.level.as_level())?;

    if config.server.listen.is_empty() {
        log::warn!("no listen addresses configured, nothing to do");
        return Ok(());
    }

    ntrip_caster::startup(config).await
}
