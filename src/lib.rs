pub mod config;
pub mod observer;
pub mod server;
pub mod statistics;

use std::sync::Arc;

use self::config::Config;
use self::statistics::Statistics;

/// Opened so integration tests can start the caster in-process exactly
/// like `main` does, without a CLI round-trip (grounded on the teacher's
/// own doc comment on its `startup` entry point).
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    let statistics = Arc::new(Statistics::default());
    server::start(config, statistics).await
}
