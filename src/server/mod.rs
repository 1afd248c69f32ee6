pub mod connection;
pub mod source;

use std::sync::Arc;

use anyhow::Result;
use mount::{AclStore, Router, SourcetableStore};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::observer::Observer;
use crate::statistics::Statistics;

/// Everything a connection handler needs, shared across every accepted
/// socket (spec.md §5: "the User store is read-mostly... only counters
/// embedded in the shared source are touched cross-thread").
pub struct Shared {
    pub config: Arc<Config>,
    pub acl: AclStore,
    pub sourcetable: SourcetableStore,
    pub router: Router,
    pub observer: Observer,
}

/// Bind every configured listen address and spawn a task per accepted
/// connection (spec.md §1 treats the accept loop itself as an external
/// collaborator; this is that collaborator's minimal harness).
pub async fn start(config: Arc<Config>, statistics: Arc<Statistics>) -> Result<()> {
    let acl = AclStore::new();
    acl.reload_from_file(&config.auth.mount_file)?;

    let sourcetable = SourcetableStore::new();
    if let Some(path) = &config.sourcetable.file {
        sourcetable.reload_from_file(path)?;
    }

    let router = Router::new(config.server.max_clients, config.server.max_clients_per_source);
    sourcetable.with_current(|table| {
        if let Some(table) = table {
            for mountpoint in table.mountpoints() {
                router.register_source(Arc::new(source::PlaceholderSource::new(mountpoint)));
            }
        }
    });

    let shared = Arc::new(Shared {
        config: config.clone(),
        acl,
        sourcetable,
        router,
        observer: Observer::new(statistics),
    });

    spawn_rehash_sweep(shared.clone());

    let mut listeners = Vec::with_capacity(config.server.listen.len());
    for addr in &config.server.listen {
        listeners.push(TcpListener::bind(addr).await?);
        log::info!("listening on {addr}");
    }

    let mut tasks = Vec::with_capacity(listeners.len());
    for listener in listeners {
        let shared = shared.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, peer)) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            if let Err(error) = connection::handle(socket, peer, shared).await {
                                log::debug!("connection with {peer} ended: {error}");
                            }
                        });
                    }
                    Err(error) => log::warn!("accept failed: {error}"),
                }
            }
        }));
    }

    for task in tasks {
        task.await?;
    }

    Ok(())
}

/// Periodic background sweep comparing the mount file's (and sourcetable
/// file's) `mtime` against the last successful reload (spec.md §9 open
/// question (b): the original's call site is commented out, but the
/// documented intent is implemented here).
fn spawn_rehash_sweep(shared: Arc<Shared>) {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(shared.config.auth.rehash_interval_secs);

        loop {
            tokio::time::sleep(interval).await;

            match shared.acl.rehash_if_stale(&shared.config.auth.mount_file) {
                Ok(true) => shared.observer.auth_file_reloaded(shared.acl.user_count()),
                Ok(false) => {}
                Err(error) => shared.observer.auth_file_unreadable(&error),
            }

            if let Some(path) = &shared.config.sourcetable.file {
                if let Err(error) = shared.sourcetable.rehash_if_stale(path) {
                    log::warn!("sourcetable file unreadable, retaining previous table: {error}");
                }
            }
        }
    });
}
