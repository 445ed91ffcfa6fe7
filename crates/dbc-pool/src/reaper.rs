//! Background eviction of idle connections.
//!
//! One reaper task runs per pool. Every `reaper_interval` it closes idle
//! connections past their idle timeout (never dropping below
//! `min_connections`) or past their maximum lifetime, then opens
//! connections until the pool is back at `min_connections`.

use std::sync::{Arc, Weak};

use tokio::time::{Instant, MissedTickBehavior};

use crate::lifecycle::ManageConnection;
use crate::pool::Shared;

/// How the reaper refers to its pool.
///
/// With `exit_on_idle` the reaper must not keep the pool alive, so it only
/// holds a weak reference and stops once every pool handle is gone.
enum PoolRef<M: ManageConnection> {
    Strong(Arc<Shared<M>>),
    Weak(Weak<Shared<M>>),
}

impl<M: ManageConnection> PoolRef<M> {
    fn upgrade(&self) -> Option<Arc<Shared<M>>> {
        match self {
            Self::Strong(shared) => Some(Arc::clone(shared)),
            Self::Weak(shared) => shared.upgrade(),
        }
    }
}

pub(crate) fn spawn<M: ManageConnection>(shared: &Arc<Shared<M>>) {
    let pool = if shared.config.exit_on_idle {
        PoolRef::Weak(Arc::downgrade(shared))
    } else {
        PoolRef::Strong(Arc::clone(shared))
    };
    let shutdown = shared.shutdown.clone();
    let period = shared.config.reaper_interval;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(shared) = pool.upgrade() else {
                break;
            };
            shared.reap();
            shared.replenish().await;
        }

        tracing::trace!("connection reaper stopped");
    });
}
