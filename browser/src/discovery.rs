// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, info, trace, warn};
use tacops_protocol::{server::ServerAddress, ServerRecord};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    master::{download_server_list, MasterEndpoint, MASTER_TIMEOUT},
    query::ServerQuery,
    Error,
};

/// Default limit of `info` queries in flight.
pub const MAX_CONCURRENT: usize = 100;

/// Counters of a discovery run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Master servers asked for the list.
    pub masters: usize,
    /// Master servers that failed.
    pub masters_failed: usize,
    /// Unique addresses.
    pub candidates: usize,
    /// Addresses rejected before querying.
    pub rejected: usize,
    /// Queried addresses.
    pub queried: usize,
    /// Recognized servers passed to the callback.
    pub found: usize,
    /// Servers that did not answer.
    pub timeouts: usize,
    /// Servers that failed or run another game.
    pub failures: usize,
}

/// Configures a [`Discovery`].
///
/// ```no_run
/// # use std::time::Duration;
/// # use tacops_browser::{DiscoveryBuilder, UdpQuery};
/// let discovery = DiscoveryBuilder::new()
///     .master_timeout(Duration::from_secs(5))
///     .max_concurrent(16)
///     .build(UdpQuery::new());
/// ```
#[derive(Clone, Debug)]
pub struct DiscoveryBuilder {
    master_timeout: Duration,
    max_concurrent: usize,
}

impl Default for DiscoveryBuilder {
    fn default() -> Self {
        Self {
            master_timeout: MASTER_TIMEOUT,
            max_concurrent: MAX_CONCURRENT,
        }
    }
}

impl DiscoveryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time limit for a whole exchange with one master server.
    pub fn master_timeout(mut self, value: Duration) -> Self {
        self.master_timeout = value;
        self
    }

    /// Limits the number of `info` queries in flight, at least one.
    pub fn max_concurrent(mut self, value: usize) -> Self {
        self.max_concurrent = value.max(1);
        self
    }

    /// Creates a [`Discovery`] querying game servers with `query`.
    pub fn build<Q: ServerQuery>(self, query: Q) -> Discovery<Q> {
        Discovery {
            query: Arc::new(query),
            master_timeout: self.master_timeout,
            limit: Arc::new(Semaphore::new(self.max_concurrent)),
            refreshing: AtomicBool::new(false),
        }
    }
}

/// Resets the refreshing flag on drop.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Finds game servers through master servers.
pub struct Discovery<Q> {
    query: Arc<Q>,
    master_timeout: Duration,
    limit: Arc<Semaphore>,
    refreshing: AtomicBool,
}

impl<Q: ServerQuery> Discovery<Q> {
    /// Returns the query client.
    pub fn query(&self) -> &Q {
        &self.query
    }

    /// Returns `true` while a discovery run is in progress.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Downloads server lists from `endpoints` and queries every address.
    ///
    /// `on_found` is called on the caller's task for every recognized server
    /// as soon as it answers. Returns after all queries have settled.
    ///
    /// Returns `Ok(None)` without doing anything if another run is in progress.
    /// Unreachable masters and servers are not errors.
    pub async fn run<F>(
        &self,
        endpoints: &[MasterEndpoint],
        on_found: F,
    ) -> Result<Option<Summary>, Error>
    where
        F: FnMut(ServerRecord),
    {
        let Some(_guard) = RefreshGuard::try_acquire(&self.refreshing) else {
            debug!("discovery is already running");
            return Ok(None);
        };

        let mut summary = Summary::default();
        let addresses = self.download(endpoints, &mut summary).await?;
        self.fan_out(addresses, &mut summary, on_found).await?;
        info!(
            "found {} servers of {} addresses from {} masters",
            summary.found, summary.candidates, summary.masters
        );
        Ok(Some(summary))
    }

    /// Queries an explicit list of addresses.
    ///
    /// Shares the refreshing flag with [`run`](Self::run).
    pub async fn query_addresses<I, S, F>(
        &self,
        addresses: I,
        on_found: F,
    ) -> Result<Option<Summary>, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(ServerRecord),
    {
        let Some(_guard) = RefreshGuard::try_acquire(&self.refreshing) else {
            debug!("discovery is already running");
            return Ok(None);
        };

        let mut summary = Summary::default();
        let addresses: BTreeSet<String> = addresses.into_iter().map(Into::into).collect();
        self.fan_out(addresses, &mut summary, on_found).await?;
        Ok(Some(summary))
    }

    /// Re-reads status and players of a known server.
    ///
    /// Not limited by the concurrency gate. The record is left intact on
    /// failure.
    pub async fn refresh_one(&self, record: &mut ServerRecord) -> Result<(), Error> {
        let details = self.query.query_details(record.address()).await?;
        record.clear_players();
        details.apply(record);
        Ok(())
    }

    async fn download(
        &self,
        endpoints: &[MasterEndpoint],
        summary: &mut Summary,
    ) -> Result<BTreeSet<String>, Error> {
        let mut tasks = JoinSet::new();
        for endpoint in endpoints {
            let endpoint = endpoint.clone();
            let timeout = self.master_timeout;
            tasks.spawn(async move {
                let result = download_server_list(&endpoint, timeout).await;
                (endpoint, result)
            });
        }
        summary.masters = endpoints.len();

        let mut addresses = BTreeSet::new();
        while let Some(res) = tasks.join_next().await {
            match res? {
                (_, Ok(list)) => addresses.extend(list),
                (endpoint, Err(e)) => {
                    warn!("master {endpoint}: {e}");
                    summary.masters_failed += 1;
                }
            }
        }
        Ok(addresses)
    }

    async fn fan_out<F>(
        &self,
        addresses: BTreeSet<String>,
        summary: &mut Summary,
        mut on_found: F,
    ) -> Result<(), Error>
    where
        F: FnMut(ServerRecord),
    {
        summary.candidates = addresses.len();

        let mut tasks = JoinSet::new();
        let mut id = 0;
        for s in addresses {
            let address = match s.parse::<ServerAddress>() {
                Ok(address) => address,
                Err(e) => {
                    debug!("skip {s:?}: {e}");
                    summary.rejected += 1;
                    continue;
                }
            };

            let query = self.query.clone();
            let limit = self.limit.clone();
            let task_id = id;
            id += 1;
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = limit.acquire_owned().await.ok();
                let result = query.query_info(task_id, &address).await;
                (address, result)
            });
            summary.queried += 1;
        }

        while let Some(res) = tasks.join_next().await {
            match res? {
                (_, Ok(record)) => {
                    summary.found += 1;
                    on_found(record);
                }
                (address, Err(Error::Timeout)) => {
                    trace!("{address}: timed out");
                    summary.timeouts += 1;
                }
                (address, Err(e)) => {
                    debug!("{address}: {e}");
                    summary.failures += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tacops_protocol::{decode, Error as ProtocolError};

    use crate::query::Details;

    struct Slow;

    impl ServerQuery for Slow {
        async fn query_info(&self, id: u32, address: &ServerAddress) -> Result<ServerRecord, Error> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            match address.port() {
                7778 => Ok(ServerRecord::new(
                    id,
                    address.clone(),
                    20,
                    &decode(b"\\gametype\\TO220\\final\\"),
                )?),
                7780 => Err(ProtocolError::UnsupportedGame("DM".into()).into()),
                _ => Err(Error::Timeout),
            }
        }

        async fn query_details(&self, _: &ServerAddress) -> Result<Details, Error> {
            Ok(Details {
                packets: vec![decode(b"\\player_0\\Fresh\\ping_0\\0\\final\\")],
                terminated: true,
            })
        }
    }

    #[tokio::test]
    async fn rejects_invalid_addresses() {
        let discovery = DiscoveryBuilder::new().build(Slow);
        let mut found = Vec::new();
        let summary = discovery
            .query_addresses(
                [
                    "1.2.3.4:7778",
                    "1.2.3.4:7779",
                    "1.2.3.4:7780",
                    "1.2.3.4:80",
                    "1.2.3.4",
                    "1.2.3.4:7778",
                ],
                |record| found.push(record.key()),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found, ["1.2.3.4:7778"]);
        assert_eq!(
            summary,
            Summary {
                candidates: 5,
                rejected: 2,
                queried: 3,
                found: 1,
                timeouts: 1,
                failures: 1,
                ..Summary::default()
            }
        );
    }

    #[tokio::test]
    async fn overlapping_runs() {
        let discovery = DiscoveryBuilder::new().build(Slow);
        let (a, b) = tokio::join!(
            discovery.query_addresses(["1.2.3.4:7778"], |_| {}),
            discovery.query_addresses(["1.2.3.4:7778"], |_| {}),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert!(a.is_some() != b.is_some());
        assert!(!discovery.is_refreshing());

        // the flag is released after a run
        let c = discovery.run(&[], |_| {}).await.unwrap();
        assert_eq!(c, Some(Summary::default()));
    }

    #[tokio::test]
    async fn refresh_rebuilds_players() {
        let discovery = DiscoveryBuilder::new().build(Slow);
        let address: ServerAddress = "1.2.3.4:7778".parse().unwrap();
        let info = decode(b"\\gametype\\TO340\\player_0\\Old\\player_1\\Gone\\final\\");
        let mut record = ServerRecord::new(0, address, 20, &info).unwrap();
        assert_eq!(record.players().len(), 2);

        discovery.refresh_one(&mut record).await.unwrap();
        assert_eq!(record.players().len(), 1);
        assert_eq!(record.players()[0].name, "Fresh");
        assert_eq!(record.bot_count(), 1);
    }
}
