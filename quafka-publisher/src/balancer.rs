//! Selection among equivalent connections or endpoints.
//!
//! One [`LoadBalancer`] type covers every [`LoadBalancingStrategy`]; selection
//! dispatches on the strategy in a single place. The balancer works over any
//! [`Candidate`]: single connections or whole pools.
//!
//! - `RoundRobin`: a shared counter modulo the candidate count
//! - `Random`: uniform choice
//! - `LeastLoaded`: fewest outstanding selections, released with
//!   [`LoadBalancer::decrement_load`]
//! - `Nearest`: lowest measured liveness-check time, refreshed by a background
//!   prober; unreachable candidates measure as [`Duration::MAX`]

use crate::{connection::ConnectionController, factory::ConnectionFactory, pool::ConnectionPool};
use dashmap::DashMap;
use parking_lot::Mutex;
use quafka_core::{
    config::{ConnectionConfig, LoadBalancerConfig, LoadBalancingStrategy},
    ConnectionId, Error, Result,
};
use rand::Rng;
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Something a [`LoadBalancer`] can choose.
pub trait Candidate: Send + Sync + 'static {
    /// Stable identity used to key load and latency tables.
    fn candidate_id(&self) -> ConnectionId;

    /// Cheap liveness check.
    fn is_alive(&self) -> bool;
}

impl Candidate for ConnectionController {
    fn candidate_id(&self) -> ConnectionId {
        self.id()
    }

    fn is_alive(&self) -> bool {
        self.is_connected()
    }
}

impl Candidate for ConnectionPool {
    fn candidate_id(&self) -> ConnectionId {
        self.id()
    }

    fn is_alive(&self) -> bool {
        !self.is_closed()
    }
}

struct Tracked<C, V> {
    candidate: Arc<C>,
    value: V,
}

type RttTable<C> = DashMap<ConnectionId, Tracked<C, Duration>>;

enum Policy<C> {
    RoundRobin { next: AtomicUsize },
    Random,
    LeastLoaded {
        loads: DashMap<ConnectionId, Tracked<C, usize>>,
        // Held across the scan and the increment so concurrent selections see each other.
        picking: Mutex<()>,
    },
    Nearest { rtts: Arc<RttTable<C>>, prober: Option<JoinHandle<()>> },
}

/// Chooses one of several candidates according to a strategy.
pub struct LoadBalancer<C: Candidate = ConnectionController> {
    strategy: LoadBalancingStrategy,
    policy: Policy<C>,
}

impl<C: Candidate> fmt::Debug for LoadBalancer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracked = match &self.policy {
            Policy::LeastLoaded { loads, .. } => loads.len(),
            Policy::Nearest { rtts, .. } => rtts.len(),
            Policy::RoundRobin { .. } | Policy::Random => 0,
        };
        f.debug_struct("LoadBalancer")
            .field("strategy", &self.strategy)
            .field("tracked", &tracked)
            .finish()
    }
}

impl<C: Candidate> LoadBalancer<C> {
    /// Balancer with the default probe interval for `Nearest`.
    ///
    /// A `Nearest` balancer probes from a tokio task; created outside a
    /// runtime it only measures on selection.
    #[must_use]
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self::with_probe_interval(strategy, LoadBalancerConfig::default().probe_interval)
    }

    /// Balancer from configuration.
    #[must_use]
    pub fn from_config(config: &LoadBalancerConfig) -> Self {
        Self::with_probe_interval(config.strategy, config.probe_interval)
    }

    /// Balancer re-measuring `Nearest` candidates every `probe_interval`.
    #[must_use]
    pub fn with_probe_interval(strategy: LoadBalancingStrategy, probe_interval: Duration) -> Self {
        let policy = match strategy {
            LoadBalancingStrategy::RoundRobin => Policy::RoundRobin { next: AtomicUsize::new(0) },
            LoadBalancingStrategy::Random => Policy::Random,
            LoadBalancingStrategy::LeastLoaded => {
                Policy::LeastLoaded { loads: DashMap::new(), picking: Mutex::new(()) }
            },
            LoadBalancingStrategy::Nearest => {
                let rtts = Arc::new(DashMap::new());
                let prober = spawn_prober(Arc::downgrade(&rtts), probe_interval);
                Policy::Nearest { rtts, prober }
            },
        };
        Self { strategy, policy }
    }

    /// Configured strategy.
    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Pick one of `candidates`.
    ///
    /// # Errors
    /// `LOAD_BALANCING_ERROR` if `candidates` is empty.
    pub fn select(&self, candidates: &[Arc<C>]) -> Result<Arc<C>> {
        if candidates.is_empty() {
            return Err(Error::load_balancing("no candidates to select from"));
        }

        let chosen = match &self.policy {
            Policy::RoundRobin { next } => {
                &candidates[next.fetch_add(1, Ordering::Relaxed) % candidates.len()]
            },
            Policy::Random => &candidates[rand::thread_rng().gen_range(0..candidates.len())],
            Policy::LeastLoaded { loads, picking } => {
                let _picking = picking.lock();
                let chosen = candidates
                    .iter()
                    .min_by_key(|c| loads.get(&c.candidate_id()).map_or(0, |t| t.value))
                    .unwrap_or(&candidates[0]);
                loads
                    .entry(chosen.candidate_id())
                    .or_insert_with(|| Tracked { candidate: Arc::clone(chosen), value: 0 })
                    .value += 1;
                chosen
            },
            Policy::Nearest { rtts, .. } => {
                let mut best: Option<(&Arc<C>, Duration)> = None;
                for candidate in candidates {
                    let rtt = rtt_of(rtts, candidate);
                    if best.map_or(true, |(_, fastest)| rtt < fastest) {
                        best = Some((candidate, rtt));
                    }
                }
                best.map_or(&candidates[0], |(candidate, _)| candidate)
            },
        };
        Ok(Arc::clone(chosen))
    }

    /// Release one selection of `id`. Only meaningful for `LeastLoaded`.
    pub fn decrement_load(&self, id: ConnectionId) {
        if let Policy::LeastLoaded { loads, .. } = &self.policy {
            if let Some(mut tracked) = loads.get_mut(&id) {
                tracked.value = tracked.value.saturating_sub(1);
            }
        }
    }

    /// Outstanding selections of `id` under `LeastLoaded`.
    pub fn load(&self, id: ConnectionId) -> Option<usize> {
        match &self.policy {
            Policy::LeastLoaded { loads, .. } => loads.get(&id).map(|t| t.value),
            _ => None,
        }
    }

    /// Last measurement of `id` under `Nearest`.
    pub fn rtt(&self, id: ConnectionId) -> Option<Duration> {
        match &self.policy {
            Policy::Nearest { rtts, .. } => rtts.get(&id).map(|t| t.value),
            _ => None,
        }
    }
}

impl LoadBalancer<ConnectionController> {
    /// Pick an endpoint from `configs` and return a connected connection to it.
    ///
    /// `RoundRobin` and `Random` open a fresh connection to the chosen
    /// endpoint. `LeastLoaded` and `Nearest` keep one tracked connection per
    /// endpoint, keyed by the config's connection id, and open it on first use.
    /// The `LeastLoaded` count is taken only after the connect completes, so
    /// callers racing on the same endpoints may pick the same one.
    ///
    /// # Errors
    /// `LOAD_BALANCING_ERROR` if `configs` is empty or no endpoint is reachable;
    /// otherwise the connect failure of the chosen endpoint.
    pub async fn get_connection(
        &self,
        configs: &[ConnectionConfig],
        factory: &ConnectionFactory,
    ) -> Result<Arc<ConnectionController>> {
        if configs.is_empty() {
            return Err(Error::load_balancing("no endpoints to select from"));
        }

        match &self.policy {
            Policy::RoundRobin { next } => {
                let config = &configs[next.fetch_add(1, Ordering::Relaxed) % configs.len()];
                open(config, factory).await
            },
            Policy::Random => {
                let config = &configs[rand::thread_rng().gen_range(0..configs.len())];
                open(config, factory).await
            },
            Policy::LeastLoaded { loads, .. } => {
                let config = configs
                    .iter()
                    .min_by_key(|c| loads.get(&c.connection_id).map_or(0, |t| t.value))
                    .unwrap_or(&configs[0]);
                let id = config.connection_id;

                let tracked = loads.get(&id).map(|t| Arc::clone(&t.candidate));
                let connection = match tracked {
                    Some(connection) => {
                        connection.connect().await?;
                        connection
                    },
                    None => {
                        let connection = open(config, factory).await?;
                        loads
                            .entry(id)
                            .or_insert_with(|| Tracked { candidate: Arc::clone(&connection), value: 0 });
                        connection
                    },
                };
                if let Some(mut tracked) = loads.get_mut(&id) {
                    tracked.value += 1;
                }
                Ok(connection)
            },
            Policy::Nearest { rtts, .. } => {
                for config in configs {
                    if rtts.contains_key(&config.connection_id) {
                        continue;
                    }
                    match open(config, factory).await {
                        Ok(connection) => {
                            let value = measure(connection.as_ref());
                            rtts.insert(config.connection_id, Tracked { candidate: connection, value });
                        },
                        Err(e) => warn!("Endpoint {} unreachable: {}", config.address(), e),
                    }
                }

                let nearest = configs
                    .iter()
                    .filter_map(|c| rtts.get(&c.connection_id).map(|t| (Arc::clone(&t.candidate), t.value)))
                    .min_by_key(|(_, rtt)| *rtt)
                    .map(|(connection, _)| connection)
                    .ok_or_else(|| Error::load_balancing("no endpoint is reachable"))?;
                nearest.connect().await?;
                Ok(nearest)
            },
        }
    }
}

impl<C: Candidate> Drop for LoadBalancer<C> {
    fn drop(&mut self) {
        if let Policy::Nearest { prober: Some(prober), .. } = &self.policy {
            prober.abort();
        }
    }
}

async fn open(
    config: &ConnectionConfig,
    factory: &ConnectionFactory,
) -> Result<Arc<ConnectionController>> {
    let connection = factory.create(config.clone());
    connection.connect().await?;
    Ok(connection)
}

fn measure<C: Candidate + ?Sized>(candidate: &C) -> Duration {
    let started = Instant::now();
    if candidate.is_alive() {
        started.elapsed()
    } else {
        Duration::MAX
    }
}

fn rtt_of<C: Candidate>(rtts: &RttTable<C>, candidate: &Arc<C>) -> Duration {
    let id = candidate.candidate_id();
    let known = rtts.get(&id).map(|t| t.value);
    known.unwrap_or_else(|| {
        let value = measure(candidate.as_ref());
        rtts.insert(id, Tracked { candidate: Arc::clone(candidate), value });
        value
    })
}

fn spawn_prober<C: Candidate>(
    rtts: Weak<RttTable<C>>,
    probe_interval: Duration,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("No runtime; nearest-endpoint probing disabled");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(probe_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(rtts) = rtts.upgrade() else {
                break;
            };
            for mut entry in rtts.iter_mut() {
                entry.value = measure(entry.candidate.as_ref());
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use proptest::prelude::*;
    use quafka_core::ErrorKind;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn factory(transport: &MockTransport) -> ConnectionFactory {
        ConnectionFactory::new(Arc::new(transport.clone()))
    }

    fn connections(n: usize) -> Vec<Arc<ConnectionController>> {
        let factory = factory(&MockTransport::echo());
        (0..n).map(|i| factory.create(ConnectionConfig::new("127.0.0.1", 9000 + i as u16))).collect()
    }

    fn ids(chosen: &[Arc<ConnectionController>]) -> Vec<ConnectionId> {
        chosen.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn test_empty_candidates() {
        for strategy in [
            LoadBalancingStrategy::RoundRobin,
            LoadBalancingStrategy::Random,
            LoadBalancingStrategy::LeastLoaded,
            LoadBalancingStrategy::Nearest,
        ] {
            let balancer = LoadBalancer::<ConnectionController>::new(strategy);
            let err = balancer.select(&[]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::LoadBalancingError);
        }
    }

    #[test]
    fn test_round_robin_order() {
        let candidates = connections(3);
        let balancer = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
        let chosen: Vec<_> = (0..6).map(|_| balancer.select(&candidates).unwrap()).collect();
        let expected = ids(&candidates);
        assert_eq!(ids(&chosen), [expected.clone(), expected].concat());
    }

    #[test]
    fn test_round_robin_concurrent_is_even() {
        let candidates = Arc::new(connections(4));
        let balancer = Arc::new(LoadBalancer::new(LoadBalancingStrategy::RoundRobin));
        let counts: Arc<DashMap<ConnectionId, usize>> = Arc::new(DashMap::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (candidates, balancer, counts) =
                    (Arc::clone(&candidates), Arc::clone(&balancer), Arc::clone(&counts));
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let chosen = balancer.select(&candidates).unwrap();
                        *counts.entry(chosen.id()).or_insert(0) += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counts.len(), 4);
        assert!(counts.iter().all(|entry| *entry.value() == 200));
    }

    proptest! {
        #[test]
        fn prop_round_robin_cycles(len in 1usize..8, picks in 1usize..40) {
            let candidates = connections(len);
            let balancer = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);
            for i in 0..picks {
                let chosen = balancer.select(&candidates).unwrap();
                prop_assert_eq!(chosen.id(), candidates[i % len].id());
            }
        }
    }

    #[test]
    fn test_random_stays_in_range() {
        let candidates = connections(3);
        let balancer = LoadBalancer::new(LoadBalancingStrategy::Random);
        let known = ids(&candidates);
        for _ in 0..50 {
            assert!(known.contains(&balancer.select(&candidates).unwrap().id()));
        }
    }

    #[test]
    fn test_least_loaded() {
        let candidates = connections(2);
        let (a, b) = (candidates[0].id(), candidates[1].id());
        let balancer = LoadBalancer::new(LoadBalancingStrategy::LeastLoaded);

        let chosen: Vec<_> = (0..3).map(|_| balancer.select(&candidates).unwrap()).collect();
        assert_eq!(ids(&chosen), vec![a, b, a]);
        assert_eq!((balancer.load(a), balancer.load(b)), (Some(2), Some(1)));

        balancer.decrement_load(a);
        balancer.decrement_load(a);
        balancer.decrement_load(a);
        assert_eq!(balancer.load(a), Some(0));
        assert_eq!(balancer.select(&candidates).unwrap().id(), a);
    }

    #[test]
    fn test_least_loaded_concurrent_stays_level() {
        let candidates = Arc::new(connections(4));
        let balancer = Arc::new(LoadBalancer::new(LoadBalancingStrategy::LeastLoaded));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (candidates, balancer) = (Arc::clone(&candidates), Arc::clone(&balancer));
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        balancer.select(&candidates).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for candidate in candidates.iter() {
            assert_eq!(balancer.load(candidate.id()), Some(100));
        }
    }

    #[tokio::test]
    async fn test_nearest_prefers_live_candidates() {
        let candidates = connections(2);
        candidates[1].connect().await.unwrap();
        let balancer = LoadBalancer::new(LoadBalancingStrategy::Nearest);

        assert_eq!(balancer.select(&candidates).unwrap().id(), candidates[1].id());
        assert_eq!(balancer.rtt(candidates[0].id()), Some(Duration::MAX));
        assert!(balancer.rtt(candidates[1].id()).unwrap() < Duration::MAX);
    }

    #[tokio::test]
    async fn test_nearest_prober_refreshes() {
        let candidates = connections(1);
        let balancer =
            LoadBalancer::with_probe_interval(LoadBalancingStrategy::Nearest, Duration::from_millis(20));
        balancer.select(&candidates).unwrap();
        assert_eq!(balancer.rtt(candidates[0].id()), Some(Duration::MAX));

        candidates[0].connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(balancer.rtt(candidates[0].id()).unwrap() < Duration::MAX);
    }

    #[tokio::test]
    async fn test_get_connection_round_robin() {
        let transport = MockTransport::echo();
        let configs =
            vec![ConnectionConfig::new("127.0.0.1", 9001), ConnectionConfig::new("127.0.0.1", 9002)];
        let balancer = LoadBalancer::new(LoadBalancingStrategy::RoundRobin);

        let mut ports = Vec::new();
        for _ in 0..4 {
            let connection = balancer.get_connection(&configs, &factory(&transport)).await.unwrap();
            assert!(connection.is_connected());
            ports.push(connection.config().port);
        }
        assert_eq!(ports, vec![9001, 9002, 9001, 9002]);
    }

    #[tokio::test]
    async fn test_get_connection_least_loaded_reuses_tracked() {
        let transport = MockTransport::echo();
        let configs =
            vec![ConnectionConfig::new("127.0.0.1", 9001), ConnectionConfig::new("127.0.0.1", 9002)];
        let balancer = LoadBalancer::new(LoadBalancingStrategy::LeastLoaded);
        let factory = factory(&transport);

        let first = balancer.get_connection(&configs, &factory).await.unwrap();
        let second = balancer.get_connection(&configs, &factory).await.unwrap();
        assert_ne!(first.id(), second.id());

        balancer.decrement_load(second.id());
        let third = balancer.get_connection(&configs, &factory).await.unwrap();
        assert_eq!(third.id(), second.id());
        assert_eq!(transport.opens.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_connection_nearest_skips_unreachable() {
        let transport = MockTransport::echo();
        transport.fail_next_opens(1);
        let configs =
            vec![ConnectionConfig::new("127.0.0.1", 9001), ConnectionConfig::new("127.0.0.1", 9002)];
        let balancer = LoadBalancer::new(LoadBalancingStrategy::Nearest);

        let connection = balancer.get_connection(&configs, &factory(&transport)).await.unwrap();
        assert_eq!(connection.config().port, 9002);

        let err = balancer.get_connection(&[], &factory(&transport)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadBalancingError);
    }
}
