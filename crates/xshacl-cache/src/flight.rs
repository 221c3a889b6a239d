//! Single-flight execution keyed by (signature, language)
//!
//! Each key owns a small state machine:
//!
//! ```text
//! Absent --leader starts--> Generating --success--> Present(value)
//!                               |
//!                               +--failure--------> Failed(error)
//!                               |
//!                               +--leader dropped--> Absent
//! ```
//!
//! Callers for the same key queue on the flight's async mutex. The first to
//! acquire it while the state is `Absent` becomes the leader and runs its
//! work while holding the lock. Callers that acquire it afterwards find the
//! leader's outcome: `Present` hands them a clone of the value and `Failed`
//! a clone of the error, so a failing leader is never retried by its
//! followers. Only a leader that is dropped mid-work leaves `Absent` behind,
//! and the next waiting caller is promoted to leader. A flight, including a
//! recorded failure, is forgotten once its last caller leaves.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

/// State of one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightState<V, E> {
    Absent,
    Generating,
    Present(V),
    Failed(E),
}

/// How a caller obtained its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flighted<V> {
    /// This caller ran the work
    Leader(V),
    /// Another caller ran the work and this one waited for it
    Follower(V),
}

impl<V> Flighted<V> {
    pub fn into_inner(self) -> V {
        match self {
            Flighted::Leader(v) | Flighted::Follower(v) => v,
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self, Flighted::Leader(_))
    }
}

type Flight<V, E> = Arc<AsyncMutex<FlightState<V, E>>>;

struct Slot<V, E> {
    flight: Flight<V, E>,
    participants: usize,
}

/// Collapses concurrent work for the same key into one execution
pub struct SingleFlight<K, V, E> {
    flights: Mutex<HashMap<K, Slot<V, E>>>,
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V, E> std::fmt::Debug for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with at least one caller
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn join(&self, key: K) -> Participation<'_, K, V, E> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = flights.entry(key.clone()).or_insert_with(|| Slot {
            flight: Arc::new(AsyncMutex::new(FlightState::Absent)),
            participants: 0,
        });
        slot.participants += 1;
        Participation {
            owner: self,
            key,
            flight: Arc::clone(&slot.flight),
        }
    }
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
{
    /// Run `work` unless another caller for `key` already is.
    ///
    /// `work` is only called if this caller becomes the leader. Callers that
    /// waited on a leader receive its value or its error.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<Flighted<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let participation = self.join(key);
        let mut state = participation.flight.lock().await;

        match &*state {
            FlightState::Present(value) => return Ok(Flighted::Follower(value.clone())),
            FlightState::Failed(error) => return Err(error.clone()),
            FlightState::Absent | FlightState::Generating => {}
        }

        *state = FlightState::Generating;
        let mut leader = LeaderSlot { state: Some(state) };

        match work().await {
            Ok(value) => {
                leader.settle(FlightState::Present(value.clone()));
                Ok(Flighted::Leader(value))
            }
            Err(error) => {
                leader.settle(FlightState::Failed(error.clone()));
                Err(error)
            }
        }
    }
}

/// Caller registration; the flight is removed when the last caller leaves
struct Participation<'a, K, V, E>
where
    K: Eq + Hash + Clone,
{
    owner: &'a SingleFlight<K, V, E>,
    key: K,
    flight: Flight<V, E>,
}

impl<K, V, E> Drop for Participation<'_, K, V, E>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let mut flights = self
            .owner
            .flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = flights.get_mut(&self.key) {
            if Arc::ptr_eq(&slot.flight, &self.flight) {
                slot.participants = slot.participants.saturating_sub(1);
                if slot.participants == 0 {
                    flights.remove(&self.key);
                }
            }
        }
    }
}

/// Held by the leader; resets `Generating` to `Absent` unless settled
struct LeaderSlot<'a, V, E> {
    state: Option<AsyncMutexGuard<'a, FlightState<V, E>>>,
}

impl<V, E> LeaderSlot<'_, V, E> {
    fn settle(&mut self, outcome: FlightState<V, E>) {
        if let Some(mut state) = self.state.take() {
            *state = outcome;
        }
    }
}

impl<V, E> Drop for LeaderSlot<'_, V, E> {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.take() {
            if matches!(*state, FlightState::Generating) {
                *state = FlightState::Absent;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<&'static str, u32, String>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    flights
                        .run("k", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, String>(7)
                        })
                        .await
                })
            })
            .collect();

        let mut leaders = 0;
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            if result.is_leader() {
                leaders += 1;
            }
            assert_eq!(result.into_inner(), 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared_with_waiting_callers() {
        let flights: Arc<SingleFlight<u8, u32, &'static str>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    flights
                        .run(1, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err::<u32, _>("boom")
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Err("boom"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_forgotten_after_last_caller() {
        let flights: SingleFlight<u8, u32, &'static str> = SingleFlight::new();

        let failed = flights.run(1, || async { Err::<u32, _>("boom") }).await;
        assert_eq!(failed, Err("boom"));

        let retried = flights.run(1, || async { Ok::<_, &str>(3) }).await;
        assert_eq!(retried, Ok(Flighted::Leader(3)));
    }

    #[tokio::test]
    async fn test_cancelled_leader_promotes_follower() {
        let flights: Arc<SingleFlight<u8, u32, ()>> = Arc::new(SingleFlight::new());

        let leader = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run(1, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<_, ()>(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let follower = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move { flights.run(1, || async { Ok::<_, ()>(2) }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        let result = tokio::time::timeout(Duration::from_secs(5), follower)
            .await
            .expect("follower promoted")
            .unwrap();
        assert_eq!(result, Ok(Flighted::Leader(2)));
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights: SingleFlight<u8, u8, ()> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flights.run(1, || async { Ok::<_, ()>(1) }),
            flights.run(2, || async { Ok::<_, ()>(2) }),
        );
        assert_eq!(a, Ok(Flighted::Leader(1)));
        assert_eq!(b, Ok(Flighted::Leader(2)));
    }
}
