use crate::group::CacheError;
use crate::group::value::ByteView;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

type Outcome = Result<ByteView, CacheError>;
type InFlightMap = Mutex<HashMap<String, watch::Sender<Option<Outcome>>>>;

/// Collapses concurrent loads for the same key into one execution.
///
/// The first caller for a key becomes the leader and runs the load; callers
/// arriving while it is in flight suspend and receive the leader's exact
/// outcome, value or error. The in-flight record is removed the instant the
/// load completes, so a later call for the same key starts fresh. This is a
/// coordination primitive, not a cache: it remembers nothing once a call
/// has completed.
#[derive(Default)]
pub struct FlightGroup {
    in_flight: InFlightMap,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `load` for `key`, or waits for the in-flight load of the same
    /// key and returns its outcome. `load` is invoked at most once per
    /// overlapping window of concurrent callers.
    pub async fn run<F, Fut>(&self, key: &str, load: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        // The lock only guards map insert/lookup/remove, never the load.
        let waiter = {
            let mut in_flight = self.in_flight.lock().expect("flight map lock poisoned");

            match in_flight.get(key) {
                Some(sender) => Some(sender.subscribe()),
                None => {
                    let (sender, _) = watch::channel(None);
                    in_flight.insert(key.to_string(), sender);
                    None
                }
            }
        };

        if let Some(mut receiver) = waiter {
            return match receiver.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).clone().expect("outcome published"),
                // Only possible if the whole group was torn down mid-load.
                Err(_) => Err(CacheError::Interrupted(key.to_string())),
            };
        }

        let mut guard = FlightGuard {
            in_flight: &self.in_flight,
            key,
            published: false,
        };

        let outcome = load().await;
        guard.publish(outcome.clone());

        outcome
    }
}

/// Unblocks waiters even when the leader's future is dropped mid-load
/// (e.g. the inbound request driving it disconnects).
struct FlightGuard<'a> {
    in_flight: &'a InFlightMap,
    key: &'a str,
    published: bool,
}

impl FlightGuard<'_> {
    fn publish(&mut self, outcome: Outcome) {
        // Remove before sending: once the entry is gone no new waiter can
        // subscribe, so everyone who subscribed sees exactly this outcome.
        let sender = self
            .in_flight
            .lock()
            .expect("flight map lock poisoned")
            .remove(self.key);

        if let Some(sender) = sender {
            sender.send_replace(Some(outcome));
        }

        self.published = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.publish(Err(CacheError::Interrupted(self.key.to_string())));
        }
    }
}
