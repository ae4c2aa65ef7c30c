use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{AddonApi, AddonClientError, AddonSummary};
use crate::core::PowerCommand;

/// Scripted stand-in for the remote addon, shared by the crate's tests.
///
/// Summary responses are served from a script first, then from a repeating
/// fallback. Every summary fetch tracks concurrency so tests can assert that
/// polls never overlap.
pub(crate) struct FakeAddon {
    summaries: Mutex<VecDeque<Result<AddonSummary, AddonClientError>>>,
    fallback: Mutex<Option<Result<AddonSummary, AddonClientError>>>,
    command_results: Mutex<VecDeque<Result<(), AddonClientError>>>,
    commands: Mutex<Vec<PowerCommand>>,
    summary_delay: Mutex<Duration>,
    command_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeAddon {
    pub fn new() -> Self {
        Self {
            summaries: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            command_results: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            summary_delay: Mutex::new(Duration::ZERO),
            command_delay: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn push_summary(&self, result: Result<AddonSummary, AddonClientError>) {
        self.summaries.lock().unwrap().push_back(result);
    }

    pub fn set_fallback(&self, result: Result<AddonSummary, AddonClientError>) {
        *self.fallback.lock().unwrap() = Some(result);
    }

    pub fn push_command_result(&self, result: Result<(), AddonClientError>) {
        self.command_results.lock().unwrap().push_back(result);
    }

    pub fn set_summary_delay(&self, delay: Duration) {
        *self.summary_delay.lock().unwrap() = delay;
    }

    pub fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock().unwrap() = delay;
    }

    pub fn executed_commands(&self) -> Vec<PowerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl AddonApi for FakeAddon {
    async fn fetch_summary(&self) -> Result<AddonSummary, AddonClientError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = *self.summary_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let scripted = self.summaries.lock().unwrap().pop_front();
            match scripted {
                Some(result) => result,
                None => self
                    .fallback
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Err(AddonClientError::Unreachable("no scripted response".to_owned()))),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn execute_command(&self, command: PowerCommand) -> Result<(), AddonClientError> {
        self.commands.lock().unwrap().push(command);

        let delay = *self.command_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.command_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Summary with the given power state and raw sensor states, exposing all
/// ids as temperature sensors.
pub(crate) fn summary(power_on: bool, states: &[(&str, &str)]) -> AddonSummary {
    let sensors: serde_json::Map<String, serde_json::Value> = states
        .iter()
        .map(|(id, _)| (id.to_string(), serde_json::Value::String(id.to_string())))
        .collect();
    let values: serde_json::Map<String, serde_json::Value> = states
        .iter()
        .map(|(id, value)| (id.to_string(), serde_json::Value::String(value.to_string())))
        .collect();

    serde_json::from_value(serde_json::json!({
        "success": true,
        "device": { "manufacturer_name": "Supermicro", "product_name": "X10SLL-F" },
        "power_on": power_on,
        "sensors": { "temperature": sensors },
        "states": values,
    }))
    .expect("valid fake summary")
}
