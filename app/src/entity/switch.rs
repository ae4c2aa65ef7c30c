use std::sync::Arc;

use tokio::sync::watch;

use crate::adapter::addon::AddonApi;
use crate::command::CommandError;
use crate::core::SwitchState;
use crate::switch::PowerSwitch;

/// The graceful on/off entity: on issues power-on, off issues a soft
/// shutdown with forced fallback.
pub struct SwitchEntity<A> {
    switch: Arc<PowerSwitch<A>>,
    unique_id: String,
}

impl<A: AddonApi> SwitchEntity<A> {
    pub(crate) fn new(switch: Arc<PowerSwitch<A>>, server_unique_id: &str) -> Self {
        Self {
            switch,
            unique_id: format!("{}_chassis", server_unique_id),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn state(&self) -> SwitchState {
        self.switch.state()
    }

    /// Status-faithful view: a server still shutting down reports on, a
    /// server still booting reports off. `None` while the state is unknown.
    pub fn is_on(&self) -> Option<bool> {
        match self.switch.state() {
            SwitchState::On | SwitchState::TurningOff => Some(true),
            SwitchState::Off | SwitchState::TurningOn => Some(false),
            SwitchState::Unknown => None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SwitchState> {
        self.switch.subscribe()
    }

    pub async fn turn_on(&self) -> Result<(), CommandError> {
        self.switch.turn_on().await
    }

    pub async fn turn_off(&self) -> Result<(), CommandError> {
        self.switch.turn_off().await
    }
}
