use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_util::sync::CancellationToken;

use crate::adapter::addon::AddonApi;
use crate::command::{CommandError, CommandSequencer};
use crate::core::{PowerCommand, PowerStatus, SwitchState};
use crate::polling::StatusSnapshot;

#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub turn_on_deadline: Duration,
    /// Longer than the turn-on deadline since an OS shutdown is slower than
    /// a power-on.
    pub turn_off_deadline: Duration,
    pub forced_off_grace: Duration,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            turn_on_deadline: Duration::from_secs(60),
            turn_off_deadline: Duration::from_secs(120),
            forced_off_grace: Duration::from_secs(15),
        }
    }
}

/// Graceful on/off entity for one server.
///
/// Turn-off is two-phase: soft shutdown first, verified against polled power
/// status, with a forced power-off fallback exactly once after the deadline.
/// Graceful shutdown is best-effort and must neither block the entity
/// indefinitely nor silently leave a server running that ignored the signal.
pub struct PowerSwitch<A> {
    alias: String,
    config: SwitchConfig,
    sequencer: Arc<CommandSequencer<A>>,
    status_rx: watch::Receiver<StatusSnapshot>,
    state_tx: watch::Sender<SwitchState>,
    in_transition: AtomicBool,
    transition_lock: Mutex<()>,
}

impl<A: AddonApi> PowerSwitch<A> {
    pub fn new(
        alias: &str,
        config: SwitchConfig,
        sequencer: Arc<CommandSequencer<A>>,
        status_rx: watch::Receiver<StatusSnapshot>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SwitchState::Unknown);

        Self {
            alias: alias.to_owned(),
            config,
            sequencer,
            status_rx,
            state_tx,
            in_transition: AtomicBool::new(false),
            transition_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SwitchState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SwitchState> {
        self.state_tx.subscribe()
    }

    /// Keeps the idle switch aligned with the latest completed status poll.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.status_rx.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let snapshot = *rx.borrow_and_update();
            self.apply_status(snapshot);
        }
    }

    /// Reconciliation outside of transitions; a transition in flight owns
    /// the state until it settles.
    pub fn apply_status(&self, snapshot: StatusSnapshot) {
        if self.in_transition.load(Ordering::SeqCst) {
            return;
        }

        let state = match snapshot.status {
            PowerStatus::On => SwitchState::On,
            PowerStatus::Off => SwitchState::Off,
            PowerStatus::Unknown => SwitchState::Unknown,
        };

        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    /// Power the server on and wait for polled status to confirm it.
    ///
    /// A failed submission leaves the state untouched since the command
    /// demonstrably never reached the hardware. An unconfirmed power-on is
    /// not a hard error: the host may just be slow to boot.
    pub async fn turn_on(&self) -> Result<(), CommandError> {
        let _transition = self.begin_transition()?;

        if self.state() == SwitchState::On {
            return Ok(());
        }

        self.sequencer.submit(PowerCommand::PowerOn).await?;
        self.state_tx.send_replace(SwitchState::TurningOn);

        if self.await_status(PowerStatus::On, self.config.turn_on_deadline).await {
            self.state_tx.send_replace(SwitchState::On);
        } else {
            tracing::warn!(
                "Power-on of {} unconfirmed within {:?}; state unknown until the next poll",
                self.alias,
                self.config.turn_on_deadline
            );
            self.state_tx.send_replace(SwitchState::Unknown);
        }

        Ok(())
    }

    /// Gracefully shut the server down, forcing power off exactly once if
    /// the soft shutdown is not confirmed before the deadline.
    pub async fn turn_off(&self) -> Result<(), CommandError> {
        let _transition = self.begin_transition()?;

        self.sequencer.submit(PowerCommand::SoftShutdown).await?;
        self.state_tx.send_replace(SwitchState::TurningOff);

        if self.await_status(PowerStatus::Off, self.config.turn_off_deadline).await {
            self.state_tx.send_replace(SwitchState::Off);
            return Ok(());
        }

        tracing::warn!(
            "Soft shutdown of {} unconfirmed within {:?}, forcing power off",
            self.alias,
            self.config.turn_off_deadline
        );

        match self.sequencer.submit(PowerCommand::PowerOff).await {
            Ok(()) => {
                if self.await_status(PowerStatus::Off, self.config.forced_off_grace).await {
                    self.state_tx.send_replace(SwitchState::Off);
                } else {
                    tracing::warn!("Forced power off of {} unconfirmed, state unknown", self.alias);
                    self.state_tx.send_replace(SwitchState::Unknown);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Forced power off of {} failed: {}", self.alias, e);
                self.state_tx.send_replace(SwitchState::Unknown);
                Err(e)
            }
        }
    }

    fn begin_transition(&self) -> Result<TransitionGuard<'_>, CommandError> {
        let Ok(lock) = self.transition_lock.try_lock() else {
            return Err(CommandError::CommandInProgress);
        };

        self.in_transition.store(true, Ordering::SeqCst);
        Ok(TransitionGuard {
            flag: &self.in_transition,
            _lock: lock,
        })
    }

    /// Waits until the latest completed poll reports the wanted status.
    /// Returns false when the deadline elapses first.
    async fn await_status(&self, want: PowerStatus, deadline: Duration) -> bool {
        let mut rx = self.status_rx.clone();

        tokio::time::timeout(deadline, async move {
            loop {
                if rx.borrow_and_update().status == want {
                    return;
                }
                if rx.changed().await.is_err() {
                    // status source gone; wait out the deadline
                    futures::future::pending::<()>().await;
                }
            }
        })
        .await
        .is_ok()
    }
}

/// Clears the in-transition flag even when the owning wait is abandoned.
struct TransitionGuard<'a> {
    flag: &'a AtomicBool,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::addon::AddonClientError;
    use crate::adapter::addon::fake::FakeAddon;

    struct Harness {
        addon: Arc<FakeAddon>,
        switch: Arc<PowerSwitch<FakeAddon>>,
        status_tx: watch::Sender<StatusSnapshot>,
        cycle: u64,
    }

    impl Harness {
        fn new() -> Self {
            let addon = Arc::new(FakeAddon::new());
            let sequencer = Arc::new(CommandSequencer::new("rack1", addon.clone(), 2, Duration::from_secs(2)));
            let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
            let switch = Arc::new(PowerSwitch::new(
                "rack1",
                SwitchConfig::default(),
                sequencer,
                status_rx,
            ));

            Self {
                addon,
                switch,
                status_tx,
                cycle: 0,
            }
        }

        /// Publishes one completed poll result and lets waiters run.
        async fn poll_reports(&mut self, status: PowerStatus) {
            self.cycle += 1;
            self.status_tx.send_replace(StatusSnapshot {
                status,
                cycle: self.cycle,
            });
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn turn_off_settles_on_the_cycle_reporting_off() {
        let mut harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::On,
            cycle: 0,
        });

        let switch = harness.switch.clone();
        let task = tokio::spawn(async move { switch.turn_off().await });
        tokio::task::yield_now().await;

        assert_eq!(harness.switch.state(), SwitchState::TurningOff);
        assert_eq!(harness.addon.executed_commands(), vec![PowerCommand::SoftShutdown]);

        harness.poll_reports(PowerStatus::On).await;
        assert_eq!(harness.switch.state(), SwitchState::TurningOff);

        harness.poll_reports(PowerStatus::On).await;
        assert_eq!(harness.switch.state(), SwitchState::TurningOff);

        harness.poll_reports(PowerStatus::Off).await;
        assert_eq!(harness.switch.state(), SwitchState::Off);

        assert!(task.await.expect("turn_off task").is_ok());
        assert_eq!(harness.addon.executed_commands(), vec![PowerCommand::SoftShutdown]);
    }

    #[tokio::test(start_paused = true)]
    async fn missed_deadline_forces_power_off_exactly_once() {
        let harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::On,
            cycle: 0,
        });

        let switch = harness.switch.clone();
        let task = tokio::spawn(async move { switch.turn_off().await });
        tokio::task::yield_now().await;
        assert_eq!(harness.switch.state(), SwitchState::TurningOff);

        // no poll ever reports off; the soft deadline elapses
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(
            harness.addon.executed_commands(),
            vec![PowerCommand::SoftShutdown, PowerCommand::PowerOff]
        );

        let mut harness = harness;
        harness.poll_reports(PowerStatus::Off).await;
        assert_eq!(harness.switch.state(), SwitchState::Off);

        assert!(task.await.expect("turn_off task").is_ok());
        assert_eq!(
            harness.addon.executed_commands(),
            vec![PowerCommand::SoftShutdown, PowerCommand::PowerOff]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_forced_power_off_ends_unknown() {
        let harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::On,
            cycle: 0,
        });

        let switch = harness.switch.clone();
        let task = tokio::spawn(async move { switch.turn_off().await });
        tokio::task::yield_now().await;

        // soft deadline plus forced-off grace elapse without an off status
        tokio::time::sleep(Duration::from_secs(140)).await;

        assert!(task.await.expect("turn_off task").is_ok());
        assert_eq!(harness.switch.state(), SwitchState::Unknown);
        assert_eq!(
            harness.addon.executed_commands(),
            vec![PowerCommand::SoftShutdown, PowerCommand::PowerOff]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn turn_on_confirms_within_deadline() {
        let mut harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::Off,
            cycle: 0,
        });

        let switch = harness.switch.clone();
        let task = tokio::spawn(async move { switch.turn_on().await });
        tokio::task::yield_now().await;

        assert_eq!(harness.switch.state(), SwitchState::TurningOn);

        harness.poll_reports(PowerStatus::Off).await;
        assert_eq!(harness.switch.state(), SwitchState::TurningOn);

        harness.poll_reports(PowerStatus::On).await;
        assert_eq!(harness.switch.state(), SwitchState::On);

        assert!(task.await.expect("turn_on task").is_ok());
        assert_eq!(harness.addon.executed_commands(), vec![PowerCommand::PowerOn]);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_turn_on_ends_unknown_without_error() {
        let harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::Off,
            cycle: 0,
        });

        let switch = harness.switch.clone();
        let task = tokio::spawn(async move { switch.turn_on().await });
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(task.await.expect("turn_on task").is_ok());
        assert_eq!(harness.switch.state(), SwitchState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_reverts_to_pre_transition_state() {
        let harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::On,
            cycle: 0,
        });

        harness
            .addon
            .push_command_result(Err(AddonClientError::Addon("ipmitool exited with code 1".to_owned())));

        let result = harness.switch.turn_off().await;

        assert!(matches!(result, Err(CommandError::Addon(AddonClientError::Addon(_)))));
        assert_eq!(harness.switch.state(), SwitchState::On);
    }

    #[tokio::test(start_paused = true)]
    async fn turn_off_of_an_off_server_settles_on_off() {
        let mut harness = Harness::new();
        harness.poll_reports(PowerStatus::Off).await;

        // already off: the verification path confirms on the latest poll
        // without waiting out the deadline or forcing power off
        harness.switch.turn_off().await.expect("turn_off should succeed");

        assert_eq!(harness.switch.state(), SwitchState::Off);
        assert_eq!(harness.addon.executed_commands(), vec![PowerCommand::SoftShutdown]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_transition_fails_fast() {
        let harness = Harness::new();
        harness.switch.apply_status(StatusSnapshot {
            status: PowerStatus::On,
            cycle: 0,
        });

        let switch = harness.switch.clone();
        let task = tokio::spawn(async move { switch.turn_off().await });
        tokio::task::yield_now().await;

        let second = harness.switch.turn_on().await;
        assert!(matches!(second, Err(CommandError::CommandInProgress)));

        let mut harness = harness;
        harness.poll_reports(PowerStatus::Off).await;
        assert!(task.await.expect("turn_off task").is_ok());
        assert_eq!(harness.switch.state(), SwitchState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_switch_follows_polled_status() {
        let mut harness = Harness::new();
        let cancel = CancellationToken::new();
        let reconcile = tokio::spawn(harness.switch.clone().run(cancel.clone()));

        assert_eq!(harness.switch.state(), SwitchState::Unknown);

        harness.poll_reports(PowerStatus::On).await;
        assert_eq!(harness.switch.state(), SwitchState::On);

        harness.poll_reports(PowerStatus::Unknown).await;
        assert_eq!(harness.switch.state(), SwitchState::Unknown);

        harness.poll_reports(PowerStatus::Off).await;
        assert_eq!(harness.switch.state(), SwitchState::Off);

        cancel.cancel();
        reconcile.await.expect("reconciliation task should stop");
    }
}
