use std::sync::Arc;

use crate::adapter::addon::AddonApi;
use crate::command::{CommandError, CommandSequencer};
use crate::core::PowerCommand;

/// One pressable power action, a thin call into the command sequencer.
pub struct PowerAction<A> {
    command: PowerCommand,
    unique_id: String,
    sequencer: Arc<CommandSequencer<A>>,
}

impl<A: AddonApi> PowerAction<A> {
    pub(crate) fn new(command: PowerCommand, server_unique_id: &str, sequencer: Arc<CommandSequencer<A>>) -> Self {
        Self {
            command,
            unique_id: format!("{}_{}", server_unique_id, command),
            sequencer,
        }
    }

    pub fn command(&self) -> PowerCommand {
        self.command
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub async fn press(&self) -> Result<(), CommandError> {
        self.sequencer.submit(self.command).await
    }
}
