mod sequencer;

pub use sequencer::{CommandError, CommandSequencer};
