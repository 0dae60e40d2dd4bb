//! Buffered command log replayed to late joiners

use log::debug;
use shared::{BufferChannel, Command};

/// Latest buffered command per channel, in the order channels were first
/// written. Replaying it brings a fresh peer to the current session state
/// without the history that led there.
#[derive(Debug, Default)]
pub struct BufferedLog {
    entries: Vec<(BufferChannel, Command)>,
}

impl BufferedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `command` as the latest value of its channel. Commands
    /// without a channel are not buffered; returns whether it was kept.
    pub fn record(&mut self, command: &Command) -> bool {
        let Some(channel) = command.buffer_channel() else {
            debug!("{} has no buffer channel, not recording", command);
            return false;
        };

        match self.entries.iter_mut().find(|(c, _)| *c == channel) {
            Some(entry) => entry.1 = command.clone(),
            None => self.entries.push((channel, command.clone())),
        }
        true
    }

    /// Commands to send a late joiner, oldest channel first.
    pub fn replay(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter().map(|(_, command)| command)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
