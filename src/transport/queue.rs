//! Outbound queue.
//!
//! Holds commands issued while no transport is ready and hands them over,
//! oldest first, once one is. A delivery that fails leaves the command at
//! the head of the queue, so an interrupted flush neither loses nor
//! duplicates anything.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use tracing::{trace, warn};

use crate::protocol::Command;

// ============================================================================
// OutboundQueue
// ============================================================================

/// Bounded FIFO of not-yet-sent commands.
///
/// Beyond `capacity` the oldest entry is dropped with a warning.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<Command>,
    capacity: usize,
}

impl OutboundQueue {
    /// Creates an empty queue holding at most `capacity` commands.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends a command.
    pub fn enqueue(&mut self, command: Command) {
        if self.entries.len() >= self.capacity
            && let Some(dropped) = self.entries.pop_front()
        {
            warn!(
                command = %dropped.name,
                capacity = self.capacity,
                "Outbound queue full, dropping oldest command"
            );
        }

        trace!(command = %command.name, queued = self.entries.len() + 1, "Command queued");
        self.entries.push_back(command);
    }

    /// Puts commands back at the head, keeping their relative order.
    ///
    /// Used for commands a transport accepted but never wrote. They are
    /// older than anything already queued.
    pub fn requeue_front(&mut self, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }

        for command in commands.into_iter().rev() {
            self.entries.push_front(command);
        }
        while self.entries.len() > self.capacity {
            if let Some(dropped) = self.entries.pop_front() {
                warn!(command = %dropped.name, "Outbound queue full, dropping oldest command");
            }
        }
    }

    /// Hands queued commands to `deliver`, oldest first.
    ///
    /// `deliver` returns the command back as `Err` when the sink is not
    /// ready; draining stops there and the command stays at the head.
    /// Returns the number of commands delivered.
    pub fn drain<F>(&mut self, mut deliver: F) -> usize
    where
        F: FnMut(Command) -> Result<(), Command>,
    {
        let mut delivered = 0;
        while let Some(command) = self.entries.pop_front() {
            if let Err(command) = deliver(command) {
                self.entries.push_front(command);
                break;
            }
            delivered += 1;
        }

        if delivered > 0 {
            trace!(delivered, remaining = self.entries.len(), "Outbound queue drained");
        }
        delivered
    }

    /// Returns the number of queued commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
