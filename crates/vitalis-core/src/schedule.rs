//! Deferred-action queues.
//!
//! Two shapes of schedule are used by the timed processes:
//!
//! - [`TickSchedule`] -- sparse map from a future tick to the agents due
//!   then. Processes look up exactly the current tick each step; nothing
//!   scans the pending entries.
//! - [`DueQueue`] -- tick-ordered min-priority queue for "pop while due"
//!   consumption, where entries may be overdue.
//!
//! Both remove an entry before handing it out, so an entry fires at most
//! once no matter how often a tick is processed. Entries carry no
//! cancellation: whoever applies them revalidates the agent first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use vitalis_types::AgentIndex;

/// Sparse tick-indexed schedule of one-shot actions.
#[derive(Debug, Clone, Default)]
pub struct TickSchedule {
    entries: HashMap<u64, Vec<AgentIndex>>,
    pending: usize,
}

impl TickSchedule {
    /// An empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `agent` for `tick`.
    pub fn schedule(&mut self, tick: u64, agent: AgentIndex) {
        self.entries.entry(tick).or_default().push(agent);
        self.pending = self.pending.saturating_add(1);
    }

    /// Schedule every agent in `agents` for `tick`.
    pub fn schedule_many(&mut self, tick: u64, agents: &[AgentIndex]) {
        if agents.is_empty() {
            return;
        }
        self.entries.entry(tick).or_default().extend_from_slice(agents);
        self.pending = self.pending.saturating_add(agents.len());
    }

    /// Remove and return the entries keyed to `tick`, in scheduling order.
    ///
    /// A second call for the same tick returns an empty list.
    pub fn take_due(&mut self, tick: u64) -> Vec<AgentIndex> {
        let due = self.entries.remove(&tick).unwrap_or_default();
        self.pending = self.pending.saturating_sub(due.len());
        due
    }

    /// Entries keyed to `tick`, without removing them.
    pub fn peek(&self, tick: u64) -> &[AgentIndex] {
        self.entries.get(&tick).map_or(&[], Vec::as_slice)
    }

    /// Total entries not yet taken.
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Whether no entries are pending.
    pub const fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Earliest tick with pending entries.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.keys().min().copied()
    }

    /// Number of distinct ticks with pending entries.
    pub fn scheduled_ticks(&self) -> usize {
        self.entries.len()
    }
}

/// Tick-ordered min-priority queue of deferred actions.
///
/// Ties on the tick are broken by agent index.
#[derive(Debug, Clone, Default)]
pub struct DueQueue {
    heap: BinaryHeap<Reverse<(u64, AgentIndex)>>,
}

impl DueQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `agent` for `tick`.
    pub fn push(&mut self, tick: u64, agent: AgentIndex) {
        self.heap.push(Reverse((tick, agent)));
    }

    /// Scheduled tick of the earliest entry.
    pub fn peek_tick(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse((tick, _))| *tick)
    }

    /// Pop the earliest entry if it is due at or before `tick`.
    pub fn pop_due(&mut self, tick: u64) -> Option<(u64, AgentIndex)> {
        if self.peek_tick()? <= tick {
            self.heap.pop().map(|Reverse(entry)| entry)
        } else {
            None
        }
    }

    /// Pop every entry due at or before `tick`, earliest first.
    pub fn drain_due(&mut self, tick: u64) -> Vec<(u64, AgentIndex)> {
        let mut due = Vec::new();
        while let Some(entry) = self.pop_due(tick) {
            due.push(entry);
        }
        due
    }

    /// Entries not yet popped.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
