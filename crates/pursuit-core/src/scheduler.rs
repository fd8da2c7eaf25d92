//! Delayed-task scheduler.
//!
//! Every timer in the server (periodic cadences and per-participant one-shot
//! tasks) is a `TaskKey` in one priority queue. A key is scheduled at most
//! once: scheduling it again replaces the due time. Replaced and cancelled
//! entries stay in the heap and are skipped on pop by generation check.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use contracts::{ParticipantId, TimestampMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CombinedTick,
    RoleCheck,
    MoneyPerMinute,
    CoolMessage,
    Autosave,
    Welcome,
    RoleRecheck,
}

impl TaskKind {
    pub fn is_periodic(self) -> bool {
        !matches!(self, Self::Welcome | Self::RoleRecheck)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub kind: TaskKind,
    /// `None` for global cadences.
    pub participant: Option<ParticipantId>,
}

impl TaskKey {
    pub fn global(kind: TaskKind) -> Self {
        Self {
            kind,
            participant: None,
        }
    }

    pub fn for_participant(kind: TaskKind, participant: ParticipantId) -> Self {
        Self {
            kind,
            participant: Some(participant),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask {
    pub due_at: TimestampMs,
    pub key: TaskKey,
}

// ---------------------------------------------------------------------------
// Ordering for queued tasks
// ---------------------------------------------------------------------------

/// Ordering: (due_at ASC, key ASC, generation ASC).
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderedTask {
    due_at: TimestampMs,
    key: TaskKey,
    generation: u64,
}

impl PartialOrd for OrderedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| self.generation.cmp(&other.generation))
    }
}

// ---------------------------------------------------------------------------
// TaskScheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TaskScheduler {
    queue: BinaryHeap<Reverse<OrderedTask>>,
    /// Live entry per key: (due_at, generation).
    live: BTreeMap<TaskKey, (TimestampMs, u64)>,
    next_generation: u64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` at `due_at`, replacing any pending entry for it.
    pub fn schedule(&mut self, key: TaskKey, due_at: TimestampMs) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.live.insert(key.clone(), (due_at, generation));
        self.queue.push(Reverse(OrderedTask {
            due_at,
            key,
            generation,
        }));
    }

    pub fn schedule_after(&mut self, key: TaskKey, now: TimestampMs, delay_ms: u64) {
        self.schedule(key, now.saturating_add(delay_ms));
    }

    /// Returns whether a pending entry was dropped.
    pub fn cancel(&mut self, key: &TaskKey) -> bool {
        self.live.remove(key).is_some()
    }

    /// Drops every task owned by `participant`. Returns how many were pending.
    pub fn cancel_participant(&mut self, participant: &ParticipantId) -> usize {
        let before = self.live.len();
        self.live
            .retain(|key, _| key.participant.as_ref() != Some(participant));
        before - self.live.len()
    }

    /// Pops the earliest live task due at or before `now`.
    pub fn pop_due(&mut self, now: TimestampMs) -> Option<DueTask> {
        loop {
            let next = self.queue.peek()?;
            if next.0.due_at > now {
                return None;
            }
            let Reverse(task) = self.queue.pop()?;
            let is_live = self
                .live
                .get(&task.key)
                .is_some_and(|(_, generation)| *generation == task.generation);
            if !is_live {
                continue;
            }
            self.live.remove(&task.key);
            return Some(DueTask {
                due_at: task.due_at,
                key: task.key,
            });
        }
    }

    /// Earliest live due time.
    pub fn next_due(&self) -> Option<TimestampMs> {
        self.live.values().map(|(due_at, _)| *due_at).min()
    }

    pub fn due_at(&self, key: &TaskKey) -> Option<TimestampMs> {
        self.live.get(key).map(|(due_at, _)| *due_at)
    }

    pub fn is_scheduled(&self, key: &TaskKey) -> bool {
        self.live.contains_key(key)
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn welcome(id: &str) -> TaskKey {
        TaskKey::for_participant(TaskKind::Welcome, ParticipantId::from(id))
    }

    #[test]
    fn pops_in_due_then_key_order() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(TaskKey::global(TaskKind::RoleCheck), 500);
        scheduler.schedule(TaskKey::global(TaskKind::CombinedTick), 500);
        scheduler.schedule(welcome("b"), 100);

        let order = std::iter::from_fn(|| scheduler.pop_due(1_000))
            .map(|task| task.key.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![TaskKind::Welcome, TaskKind::CombinedTick, TaskKind::RoleCheck]
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn rescheduling_replaces_due_time() {
        let mut scheduler = TaskScheduler::new();
        let key = TaskKey::for_participant(TaskKind::RoleRecheck, ParticipantId::from("a"));
        scheduler.schedule(key.clone(), 100);
        scheduler.schedule_after(key.clone(), 100, 500);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.due_at(&key), Some(600));
        assert!(scheduler.pop_due(599).is_none());
        assert_eq!(
            scheduler.pop_due(600),
            Some(DueTask {
                due_at: 600,
                key: key.clone()
            })
        );
        assert!(scheduler.pop_due(10_000).is_none());
    }

    #[test]
    fn cancel_participant_drops_only_their_tasks() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(welcome("a"), 10);
        scheduler.schedule(
            TaskKey::for_participant(TaskKind::RoleRecheck, ParticipantId::from("a")),
            20,
        );
        scheduler.schedule(welcome("b"), 30);
        scheduler.schedule(TaskKey::global(TaskKind::Autosave), 40);

        assert_eq!(scheduler.cancel_participant(&ParticipantId::from("a")), 2);
        let remaining = std::iter::from_fn(|| scheduler.pop_due(100))
            .map(|task| task.key)
            .collect::<Vec<_>>();
        assert_eq!(
            remaining,
            vec![welcome("b"), TaskKey::global(TaskKind::Autosave)]
        );
    }

    #[test]
    fn next_due_ignores_cancelled_entries() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule(welcome("a"), 10);
        scheduler.schedule(TaskKey::global(TaskKind::CombinedTick), 1_000);
        assert!(scheduler.cancel(&welcome("a")));
        assert!(!scheduler.cancel(&welcome("a")));
        assert_eq!(scheduler.next_due(), Some(1_000));
        assert!(TaskKind::CombinedTick.is_periodic());
        assert!(!TaskKind::Welcome.is_periodic());
    }
}
