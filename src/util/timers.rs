//! Fire-once deadline queue driven by a world clock.
//!
//! Tasks are popped in due order; equal deadlines pop in scheduling order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Scheduled<T> {
    due_us: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due_us == other.due_us && self.seq == other.seq
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.due_us.cmp(&other.due_us) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            o => o,
        }
    }
}

/// Deadline queue keyed by world time in seconds
#[derive(Debug)]
pub struct TaskQueue<T> {
    events: BinaryHeap<Reverse<Scheduled<T>>>,
    next_seq: u64,
}

fn to_micros(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000.0).round() as u64
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            events: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` to fire at absolute world time `due`
    pub fn schedule_at(&mut self, due: f64, task: T) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.events.push(Reverse(Scheduled {
            due_us: to_micros(due),
            seq,
            task,
        }));
    }

    /// Schedule `task` to fire `delay` seconds after `now`
    pub fn schedule_in(&mut self, now: f64, delay: f64, task: T) {
        self.schedule_at(now + delay.max(0.0), task);
    }

    /// Pop the earliest task whose deadline is at or before `now`
    fn pop_due(&mut self, now: f64) -> Option<T> {
        let due = self.events.peek()?.0.due_us;
        if due > to_micros(now) {
            return None;
        }
        self.events.pop().map(|Reverse(ev)| ev.task)
    }

    /// Pop every task due at `now`. Tasks the caller schedules while running
    /// the batch wait for the next call, even when already due.
    pub fn take_due(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(task) = self.pop_due(now) {
            due.push(task);
        }
        due
    }

    /// Drop every pending task
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let mut queue = TaskQueue::new();
        queue.schedule_at(2.0, "late");
        queue.schedule_at(1.0, "early");
        queue.schedule_in(0.5, 0.5, "tied");

        assert_eq!(queue.pop_due(0.9), None);
        assert_eq!(queue.pop_due(1.0), Some("early"));
        assert_eq!(queue.pop_due(1.0), Some("tied"));
        assert_eq!(queue.pop_due(1.5), None);
        assert_eq!(queue.pop_due(5.0), Some("late"));
        assert!(queue.is_empty());
    }

    #[test]
    fn take_due_defers_tasks_scheduled_by_the_batch() {
        let mut queue = TaskQueue::new();
        queue.schedule_at(1.0, "a");
        queue.schedule_at(1.0, "b");
        queue.schedule_at(3.0, "later");

        for task in queue.take_due(1.0) {
            assert!(task == "a" || task == "b");
            // Re-arming with a sub-microsecond delay lands on the same clock
            queue.schedule_in(1.0, 1e-9, "rearmed");
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.take_due(1.0), ["rearmed", "rearmed"]);
        assert_eq!(queue.take_due(5.0), ["later"]);
    }

    #[test]
    fn clear_cancels_everything() {
        let mut queue = TaskQueue::new();
        queue.schedule_at(0.0, 1);
        queue.schedule_at(0.0, 2);
        queue.clear();
        assert_eq!(queue.pop_due(10.0), None);
        assert_eq!(queue.len(), 0);
    }
}
