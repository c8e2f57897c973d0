// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One-shot timer queue
//!
//! Every subsystem defers work (IRQs, DMA completion, scanline events)
//! through this queue. Each event has a stable integer id indexing a fixed
//! table; an event is on the sorted *short* list (due within the current
//! virtual second), on the unsorted *long* list (seconds pending), or
//! unscheduled. Short-list times are nanoseconds on the same clock as the
//! SH4 slice cycle; they are decremented wholesale at the end of each time
//! slice. Once per virtual second a sweep decrements every long entry;
//! entries reaching zero seconds migrate to the short list.
//!
//! Handlers are dispatched by the system: it pops due events one at a time
//! (re-reading the head after each, since handlers commonly re-schedule the
//! id that just fired) and routes each id to its owning module. Events 0..96
//! are the ASIC event numbers.

use serde::{Deserialize, Serialize};

/// Number of event slots
pub const MAX_EVENT_ID: usize = 128;
/// Sentinel time for an unscheduled event
pub const NOT_SCHEDULED: u32 = 0xFFFF_FFFF;
/// One virtual second, the long-list sweep period
const LONG_SCAN_PERIOD: i64 = 1_000_000_000;

/// No successor in an intrusive list
const NIL: i16 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventSlot {
    /// Whole seconds remaining (long list only)
    seconds: u32,
    /// Nanoseconds component; `NOT_SCHEDULED` when idle
    nanosecs: u32,
    /// Next slot in whichever list holds this event
    next: i16,
}

/// One-shot timer service with nanosecond resolution
///
/// # Example
///
/// ```
/// use dcrx::core::event::{EventQueue, NOT_SCHEDULED};
///
/// let mut q = EventQueue::new();
/// q.schedule(2, 500, 0);
/// assert_eq!(q.next_time(), 500);
/// assert_eq!(q.pop_due(1000), Some(2));
/// assert_eq!(q.next_time(), NOT_SCHEDULED);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueue {
    events: Vec<EventSlot>,
    head: i16,
    long_head: i16,
    long_scan_time_remaining: i64,
}

impl EventQueue {
    /// Create a queue with every event unscheduled
    pub fn new() -> Self {
        Self {
            events: vec![
                EventSlot { seconds: 0, nanosecs: NOT_SCHEDULED, next: NIL };
                MAX_EVENT_ID
            ],
            head: NIL,
            long_head: NIL,
            long_scan_time_remaining: LONG_SCAN_PERIOD,
        }
    }

    /// Unschedule everything
    pub fn reset(&mut self) {
        self.head = NIL;
        self.long_head = NIL;
        self.long_scan_time_remaining = LONG_SCAN_PERIOD;
        for slot in &mut self.events {
            slot.nanosecs = NOT_SCHEDULED;
            slot.seconds = 0;
            slot.next = NIL;
        }
    }

    /// True if `id` is currently on either list
    pub fn is_scheduled(&self, id: usize) -> bool {
        self.events[id].nanosecs != NOT_SCHEDULED
    }

    /// Absolute time of the next short-list event, or [`NOT_SCHEDULED`]
    pub fn next_time(&self) -> u32 {
        if self.head == NIL {
            NOT_SCHEDULED
        } else {
            self.events[self.head as usize].nanosecs
        }
    }

    /// Insert into the short list, keeping it sorted ascending by time.
    /// Ties go after existing entries so same-time events fire in schedule
    /// order.
    fn enqueue(&mut self, id: usize) {
        let time = self.events[id].nanosecs;
        if self.head == NIL || time < self.events[self.head as usize].nanosecs {
            self.events[id].next = self.head;
            self.head = id as i16;
        } else {
            let mut cur = self.head as usize;
            while self.events[cur].next != NIL
                && time >= self.events[self.events[cur].next as usize].nanosecs
            {
                cur = self.events[cur].next as usize;
            }
            self.events[id].next = self.events[cur].next;
            self.events[cur].next = id as i16;
        }
    }

    fn dequeue_short(&mut self, id: usize) {
        if self.head == NIL {
            log::error!("Empty event queue but should contain event {}", id);
        } else if self.head == id as i16 {
            self.head = self.events[id].next;
        } else {
            let mut cur = self.head as usize;
            while self.events[cur].next != NIL {
                if self.events[cur].next == id as i16 {
                    self.events[cur].next = self.events[id].next;
                    return;
                }
                cur = self.events[cur].next as usize;
            }
        }
    }

    fn dequeue_long(&mut self, id: usize) {
        if self.long_head == NIL {
            log::error!("Empty long event queue but should contain event {}", id);
        } else if self.long_head == id as i16 {
            self.long_head = self.events[id].next;
        } else {
            let mut cur = self.long_head as usize;
            while self.events[cur].next != NIL {
                if self.events[cur].next == id as i16 {
                    self.events[cur].next = self.events[id].next;
                    return;
                }
                cur = self.events[cur].next as usize;
            }
        }
    }

    /// Schedule `id` to fire `nanos` nanoseconds from `now` (the current
    /// slice cycle). Re-scheduling an already-pending id replaces the prior
    /// schedule.
    pub fn schedule(&mut self, id: usize, nanos: u32, now: u32) {
        if self.is_scheduled(id) {
            self.cancel(id);
        }
        self.events[id].seconds = 0;
        self.events[id].nanosecs = nanos.wrapping_add(now);
        self.enqueue(id);
    }

    /// Schedule `id` to fire after `seconds` + `nanos`. Zero seconds falls
    /// through to [`EventQueue::schedule`]; otherwise the event sits on the
    /// long list until the per-second sweep migrates it.
    pub fn schedule_long(&mut self, id: usize, seconds: u32, nanos: u32, now: u32) {
        if seconds == 0 {
            self.schedule(id, nanos, now);
            return;
        }
        if self.is_scheduled(id) {
            self.cancel(id);
        }
        self.events[id].seconds = seconds;
        self.events[id].nanosecs = nanos;
        self.events[id].next = self.long_head;
        self.long_head = id as i16;
    }

    /// Remove `id` from whichever list holds it. A no-op if unscheduled.
    pub fn cancel(&mut self, id: usize) {
        if !self.is_scheduled(id) {
            return;
        }
        let long = self.events[id].seconds != 0;
        self.events[id].nanosecs = NOT_SCHEDULED;
        self.events[id].seconds = 0;
        if long {
            self.dequeue_long(id);
        } else {
            self.dequeue_short(id);
        }
        self.events[id].next = NIL;
    }

    /// Pop the head event if it is due at `now`. The caller loops, invoking
    /// each handler before asking again, so re-schedules made by a handler
    /// are honoured immediately.
    pub fn pop_due(&mut self, now: u32) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let id = self.head as usize;
        if self.events[id].nanosecs > now {
            return None;
        }
        self.head = self.events[id].next;
        self.events[id].nanosecs = NOT_SCHEDULED;
        self.events[id].next = NIL;
        Some(id)
    }

    /// Sweep the long list: decrement each entry by one second and migrate
    /// entries reaching zero onto the short list.
    fn scan_long(&mut self) {
        while self.long_head != NIL {
            let id = self.long_head as usize;
            self.events[id].seconds -= 1;
            if self.events[id].seconds != 0 {
                break;
            }
            self.long_head = self.events[id].next;
            self.enqueue(id);
        }

        if self.long_head != NIL {
            let mut last = self.long_head as usize;
            let mut cur = self.events[last].next;
            while cur != NIL {
                let id = cur as usize;
                self.events[id].seconds -= 1;
                if self.events[id].seconds == 0 {
                    self.events[last].next = self.events[id].next;
                    self.enqueue(id);
                } else {
                    last = id;
                }
                cur = self.events[last].next;
            }
        }
    }

    /// Advance the queue clock by `nanosecs`: every pending short-list time
    /// is decremented (clamping at zero), and the long-list sweep runs when
    /// its one-second countdown expires. Returns the nanoseconds consumed.
    pub fn run_slice(&mut self, nanosecs: u32) -> u32 {
        let mut cur = self.head;
        while cur != NIL {
            let slot = &mut self.events[cur as usize];
            slot.nanosecs = slot.nanosecs.saturating_sub(nanosecs);
            cur = slot.next;
        }

        self.long_scan_time_remaining -= i64::from(nanosecs);
        if self.long_scan_time_remaining <= 0 {
            self.long_scan_time_remaining += LONG_SCAN_PERIOD;
            self.scan_long();
        }
        nanosecs
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(q: &mut EventQueue, now: u32) -> Vec<usize> {
        let mut fired = Vec::new();
        while let Some(id) = q.pop_due(now) {
            fired.push(id);
        }
        fired
    }

    #[test]
    fn test_dispatch_order() {
        // Scenario: A at 1000, B at 500, C at 750 -> B, C, A at now=2000
        let mut q = EventQueue::new();
        q.schedule(10, 1000, 0); // A
        q.schedule(11, 500, 0); // B
        q.schedule(12, 750, 0); // C
        assert_eq!(drain(&mut q, 2000), vec![11, 12, 10]);
    }

    #[test]
    fn test_not_due_yet() {
        let mut q = EventQueue::new();
        q.schedule(3, 1000, 0);
        assert_eq!(q.pop_due(999), None);
        assert_eq!(q.pop_due(1000), Some(3));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut q = EventQueue::new();
        q.schedule(3, 100, 0);
        q.schedule(4, 200, 0);
        q.cancel(3);
        assert_eq!(drain(&mut q, 1000), vec![4]);
        // Cancelling an unscheduled id is a no-op
        q.cancel(3);
        assert!(!q.is_scheduled(3));
    }

    #[test]
    fn test_reschedule_replaces() {
        let mut q = EventQueue::new();
        q.schedule(5, 100, 0);
        q.schedule(5, 5000, 0);
        assert_eq!(q.pop_due(1000), None);
        assert_eq!(q.pop_due(5000), Some(5));
    }

    #[test]
    fn test_schedule_relative_to_now() {
        let mut q = EventQueue::new();
        q.schedule(1, 100, 400);
        assert_eq!(q.next_time(), 500);
    }

    #[test]
    fn test_run_slice_decrements() {
        let mut q = EventQueue::new();
        q.schedule(1, 1_500_000, 0);
        q.run_slice(1_000_000);
        assert_eq!(q.next_time(), 500_000);
        q.run_slice(1_000_000);
        // Clamped at zero, fires immediately next slice
        assert_eq!(q.next_time(), 0);
    }

    #[test]
    fn test_long_list_migration() {
        // An event at (2s, 100ns) must not fire before ~2 virtual seconds
        let mut q = EventQueue::new();
        q.schedule_long(7, 2, 100, 0);
        assert_eq!(q.next_time(), NOT_SCHEDULED);

        // First virtual second: still on the long list
        for _ in 0..1000 {
            q.run_slice(1_000_000);
            assert_eq!(q.pop_due(0), None);
        }
        // Second virtual second: migrates at the sweep
        for _ in 0..1000 {
            q.run_slice(1_000_000);
        }
        assert!(q.next_time() <= 100);
        assert_eq!(q.pop_due(100), Some(7));
    }

    #[test]
    fn test_schedule_long_zero_seconds() {
        let mut q = EventQueue::new();
        q.schedule_long(9, 0, 300, 0);
        assert_eq!(q.next_time(), 300);
    }

    #[test]
    fn test_handler_reschedule_seen_in_same_drain() {
        let mut q = EventQueue::new();
        q.schedule(1, 10, 0);
        let mut fired = Vec::new();
        let mut rearmed = false;
        while let Some(id) = q.pop_due(100) {
            fired.push(id);
            if !rearmed {
                // A handler re-scheduling itself within the due window is
                // picked up by the same drain loop
                q.schedule(1, 50, 0);
                rearmed = true;
            }
        }
        assert_eq!(fired, vec![1, 1]);
    }

    proptest! {
        #[test]
        fn prop_events_fire_in_time_order(times in proptest::collection::vec(0u32..100_000, 1..20)) {
            let mut q = EventQueue::new();
            for (id, &t) in times.iter().enumerate() {
                q.schedule(id, t, 0);
            }
            let mut fired_times = Vec::new();
            while let Some(id) = q.pop_due(u32::MAX - 1) {
                fired_times.push(times[id]);
            }
            prop_assert_eq!(fired_times.len(), times.len());
            let mut sorted = fired_times.clone();
            sorted.sort();
            prop_assert_eq!(fired_times, sorted);
        }
    }
}
