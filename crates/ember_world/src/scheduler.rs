//! Scheduler - ticks and delayed messages
//!
//! Time is purely logical: the host supplies a delta to
//! [`World::advance_time`] and every interval and delay is compared against
//! the accumulated clock. Nothing here sleeps.
//!
//! Two kinds of work are scheduled:
//! - **Ticks**: a component asks to be ticked every update or at a fixed
//!   interval. A tick fires at most once per update; an interval shorter
//!   than the update degrades to once per update and missed intervals are
//!   never caught up.
//! - **Scheduled messages**: a message posted with a delay is delivered by
//!   the first drain pass at or after its fire time. Equal fire times are
//!   delivered in posting order. A message posted while the queue is being
//!   drained always waits for the next drain pass, even with zero delay.
//!
//! Time arithmetic saturates, so `Duration::MAX` works as "never".

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::component::{ComponentHandle, LifecycleState};
use crate::message::{Message, MessageTarget};
use crate::object::ObjectHandle;
use crate::world::World;

/// How often a component wants `tick` to be called
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TickInterval {
    /// Once per update
    EveryFrame,
    /// At most once per update, whenever the interval has elapsed
    Every(Duration),
    /// Not ticked
    #[default]
    Disabled,
}

impl TickInterval {
    /// Interval from a duration; zero means every frame
    pub fn from_duration(interval: Duration) -> Self {
        if interval.is_zero() {
            TickInterval::EveryFrame
        } else {
            TickInterval::Every(interval)
        }
    }

    fn period(self) -> Option<Duration> {
        match self {
            TickInterval::EveryFrame => Some(Duration::ZERO),
            TickInterval::Every(interval) if interval.is_zero() => Some(Duration::ZERO),
            TickInterval::Every(interval) => Some(interval),
            TickInterval::Disabled => None,
        }
    }
}

impl From<Duration> for TickInterval {
    fn from(interval: Duration) -> Self {
        Self::from_duration(interval)
    }
}

/// A component's tick request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickRegistration {
    /// Ticked component
    pub component: ComponentHandle,
    /// Requested period, zero for every frame
    pub interval: Duration,
    /// Earliest time the next tick may fire
    pub next_due: Duration,
}

/// A message waiting for its fire time
pub struct ScheduledMessage {
    /// Where the message goes
    pub target: MessageTarget,
    /// The message itself
    pub message: Box<dyn Message>,
    /// Logical time at which the message becomes due
    pub fire_at: Duration,
    /// Posting order, breaks ties between equal fire times
    pub sequence: u64,
}

impl ScheduledMessage {
    fn key(&self) -> (Duration, u64) {
        (self.fire_at, self.sequence)
    }
}

impl PartialEq for ScheduledMessage {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledMessage {}

impl PartialOrd for ScheduledMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledMessage {
    // Reversed so the max-heap pops the earliest entry first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl std::fmt::Debug for ScheduledMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledMessage")
            .field("target", &self.target)
            .field("message", &self.message)
            .field("fire_at", &self.fire_at)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Logical clock, tick registrations and the delayed message queue
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    frame: u64,
    ticks: Vec<TickRegistration>,
    queue: BinaryHeap<ScheduledMessage>,
    next_sequence: u64,
}

impl Scheduler {
    /// Create an empty scheduler at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of clock advances so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Move the clock forward by one update
    pub fn advance_clock(&mut self, delta: Duration) {
        self.now = self.now.saturating_add(delta);
        self.frame += 1;
    }

    // ------------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------------

    /// Register, update or remove a tick request.
    ///
    /// The first tick is due one interval from now; for every-frame ticks
    /// that is the next update.
    pub fn set_tick(&mut self, component: ComponentHandle, interval: TickInterval) {
        let Some(period) = interval.period() else {
            self.ticks.retain(|reg| reg.component != component);
            return;
        };
        let next_due = self.now.saturating_add(period);
        match self.ticks.iter_mut().find(|reg| reg.component == component) {
            Some(reg) => {
                reg.interval = period;
                reg.next_due = next_due;
            }
            None => self.ticks.push(TickRegistration {
                component,
                interval: period,
                next_due,
            }),
        }
    }

    /// Current tick request of a component
    pub fn tick_interval(&self, component: ComponentHandle) -> TickInterval {
        self.ticks
            .iter()
            .find(|reg| reg.component == component)
            .map_or(TickInterval::Disabled, |reg| TickInterval::from_duration(reg.interval))
    }

    /// Registered ticks in registration order
    pub fn ticks(&self) -> &[TickRegistration] {
        &self.ticks
    }

    /// Collect every tick due now and move each one's due time forward.
    ///
    /// The next due time advances by one interval from the previous due
    /// time; if that is still not in the future it restarts from now, so no
    /// backlog is carried into the next update.
    pub fn take_due_ticks(&mut self) -> Vec<ComponentHandle> {
        let now = self.now;
        self.ticks
            .iter_mut()
            .filter(|reg| reg.next_due <= now)
            .map(|reg| {
                let mut next = reg.next_due.saturating_add(reg.interval);
                if next <= now {
                    next = now.saturating_add(reg.interval);
                }
                reg.next_due = next;
                reg.component
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Queue a message to fire `delay` from now
    pub fn post(&mut self, target: MessageTarget, message: Box<dyn Message>, delay: Duration) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(ScheduledMessage {
            target,
            message,
            fire_at: self.now.saturating_add(delay),
            sequence,
        });
    }

    /// Sequence number the next posted message will receive.
    ///
    /// A drain pass captures this first and only pops entries below it.
    pub fn sequence_mark(&self) -> u64 {
        self.next_sequence
    }

    /// Pop the earliest due entry posted before `mark`
    pub fn pop_due(&mut self, mark: u64) -> Option<ScheduledMessage> {
        let head = self.queue.peek()?;
        // Entries posted after the mark fire no earlier than now, so every
        // older due entry sorts ahead of them.
        if head.fire_at > self.now || head.sequence >= mark {
            return None;
        }
        self.queue.pop()
    }

    /// Number of queued messages
    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Drop ticks and queued messages targeting a component
    pub fn remove_component(&mut self, component: ComponentHandle) {
        self.ticks.retain(|reg| reg.component != component);
        self.queue
            .retain(|entry| entry.target != MessageTarget::Component(component));
    }

    /// Drop queued messages targeting an object
    pub fn remove_object(&mut self, object: ObjectHandle) {
        self.queue.retain(|entry| match entry.target {
            MessageTarget::Object(target)
            | MessageTarget::ObjectRecursive(target)
            | MessageTarget::Event(target) => target != object,
            MessageTarget::Component(_) => true,
        });
    }

    /// Drop all ticks and queued messages; the clock keeps running
    pub fn clear(&mut self) {
        self.ticks.clear();
        self.queue.clear();
    }
}

// ============================================================================
// World integration
// ============================================================================

impl World {
    /// Register, update or remove a component's tick request.
    ///
    /// Returns false if the component handle is stale.
    pub fn set_tick_interval(&mut self, component: ComponentHandle, interval: impl Into<TickInterval>) -> bool {
        if !self.components.contains(component) {
            return false;
        }
        self.scheduler.set_tick(component, interval.into());
        true
    }

    /// Current tick request of a component
    pub fn tick_interval(&self, component: ComponentHandle) -> TickInterval {
        self.scheduler.tick_interval(component)
    }

    /// Queue a message for delivery `delay` from now.
    ///
    /// Even with zero delay the message is delivered by a later drain pass,
    /// never inline. Returns false (and drops the message) if the target is
    /// stale.
    pub fn post_message<M: Message>(&mut self, target: impl Into<MessageTarget>, message: M, delay: Duration) -> bool {
        self.post_boxed(target.into(), Box::new(message), delay)
    }

    /// Queue an already boxed message
    pub fn post_boxed(&mut self, target: MessageTarget, message: Box<dyn Message>, delay: Duration) -> bool {
        if !self.is_valid_target(target) {
            log::trace!("Dropping {:?} posted to stale target {:?}", message, target);
            return false;
        }
        self.scheduler.post(target, message, delay);
        true
    }

    /// Number of messages waiting in the queue
    pub fn pending_message_count(&self) -> usize {
        self.scheduler.pending_messages()
    }

    pub(crate) fn is_valid_target(&self, target: MessageTarget) -> bool {
        match target {
            MessageTarget::Object(object)
            | MessageTarget::ObjectRecursive(object)
            | MessageTarget::Event(object) => self.objects.contains(object),
            MessageTarget::Component(component) => self.components.contains(component),
        }
    }

    pub(crate) fn run_ticks(&mut self) {
        for component in self.scheduler.take_due_ticks() {
            if !self.is_component_active(component) {
                continue;
            }
            if self.component_state(component) != Some(LifecycleState::Activated) {
                continue;
            }
            self.with_component(component, |component, ctx| component.tick(ctx));
        }
    }

    pub(crate) fn drain_messages(&mut self) {
        let mark = self.scheduler.sequence_mark();
        while let Some(entry) = self.scheduler.pop_due(mark) {
            let ScheduledMessage { target, mut message, .. } = entry;
            if !self.is_valid_target(target) {
                log::trace!("Discarding {:?} for stale target {:?}", message, target);
                continue;
            }
            self.dispatch(target, message.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    #[derive(Clone)]
    struct MsgNamed(&'static str);
    impl MessageType for MsgNamed {
        const NAME: &'static str = "MsgNamed";
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn drain_names(scheduler: &mut Scheduler) -> Vec<&'static str> {
        let mark = scheduler.sequence_mark();
        let mut names = Vec::new();
        while let Some(entry) = scheduler.pop_due(mark) {
            names.push(entry.message.downcast_ref::<MsgNamed>().map_or("?", |m| m.0));
        }
        names
    }

    #[test]
    fn test_queue_orders_by_time_then_sequence() {
        let mut scheduler = Scheduler::new();
        let target = MessageTarget::Object(ObjectHandle::new(0, 0));
        scheduler.post(target, Box::new(MsgNamed("A")), ms(10));
        scheduler.post(target, Box::new(MsgNamed("B")), ms(5));
        scheduler.post(target, Box::new(MsgNamed("C")), ms(5));

        scheduler.advance_clock(ms(4));
        assert!(drain_names(&mut scheduler).is_empty());

        scheduler.advance_clock(ms(6));
        assert_eq!(drain_names(&mut scheduler), vec!["B", "C", "A"]);
        assert_eq!(scheduler.pending_messages(), 0);
    }

    #[test]
    fn test_entries_after_mark_wait() {
        let mut scheduler = Scheduler::new();
        let target = MessageTarget::Object(ObjectHandle::new(0, 0));
        scheduler.post(target, Box::new(MsgNamed("first")), Duration::ZERO);
        let mark = scheduler.sequence_mark();
        scheduler.post(target, Box::new(MsgNamed("late")), Duration::ZERO);

        assert!(scheduler.pop_due(mark).is_some());
        assert!(scheduler.pop_due(mark).is_none());
        assert_eq!(scheduler.pending_messages(), 1);
    }

    #[test]
    fn test_tick_does_not_accumulate() {
        let mut scheduler = Scheduler::new();
        let component = ComponentHandle::new(3, 0);
        scheduler.set_tick(component, TickInterval::Every(ms(100)));

        scheduler.advance_clock(ms(1000));
        assert_eq!(scheduler.take_due_ticks(), vec![component]);
        assert!(scheduler.take_due_ticks().is_empty());
        assert_eq!(scheduler.ticks()[0].next_due, ms(1100));

        scheduler.advance_clock(ms(50));
        assert!(scheduler.take_due_ticks().is_empty());
        scheduler.advance_clock(ms(50));
        assert_eq!(scheduler.take_due_ticks(), vec![component]);
        assert_eq!(scheduler.ticks()[0].next_due, ms(1200));
    }

    #[test]
    fn test_every_frame_and_disable() {
        let mut scheduler = Scheduler::new();
        let component = ComponentHandle::new(0, 0);
        scheduler.set_tick(component, TickInterval::from_duration(Duration::ZERO));
        assert_eq!(scheduler.tick_interval(component), TickInterval::EveryFrame);

        for _ in 0..3 {
            scheduler.advance_clock(ms(16));
            assert_eq!(scheduler.take_due_ticks(), vec![component]);
        }

        scheduler.set_tick(component, TickInterval::Disabled);
        scheduler.advance_clock(ms(16));
        assert!(scheduler.take_due_ticks().is_empty());
        assert_eq!(scheduler.tick_interval(component), TickInterval::Disabled);
    }

    #[test]
    fn test_far_future_saturates() {
        let mut scheduler = Scheduler::new();
        let target = MessageTarget::Object(ObjectHandle::new(0, 0));
        let component = ComponentHandle::new(0, 0);
        scheduler.advance_clock(ms(16));
        scheduler.post(target, Box::new(MsgNamed("never")), Duration::MAX);
        scheduler.set_tick(component, TickInterval::Every(Duration::MAX));

        scheduler.advance_clock(ms(16));
        assert!(drain_names(&mut scheduler).is_empty());
        assert!(scheduler.take_due_ticks().is_empty());
        assert_eq!(scheduler.ticks()[0].next_due, Duration::MAX);
        assert_eq!(scheduler.pending_messages(), 1);
    }

    #[test]
    fn test_remove_component_cancels_work() {
        let mut scheduler = Scheduler::new();
        let component = ComponentHandle::new(1, 0);
        let other = ComponentHandle::new(2, 0);
        scheduler.set_tick(component, TickInterval::EveryFrame);
        scheduler.post(MessageTarget::Component(component), Box::new(MsgNamed("gone")), ms(1));
        scheduler.post(MessageTarget::Component(other), Box::new(MsgNamed("kept")), ms(1));

        scheduler.remove_component(component);
        scheduler.advance_clock(ms(1));
        assert!(scheduler.take_due_ticks().is_empty());
        assert_eq!(drain_names(&mut scheduler), vec!["kept"]);
    }
}
