// Communication channels lock-free
//
// All three are bounded single-producer/single-consumer ring buffers.
// Push never blocks the producer; pop never blocks the consumer.

use crate::messaging::command::RenderCommand;
use crate::messaging::notification::Notification;
use crate::midi::event::RawMidiEvent;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapRb, traits::Split};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type RenderProducer = ringbuf::HeapProd<RenderCommand>;
pub type RenderConsumer = ringbuf::HeapCons<RenderCommand>;

/// Trigger queue: control context → audio callback
pub fn create_render_channel(capacity: usize) -> (RenderProducer, RenderConsumer) {
    let rb = HeapRb::<RenderCommand>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

/// Display events: control context → presentation layer
pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Producer half of the note event queue (MIDI input callback side)
pub struct NoteEventSender {
    producer: ringbuf::HeapProd<RawMidiEvent>,
    dropped: Arc<AtomicU64>,
}

impl NoteEventSender {
    /// Queue an event. When the queue is full the event is dropped and counted;
    /// returns whether it was queued.
    #[inline]
    pub fn send(&mut self, event: RawMidiEvent) -> bool {
        match self.producer.try_push(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Shared drop counter, for producers that may lose an event before
    /// reaching `send` (contended capture handler)
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

/// Consumer half of the note event queue (session control context side)
pub struct NoteEventReceiver {
    consumer: ringbuf::HeapCons<RawMidiEvent>,
    dropped: Arc<AtomicU64>,
    reported: u64,
}

impl NoteEventReceiver {
    pub fn try_recv(&mut self) -> Option<RawMidiEvent> {
        self.consumer.try_pop()
    }

    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Events dropped since the previous call
    pub fn take_dropped(&mut self) -> u64 {
        let total = self.dropped.load(Ordering::Relaxed);
        let fresh = total.saturating_sub(self.reported);
        self.reported = total;
        fresh
    }

    /// Discard everything currently queued
    pub fn clear(&mut self) -> usize {
        let mut count = 0;
        while self.consumer.try_pop().is_some() {
            count += 1;
        }
        count
    }
}

/// Note event queue: MIDI input callback → session control context
pub fn create_note_event_channel(capacity: usize) -> (NoteEventSender, NoteEventReceiver) {
    let rb = HeapRb::<RawMidiEvent>::new(capacity);
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicU64::new(0));
    (
        NoteEventSender {
            producer,
            dropped: Arc::clone(&dropped),
        },
        NoteEventReceiver {
            consumer,
            dropped,
            reported: 0,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_queue_preserves_order() {
        let (mut tx, mut rx) = create_note_event_channel(8);
        for i in 0..5 {
            assert!(tx.send(RawMidiEvent::note_on(60 + i, 100, i as f64)));
        }
        assert_eq!(rx.len(), 5);
        for i in 0..5 {
            assert_eq!(rx.try_recv().unwrap().pitch, 60 + i);
        }
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_note_queue_overflow_counts_drops() {
        let (mut tx, mut rx) = create_note_event_channel(4);
        for i in 0..7 {
            tx.send(RawMidiEvent::note_on(60, 100, i as f64));
        }
        assert_eq!(rx.take_dropped(), 3);
        // Reported once
        assert_eq!(rx.take_dropped(), 0);

        // Oldest events survive, newest are the ones dropped
        assert_eq!(rx.try_recv().unwrap().timestamp, 0.0);
        assert_eq!(rx.clear(), 3);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_render_channel() {
        let (mut tx, mut rx) = create_render_channel(2);
        assert!(tx.try_push(RenderCommand::Reset).is_ok());
        assert!(tx.try_push(RenderCommand::StopBeatLoop).is_ok());
        assert!(tx.try_push(RenderCommand::Reset).is_err());
        assert_eq!(rx.try_pop(), Some(RenderCommand::Reset));
    }
}
