//! Output multiplexer
//!
//! Fans one runner's output stream out to any number of subscribers. Each
//! runner has exactly one OS-level reader (the registry's event pump)
//! regardless of subscriber count; subscribing only adds a delivery lease.
//! A bounded FIFO replay buffer lets late subscribers catch up on recent
//! output before receiving live chunks.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::event::{OutputChunk, OutputMessage, ProcessEvent};

/// A lease on delivery for one subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: Uuid,
    pub process_id: Uuid,
}

#[derive(Default)]
struct ProcessStream {
    buffer: VecDeque<OutputChunk>,
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<OutputMessage>>,
}

/// Fan-out hub with bounded replay history per runner
pub struct OutputMultiplexer {
    max_chunks: usize,
    streams: Mutex<HashMap<Uuid, ProcessStream>>,
}

impl OutputMultiplexer {
    pub fn new(max_chunks: usize) -> Self {
        Self {
            max_chunks,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a runner's output.
    ///
    /// The receiver is first handed the whole replay buffer (oldest first)
    /// and then live messages. Replay and registration happen under the same
    /// lock as publishing, so the historical/live boundary has no gap and no
    /// duplication.
    pub async fn subscribe(
        &self,
        process_id: Uuid,
    ) -> (Subscription, mpsc::UnboundedReceiver<OutputMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut streams = self.streams.lock().await;
        let stream = streams.entry(process_id).or_default();

        for chunk in &stream.buffer {
            let _ = tx.send(OutputMessage::Chunk(chunk.clone()));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            process_id,
        };
        stream.subscribers.insert(subscription.id, tx);
        debug!(
            "Subscriber {} attached to {} ({} total)",
            subscription.id,
            process_id,
            stream.subscribers.len()
        );

        (subscription, rx)
    }

    /// Drop one delivery lease. Remaining subscribers keep receiving.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut streams = self.streams.lock().await;
        if let Some(stream) = streams.get_mut(&subscription.process_id) {
            if stream.subscribers.remove(&subscription.id).is_some() {
                debug!(
                    "Subscriber {} detached from {} ({} remain)",
                    subscription.id,
                    subscription.process_id,
                    stream.subscribers.len()
                );
            }
        }
    }

    /// Record a chunk in the replay buffer and deliver it to subscribers
    pub async fn publish_chunk(&self, chunk: OutputChunk) {
        let mut streams = self.streams.lock().await;
        let stream = streams.entry(chunk.process_id).or_default();

        stream.buffer.push_back(chunk.clone());
        while stream.buffer.len() > self.max_chunks {
            stream.buffer.pop_front();
        }

        stream
            .subscribers
            .retain(|_, tx| tx.send(OutputMessage::Chunk(chunk.clone())).is_ok());
    }

    /// Deliver a lifecycle event to subscribers. Events are not replayed.
    pub async fn publish_event(&self, event: ProcessEvent) {
        let mut streams = self.streams.lock().await;
        if let Some(stream) = streams.get_mut(&event.process_id) {
            stream
                .subscribers
                .retain(|_, tx| tx.send(OutputMessage::Event(event.clone())).is_ok());
        }
    }

    /// Number of active delivery leases for a runner
    pub async fn subscriber_count(&self, process_id: Uuid) -> usize {
        let streams = self.streams.lock().await;
        streams
            .get(&process_id)
            .map(|stream| stream.subscribers.len())
            .unwrap_or(0)
    }

    /// Current replay-buffer contents for a runner, oldest first
    pub async fn buffered_chunks(&self, process_id: Uuid) -> Vec<OutputChunk> {
        let streams = self.streams.lock().await;
        streams
            .get(&process_id)
            .map(|stream| stream.buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop one runner's buffer and force-unsubscribe its subscribers
    pub async fn clear(&self, process_id: Uuid) {
        let mut streams = self.streams.lock().await;
        streams.remove(&process_id);
    }

    /// Drop every buffer and force-unsubscribe everyone. Dropped senders
    /// close the receivers, so consumers observe end-of-stream.
    pub async fn clear_all(&self) {
        let mut streams = self.streams.lock().await;
        streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OutputStream;

    fn chunk(process_id: Uuid, data: &str) -> OutputChunk {
        OutputChunk::new(process_id, OutputStream::Stdout, data)
    }

    #[tokio::test]
    async fn test_two_subscribers_each_receive_once() {
        let mux = OutputMultiplexer::new(16);
        let process_id = Uuid::new_v4();

        let (_sub_a, mut rx_a) = mux.subscribe(process_id).await;
        let (_sub_b, mut rx_b) = mux.subscribe(process_id).await;

        mux.publish_chunk(chunk(process_id, "X")).await;

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a.as_chunk().unwrap().data, "X");
        assert_eq!(b.as_chunk().unwrap().data, "X");

        // Exactly once: nothing further is pending.
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_subscriber_replays_history_in_order() {
        let mux = OutputMultiplexer::new(16);
        let process_id = Uuid::new_v4();

        mux.publish_chunk(chunk(process_id, "one")).await;
        mux.publish_chunk(chunk(process_id, "two")).await;

        let (_sub, mut rx) = mux.subscribe(process_id).await;
        mux.publish_chunk(chunk(process_id, "three")).await;

        let received: Vec<String> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|m| m.as_chunk().unwrap().data.clone())
        .collect();
        assert_eq!(received, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_buffer_eviction_is_fifo() {
        let mux = OutputMultiplexer::new(3);
        let process_id = Uuid::new_v4();

        for i in 0..5 {
            mux.publish_chunk(chunk(process_id, &i.to_string())).await;
        }

        let buffered = mux.buffered_chunks(process_id).await;
        let data: Vec<&str> = buffered.iter().map(|c| c.data.as_str()).collect();
        assert_eq!(data, vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_remaining_subscribers() {
        let mux = OutputMultiplexer::new(16);
        let process_id = Uuid::new_v4();

        let (sub_a, mut rx_a) = mux.subscribe(process_id).await;
        let (_sub_b, mut rx_b) = mux.subscribe(process_id).await;
        assert_eq!(mux.subscriber_count(process_id).await, 2);

        mux.unsubscribe(&sub_a).await;
        assert_eq!(mux.subscriber_count(process_id).await, 1);

        mux.publish_chunk(chunk(process_id, "still-flowing")).await;
        assert_eq!(
            rx_b.recv().await.unwrap().as_chunk().unwrap().data,
            "still-flowing"
        );
        // The detached subscriber's channel is closed, not fed.
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_resubscribe_after_unsubscribe() {
        let mux = OutputMultiplexer::new(16);
        let process_id = Uuid::new_v4();

        let (sub, _rx) = mux.subscribe(process_id).await;
        mux.unsubscribe(&sub).await;
        mux.unsubscribe(&sub).await; // double detach is harmless

        let (_sub2, mut rx2) = mux.subscribe(process_id).await;
        mux.publish_chunk(chunk(process_id, "fresh")).await;
        assert_eq!(rx2.recv().await.unwrap().as_chunk().unwrap().data, "fresh");
        assert_eq!(mux.subscriber_count(process_id).await, 1);
    }

    #[tokio::test]
    async fn test_events_are_delivered_but_not_replayed() {
        let mux = OutputMultiplexer::new(16);
        let process_id = Uuid::new_v4();

        let (_sub, mut rx) = mux.subscribe(process_id).await;
        mux.publish_event(ProcessEvent::idle(process_id)).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            OutputMessage::Event(_)
        ));

        // A later subscriber sees no replayed events.
        let (_sub2, mut rx2) = mux.subscribe(process_id).await;
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_all_closes_subscribers_and_drops_buffers() {
        let mux = OutputMultiplexer::new(16);
        let process_id = Uuid::new_v4();

        mux.publish_chunk(chunk(process_id, "gone")).await;
        let (_sub, mut rx) = mux.subscribe(process_id).await;
        // Drain the replayed chunk.
        assert!(rx.recv().await.is_some());

        mux.clear_all().await;

        assert!(rx.recv().await.is_none());
        assert!(mux.buffered_chunks(process_id).await.is_empty());
        assert_eq!(mux.subscriber_count(process_id).await, 0);
    }
}
