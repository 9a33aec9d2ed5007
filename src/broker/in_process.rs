//! In-process reference broker.
//!
//! Every subscription owns a bounded queue and a dedicated delivery task that
//! pulls from it and invokes the handler. Publishing pushes onto every queue
//! registered for the topic. A push blocked on a full queue races against the
//! shutdown token, so closing the broker never deadlocks a publisher.
//!
//! Lock discipline: `publish` holds the shared lock for its whole fan-out;
//! `subscribe` and `close` take the exclusive lock. `close` cancels the
//! shutdown token *before* asking for the exclusive lock so that publishers
//! parked on a full queue abort and release their shared guard.

use super::{Broker, BrokerError, Handler, Message};
use crate::utils::spawn_tracked;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default per-subscription queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

struct BrokerState {
    queues: HashMap<String, Vec<mpsc::Sender<Message>>>,
    delivery_tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Broker that routes messages between tasks of the current process
pub struct InProcessBroker {
    state: RwLock<BrokerState>,
    shutdown: CancellationToken,
    queue_capacity: usize,
}

impl InProcessBroker {
    /// Create a broker with the default queue capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a broker whose subscription queues hold `queue_capacity` messages.
    ///
    /// A capacity of zero is raised to one; tokio channels cannot be unbuffered.
    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            state: RwLock::new(BrokerState {
                queues: HashMap::new(),
                delivery_tasks: Vec::new(),
                closed: false,
            }),
            shutdown: CancellationToken::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Number of live subscriptions registered for `topic`
    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .queues
            .get(topic)
            .map_or(0, |queues| queues.len())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InProcessBroker {
    async fn publish(&self, topic: &str, message: Message) -> Result<(), BrokerError> {
        let state = self.state.read().await;

        if state.closed {
            return Err(BrokerError::Closed);
        }

        let queues = match state.queues.get(topic) {
            Some(queues) => queues,
            None => return Ok(()),
        };

        for queue in queues {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(BrokerError::Closing),
                sent = queue.send(message.clone()) => {
                    // The receiver only goes away when its delivery task exits on shutdown
                    if sent.is_err() {
                        return Err(BrokerError::Closing);
                    }
                }
            }
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<(), BrokerError> {
        let mut state = self.state.write().await;

        if state.closed {
            return Err(BrokerError::Closed);
        }

        let (tx, mut rx) = mpsc::channel::<Message>(self.queue_capacity);
        state.queues.entry(topic.to_string()).or_default().push(tx);

        let token = self.shutdown.clone();
        let task_topic = topic.to_string();
        let task = spawn_tracked(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    message = rx.recv() => match message {
                        Some(message) => handler(message),
                        None => break,
                    },
                }
            }
            debug!("Delivery task for topic '{}' stopped", task_topic);
        });
        state.delivery_tasks.push(task);

        debug!(
            "Subscribed to topic '{}' (queue capacity {})",
            topic, self.queue_capacity
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        // Wake publishers parked on full queues before waiting for the write lock
        self.shutdown.cancel();

        let delivery_tasks = {
            let mut state = self.state.write().await;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.queues.clear();
            std::mem::take(&mut state.delivery_tasks)
        };

        let task_count = delivery_tasks.len();
        for task in delivery_tasks {
            if let Err(e) = task.await {
                warn!("Delivery task ended abnormally: {}", e);
            }
        }

        debug!("In-process broker closed ({} delivery tasks joined)", task_count);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::handler;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let broker = InProcessBroker::new();
        assert!(broker.publish("empty", Message::from("x")).await.is_ok());
        assert!(broker.publish("", Message::from("x")).await.is_ok());
        assert_eq!(broker.subscription_count("empty").await, 0);
        broker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_subscriber_preserves_order() {
        let broker = InProcessBroker::with_capacity(2);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        broker
            .subscribe(
                "orders",
                handler(move |message| sink.lock().push(message.as_bytes().to_vec())),
            )
            .await
            .unwrap();

        for i in 0..100 {
            broker.publish("orders", Message::indexed(i)).await.unwrap();
        }

        wait_until(|| received.lock().len() == 100).await;
        let received = received.lock().clone();
        for (i, payload) in received.iter().enumerate() {
            assert_eq!(payload, format!("Message {}", i).as_bytes());
        }
        broker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscription() {
        let broker = InProcessBroker::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let other_topic = Arc::new(AtomicUsize::new(0));

        for (topic, counter) in [("a", &first), ("a", &second), ("b", &other_topic)] {
            let counter = counter.clone();
            broker
                .subscribe(
                    topic,
                    handler(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .await
                .unwrap();
        }
        assert_eq!(broker.subscription_count("a").await, 2);

        for i in 0..20 {
            broker.publish("a", Message::indexed(i)).await.unwrap();
        }

        wait_until(|| first.load(Ordering::SeqCst) == 20 && second.load(Ordering::SeqCst) == 20)
            .await;
        assert_eq!(other_topic.load(Ordering::SeqCst), 0);
        broker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_operations() {
        let broker = InProcessBroker::new();
        broker
            .subscribe("t", handler(|_| {}))
            .await
            .unwrap();

        assert_eq!(broker.close().await, Ok(()));
        assert_eq!(broker.close().await, Ok(()));
        assert!(broker.is_closed().await);

        assert_eq!(
            broker.publish("t", Message::from("late")).await,
            Err(BrokerError::Closed)
        );
        assert_eq!(
            broker.subscribe("t", handler(|_| {})).await,
            Err(BrokerError::Closed)
        );
        assert_eq!(broker.subscription_count("t").await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_unblocks_publisher_on_full_queue() {
        let broker = Arc::new(InProcessBroker::with_capacity(1));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let entered = Arc::new(AtomicUsize::new(0));

        // Park the delivery task inside the handler so the queue fills up
        let entered_handler = entered.clone();
        broker
            .subscribe(
                "slow",
                handler(move |_| {
                    entered_handler.fetch_add(1, Ordering::SeqCst);
                    let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
                }),
            )
            .await
            .unwrap();

        let publisher = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let mut last = Ok(());
                for i in 0..10 {
                    last = broker.publish("slow", Message::indexed(i)).await;
                    if last.is_err() {
                        break;
                    }
                }
                last
            })
        };

        wait_until(|| entered.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!publisher.is_finished());

        let closer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.close().await })
        };

        let outcome = tokio::time::timeout(Duration::from_secs(5), publisher)
            .await
            .expect("publisher stayed blocked after close")
            .unwrap();
        assert_eq!(outcome, Err(BrokerError::Closing));

        release_tx.send(()).unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(10), closer)
            .await
            .expect("close did not finish")
            .unwrap();
        assert_eq!(closed, Ok(()));
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised() {
        let broker = InProcessBroker::with_capacity(0);
        assert_eq!(broker.queue_capacity(), 1);
    }
}
