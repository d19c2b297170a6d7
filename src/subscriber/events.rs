//! Subscriber callbacks: subscribe on connect, log everything else

use crate::config::TopicSet;
use crate::transport::mqtt::MessageHandler;
use crate::transport::{SessionEvents, TopicSubscriber};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Session callbacks of the subscriber
#[derive(Debug, Clone)]
pub struct SubscriberEvents {
    topics: TopicSet,
}

impl SubscriberEvents {
    pub fn new(topics: TopicSet) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }
}

#[async_trait]
impl SessionEvents for SubscriberEvents {
    async fn on_connect(&self, subscriber: Arc<dyn TopicSubscriber>) {
        info!("subscriber connected");

        match subscriber.subscribe(&self.topics).await {
            Ok(ack) => {
                info!("subscribed to topics: {}", ack.granted);
                if !ack.is_complete() {
                    warn!(rejected = ?ack.rejected, "Broker refused some subscriptions");
                }
            }
            Err(e) => {
                error!("Failed to subscribe to {}: {}", self.topics, e);
            }
        }
    }

    fn on_connection_lost(&self, cause: &dyn std::error::Error) {
        warn!("subscriber lost connection: {}", cause);
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) {
        info!(
            "Received message: {} from topic {}",
            MessageHandler::format_payload(payload),
            topic
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSubscriber;
    use std::io;
    use std::sync::{Mutex, PoisonError};
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink shared between the fmt layer and the assertions
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn test_on_connect_subscribes_whole_topic_set() {
        let events = SubscriberEvents::new(TopicSet::device_defaults());
        let subscriber = Arc::new(MockSubscriber::granting_all());

        events.on_connect(subscriber.clone()).await;

        assert_eq!(subscriber.requests(), vec![TopicSet::device_defaults()]);
    }

    #[tokio::test]
    async fn test_on_connect_survives_subscription_failure() {
        let events = SubscriberEvents::new(TopicSet::device_defaults());
        let subscriber = Arc::new(MockSubscriber::failing());

        events.on_connect(subscriber.clone()).await;

        assert_eq!(subscriber.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_every_reconnect_subscribes_again() {
        let events = SubscriberEvents::new(TopicSet::device_defaults());
        let subscriber = Arc::new(MockSubscriber::granting_all());

        events.on_connect(subscriber.clone()).await;
        events.on_connect(subscriber.clone()).await;

        assert_eq!(subscriber.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_on_connect_logs_granted_topics() {
        let (logs, _guard) = capture_logs();
        let events = SubscriberEvents::new(TopicSet::device_defaults());

        events.on_connect(Arc::new(MockSubscriber::granting_all())).await;

        let output = logs.contents();
        assert!(output.contains("subscriber connected"), "{output}");
        assert!(
            output.contains(
                "subscribed to topics: \
                 [topic/device/pressure:0 topic/device/speed:0 topic/device/temperature:0]"
            ),
            "{output}"
        );
    }

    #[tokio::test]
    async fn test_on_message_logs_lossy_payload() {
        let (logs, _guard) = capture_logs();
        let events = SubscriberEvents::new(TopicSet::device_defaults());

        events.on_message("topic/device/speed", &[0x34, 0x32, 0xff]).await;

        let output = logs.contents();
        assert!(
            output.contains("Received message: 42\u{fffd} from topic topic/device/speed"),
            "{output}"
        );
    }

    #[test]
    fn test_on_connection_lost_logs_cause() {
        let (logs, _guard) = capture_logs();
        let events = SubscriberEvents::new(TopicSet::device_defaults());

        events.on_connection_lost(&io::Error::other("reset by peer"));

        let output = logs.contents();
        assert!(output.contains("subscriber lost connection: reset by peer"), "{output}");
    }
}
