use std::time::Duration;

use axum::response::sse::{Event, KeepAlive};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, warn};

use greencity_core::dto::AmountCommentLikesDto;

/// Topic name subscribers see as the SSE event type.
pub const COMMENT_TOPIC: &str = "comment";

const TOPIC_BUFFER: usize = 128;

/// Fan-out of like counts to every `/topic/comment` subscriber.
#[derive(Clone)]
pub struct LikeTopic {
    sender: broadcast::Sender<AmountCommentLikesDto>,
}

impl LikeTopic {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(TOPIC_BUFFER);
        Self { sender }
    }

    pub fn publish(&self, amount: AmountCommentLikesDto) {
        match self.sender.send(amount) {
            Ok(receivers) => debug!(stage = "topic", receivers, "published like count"),
            // No subscribers is a normal state for this topic.
            Err(_) => debug!(stage = "topic", "like count published without subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AmountCommentLikesDto> {
        self.sender.subscribe()
    }
}

impl Default for LikeTopic {
    fn default() -> Self {
        Self::new()
    }
}

fn into_event(amount: &AmountCommentLikesDto) -> Result<Event, serde_json::Error> {
    let data = serde_json::to_string(amount)?;
    Ok(Event::default()
        .event(COMMENT_TOPIC)
        .id(amount.id.to_string())
        .data(data))
}

pub fn topic_stream(
    topic: LikeTopic,
) -> impl Stream<Item = Result<Event, serde_json::Error>> + Send + 'static {
    BroadcastStream::new(topic.subscribe()).filter_map(|result| match result {
        Ok(amount) => Some(into_event(&amount)),
        Err(err) => {
            warn!(stage = "topic", error = %err, "subscriber lagged behind like counts");
            None
        }
    })
}

pub fn topic_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(20))
        .text("heartbeat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_counts() {
        let topic = LikeTopic::new();
        let mut receiver = topic.subscribe();

        topic.publish(AmountCommentLikesDto {
            id: 4,
            amount_likes: 2,
        });

        let received = receiver.recv().await.expect("message");
        assert_eq!(received.id, 4);
        assert_eq!(received.amount_likes, 2);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        LikeTopic::new().publish(AmountCommentLikesDto {
            id: 1,
            amount_likes: 0,
        });
    }
}
