//! End-to-end adapter tests: a producer-side event source streamed to a
//! consumer-side typed sequence across the in-process substrate, including
//! graceful completion, source failure, and consumer cancellation.

mod common;

use async_trait::async_trait;
use common::run_local;
use serde::{Deserialize, Serialize};
use streamrail::{
    ChannelSource, EndpointConfig, EventSource, JsonCodec, MemorySubstrate, SourceError,
    StreamConsumer, TokioTaskProvider, TokioTimeProvider, serve_stream,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatEvent {
    user: String,
    text: String,
}

fn chat(user: &str, text: &str) -> ChatEvent {
    ChatEvent {
        user: user.to_string(),
        text: text.to_string(),
    }
}

#[test]
fn test_stream_end_to_end() {
    run_local(async {
        let substrate = MemorySubstrate::new();

        let (feed, source) = ChannelSource::channel();
        feed.send(chat("ada", "x")).expect("feed");
        feed.send(chat("ada", "y")).expect("feed");
        feed.send(chat("bob", "z")).expect("feed");
        drop(feed); // complete the stream

        let rendezvous_substrate = substrate.clone();
        let mut consumer: StreamConsumer<ChatEvent, _, _, _, _> = StreamConsumer::open(
            substrate.clone(),
            TokioTimeProvider::new(),
            TokioTaskProvider,
            JsonCodec,
            EndpointConfig::default(),
            |consumer_address| async move {
                serve_stream(
                    rendezvous_substrate,
                    TokioTimeProvider::new(),
                    TokioTaskProvider,
                    JsonCodec,
                    EndpointConfig::default(),
                    consumer_address,
                    source,
                )
                .await
            },
        )
        .await
        .expect("open");

        let first = consumer.next().await.expect("item").expect("ok");
        assert_eq!(first, chat("ada", "x"));
        let second = consumer.next().await.expect("item").expect("ok");
        assert_eq!(second, chat("ada", "y"));
        let third = consumer.next().await.expect("item").expect("ok");
        assert_eq!(third, chat("bob", "z"));

        // Source completion ends the sequence cleanly.
        assert!(consumer.next().await.is_none());
        // And stays ended.
        assert!(consumer.next().await.is_none());
    });
}

/// Source that yields one event and then fails.
struct FailingSource {
    yielded: bool,
}

#[async_trait(?Send)]
impl EventSource for FailingSource {
    type Item = String;

    async fn next(&mut self) -> Option<Result<String, SourceError>> {
        if self.yielded {
            Some(Err("backend exploded".into()))
        } else {
            self.yielded = true;
            Some(Ok("only".to_string()))
        }
    }
}

#[test]
fn test_source_failure_ends_stream() {
    run_local(async {
        let substrate = MemorySubstrate::new();

        let rendezvous_substrate = substrate.clone();
        let mut consumer: StreamConsumer<String, _, _, _, _> = StreamConsumer::open(
            substrate.clone(),
            TokioTimeProvider::new(),
            TokioTaskProvider,
            JsonCodec,
            EndpointConfig::default(),
            |consumer_address| async move {
                serve_stream(
                    rendezvous_substrate,
                    TokioTimeProvider::new(),
                    TokioTaskProvider,
                    JsonCodec,
                    EndpointConfig::default(),
                    consumer_address,
                    FailingSource { yielded: false },
                )
                .await
            },
        )
        .await
        .expect("open");

        let first = consumer.next().await.expect("item").expect("ok");
        assert_eq!(first, "only");

        // The producer logs the source error and stops; the consumer sees
        // a clean end of sequence, not a transport failure.
        assert!(consumer.next().await.is_none());
    });
}

#[test]
fn test_consumer_cancellation_reaches_producer() {
    run_local(async {
        let substrate = MemorySubstrate::new();

        let (feed, source) = ChannelSource::channel();
        feed.send("first".to_string()).expect("feed");

        let rendezvous_substrate = substrate.clone();
        let mut consumer: StreamConsumer<String, _, _, _, _> = StreamConsumer::open(
            substrate.clone(),
            TokioTimeProvider::new(),
            TokioTaskProvider,
            JsonCodec,
            EndpointConfig::default(),
            |consumer_address| async move {
                serve_stream(
                    rendezvous_substrate,
                    TokioTimeProvider::new(),
                    TokioTaskProvider,
                    JsonCodec,
                    EndpointConfig::default(),
                    consumer_address,
                    source,
                )
                .await
            },
        )
        .await
        .expect("open");

        let first = consumer.next().await.expect("item").expect("ok");
        assert_eq!(first, "first");

        consumer.cancel();

        // The stop notice reaches the producer endpoint, whose forward task
        // drops the source: the feed observes the cancellation.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(feed.is_closed(), "producer should drop the source");

        assert!(consumer.next().await.is_none());
    });
}
