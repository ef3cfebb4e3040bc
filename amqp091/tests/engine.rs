use std::time::Duration;

use amqp091::{
    channel::Error,
    options::{AssertQueueOptions, ConsumeOptions, GetOptions, PublishOptions},
    types::{
        constants::{NOT_FOUND, PRECONDITION_FAILED},
        methods::{basic, channel, connection, queue, Method},
        primitives::{FieldTable, FieldValue},
        properties::BasicProperties,
    },
    Builder, ChannelEvent, ChannelState, CloseReason, Confirmation, ConnectionEvent,
};
use bytes::Bytes;
use futures_util::FutureExt;

mod common;

use common::{connect, connect_with, open_channel, rabbit_tune};

fn deliver(consumer_tag: &str, delivery_tag: u64) -> basic::Deliver {
    basic::Deliver {
        consumer_tag: consumer_tag.to_string(),
        delivery_tag,
        redelivered: false,
        exchange: String::new(),
        routing_key: "q1".into(),
    }
}

fn declare_ok(name: &str) -> queue::DeclareOk {
    queue::DeclareOk {
        queue: name.to_string(),
        message_count: 0,
        consumer_count: 0,
    }
}

#[tokio::test]
async fn handshake_negotiates_tuning() {
    let builder = Builder::new().heartbeat(30).channel_max(100);
    let tune = connection::Tune {
        channel_max: 2047,
        frame_max: 65_536,
        heartbeat: 60,
    };
    let (connection, broker) = connect_with(builder, tune).await;

    let tuning = connection.tuning();
    assert_eq!(tuning.channel_max, 100);
    assert_eq!(tuning.frame_max, 65_536);
    assert_eq!(tuning.heartbeat, 30);

    assert_eq!(broker.start_ok.mechanism, "PLAIN");
    assert_eq!(&broker.start_ok.response[..], b"\0guest\0guest");
    assert_eq!(broker.start_ok.locale, "en_US");
    assert!(broker.start_ok.client_properties.get("capabilities").is_some());
    assert_eq!(broker.open.virtual_host, "/");
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn acking_up_to_a_tag_leaves_later_deliveries_outstanding() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (declared, ()) = tokio::join!(
        channel.assert_queue("q1", AssertQueueOptions::default()),
        async {
            match broker.expect(1).await {
                Method::QueueDeclare(declare) => {
                    assert_eq!(declare.queue, "q1");
                    assert!(declare.durable);
                    assert!(!declare.passive);
                }
                other => panic!("unexpected {:?}", other),
            }
            broker.send(1, declare_ok("q1")).await;
        }
    );
    assert_eq!(declared.unwrap().queue, "q1");

    let (asserted, ()) = tokio::join!(
        channel.assert_exchange("ex1", "direct", Default::default()),
        async {
            match broker.expect(1).await {
                Method::ExchangeDeclare(declare) => {
                    assert_eq!(declare.exchange, "ex1");
                    assert_eq!(declare.kind, "direct");
                }
                other => panic!("unexpected {:?}", other),
            }
            broker.send(1, amqp091::types::methods::exchange::DeclareOk).await;
        }
    );
    asserted.unwrap();

    let (bound, ()) = tokio::join!(
        channel.bind_queue("q1", "ex1", "k", FieldTable::new()),
        async {
            match broker.expect(1).await {
                Method::QueueBind(bind) => {
                    assert_eq!(bind.exchange, "ex1");
                    assert_eq!(bind.routing_key, "k");
                }
                other => panic!("unexpected {:?}", other),
            }
            broker.send(1, queue::BindOk).await;
        }
    );
    bound.unwrap();

    for body in ["m1", "m2", "m3"] {
        assert!(channel
            .publish("ex1", "k", body, PublishOptions::default())
            .unwrap());
    }
    for expected in ["m1", "m2", "m3"] {
        let published = broker.recv_publish().await;
        match published.method {
            Method::BasicPublish(publish) => {
                assert_eq!(publish.exchange, "ex1");
                assert_eq!(publish.routing_key, "k");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(&published.body[..], expected.as_bytes());
    }

    let (consumer, ()) = tokio::join!(channel.consume("q1", ConsumeOptions::default()), async {
        match broker.expect(1).await {
            Method::BasicConsume(consume) => assert!(!consume.no_ack),
            other => panic!("unexpected {:?}", other),
        }
        broker
            .send(
                1,
                basic::ConsumeOk {
                    consumer_tag: "ctag".into(),
                },
            )
            .await;
    });
    let mut consumer = consumer.unwrap();
    assert_eq!(consumer.tag(), "ctag");

    for (tag, body) in [(1u64, b"m1"), (2, b"m2"), (3, b"m3")] {
        let deliver = basic::Deliver {
            consumer_tag: "ctag".into(),
            delivery_tag: tag,
            redelivered: false,
            exchange: "ex1".into(),
            routing_key: "k".into(),
        };
        broker
            .send_content(1, deliver, BasicProperties::default(), body)
            .await;
    }

    let mut tags = Vec::new();
    for _ in 0..3 {
        let delivery = consumer.recv().await.unwrap();
        assert_eq!(delivery.consumer_tag, "ctag");
        tags.push(delivery.delivery_tag);
    }
    assert_eq!(tags, vec![1, 2, 3]);
    assert_eq!(channel.outstanding_deliveries(), vec![1, 2, 3]);

    channel.ack(2, true).unwrap();
    assert_eq!(channel.outstanding_deliveries(), vec![3]);
    assert_eq!(
        broker.expect(1).await,
        Method::BasicAck(basic::Ack {
            delivery_tag: 2,
            multiple: true
        })
    );
}

#[tokio::test]
async fn confirms_resolve_up_to_the_acked_sequence() {
    let (connection, mut broker) = connect().await;
    let (channel, ()) = tokio::join!(connection.create_confirm_channel(), async {
        assert!(matches!(broker.expect(1).await, Method::ChannelOpen(_)));
        broker.send(1, channel::OpenOk).await;
        assert!(matches!(broker.expect(1).await, Method::ConfirmSelect(_)));
        broker.send(1, amqp091::types::methods::confirm::SelectOk).await;
    });
    let channel = channel.unwrap();

    let mut confirms = Vec::new();
    for i in 0..5 {
        let (keep_going, confirm) = channel
            .send_to_queue("q1", format!("m{}", i), PublishOptions::default())
            .unwrap();
        assert!(keep_going);
        confirms.push(confirm);
    }
    for _ in 0..5 {
        broker.recv_publish().await;
    }

    broker
        .send(
            1,
            basic::Ack {
                delivery_tag: 4,
                multiple: true,
            },
        )
        .await;

    let mut fifth = confirms.pop().unwrap();
    for confirm in confirms {
        assert_eq!(confirm.await.unwrap(), Confirmation::Acked);
    }
    assert_eq!(channel.unconfirmed(), 1);
    assert!((&mut fifth).now_or_never().is_none());

    // Unconfirmed publishes are indeterminate once the channel closes
    let (closed, ()) = tokio::join!(channel.close(), async {
        assert!(matches!(broker.expect(1).await, Method::ChannelClose(_)));
        broker.send(1, channel::CloseOk).await;
    });
    closed.unwrap();
    assert!(matches!(
        fifth.await,
        Err(Error::ChannelClosed(CloseReason::Requested))
    ));
}

#[tokio::test]
async fn synchronous_calls_are_sent_one_at_a_time() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (a, b, ()) = tokio::join!(
        channel.assert_queue("a", AssertQueueOptions::default()),
        channel.assert_queue("b", AssertQueueOptions::default()),
        async {
            match broker.expect(1).await {
                Method::QueueDeclare(declare) => assert_eq!(declare.queue, "a"),
                other => panic!("unexpected {:?}", other),
            }
            broker.expect_silence().await;
            broker.send(1, declare_ok("a")).await;

            match broker.expect(1).await {
                Method::QueueDeclare(declare) => assert_eq!(declare.queue, "b"),
                other => panic!("unexpected {:?}", other),
            }
            broker.send(1, declare_ok("b")).await;
        }
    );
    assert_eq!(a.unwrap().queue, "a");
    assert_eq!(b.unwrap().queue, "b");
}

#[tokio::test]
async fn closing_a_channel_rejects_every_pending_call() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (a, b, c, closed, ()) = tokio::join!(
        channel.check_queue("a"),
        channel.check_queue("b"),
        channel.purge_queue("c"),
        channel.close(),
        async {
            assert!(matches!(broker.expect(1).await, Method::QueueDeclare(_)));
            assert!(matches!(broker.expect(1).await, Method::ChannelClose(_)));
            broker.send(1, channel::CloseOk).await;
        }
    );
    for result in [a.map(|_| ()), b.map(|_| ()), c.map(|_| ())] {
        assert!(matches!(
            result,
            Err(Error::ChannelClosed(CloseReason::Requested))
        ));
    }
    closed.unwrap();
    assert_eq!(channel.state(), ChannelState::Closed);

    let mut events = channel.take_events().unwrap();
    assert!(matches!(
        events.recv().await,
        Some(ChannelEvent::Close(CloseReason::Requested))
    ));
    assert!(matches!(
        channel.publish("", "q", "late", PublishOptions::default()),
        Err(Error::ChannelClosed(_))
    ));
}

#[tokio::test]
async fn broker_channel_exception_fails_the_call_and_raises_error_then_close() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = channel.take_events().unwrap();
    assert!(channel.take_events().is_none());

    let (checked, ()) = tokio::join!(channel.check_queue("missing"), async {
        assert!(matches!(broker.expect(1).await, Method::QueueDeclare(_)));
        let close = channel::Close {
            reply_code: NOT_FOUND,
            reply_text: "NOT_FOUND - no queue 'missing'".into(),
            class_id: 50,
            method_id: 10,
        };
        broker.send(1, close).await;
        assert_eq!(broker.expect(1).await, Method::ChannelCloseOk(channel::CloseOk));
    });

    match checked {
        Err(Error::ChannelClosed(CloseReason::Remote(exception))) => {
            assert_eq!(exception.reply_code, NOT_FOUND)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(channel.state(), ChannelState::Error);

    match events.recv().await {
        Some(ChannelEvent::Error(exception)) => assert_eq!(exception.reply_code, NOT_FOUND),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        events.recv().await,
        Some(ChannelEvent::Close(CloseReason::Remote(_)))
    ));

    // The connection is unaffected
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn acking_an_unknown_tag_closes_the_channel_locally() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = channel.take_events().unwrap();

    match channel.ack(99, false) {
        Err(Error::ChannelClosed(CloseReason::Local(exception))) => {
            assert_eq!(exception.reply_code, PRECONDITION_FAILED)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(channel.state(), ChannelState::Closing);
    match events.recv().await {
        Some(ChannelEvent::Error(exception)) => {
            assert_eq!(exception.reply_code, PRECONDITION_FAILED)
        }
        other => panic!("unexpected {:?}", other),
    }

    match broker.expect(1).await {
        Method::ChannelClose(close) => {
            assert_eq!(close.reply_code, PRECONDITION_FAILED);
            assert_eq!((close.class_id, close.method_id), (60, 80));
        }
        other => panic!("unexpected {:?}", other),
    }
    broker.send(1, channel::CloseOk).await;

    assert!(matches!(
        events.recv().await,
        Some(ChannelEvent::Close(CloseReason::Local(_)))
    ));
    assert_eq!(channel.state(), ChannelState::Error);
}

#[tokio::test]
async fn ack_all_on_an_empty_channel_is_harmless() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    channel.ack_all().unwrap();
    channel.nack_all(true).unwrap();
    assert_eq!(
        broker.expect(1).await,
        Method::BasicAck(basic::Ack {
            delivery_tag: 0,
            multiple: true
        })
    );
    assert_eq!(
        broker.expect(1).await,
        Method::BasicNack(basic::Nack {
            delivery_tag: 0,
            multiple: true,
            requeue: true
        })
    );
    assert_eq!(channel.state(), ChannelState::Open);
}

#[tokio::test]
async fn get_resolves_with_content_or_empty() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (empty, ()) = tokio::join!(channel.get("q1", GetOptions::default()), async {
        assert!(matches!(broker.expect(1).await, Method::BasicGet(_)));
        broker.send(1, basic::GetEmpty).await;
    });
    assert!(empty.unwrap().is_none());

    let (got, ()) = tokio::join!(channel.get("q1", GetOptions::default()), async {
        assert!(matches!(broker.expect(1).await, Method::BasicGet(_)));
        let get_ok = basic::GetOk {
            delivery_tag: 7,
            redelivered: true,
            exchange: String::new(),
            routing_key: "q1".into(),
            message_count: 2,
        };
        let properties = BasicProperties {
            content_type: Some("text/plain".into()),
            ..Default::default()
        };
        broker.send_content(1, get_ok, properties, b"hello").await;
    });
    let delivery = got.unwrap().unwrap();
    assert_eq!(delivery.delivery_tag, 7);
    assert!(delivery.redelivered);
    assert_eq!(delivery.consumer_tag, "");
    assert_eq!(delivery.message_count, Some(2));
    assert_eq!(delivery.properties.content_type.as_deref(), Some("text/plain"));
    assert_eq!(&delivery.body[..], b"hello");
    assert_eq!(channel.outstanding_deliveries(), vec![7]);

    channel.reject(7, false).unwrap();
    assert!(channel.outstanding_deliveries().is_empty());
}

#[tokio::test]
async fn recover_clears_outstanding_deliveries() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (prefetched, ()) = tokio::join!(channel.prefetch(2, false), async {
        match broker.expect(1).await {
            Method::BasicQos(qos) => {
                assert_eq!(qos.prefetch_count, 2);
                assert!(!qos.global);
            }
            other => panic!("unexpected {:?}", other),
        }
        broker.send(1, basic::QosOk).await;
    });
    prefetched.unwrap();
    assert_eq!(channel.prefetch_credit(), None);
    assert_eq!(channel.consumer_prefetch_credit("c"), None);

    let (consumer, ()) = tokio::join!(channel.consume("q1", ConsumeOptions::default()), async {
        assert!(matches!(broker.expect(1).await, Method::BasicConsume(_)));
        broker
            .send(1, basic::ConsumeOk { consumer_tag: "c".into() })
            .await;
        broker
            .send_content(1, deliver("c", 1), BasicProperties::default(), b"")
            .await;
    });
    let mut consumer = consumer.unwrap();
    let delivery = consumer.recv().await.unwrap();
    assert!(delivery.body.is_empty());
    assert_eq!(channel.consumer_prefetch_credit("c"), Some(1));

    let (recovered, ()) = tokio::join!(channel.recover(), async {
        assert!(matches!(broker.expect(1).await, Method::BasicRecover(_)));
        broker.send(1, basic::RecoverOk).await;
    });
    recovered.unwrap();
    assert!(channel.outstanding_deliveries().is_empty());
    assert_eq!(channel.consumer_prefetch_credit("c"), Some(2));
}

#[tokio::test]
async fn redeliveries_before_recover_ok_stay_outstanding() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (consumer, ()) = tokio::join!(channel.consume("q1", ConsumeOptions::default()), async {
        assert!(matches!(broker.expect(1).await, Method::BasicConsume(_)));
        broker
            .send(1, basic::ConsumeOk { consumer_tag: "c".into() })
            .await;
        broker
            .send_content(1, deliver("c", 1), BasicProperties::default(), b"first")
            .await;
    });
    let mut consumer = consumer.unwrap();
    assert_eq!(consumer.recv().await.unwrap().delivery_tag, 1);

    let (recovered, ()) = tokio::join!(channel.recover(), async {
        assert!(matches!(broker.expect(1).await, Method::BasicRecover(_)));
        let redeliver = basic::Deliver {
            redelivered: true,
            ..deliver("c", 2)
        };
        broker
            .send_content(1, redeliver, BasicProperties::default(), b"first")
            .await;
        broker.send(1, basic::RecoverOk).await;
    });
    recovered.unwrap();

    let redelivered = consumer.recv().await.unwrap();
    assert!(redelivered.redelivered);
    assert_eq!(channel.outstanding_deliveries(), vec![2]);

    channel.ack(2, false).unwrap();
    assert_eq!(
        broker.expect(1).await,
        Method::BasicAck(basic::Ack {
            delivery_tag: 2,
            multiple: false
        })
    );
    assert_eq!(channel.state(), ChannelState::Open);
}

#[tokio::test]
async fn global_prefetch_is_shared_and_per_consumer_prefetch_is_not() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    for (count, global) in [(5, true), (2, false)] {
        let (prefetched, ()) = tokio::join!(channel.prefetch(count, global), async {
            match broker.expect(1).await {
                Method::BasicQos(qos) => assert_eq!(qos.global, global),
                other => panic!("unexpected {:?}", other),
            }
            broker.send(1, basic::QosOk).await;
        });
        prefetched.unwrap();
    }

    let mut consumers = Vec::new();
    for tag in ["a", "b"] {
        let options = ConsumeOptions {
            consumer_tag: tag.to_string(),
            ..Default::default()
        };
        let (consumer, ()) = tokio::join!(channel.consume("q1", options), async {
            assert!(matches!(broker.expect(1).await, Method::BasicConsume(_)));
            broker
                .send(1, basic::ConsumeOk { consumer_tag: tag.into() })
                .await;
        });
        consumers.push(consumer.unwrap());
    }

    broker
        .send_content(1, deliver("a", 1), BasicProperties::default(), b"")
        .await;
    broker
        .send_content(1, deliver("a", 2), BasicProperties::default(), b"")
        .await;
    broker
        .send_content(1, deliver("b", 3), BasicProperties::default(), b"")
        .await;
    assert_eq!(consumers[0].recv().await.unwrap().delivery_tag, 1);
    assert_eq!(consumers[0].recv().await.unwrap().delivery_tag, 2);
    assert_eq!(consumers[1].recv().await.unwrap().delivery_tag, 3);

    assert_eq!(channel.prefetch_credit(), Some(2));
    assert_eq!(channel.consumer_prefetch_credit("a"), Some(0));
    assert_eq!(channel.consumer_prefetch_credit("b"), Some(1));

    channel.ack(1, false).unwrap();
    assert_eq!(channel.prefetch_credit(), Some(3));
    assert_eq!(channel.consumer_prefetch_credit("a"), Some(1));
}

#[tokio::test]
async fn binary_header_values_are_delivered() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (consumer, ()) = tokio::join!(channel.consume("q1", ConsumeOptions::default()), async {
        assert!(matches!(broker.expect(1).await, Method::BasicConsume(_)));
        broker
            .send(1, basic::ConsumeOk { consumer_tag: "c".into() })
            .await;
        let headers = FieldTable::new()
            .with("bin", FieldValue::LongString(Bytes::from_static(&[0xff, 0xfe])))
            .with("text", "plain");
        let properties = BasicProperties {
            headers: Some(headers),
            ..Default::default()
        };
        broker
            .send_content(1, deliver("c", 1), properties, b"payload")
            .await;
    });
    let mut consumer = consumer.unwrap();

    let delivery = consumer.recv().await.unwrap();
    let headers = delivery.properties.headers.as_ref().unwrap();
    let bin = headers.get("bin").unwrap();
    assert_eq!(bin.as_bytes(), Some(&[0xff, 0xfe][..]));
    assert_eq!(bin.as_str(), None);
    assert_eq!(headers.get("text").and_then(FieldValue::as_str), Some("plain"));
    assert_eq!(&delivery.body[..], b"payload");

    assert!(!connection.is_closed());
    assert_eq!(channel.state(), ChannelState::Open);
}

#[tokio::test]
async fn broker_cancel_ends_the_consumer_stream() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;

    let (consumer, ()) = tokio::join!(channel.consume("q1", ConsumeOptions::default()), async {
        assert!(matches!(broker.expect(1).await, Method::BasicConsume(_)));
        broker
            .send(1, basic::ConsumeOk { consumer_tag: "c".into() })
            .await;
    });
    let mut consumer = consumer.unwrap();

    let cancel = basic::Cancel {
        consumer_tag: "c".into(),
        no_wait: false,
    };
    broker.send(1, cancel).await;
    assert!(consumer.recv().await.is_none());
    assert_eq!(
        broker.expect(1).await,
        Method::BasicCancelOk(basic::CancelOk {
            consumer_tag: "c".into()
        })
    );
}

#[tokio::test]
async fn flow_is_answered_and_returns_are_raised() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = channel.take_events().unwrap();

    broker.send(1, channel::Flow { active: false }).await;
    assert_eq!(
        broker.expect(1).await,
        Method::ChannelFlowOk(channel::FlowOk { active: false })
    );

    let ret = basic::Return {
        reply_code: 312,
        reply_text: "NO_ROUTE".into(),
        exchange: "ex1".into(),
        routing_key: "nowhere".into(),
    };
    broker
        .send_content(1, ret, BasicProperties::default(), b"lost")
        .await;
    match events.recv().await {
        Some(ChannelEvent::Return(returned)) => {
            assert_eq!(returned.reply_code, 312);
            assert_eq!(returned.routing_key, "nowhere");
            assert_eq!(&returned.body[..], b"lost");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn large_publishes_are_split_at_frame_max() {
    let tune = connection::Tune {
        frame_max: 4096,
        ..rabbit_tune()
    };
    let (connection, mut broker) = connect_with(Builder::new(), tune).await;
    assert_eq!(connection.tuning().frame_max, 4096);
    let channel = open_channel(&connection, &mut broker, 1).await;

    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    channel
        .publish("", "q1", body.clone(), PublishOptions::default())
        .unwrap();

    let published = broker.recv_publish().await;
    assert_eq!(published.body_frames, 3);
    assert_eq!(&published.body[..], &body[..]);
}

#[tokio::test]
async fn publish_reports_back_pressure_and_drains_once() {
    let builder = Builder::new().water_marks(16, 8);
    let (connection, mut broker) = connect_with(builder, rabbit_tune()).await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = channel.take_events().unwrap();

    let keep_going = channel
        .publish("", "q1", "more than sixteen bytes", PublishOptions::default())
        .unwrap();
    assert!(!keep_going);
    assert!(matches!(events.recv().await, Some(ChannelEvent::Drain)));
    broker.recv_publish().await;
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn paused_channel_closed_by_the_broker_gets_no_drain() {
    let builder = Builder::new().water_marks(16, 8);
    let (connection, mut broker) = connect_with(builder, rabbit_tune()).await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = channel.take_events().unwrap();

    // Larger than the pipe, so the writer stalls until the broker reads
    let body = vec![0x5au8; 3 * 1024 * 1024];
    let keep_going = channel
        .publish("", "q1", body, PublishOptions::default())
        .unwrap();
    assert!(!keep_going);

    let close = channel::Close {
        reply_code: NOT_FOUND,
        reply_text: "NOT_FOUND - no exchange".into(),
        class_id: 60,
        method_id: 40,
    };
    broker.send(1, close).await;
    match events.recv().await {
        Some(ChannelEvent::Error(exception)) => assert_eq!(exception.reply_code, NOT_FOUND),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        events.recv().await,
        Some(ChannelEvent::Close(CloseReason::Remote(_)))
    ));

    let published = broker.recv_publish().await;
    assert_eq!(published.body.len(), 3 * 1024 * 1024);
    assert_eq!(broker.expect(1).await, Method::ChannelCloseOk(channel::CloseOk));

    let next = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
    assert!(!matches!(next, Ok(Some(_))), "unexpected {:?}", next);
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn connection_close_closes_every_channel() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut channel_events = channel.take_events().unwrap();
    let mut events = connection.take_events().unwrap();

    let (closed, ()) = tokio::join!(connection.close(), async {
        match broker.expect(0).await {
            Method::ConnectionClose(close) => assert_eq!(close.reply_code, 200),
            other => panic!("unexpected {:?}", other),
        }
        broker.send(0, connection::CloseOk).await;
    });
    closed.unwrap();
    assert!(connection.is_closed());

    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Close(CloseReason::Requested))
    ));
    assert!(matches!(
        channel_events.recv().await,
        Some(ChannelEvent::Close(CloseReason::Requested))
    ));
    assert!(matches!(
        channel.check_queue("q1").await,
        Err(Error::ConnectionClosed(CloseReason::Requested))
    ));
}

#[tokio::test]
async fn broker_connection_close_fails_pending_calls() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = connection.take_events().unwrap();

    let (checked, ()) = tokio::join!(channel.check_queue("q1"), async {
        assert!(matches!(broker.expect(1).await, Method::QueueDeclare(_)));
        let close = connection::Close {
            reply_code: 320,
            reply_text: "CONNECTION_FORCED - shutdown".into(),
            class_id: 0,
            method_id: 0,
        };
        broker.send(0, close).await;
        assert_eq!(
            broker.expect(0).await,
            Method::ConnectionCloseOk(connection::CloseOk)
        );
    });

    assert!(matches!(
        checked,
        Err(Error::ConnectionClosed(CloseReason::Remote(_)))
    ));
    match events.recv().await {
        Some(ConnectionEvent::Error(CloseReason::Remote(exception))) => {
            assert_eq!(exception.reply_code, 320)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Close(CloseReason::Remote(_)))
    ));
    assert!(connection.is_closed());
    assert!(connection.create_channel().await.is_err());
}

#[tokio::test]
async fn blocked_and_unblocked_are_raised() {
    let (connection, mut broker) = connect().await;
    let mut events = connection.take_events().unwrap();

    broker
        .send(
            0,
            connection::Blocked {
                reason: "low on memory".into(),
            },
        )
        .await;
    broker.send(0, connection::Unblocked).await;

    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Blocked(reason)) if reason == "low on memory"
    ));
    assert!(matches!(events.recv().await, Some(ConnectionEvent::Unblocked)));
}

#[tokio::test]
async fn method_inside_content_is_a_protocol_violation() {
    let (connection, mut broker) = connect().await;
    let channel = open_channel(&connection, &mut broker, 1).await;
    let mut events = connection.take_events().unwrap();

    let deliver = basic::Deliver {
        consumer_tag: "c".into(),
        delivery_tag: 1,
        redelivered: false,
        exchange: String::new(),
        routing_key: "q1".into(),
    };
    broker.send(1, deliver).await;
    broker.send(1, channel::Flow { active: true }).await;

    match broker.expect(0).await {
        Method::ConnectionClose(close) => assert_eq!(close.reply_code, 505),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Error(CloseReason::Local(_)))
    ));
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn frame_on_unknown_channel_closes_the_connection() {
    let (connection, mut broker) = connect().await;
    let mut events = connection.take_events().unwrap();

    broker.send(9, basic::QosOk).await;
    match broker.expect(0).await {
        Method::ConnectionClose(close) => assert_eq!(close.reply_code, 504),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Error(CloseReason::Local(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn silent_broker_trips_the_heartbeat_timeout() {
    let tune = connection::Tune {
        heartbeat: 2,
        ..rabbit_tune()
    };
    let (connection, _broker) = connect_with(Builder::new(), tune).await;
    let mut events = connection.take_events().unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(matches!(
        first,
        Some(ConnectionEvent::Error(CloseReason::HeartbeatTimeout))
    ));
    assert!(matches!(
        events.recv().await,
        Some(ConnectionEvent::Close(CloseReason::HeartbeatTimeout))
    ));
}

#[tokio::test]
async fn channel_numbers_are_allocated_from_one() {
    let (connection, mut broker) = connect().await;
    let first = open_channel(&connection, &mut broker, 1).await;
    let second = open_channel(&connection, &mut broker, 2).await;
    assert_eq!((first.id(), second.id()), (1, 2));
}
