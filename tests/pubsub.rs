mod support;

use std::sync::Arc;
use std::time::Duration;

use redis_proto::{Arg, Notification};
use support::{client_for, push, spawn_fake_server, step, RecordingSink};

#[tokio::test]
async fn subscribe_then_push_routes_to_the_notification_sink() {
    let addr = spawn_fake_server(vec![
        step(
            b"*2\r\n$9\r\nSUBSCRIBE\r\n$4\r\nnews\r\n".to_vec(),
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n".to_vec(),
        ),
        push(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n".to_vec()),
        step(
            b"*2\r\n$11\r\nUNSUBSCRIBE\r\n$4\r\nnews\r\n".to_vec(),
            b"*3\r\n$11\r\nunsubscribe\r\n$4\r\nnews\r\n:0\r\n".to_vec(),
        ),
    ])
    .await;

    let sink = Arc::new(RecordingSink::new());
    let client = client_for(addr, sink.clone());

    client
        .send_void("SUBSCRIBE", vec![Arg::from("news")])
        .await
        .unwrap();

    // Give the proactive `message` push time to arrive and dispatch.
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .send_void("UNSUBSCRIBE", vec![Arg::from("news")])
        .await
        .unwrap();

    let recorded = sink.0.lock().await;
    assert_eq!(recorded.len(), 1);
    let (address, notification) = &recorded[0];
    assert_eq!(address, "io.vertx.mod-redis.news");
    assert_eq!(
        notification,
        &Notification::Channel {
            channel: "news".to_string(),
            message: "hello".to_string(),
        }
    );
}

#[tokio::test]
async fn unsubscribe_with_no_arguments_clears_every_channel() {
    let addr = spawn_fake_server(vec![
        step(
            b"*3\r\n$9\r\nSUBSCRIBE\r\n$2\r\nch\r\n$3\r\nch2\r\n".to_vec(),
            b"*3\r\n$9\r\nsubscribe\r\n$2\r\nch\r\n:1\r\n*3\r\n$9\r\nsubscribe\r\n$3\r\nch2\r\n:2\r\n".to_vec(),
        ),
        step(
            b"*1\r\n$11\r\nUNSUBSCRIBE\r\n".to_vec(),
            b"*3\r\n$11\r\nunsubscribe\r\n$2\r\nch\r\n:1\r\n*3\r\n$11\r\nunsubscribe\r\n$3\r\nch2\r\n:0\r\n".to_vec(),
        ),
    ])
    .await;

    let sink = Arc::new(RecordingSink::new());
    let client = client_for(addr, sink);

    client
        .send_void("SUBSCRIBE", vec![Arg::from("ch"), Arg::from("ch2")])
        .await
        .unwrap();

    client.send_void("UNSUBSCRIBE", vec![]).await.unwrap();
}
