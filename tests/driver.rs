//! The tokio driver over an in-memory duplex stream.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use harness::*;
use rsws_bridge::{Config, Connection, Message, QueuedTransport, Rfc6455Factory, serve};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn connection(host: TestHost, config: Config) -> Connection<TestHost, QueuedTransport> {
    Connection::new(host, QueuedTransport::new(), Arc::new(Rfc6455Factory), config)
}

fn echo_host() -> TestHost {
    TestHost::with_setup(|ws| {
        ws.on_message(|ws, msg| {
            if let Message::Text(text) = msg {
                ws.send(text)?;
            }
            Ok(())
        });
    })
}

async fn read_head(client: &mut DuplexStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(client.read_u8().await.unwrap());
    }
    String::from_utf8(head).unwrap()
}

#[tokio::test]
async fn test_echo_and_close_over_duplex() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let mut conn = connection(echo_host(), Config::default());
        serve(&mut server, &mut conn).await
    });

    client.write_all(UPGRADE_REQUEST).await.unwrap();
    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(head.contains(ACCEPT_HEADER));

    client
        .write_all(&client_frame(0x1, b"over the wire"))
        .await
        .unwrap();
    let expected = server_frame(0x1, b"over the wire");
    let mut frame = vec![0; expected.len()];
    client.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame, expected);

    client
        .write_all(&client_frame(0x8, &1000u16.to_be_bytes()))
        .await
        .unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, server_frame(0x8, &1000u16.to_be_bytes()));

    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bad_handshake_drops_connection() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let log = log();
    let l = log.clone();
    let server = tokio::spawn(async move {
        let mut conn = connection(
            TestHost::with_setup(move |ws| record_callbacks(ws, &l)),
            Config::default(),
        );
        serve(&mut server, &mut conn).await
    });

    client
        .write_all(b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: upgrade\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    server.await.unwrap().unwrap();
    let log = entries(&log);
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("error:Invalid handshake"));
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_before_upgrade() {
    let (_client, mut server) = tokio::io::duplex(4096);
    let config = Config::default().with_idle_timeout(Some(Duration::from_secs(5)));
    let mut conn = connection(TestHost::default(), config);

    let started = tokio::time::Instant::now();
    serve(&mut server, &mut conn).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(conn.websocket().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_upgrade_lifts_idle_timeout() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let log = log();
    let l = log.clone();
    let server = tokio::spawn(async move {
        let config = Config::default().with_idle_timeout(Some(Duration::from_secs(5)));
        let mut conn = connection(
            TestHost::with_setup(move |ws| record_callbacks(ws, &l)),
            config,
        );
        serve(&mut server, &mut conn).await
    });

    client.write_all(UPGRADE_REQUEST).await.unwrap();
    read_head(&mut client).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    client
        .write_all(&client_frame(0x1, b"still here"))
        .await
        .unwrap();
    client.write_all(&client_frame(0x9, b"")).await.unwrap();
    let mut pong = [0; 2];
    client.read_exact(&mut pong).await.unwrap();
    assert_eq!(pong, [0x8A, 0x00]);

    drop(client);
    server.await.unwrap().unwrap();
    assert_eq!(
        entries(&log),
        vec!["open", "text:still here", "ping:", "close"]
    );
}
