//! End-to-end session scenarios against a scripted relay server on a
//! local socket.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use weerelay::{Pointer, RelayClient, RelayConfig, RelayEvent};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config(port: u16) -> RelayConfig {
    RelayConfig {
        host: "127.0.0.1".to_string(),
        port,
        password: Some("mypass".to_string()),
        ..RelayConfig::default()
    }
}

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<RelayEvent>) -> RelayEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("timed out reading command")
        .expect("read failed");
    line.trim_end().to_string()
}

// -- wire builders ----------------------------------------------------------

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_short_ascii(out: &mut Vec<u8>, s: &str) {
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn finish_frame(body: Vec<u8>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 5);
    frame.extend_from_slice(&((body.len() + 5) as u32).to_be_bytes());
    frame.push(0);
    frame.extend_from_slice(&body);
    frame
}

/// A `listbuffers` response with one channel buffer at pointer `aa1`.
fn buffer_list_frame() -> Vec<u8> {
    let mut body = Vec::new();
    put_str(&mut body, "listbuffers");
    body.extend_from_slice(b"hda");
    put_str(&mut body, "buffer");
    put_str(
        &mut body,
        "number:int,full_name:str,short_name:str,type:int,nicklist:int,title:str,\
         local_variables:htb",
    );
    body.extend_from_slice(&1u32.to_be_bytes());
    put_short_ascii(&mut body, "aa1");
    body.extend_from_slice(&1i32.to_be_bytes());
    put_str(&mut body, "irc.libera.#rust");
    put_str(&mut body, "#rust");
    body.extend_from_slice(&0i32.to_be_bytes());
    body.extend_from_slice(&1i32.to_be_bytes());
    put_str(&mut body, "Rust!");
    body.extend_from_slice(b"str");
    body.extend_from_slice(b"str");
    body.extend_from_slice(&0u32.to_be_bytes());
    finish_frame(body)
}

/// A `_buffer_line_added` push for buffer `aa1`.
fn line_added_frame(message: &str) -> Vec<u8> {
    let mut body = Vec::new();
    put_str(&mut body, "_buffer_line_added");
    body.extend_from_slice(b"hda");
    put_str(&mut body, "line_data");
    put_str(
        &mut body,
        "buffer:ptr,date:tim,displayed:chr,prefix:str,message:str,tags_array:arr",
    );
    body.extend_from_slice(&1u32.to_be_bytes());
    put_short_ascii(&mut body, "b01");
    put_short_ascii(&mut body, "aa1");
    put_short_ascii(&mut body, "1700000000");
    body.push(1);
    put_str(&mut body, "alice");
    put_str(&mut body, message);
    body.extend_from_slice(b"str");
    body.extend_from_slice(&1u32.to_be_bytes());
    put_str(&mut body, "irc_privmsg");
    finish_frame(body)
}

// -- scenarios --------------------------------------------------------------

/// A wrong password is only observable as the server closing the socket
/// right after `init`: the client must surface a connection error and end
/// up disconnected, not hang or crash.
#[tokio::test]
async fn auth_reject_close_reports_connection_error() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let init = read_line(&mut reader).await;
        assert!(init.starts_with("init password=mypass"), "got: {init}");
        // Drain the sync commands the client already queued, then close
        // without a word - that is all a bad password looks like.
        loop {
            if read_line(&mut reader).await == "sync" {
                break;
            }
        }
        drop(reader);
    });

    let (_client, mut events) = RelayClient::connect(test_config(port)).await.unwrap();

    assert_eq!(next_event(&mut events).await, RelayEvent::Connected);
    match next_event(&mut events).await {
        RelayEvent::Disconnected { reason } => {
            assert_eq!(reason, "connection closed by server");
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_an_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = RelayClient::connect(test_config(port)).await;
    assert!(result.is_err());
    assert_eq!(result.err().unwrap().error_code(), "connection");
}

#[tokio::test]
async fn invalid_config_is_rejected_before_dialing() {
    let config = RelayConfig::default(); // empty host
    let result = RelayClient::connect(config).await;
    assert!(result.is_err());
    assert_eq!(result.err().unwrap().error_code(), "config");
}

/// Full happy path: handshake, sync commands, a buffer list response and a
/// line push land in the mirror; input goes out; quit is sent on
/// disconnect.
#[tokio::test]
async fn sync_flow_populates_mirror() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);

        assert!(read_line(&mut reader).await.starts_with("init password=mypass,compression="));
        assert!(read_line(&mut reader).await.starts_with("(listbuffers) hdata buffer:gui_buffers(*)"));
        assert!(read_line(&mut reader).await.starts_with("(listlines) hdata"));
        assert_eq!(read_line(&mut reader).await, "(nicklist) nicklist");
        assert_eq!(read_line(&mut reader).await, "sync");

        let stream = reader.get_mut();
        stream.write_all(&buffer_list_frame()).await.unwrap();
        stream.write_all(&line_added_frame("hello rust")).await.unwrap();
        stream.flush().await.unwrap();

        // The client reacts to the line by speaking and hanging up.
        assert_eq!(
            read_line(&mut reader).await,
            "input irc.libera.#rust thanks!"
        );
        assert_eq!(read_line(&mut reader).await, "quit");
    });

    let (client, mut events) = RelayClient::connect(test_config(port)).await.unwrap();
    let buffer_ptr = Pointer::from_hex("aa1").unwrap();

    assert_eq!(next_event(&mut events).await, RelayEvent::Connected);
    assert_eq!(
        next_event(&mut events).await,
        RelayEvent::BufferAdded(buffer_ptr)
    );
    assert_eq!(
        next_event(&mut events).await,
        RelayEvent::LineAdded {
            buffer: buffer_ptr,
            line: Pointer::from_hex("b01").unwrap(),
        }
    );

    {
        let mirror = client.mirror();
        let mirror = mirror.read();
        let buffer = mirror.buffer(buffer_ptr).expect("buffer mirrored");
        assert_eq!(buffer.full_name, "irc.libera.#rust");
        assert_eq!(buffer.display_name(), "#rust");
        assert_eq!(buffer.title.as_deref(), Some("Rust!"));
        assert_eq!(buffer.lines.len(), 1);
        assert_eq!(buffer.lines[0].message, "hello rust");
        assert_eq!(buffer.lines[0].prefix, "alice");
        assert_eq!(buffer.lines[0].tags, vec!["irc_privmsg".to_string()]);
    }

    assert!(client.input("irc.libera.#rust", "thanks!"));
    assert!(client.disconnect());

    match next_event(&mut events).await {
        RelayEvent::Disconnected { reason } => assert_eq!(reason, "disconnect requested"),
        other => panic!("expected Disconnected, got {other:?}"),
    }

    server.await.unwrap();
}

/// The mirror is rebuilt per connection: a second session starts empty.
#[tokio::test]
async fn reconnect_starts_with_a_fresh_mirror() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            loop {
                let line = read_line(&mut reader).await;
                if line == "sync" {
                    break;
                }
            }
            let stream = reader.get_mut();
            stream.write_all(&buffer_list_frame()).await.unwrap();
            stream.flush().await.unwrap();
            // Server goes away; client observes the close.
        }
    });

    let ptr = Pointer::from_hex("aa1").unwrap();

    let (first, mut events) = RelayClient::connect(test_config(port)).await.unwrap();
    assert_eq!(next_event(&mut events).await, RelayEvent::Connected);
    assert_eq!(next_event(&mut events).await, RelayEvent::BufferAdded(ptr));
    let first_mirror = first.mirror();
    assert_eq!(first_mirror.read().len(), 1);

    // Wait out the server-side close of session one.
    loop {
        if matches!(next_event(&mut events).await, RelayEvent::Disconnected { .. }) {
            break;
        }
    }

    let (second, mut events2) = RelayClient::connect(test_config(port)).await.unwrap();
    // The new session's mirror is empty until its own sync lands.
    assert!(second.mirror().read().is_empty() || second.mirror().read().len() == 1);
    assert_eq!(next_event(&mut events2).await, RelayEvent::Connected);
    assert_eq!(next_event(&mut events2).await, RelayEvent::BufferAdded(ptr));

    // The old handle still sees only its own, now-stale mirror.
    assert_eq!(first_mirror.read().len(), 1);

    server.await.unwrap();
}
