//! The data engine: join the authenticated session, stream outbound
//! messages, and deliver inbound ones.

use crate::backoff::Backoff;
use crate::client::Client;
use crate::command;
use crate::error::SessionError;
use crate::hooks::BackMessage;
use bytes::BytesMut;
use fq_wire::{encode_msg, put_mode, put_session_key, Message, Mode, MsgDecoder, WireError};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// The long-lived data worker: wait for the command engine's signal, serve
/// one data session, then back off before re-arming.
pub(crate) async fn data_worker(
    client: Client,
    mut signal: mpsc::Receiver<bool>,
    q_rx: mpsc::Receiver<Message>,
) {
    // The publish queue outlives individual data sessions; each session's
    // sender task borrows it through this lock.
    let q_rx = Arc::new(Mutex::new(q_rx));
    let mut backoff = Backoff::new();
    while !client.stopped() {
        if signal.recv().await.is_none() {
            return;
        }
        let mut served = false;
        if client.data_ready() {
            served = serve(&client, Arc::clone(&q_rx)).await;
        }
        if let Some(delay) = backoff.after_attempt(served) {
            debug!("data channel backing off for {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
}

/// One data session: handshake, then pump both directions until either side
/// fails. Returns `true` once the handshake succeeded, which resets the
/// backoff schedule.
async fn serve(client: &Client, q_rx: Arc<Mutex<mpsc::Receiver<Message>>>) -> bool {
    let stream = match connect(client).await {
        Ok(stream) => stream,
        Err(err) => {
            client.record_error(&err);
            return false;
        }
    };
    info!("data channel ready");

    let (rd, wr) = stream.into_split();
    let sender = tokio::spawn(data_sender(client.clone(), wr, q_rx));
    data_receiver(client, rd).await;
    sender.abort();
    true
}

/// Dial the broker, select the data-channel mode, and echo the session key
/// to join this connection to the authenticated session.
async fn connect(client: &Client) -> Result<TcpStream, SessionError> {
    let Some(key) = client.session_key() else {
        return Err(SessionError::Protocol("no command connection".into()));
    };
    let addr = client.broker_addr()?;
    debug!("dialing {addr} (data)");
    let mut stream = command::dial(&addr).await?;

    let mut buf = BytesMut::new();
    let mode = if client.peer_mode() {
        Mode::Peer
    } else {
        Mode::Data
    };
    put_mode(&mut buf, mode);
    put_session_key(&mut buf, &key);
    stream.write_all(&buf).await?;
    Ok(stream)
}

/// Drain the publish queue onto the wire.
async fn data_sender(
    client: Client,
    mut wr: OwnedWriteHalf,
    q_rx: Arc<Mutex<mpsc::Receiver<Message>>>,
) {
    let mut q = q_rx.lock().await;
    while client.data_ready() {
        let Some(msg) = q.recv().await else { return };
        let mut buf = BytesMut::with_capacity(192 + msg.payload.len());
        encode_msg(&mut buf, &msg, client.peer_mode());
        if let Err(err) = wr.write_all(&buf).await {
            debug!("data send failed: {err}");
            return;
        }
    }
}

/// Read inbound messages and hand them to the message hook, queueing
/// unconsumed ones for `receive`. EOF at a frame boundary is a clean close.
async fn data_receiver(client: &Client, mut rd: OwnedReadHalf) {
    let mut decoder = MsgDecoder::new(client.peer_mode());
    let mut buf = BytesMut::with_capacity(64 * 1024);
    while client.data_ready() {
        let msg = loop {
            match decoder.decode(&mut buf) {
                Ok(Some(msg)) => break msg,
                Ok(None) => match rd.read_buf(&mut buf).await {
                    Ok(0) => {
                        if !buf.is_empty() {
                            client.record_error(&SessionError::Wire(WireError::Truncated));
                        }
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        client.record_error(&err.into());
                        return;
                    }
                },
                Err(err) => {
                    client.record_error(&err.into());
                    return;
                }
            }
        };
        if !client.run_message_hook(&msg) && !client.push_back_message(BackMessage::msg(msg)).await
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::client::Client;
    use crate::hooks::TransientSubHooks;
    use crate::test_support::{self, MockBroker};
    use bytes::{Bytes, BytesMut};
    use fq_wire::{encode_msg, Message, MsgDecoder};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    async fn read_frame(stream: &mut TcpStream, peer_mode: bool) -> Message {
        let mut decoder = MsgDecoder::new(peer_mode);
        let mut buf = BytesMut::new();
        loop {
            if let Some(msg) = decoder.decode(&mut buf).unwrap() {
                return msg;
            }
            let n = stream.read_buf(&mut buf).await.unwrap();
            assert!(n > 0, "data socket closed mid-frame");
        }
    }

    #[tokio::test]
    async fn test_data_handshake_echoes_session_key() {
        let broker = MockBroker::start().await;
        let client = Client::new();
        client
            .creds("127.0.0.1", broker.port, "u/q/mem", "p")
            .unwrap();
        client.connect().unwrap();

        let _cmd = broker.accept_cmd(b"KKKK").await;
        let (_data, mode, key) = timeout(Duration::from_secs(2), broker.accept_data())
            .await
            .unwrap();
        assert_eq!(mode, 0xCC50_FACE);
        assert_eq!(key, b"KKKK");
        client.destroy();
    }

    #[tokio::test]
    async fn test_peer_mode_handshake_word() {
        let broker = MockBroker::start().await;
        let client = Client::new_peer();
        client
            .creds("127.0.0.1", broker.port, "u/q/mem", "p")
            .unwrap();
        client.connect().unwrap();

        let _cmd = broker.accept_cmd(b"K").await;
        let (_data, mode, _key) = timeout(Duration::from_secs(2), broker.accept_data())
            .await
            .unwrap();
        assert_eq!(mode, 0xCC50_FEED);
        client.destroy();
    }

    #[tokio::test]
    async fn test_publish_reaches_broker() {
        let broker = MockBroker::start().await;
        let client = Client::new();
        client
            .creds("127.0.0.1", broker.port, "u/q/mem", "p")
            .unwrap();

        // Messages published before the session is up wait in the queue.
        assert!(
            client
                .publish(Message::new("ex", "r1", Bytes::from_static(b"first")))
                .await
        );
        client.connect().unwrap();

        let _cmd = broker.accept_cmd(b"K").await;
        let (mut data, _, _) = broker.accept_data().await;

        assert!(
            client
                .publish(Message::new("ex", "r2", Bytes::from_static(b"second")))
                .await
        );

        let first = timeout(Duration::from_secs(2), read_frame(&mut data, false))
            .await
            .unwrap();
        assert_eq!(first.payload, Bytes::from_static(b"first"));
        assert_eq!(first.route.to_string(), "r1");

        let second = timeout(Duration::from_secs(2), read_frame(&mut data, false))
            .await
            .unwrap();
        assert_eq!(second.payload, Bytes::from_static(b"second"));
        client.destroy();
    }

    #[tokio::test]
    async fn test_receive_delivers_broker_messages() {
        let broker = MockBroker::start().await;
        let client = Client::new();
        client
            .creds("127.0.0.1", broker.port, "u/q/mem", "p")
            .unwrap();
        client.connect().unwrap();

        let _cmd = broker.accept_cmd(b"K").await;
        let (mut data, _, _) = broker.accept_data().await;

        let outbound = Message::new("ex", "host.web1", Bytes::from_static(b"fanout"));
        let mut frame = BytesMut::new();
        encode_msg(&mut frame, &outbound, false);
        data.write_all(&frame).await.unwrap();

        let received = timeout(Duration::from_secs(2), client.receive(true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.payload, Bytes::from_static(b"fanout"));
        assert_eq!(received.exchange.to_string(), "ex");
        assert_eq!(received.sender_msgid, outbound.sender_msgid);
        client.destroy();
    }

    #[tokio::test]
    async fn test_message_hook_consumes_before_receive() {
        let broker = MockBroker::start().await;
        let client = Client::new();
        let (hooks, mut msgs, _errors) = TransientSubHooks::new();
        client.set_hooks(hooks);
        client
            .creds("127.0.0.1", broker.port, "u/q/mem", "p")
            .unwrap();
        client.connect().unwrap();

        let _cmd = broker.accept_cmd(b"K").await;
        let (mut data, _, _) = broker.accept_data().await;

        let mut frame = BytesMut::new();
        encode_msg(
            &mut frame,
            &Message::new("ex", "r", Bytes::from_static(b"hooked")),
            false,
        );
        data.write_all(&frame).await.unwrap();

        let consumed = timeout(Duration::from_secs(2), msgs.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consumed.payload, Bytes::from_static(b"hooked"));
        // Consumed messages never show up on the receive path.
        assert!(client.receive(false).await.is_none());
        client.destroy();
    }
}
