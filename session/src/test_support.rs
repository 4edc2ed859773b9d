//! Loopback broker harness for session tests.

use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub(crate) struct MockBroker {
    listener: TcpListener,
    pub port: u16,
}

/// An accepted command connection with the parsed auth blobs.
pub(crate) struct CmdConn {
    pub stream: TcpStream,
    pub user: Vec<u8>,
    pub queue: Vec<u8>,
    pub pass: Vec<u8>,
}

impl MockBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    pub async fn accept(&self) -> TcpStream {
        let (stream, _) = self.listener.accept().await.unwrap();
        stream
    }

    /// Accept the command connection, verify the mode word, consume the auth
    /// sequence, and reply with the given session key.
    pub async fn accept_cmd(&self, key: &[u8]) -> CmdConn {
        let mut stream = self.accept().await;
        assert_eq!(stream.read_u32().await.unwrap(), 0xCC50_CAFE);
        assert_eq!(stream.read_u16().await.unwrap(), 0xAAAA);
        assert_eq!(stream.read_u16().await.unwrap(), 0x0000);
        let user = read_short(&mut stream).await;
        let queue = read_short(&mut stream).await;
        let pass = read_short(&mut stream).await;

        let mut out = BytesMut::new();
        out.put_u16(0xAA00);
        out.put_u16(key.len() as u16);
        out.put_slice(key);
        stream.write_all(&out).await.unwrap();

        CmdConn {
            stream,
            user,
            queue,
            pass,
        }
    }

    /// Accept the data connection; returns the mode word and echoed key.
    pub async fn accept_data(&self) -> (TcpStream, u32, Vec<u8>) {
        let mut stream = self.accept().await;
        let mode = stream.read_u32().await.unwrap();
        let key = read_short(&mut stream).await;
        (stream, mode, key)
    }
}

/// Read one big-endian `u16`.
pub(crate) async fn read_u16(stream: &mut TcpStream) -> u16 {
    stream.read_u16().await.unwrap()
}

/// Read one big-endian `u32`.
pub(crate) async fn read_u32(stream: &mut TcpStream) -> u32 {
    stream.read_u32().await.unwrap()
}

/// Read one `u16`-prefixed short block.
pub(crate) async fn read_short(stream: &mut TcpStream) -> Vec<u8> {
    let len = stream.read_u16().await.unwrap() as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Consume the heartbeat request the client issues after auth; returns the
/// negotiated interval in milliseconds.
pub(crate) async fn expect_hbreq(stream: &mut TcpStream) -> u16 {
    assert_eq!(stream.read_u16().await.unwrap(), 0x4848);
    stream.read_u16().await.unwrap()
}

/// Poll `cond` until it holds, panicking after two seconds.
pub(crate) async fn wait_for(cond: impl Fn() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timeout waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
