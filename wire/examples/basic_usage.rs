//! Basic usage example for the fq wire codec.

use bytes::{Bytes, BytesMut};
use fq_wire::{encode_msg, put_bindreq, BindFlags, Message, MsgDecoder, Rk};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== fq Wire Codec Example ===\n");

    // 1. Build a message the way a publisher would
    println!("1. Creating a message...");
    let msg = Message::new(
        "logging",
        "host.web1.error",
        Bytes::from_static(b"disk full on /var"),
    );
    let (w1, w2) = msg.sender_msgid.get_u64();
    println!("   Message id words: {w1:#018x} {w2:#018x}");

    // 2. Encode it as a client-mode data frame
    println!("\n2. Encoding the data frame...");
    let mut buf = BytesMut::new();
    encode_msg(&mut buf, &msg, false);
    println!("   Encoded frame size: {} bytes", buf.len());

    // 3. Decode it back
    println!("\n3. Decoding the frame...");
    let mut decoder = MsgDecoder::new(false);
    if let Some(decoded) = decoder.decode(&mut buf)? {
        println!("   Exchange: {}", decoded.exchange);
        println!("   Route: {}", decoded.route);
        println!("   Payload: {:?}", std::str::from_utf8(&decoded.payload));
    }

    // 4. Encode a bind request for the command channel
    println!("\n4. Encoding a bind request...");
    let mut cmd = BytesMut::new();
    put_bindreq(
        &mut cmd,
        BindFlags::TRANS,
        &Rk::new("logging"),
        b"prefix:\"host.\"",
    )?;
    println!("   Bind request: {} bytes", cmd.len());

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
