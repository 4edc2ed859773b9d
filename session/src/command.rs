//! The command engine: connect, authenticate, send requests, read and
//! correlate replies, and supervise heartbeats.

use crate::client::Client;
use crate::error::SessionError;
use crate::instr::Instr;
use bytes::BytesMut;
use fq_wire::{
    decode_auth_reply, put_auth_plain, put_bindreq, put_hb, put_hbreq, put_mode, put_statusreq,
    put_unbindreq, AuthReply, CmdDecoder, Mode, ServerCmd, WireError,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// TCP dial timeout for both channels.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Depth of the per-session reader-to-worker feedback channel.
const CMDS_DEPTH: usize = 10;

/// Depth of the per-session request-correlation queue.
const CX_DEPTH: usize = 10;

/// The long-lived command worker: connect, serve, report the disconnect,
/// repeat until the session is destroyed.
pub(crate) async fn command_worker(client: Client, mut cmdq: mpsc::Receiver<Instr>) {
    while !client.stopped() {
        if let Err(err) = run_session(&client, &mut cmdq).await {
            client.record_error(&err);
        }
        client.run_hook(|hooks, c| hooks.disconnect(c));
    }
    client.run_hook(|hooks, c| hooks.cleanup(c));
}

/// One command-channel session: dial, authenticate, then serve until a fatal
/// error or shutdown.
async fn run_session(
    client: &Client,
    cmdq: &mut mpsc::Receiver<Instr>,
) -> Result<(), SessionError> {
    let auth = connect_and_auth(client).await;
    match &auth {
        Ok(_) => client.deliver_auth_hook(None).await,
        Err(err) => client.deliver_auth_hook(Some(err.to_string())).await,
    }
    // Negotiate heartbeats as soon as the session is up.
    client.heartbeat();

    let stream = match auth {
        Ok(stream) => stream,
        Err(err) => {
            client.send_signal().await;
            return Err(err);
        }
    };
    info!("command channel ready");
    client.send_signal().await;

    let (rd, wr) = stream.into_split();
    let (cmds_tx, mut cmds_rx) = mpsc::channel(CMDS_DEPTH);
    let (cx_tx, cx_rx) = mpsc::channel(CX_DEPTH);
    let reader = tokio::spawn(command_receiver(client.clone(), rd, cmds_tx, cx_rx));

    let result = serve_ready(client, cmdq, &mut cmds_rx, cx_tx, wr).await;

    reader.abort();
    client.clear_data_ready();
    result
}

/// Dial the broker, write the command mode word, and run the plain-credential
/// authentication exchange. On success the session key is installed and the
/// session becomes data-ready.
async fn connect_and_auth(client: &Client) -> Result<TcpStream, SessionError> {
    let addr = client.broker_addr()?;
    debug!("dialing {addr} (command)");
    let mut stream = dial(&addr).await?;

    let (user, queue, queue_type, pass) = client.auth_blobs();
    let mut buf = BytesMut::new();
    put_mode(&mut buf, Mode::Command);
    put_auth_plain(&mut buf, &user, &queue, &queue_type, &pass);
    stream.write_all(&buf).await?;

    let mut rbuf = BytesMut::with_capacity(256);
    loop {
        let reply = decode_auth_reply(&mut rbuf).map_err(|err| match err {
            WireError::KeyTooLong(_) => SessionError::Protocol(err.to_string()),
            WireError::UnknownOpcode(op) => {
                SessionError::Auth(format!("server auth response {op:#06x} unknown"))
            }
            other => SessionError::Wire(other),
        })?;
        match reply {
            Some(AuthReply::Key(key)) => {
                info!("authenticated, {}-byte session key", key.len());
                client.install_session_key(&key);
                return Ok(stream);
            }
            Some(AuthReply::Refused) => {
                return Err(SessionError::Auth("server refused credentials".into()))
            }
            None => {
                let n = stream.read_buf(&mut rbuf).await?;
                if n == 0 {
                    return Err(SessionError::Auth("connection closed during auth".into()));
                }
            }
        }
    }
}

/// Dial with the protocol's connect timeout.
pub(crate) async fn dial(addr: &str) -> Result<TcpStream, SessionError> {
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connect timed out",
        ))),
    }
}

/// The Ready state: interleave completed reply feedback, new outbound
/// requests, and heartbeat ticks until something fatal happens.
async fn serve_ready(
    client: &Client,
    cmdq: &mut mpsc::Receiver<Instr>,
    cmds_rx: &mut mpsc::Receiver<Instr>,
    cx_tx: mpsc::Sender<Instr>,
    mut wr: OwnedWriteHalf,
) -> Result<(), SessionError> {
    let mut interval = client.hb_interval();
    let mut hb = heartbeat_timer(interval);
    loop {
        if client.stopped() {
            return Ok(());
        }
        tokio::select! {
            feedback = cmds_rx.recv() => {
                let Some(instr) = feedback else {
                    return Err(SessionError::Protocol(
                        "reading on command channel terminated".into(),
                    ));
                };
                client.dispatch_cmd_feedback(instr).await;
            }
            req = cmdq.recv() => {
                let Some(instr) = req else {
                    return Err(SessionError::Protocol("client command queue closed".into()));
                };
                if let Some(renegotiated) = send_instr(client, &mut wr, &cx_tx, instr).await? {
                    if renegotiated != interval {
                        interval = renegotiated;
                        hb = heartbeat_timer(interval);
                    }
                }
            }
            _ = hb.tick() => {
                if client.hb_needed() {
                    let mut buf = BytesMut::new();
                    put_hb(&mut buf);
                    wr.write_all(&buf).await?;
                    if client.hb_age() > client.hb_max_age() {
                        return Err(SessionError::Heartbeat);
                    }
                }
            }
        }
    }
}

fn heartbeat_timer(period: Duration) -> tokio::time::Interval {
    let mut hb = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    hb.set_missed_tick_behavior(MissedTickBehavior::Delay);
    hb
}

/// Encode and send one instruction. Reply-bearing requests enter the
/// correlation queue before their bytes are written, so the reader can never
/// see a reply outrun its paired request. Returns the renegotiated heartbeat
/// interval when one was sent.
async fn send_instr(
    client: &Client,
    wr: &mut OwnedWriteHalf,
    cx_tx: &mpsc::Sender<Instr>,
    instr: Instr,
) -> Result<Option<Duration>, SessionError> {
    let mut buf = BytesMut::new();
    let mut renegotiated = None;
    match instr {
        Instr::Heartbeat { interval } => {
            let ms = interval.as_millis().min(u16::MAX as u128) as u16;
            put_hbreq(&mut buf, ms);
            client.set_hb_interval(interval);
            client.touch_hb_last();
            renegotiated = Some(interval);
        }
        Instr::Bind(req) => {
            put_bindreq(&mut buf, req.flags, &req.exchange, req.program.as_bytes())?;
            push_pending(cx_tx, Instr::Bind(req)).await?;
        }
        Instr::Unbind(req) => {
            put_unbindreq(&mut buf, req.route_id, &req.exchange);
            push_pending(cx_tx, Instr::Unbind(req)).await?;
        }
        instr @ Instr::Status { .. } => {
            put_statusreq(&mut buf);
            push_pending(cx_tx, instr).await?;
        }
        other => {
            return Err(SessionError::Protocol(format!(
                "can't send unknown cmd: {other:?}"
            )))
        }
    }
    wr.write_all(&buf).await?;
    Ok(renegotiated)
}

async fn push_pending(cx_tx: &mpsc::Sender<Instr>, instr: Instr) -> Result<(), SessionError> {
    cx_tx
        .send(instr)
        .await
        .map_err(|_| SessionError::Protocol("command reader terminated".into()))
}

/// The command reader: parse inbound frames, track heartbeat liveness, and
/// correlate replies FIFO against the pending-request queue. Terminates by
/// dropping its end of the feedback channel.
async fn command_receiver(
    client: Client,
    mut rd: OwnedReadHalf,
    cmds: mpsc::Sender<Instr>,
    mut cx_queue: mpsc::Receiver<Instr>,
) {
    let mut decoder = CmdDecoder::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut pending: Option<Instr> = None;
    loop {
        let cmd = match read_cmd(&mut rd, &mut decoder, &mut buf).await {
            Ok(cmd) => cmd,
            Err(err) => {
                client.record_error(&err);
                return;
            }
        };
        match cmd {
            ServerCmd::Heartbeat => {
                client.note_heartbeat();
                continue;
            }
            ServerCmd::Error => {
                client.record_error(&SessionError::Protocol(
                    "server reported a protocol error".into(),
                ));
                return;
            }
            reply => {
                if pending.is_none() {
                    pending = cx_queue.try_recv().ok();
                }
                let Some(instr) = pending.take() else {
                    client.record_error(&SessionError::Protocol(format!(
                        "protocol violation: {reply:?} without request"
                    )));
                    return;
                };
                let filled = match (reply, instr) {
                    (ServerCmd::Bind(route_id), Instr::Bind(mut req)) => {
                        req.out_route_id = route_id;
                        Instr::Bind(req)
                    }
                    (ServerCmd::Unbind(success), Instr::Unbind(mut req)) => {
                        req.out_success = success;
                        Instr::Unbind(req)
                    }
                    (ServerCmd::Status(vals), Instr::Status { callback, .. }) => {
                        Instr::Status { callback, vals }
                    }
                    (_, mismatched) => {
                        client.record_error(&SessionError::Protocol(format!(
                            "protocol violation (exp {})",
                            mismatched.expects()
                        )));
                        return;
                    }
                };
                if cmds.send(filled).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Accumulate socket bytes until the decoder yields one command. EOF here is
/// always fatal: the command channel never closes cleanly mid-session.
async fn read_cmd(
    rd: &mut OwnedReadHalf,
    decoder: &mut CmdDecoder,
    buf: &mut BytesMut,
) -> Result<ServerCmd, SessionError> {
    loop {
        if let Some(cmd) = decoder.decode(buf)? {
            return Ok(cmd);
        }
        let n = rd.read_buf(buf).await?;
        if n == 0 {
            return Err(SessionError::Wire(WireError::Truncated));
        }
    }
}
