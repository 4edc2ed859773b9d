//! Command-channel instructions: the request types callers enqueue and the
//! correlation currency the engine matches replies against.

use fq_wire::{BindFlags, Rk};
use std::fmt;
use std::time::Duration;

/// A bind request.
///
/// `out_route_id` is filled in from the broker's reply before the bind hook
/// fires; [`fq_wire::ROUTE_REFUSED`] means the broker refused the bind.
#[derive(Debug, Clone)]
pub struct BindReq {
    /// Exchange to bind against.
    pub exchange: Rk,
    /// Bind flags.
    pub flags: BindFlags,
    /// Opaque routing-filter program; the client does not parse it.
    pub program: String,
    /// Route id assigned by the broker, set on reply.
    pub out_route_id: u32,
}

impl BindReq {
    /// Build a bind request.
    pub fn new(exchange: &str, flags: BindFlags, program: &str) -> Self {
        Self {
            exchange: Rk::new(exchange),
            flags,
            program: program.to_string(),
            out_route_id: 0,
        }
    }
}

/// An unbind request. `out_success` is set from the broker's reply.
#[derive(Debug, Clone)]
pub struct UnbindReq {
    /// Exchange the route was bound against.
    pub exchange: Rk,
    /// Route id returned by the original bind.
    pub route_id: u32,
    /// Success word from the broker, set on reply.
    pub out_success: u32,
}

impl UnbindReq {
    /// Build an unbind request.
    pub fn new(exchange: &str, route_id: u32) -> Self {
        Self {
            exchange: Rk::new(exchange),
            route_id,
            out_success: 0,
        }
    }
}

/// Callback invoked once per key/value pair of a status reply.
pub type StatusCallback = Box<dyn Fn(&str, u32) + Send>;

/// One instruction flowing through the command engine.
///
/// Reply-bearing variants sit in the correlation queue between send and
/// reply; the reader fills in the reply data and forwards the instruction to
/// the hook dispatch path.
pub(crate) enum Instr {
    Heartbeat {
        interval: Duration,
    },
    Bind(BindReq),
    Unbind(UnbindReq),
    Status {
        callback: StatusCallback,
        vals: Vec<(String, u32)>,
    },
    Auth {
        err: Option<String>,
    },
}

impl Instr {
    /// Short name of the reply this instruction expects, for violation
    /// messages.
    pub(crate) fn expects(&self) -> &'static str {
        match self {
            Instr::Bind(_) => "bind",
            Instr::Unbind(_) => "unbind",
            Instr::Status { .. } => "stats",
            _ => "none",
        }
    }
}

impl fmt::Debug for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Heartbeat { interval } => write!(f, "Heartbeat({interval:?})"),
            Instr::Bind(req) => write!(f, "Bind({req:?})"),
            Instr::Unbind(req) => write!(f, "Unbind({req:?})"),
            Instr::Status { vals, .. } => write!(f, "Status({} vals)", vals.len()),
            Instr::Auth { err } => write!(f, "Auth({err:?})"),
        }
    }
}
