//! Query engine doubles.

use std::sync::{Condvar, Mutex};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use mgmtwire_protocol::{MessageKind, ResponseBody};

use crate::dispatch::{ExecutionContext, QueryEngine, QueryError};

/// Interprets the payload as a tiny script:
///
/// - `fail` returns an invalid-query error,
/// - `panic` panics inside the engine,
/// - `warn:<text>` records `<text>` as a warning and succeeds,
/// - anything else is echoed back as the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedEngine;

impl QueryEngine for ScriptedEngine {
    fn execute(
        &self,
        _kind: MessageKind,
        payload: &[u8],
        context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, QueryError> {
        match payload {
            b"fail" => Err(QueryError::Invalid("unconfigured table events".to_owned())),
            b"panic" => panic!("engine crashed"),
            _ => {
                if let Some(warning) = payload.strip_prefix(b"warn:") {
                    context.warn(String::from_utf8_lossy(warning).into_owned());
                }
                Ok(ResponseBody::Result(Bytes::copy_from_slice(payload)))
            }
        }
    }
}

/// Blocks every query until the gate opens, announcing each arrival.
#[derive(Debug)]
pub struct GatedEngine {
    open: Mutex<bool>,
    opened: Condvar,
    arrivals: Sender<Vec<u8>>,
}

impl GatedEngine {
    /// Builds a closed gate and the channel announcing blocked queries.
    #[must_use]
    pub fn new() -> (Self, Receiver<Vec<u8>>) {
        let (arrivals, announced) = unbounded();
        let engine = Self {
            open: Mutex::new(false),
            opened: Condvar::new(),
            arrivals,
        };
        (engine, announced)
    }

    /// Releases every blocked and future query.
    pub fn open(&self) {
        *self.open.lock().expect("gate mutex poisoned") = true;
        self.opened.notify_all();
    }
}

impl QueryEngine for GatedEngine {
    fn execute(
        &self,
        _kind: MessageKind,
        payload: &[u8],
        _context: &ExecutionContext<'_>,
    ) -> Result<ResponseBody, QueryError> {
        self.arrivals
            .send(payload.to_vec())
            .expect("arrival receiver alive");
        let mut open = self.open.lock().expect("gate mutex poisoned");
        while !*open {
            open = self.opened.wait(open).expect("gate mutex poisoned");
        }
        Ok(ResponseBody::Result(Bytes::copy_from_slice(payload)))
    }
}
