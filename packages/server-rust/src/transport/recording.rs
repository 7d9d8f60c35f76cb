//! In-memory transport that records everything sent through it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{BusTransport, CallToken, OutboundSignal, Reply};
use crate::error::BusError;
use crate::handler::NestedCall;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SentReply {
    pub destination: String,
    pub reply_serial: u64,
    pub reply: Reply,
}

pub(crate) struct RecordingTransport {
    unique_name: String,
    names: Mutex<Vec<String>>,
    replies: Mutex<Vec<SentReply>>,
    signals: Mutex<Vec<OutboundSignal>>,
    calls: Mutex<Vec<(CallToken, NestedCall)>>,
    abandoned: Mutex<Vec<CallToken>>,
    next_token: AtomicU64,
    closed: AtomicBool,
    refuse_calls: AtomicBool,
}

impl RecordingTransport {
    pub fn new(unique_name: &str) -> Self {
        Self {
            unique_name: unique_name.to_string(),
            names: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            abandoned: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            refuse_calls: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Makes `call_async` fail with `Disconnected` while the rest works.
    pub fn refuse_calls(&self) {
        self.refuse_calls.store(true, Ordering::SeqCst);
    }

    pub fn replies(&self) -> Vec<SentReply> {
        self.replies.lock().clone()
    }

    pub fn replies_to(&self, reply_serial: u64) -> Vec<Reply> {
        self.replies
            .lock()
            .iter()
            .filter(|r| r.reply_serial == reply_serial)
            .map(|r| r.reply.clone())
            .collect()
    }

    pub fn signals(&self) -> Vec<OutboundSignal> {
        self.signals.lock().clone()
    }

    pub fn calls(&self) -> Vec<(CallToken, NestedCall)> {
        self.calls.lock().clone()
    }

    pub fn abandoned(&self) -> Vec<CallToken> {
        self.abandoned.lock().clone()
    }

    pub fn last_call_token(&self) -> Option<CallToken> {
        self.calls.lock().last().map(|(token, _)| *token)
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BusError::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl BusTransport for RecordingTransport {
    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn request_name(&self, name: &str) -> Result<(), BusError> {
        self.ensure_open()?;
        let mut names = self.names.lock();
        if names.iter().any(|n| n == name) {
            return Err(BusError::NameTaken {
                name: name.to_string(),
            });
        }
        names.push(name.to_string());
        Ok(())
    }

    fn send_reply(
        &self,
        destination: &str,
        reply_serial: u64,
        reply: Reply,
    ) -> Result<(), BusError> {
        self.ensure_open()?;
        self.replies.lock().push(SentReply {
            destination: destination.to_string(),
            reply_serial,
            reply,
        });
        Ok(())
    }

    fn send_signal(&self, signal: OutboundSignal) -> Result<(), BusError> {
        self.ensure_open()?;
        self.signals.lock().push(signal);
        Ok(())
    }

    fn call_async(&self, call: &NestedCall) -> Result<CallToken, BusError> {
        self.ensure_open()?;
        if self.refuse_calls.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        let token = CallToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.calls.lock().push((token, call.clone()));
        Ok(token)
    }

    fn abandon_call(&self, token: CallToken) {
        self.abandoned.lock().push(token);
    }
}
