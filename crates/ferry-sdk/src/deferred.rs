//! Deferred promises
//!
//! A native operation that completes later hands the managed caller a promise
//! right away and keeps a [`Deferred`] to settle it. The deferred owns the
//! runtime's thread-safe completion channel; settling consumes it, so a
//! deferred is settled at most once.
//!
//! [`ChannelRuntime`] is a runtime-independent implementation: settlements
//! are delivered over a crossbeam channel that the managed side drains on its
//! own thread, either from the receiver or one record at a time with
//! [`ChannelRuntime::poll_settlement`].
//!
//! # Settlement record
//!
//! ```text
//! promise u64 | status i32 (0 resolved, 1 rejected) | length i32 | payload
//! ```
//!
//! A rejected record carries the UTF-8 message as its payload. Integers are
//! written in native byte order.
//!
//! # Example
//!
//! ```ignore
//! let runtime = ChannelRuntime::new();
//! let (deferred, promise) = Deferred::create(&runtime, ctx)?;
//! std::thread::spawn(move || deferred.resolve(b"done"));
//! let (id, settlement) = runtime.receiver().recv()?;
//! assert_eq!(id, promise);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::env::VmContext;
use crate::error::{InteropError, InteropResult};

/// Bytes before the payload of a settlement record
pub const SETTLEMENT_HEADER_SIZE: usize = 16;

/// Identifier of a managed-side promise
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromiseHandle(pub u64);

/// Outcome delivered to the managed side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Resolved with a payload
    Resolved(Vec<u8>),
    /// Rejected with a message
    Rejected(String),
}

impl Settlement {
    fn status(&self) -> i32 {
        match self {
            Settlement::Resolved(_) => 0,
            Settlement::Rejected(_) => 1,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Settlement::Resolved(data) => data,
            Settlement::Rejected(message) => message.as_bytes(),
        }
    }

    /// Bytes of the record written for this settlement
    pub fn record_len(&self) -> usize {
        SETTLEMENT_HEADER_SIZE + self.payload().len()
    }

    fn write_record(&self, promise: PromiseHandle, out: &mut [u8]) {
        let payload = self.payload();
        out[..8].copy_from_slice(&promise.0.to_ne_bytes());
        out[8..12].copy_from_slice(&self.status().to_ne_bytes());
        out[12..16].copy_from_slice(&(payload.len() as i32).to_ne_bytes());
        out[SETTLEMENT_HEADER_SIZE..SETTLEMENT_HEADER_SIZE + payload.len()].copy_from_slice(payload);
    }
}

/// Thread-safe path back to the runtime that owns a promise.
pub trait CompletionChannel: Send {
    /// Deliver the settlement and release the channel
    fn complete(self: Box<Self>, settlement: Settlement);

    /// Release the channel without settling
    fn release(self: Box<Self>);
}

/// Runtime able to create promises.
pub trait PromiseRuntime: Send + Sync {
    /// Create a promise for the runtime behind `ctx`
    fn create_promise(&self, ctx: VmContext) -> InteropResult<(Box<dyn CompletionChannel>, PromiseHandle)>;
}

/// In-flight promise held by native code.
pub struct Deferred {
    channel: Option<Box<dyn CompletionChannel>>,
    promise: PromiseHandle,
}

impl Deferred {
    /// Create a promise and the deferred that settles it
    pub fn create(runtime: &dyn PromiseRuntime, ctx: VmContext) -> InteropResult<(Deferred, PromiseHandle)> {
        let (channel, promise) = runtime.create_promise(ctx)?;
        log::trace!("Created deferred for promise {}", promise.0);
        Ok((
            Deferred {
                channel: Some(channel),
                promise,
            },
            promise,
        ))
    }

    /// Promise this deferred settles
    pub fn promise(&self) -> PromiseHandle {
        self.promise
    }

    /// Resolve with `data`
    pub fn resolve(mut self, data: &[u8]) {
        if let Some(channel) = self.channel.take() {
            channel.complete(Settlement::Resolved(data.to_vec()));
        }
    }

    /// Reject with `message`
    pub fn reject(mut self, message: &str) {
        if let Some(channel) = self.channel.take() {
            channel.complete(Settlement::Rejected(message.to_string()));
        }
    }
}

impl Drop for Deferred {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            log::warn!("Deferred for promise {} dropped unsettled", self.promise.0);
            channel.release();
        }
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .field("settled", &self.channel.is_none())
            .finish()
    }
}

// ============================================================================
// ChannelRuntime
// ============================================================================

/// Promise runtime delivering settlements over a crossbeam channel.
pub struct ChannelRuntime {
    next_id: AtomicU64,
    sender: Sender<(PromiseHandle, Settlement)>,
    receiver: Receiver<(PromiseHandle, Settlement)>,
    /// Received by `poll_settlement` but too large for the caller's buffer
    pending: Mutex<Option<(PromiseHandle, Settlement)>>,
}

impl ChannelRuntime {
    /// Runtime with an unbounded settlement channel
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        ChannelRuntime {
            next_id: AtomicU64::new(1),
            sender,
            receiver,
            pending: Mutex::new(None),
        }
    }

    /// Receiving end the managed side drains
    pub fn receiver(&self) -> Receiver<(PromiseHandle, Settlement)> {
        self.receiver.clone()
    }

    /// Write the next settlement record into `out` without blocking.
    ///
    /// Returns the record length, or `None` when nothing has settled. If
    /// `out` is too small the settlement stays pending and `BufferTooSmall`
    /// reports the size needed.
    pub fn poll_settlement(&self, out: &mut [u8]) -> InteropResult<Option<usize>> {
        let mut pending = self.pending.lock();
        if pending.is_none() {
            *pending = self.receiver.try_recv().ok();
        }
        let Some((promise, settlement)) = pending.as_ref() else {
            return Ok(None);
        };
        let needed = settlement.record_len();
        if out.len() < needed {
            return Err(InteropError::BufferTooSmall {
                needed,
                capacity: out.len(),
            });
        }
        settlement.write_record(*promise, out);
        *pending = None;
        Ok(Some(needed))
    }
}

impl Default for ChannelRuntime {
    fn default() -> Self {
        Self::new()
    }
}

struct ChannelCompleter {
    promise: PromiseHandle,
    sender: Sender<(PromiseHandle, Settlement)>,
}

impl CompletionChannel for ChannelCompleter {
    fn complete(self: Box<Self>, settlement: Settlement) {
        if self.sender.send((self.promise, settlement)).is_err() {
            log::warn!("Promise {} settled after its runtime went away", self.promise.0);
        }
    }

    fn release(self: Box<Self>) {}
}

impl PromiseRuntime for ChannelRuntime {
    fn create_promise(&self, _ctx: VmContext) -> InteropResult<(Box<dyn CompletionChannel>, PromiseHandle)> {
        let promise = PromiseHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let completer = ChannelCompleter {
            promise,
            sender: self.sender.clone(),
        };
        Ok((Box::new(completer), promise))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolve_from_other_thread() {
        let runtime = ChannelRuntime::new();
        let (deferred, promise) = Deferred::create(&runtime, VmContext::null()).unwrap();
        std::thread::spawn(move || deferred.resolve(b"done")).join().unwrap();

        let (id, settlement) = runtime.receiver().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(id, promise);
        assert_eq!(settlement, Settlement::Resolved(b"done".to_vec()));
    }

    #[test]
    fn test_reject_carries_message() {
        let runtime = ChannelRuntime::new();
        let (deferred, promise) = Deferred::create(&runtime, VmContext::null()).unwrap();
        deferred.reject("compile failed");
        let (id, settlement) = runtime.receiver().try_recv().unwrap();
        assert_eq!(id, promise);
        assert_eq!(settlement, Settlement::Rejected("compile failed".into()));
    }

    #[test]
    fn test_promises_are_distinct() {
        let runtime = ChannelRuntime::new();
        let (_a, pa) = Deferred::create(&runtime, VmContext::null()).unwrap();
        let (_b, pb) = Deferred::create(&runtime, VmContext::null()).unwrap();
        assert_ne!(pa, pb);
    }

    fn settled(record: &[u8]) -> (u64, i32, &[u8]) {
        let promise = u64::from_ne_bytes(record[..8].try_into().unwrap());
        let status = i32::from_ne_bytes(record[8..12].try_into().unwrap());
        let length = i32::from_ne_bytes(record[12..16].try_into().unwrap()) as usize;
        (promise, status, &record[16..16 + length])
    }

    #[test]
    fn test_poll_settlement_records() {
        let runtime = ChannelRuntime::new();
        let (resolved, pr) = Deferred::create(&runtime, VmContext::null()).unwrap();
        let (rejected, pj) = Deferred::create(&runtime, VmContext::null()).unwrap();
        let mut out = [0u8; 64];
        assert_eq!(runtime.poll_settlement(&mut out).unwrap(), None);

        resolved.resolve(&[1, 2, 3]);
        rejected.reject("bad input");

        // Too small: nothing is lost.
        let err = runtime.poll_settlement(&mut out[..8]).unwrap_err();
        assert!(matches!(err, InteropError::BufferTooSmall { needed: 19, capacity: 8 }));

        assert_eq!(runtime.poll_settlement(&mut out).unwrap(), Some(19));
        assert_eq!(settled(&out), (pr.0, 0, &[1u8, 2, 3][..]));
        assert_eq!(runtime.poll_settlement(&mut out).unwrap(), Some(25));
        assert_eq!(settled(&out), (pj.0, 1, &b"bad input"[..]));
        assert_eq!(runtime.poll_settlement(&mut out).unwrap(), None);
    }

    #[test]
    fn test_drop_unsettled_delivers_nothing() {
        let runtime = ChannelRuntime::new();
        let (deferred, _) = Deferred::create(&runtime, VmContext::null()).unwrap();
        drop(deferred);
        assert!(runtime.receiver().try_recv().is_err());
    }
}
