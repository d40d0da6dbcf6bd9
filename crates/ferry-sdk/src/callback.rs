//! Callback event queue
//!
//! Native code that needs to reach into the managed runtime enqueues events
//! here; the managed side drains them by calling [`CallbackQueue::poll`] in a
//! loop until it reports no event.
//!
//! # Pending acknowledgement
//!
//! `poll` exposes one event at a time. The event it writes stays at the front
//! of the queue, marked as consumed, until the *next* `poll` begins: only then
//! is it popped and finalized (for a call event, its held resources are
//! released). A consumer that stops polling early leaves the last event's
//! finalization pending.
//!
//! # Record layout
//!
//! ```text
//! CallCallback      tag i32 = 0 | args [u8; 240]
//! HoldResource      tag i32 = 1 | resource id i32
//! ReleaseResource   tag i32 = 2 | resource id i32
//! ```
//!
//! Integers are written in native byte order.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{InteropError, InteropResult};

/// Size of the argument buffer carried by a call event
pub const CALLBACK_BUFFER_SIZE: usize = 240;

/// Largest record `poll` writes
pub const MAX_EVENT_RECORD_SIZE: usize = 4 + CALLBACK_BUFFER_SIZE;

/// Event tag
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackEventKind {
    /// Invoke a managed callback with an argument buffer
    CallCallback = 0,
    /// Keep a managed resource alive
    HoldResource = 1,
    /// Let a managed resource go
    ReleaseResource = 2,
}

/// Managed resource referenced from a callback argument buffer
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallbackResource {
    /// Managed resource id
    pub resource_id: i32,
    /// Takes a reference on the resource
    pub hold: unsafe extern "C" fn(resource_id: i32),
    /// Drops the reference taken by `hold`
    pub release: unsafe extern "C" fn(resource_id: i32),
}

/// Resources kept alive while a call event is in flight.
///
/// Holding invokes the resource's hold function immediately; dropping the
/// holder invokes every release function.
#[derive(Debug, Default)]
pub struct ResourceHolder {
    resources: Vec<CallbackResource>,
}

impl ResourceHolder {
    /// Holder with nothing held
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a resource with `resource_id` is held
    pub fn holds(&self, resource_id: i32) -> bool {
        self.resources.iter().any(|r| r.resource_id == resource_id)
    }

    /// Take a reference on `resource` until this holder is released
    pub fn hold(&mut self, resource: CallbackResource) {
        unsafe { (resource.hold)(resource.resource_id) };
        self.resources.push(resource);
    }

    /// Number of held resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check whether anything is held
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release everything held so far
    pub fn release_all(&mut self) {
        for resource in self.resources.drain(..) {
            unsafe { (resource.release)(resource.resource_id) };
        }
    }
}

impl Drop for ResourceHolder {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// One queued event
#[derive(Debug)]
pub enum CallbackEvent {
    /// Invoke a managed callback
    CallCallback {
        /// Argument buffer, zero-padded
        args: Box<[u8; CALLBACK_BUFFER_SIZE]>,
        /// Resources the buffer references
        holder: ResourceHolder,
    },
    /// Keep a managed resource alive
    HoldResource(i32),
    /// Let a managed resource go
    ReleaseResource(i32),
}

impl CallbackEvent {
    /// Event tag
    pub fn kind(&self) -> CallbackEventKind {
        match self {
            CallbackEvent::CallCallback { .. } => CallbackEventKind::CallCallback,
            CallbackEvent::HoldResource(_) => CallbackEventKind::HoldResource,
            CallbackEvent::ReleaseResource(_) => CallbackEventKind::ReleaseResource,
        }
    }

    /// Bytes `poll` writes for this event
    pub fn record_len(&self) -> usize {
        match self {
            CallbackEvent::CallCallback { .. } => 4 + CALLBACK_BUFFER_SIZE,
            CallbackEvent::HoldResource(_) | CallbackEvent::ReleaseResource(_) => 8,
        }
    }

    fn write_record(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&(self.kind() as i32).to_ne_bytes());
        match self {
            CallbackEvent::CallCallback { args, .. } => {
                out[4..4 + CALLBACK_BUFFER_SIZE].copy_from_slice(&args[..]);
            }
            CallbackEvent::HoldResource(id) | CallbackEvent::ReleaseResource(id) => {
                out[4..8].copy_from_slice(&id.to_ne_bytes());
            }
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<CallbackEvent>,
    /// Front event was written by the last poll and awaits finalization
    needs_release_front: bool,
}

impl QueueState {
    /// Pop the event written by the last poll. The caller drops it once the
    /// lock is released: releasing held resources may reenter the queue.
    fn take_polled(&mut self) -> Option<CallbackEvent> {
        if !self.needs_release_front {
            return None;
        }
        self.needs_release_front = false;
        self.events.pop_front()
    }

    fn write_front(&mut self, out: &mut [u8]) -> InteropResult<bool> {
        let Some(front) = self.events.front() else {
            return Ok(false);
        };
        let needed = front.record_len();
        if out.len() < needed {
            return Err(InteropError::BufferTooSmall {
                needed,
                capacity: out.len(),
            });
        }
        front.write_record(out);
        self.needs_release_front = true;
        Ok(true)
    }
}

/// FIFO of callback events shared by native producers and one managed poller.
#[derive(Debug, Default)]
pub struct CallbackQueue {
    state: Mutex<QueueState>,
}

impl CallbackQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event; callable from any thread
    pub fn enqueue(&self, event: CallbackEvent) {
        log::trace!("Enqueue callback event {:?}", event.kind());
        self.state.lock().events.push_back(event);
    }

    /// Queue a call event carrying `args` (at most 240 bytes)
    pub fn enqueue_callback(&self, args: &[u8], holder: ResourceHolder) -> InteropResult<()> {
        if args.len() > CALLBACK_BUFFER_SIZE {
            return Err(InteropError::BufferTooSmall {
                needed: args.len(),
                capacity: CALLBACK_BUFFER_SIZE,
            });
        }
        let mut buffer = Box::new([0u8; CALLBACK_BUFFER_SIZE]);
        buffer[..args.len()].copy_from_slice(args);
        self.enqueue(CallbackEvent::CallCallback { args: buffer, holder });
        Ok(())
    }

    /// Ask the managed side to hold a resource
    pub fn hold_managed_resource(&self, resource_id: i32) {
        self.enqueue(CallbackEvent::HoldResource(resource_id));
    }

    /// Ask the managed side to release a resource
    pub fn release_managed_resource(&self, resource_id: i32) {
        self.enqueue(CallbackEvent::ReleaseResource(resource_id));
    }

    /// Finalize the previously polled event, then write the next one.
    ///
    /// Returns `Ok(false)` when the queue is empty. If `out` cannot hold the
    /// next record nothing is consumed and `BufferTooSmall` is returned.
    pub fn poll(&self, out: &mut [u8]) -> InteropResult<bool> {
        let mut state = self.state.lock();
        let finished = state.take_polled();
        let written = state.write_front(out);
        drop(state);
        drop(finished);
        written
    }

    /// Finalize any polled event and take every remaining one
    pub fn drain(&self) -> Vec<CallbackEvent> {
        let mut state = self.state.lock();
        let finished = state.take_polled();
        let rest = state.events.drain(..).collect();
        drop(state);
        drop(finished);
        rest
    }

    /// Events not yet handed out by `poll`
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.events.len() - state.needs_release_front as usize
    }

    /// Check whether every event has been handed out
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
