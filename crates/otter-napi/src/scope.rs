//! Handles and handle scopes
//!
//! Every value handed to the host is a [`Value`] handle owned by the innermost open
//! scope. Handles live in a per-environment arena: closing a scope releases the
//! engine references, bumps each slot's generation and pushes the slot onto a free
//! list, so a stale handle is detected instead of dereferenced and slots are reused
//! without touching the allocator.

use std::fmt;
use std::mem;
use std::num::NonZeroU64;

use tracing::{trace, warn};

use crate::engine::{JSValue, Owned, qjs};
use crate::env::Env;
use crate::error::{NapiResult, Status};

/// A scope-owned handle to an engine value
///
/// Valid only while the scope that created it is open.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(NonZeroU64);

impl Value {
    fn new(index: u32, generation: u32) -> Self {
        let packed = (u64::from(generation) << 32) | (u64::from(index) + 1);
        Self(NonZeroU64::new(packed).unwrap_or(NonZeroU64::MIN))
    }

    fn index(self) -> usize {
        (self.0.get() & 0xffff_ffff) as usize - 1
    }

    fn generation(self) -> u32 {
        (self.0.get() >> 32) as u32
    }

    /// Opaque bits used to pass the handle through the C ABI
    pub fn to_bits(self) -> u64 {
        self.0.get()
    }

    pub fn from_bits(bits: u64) -> Option<Self> {
        NonZeroU64::new(bits).map(Self)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}@{})", self.index(), self.generation())
    }
}

/// Token for an open handle scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleScope {
    id: u32,
}

/// Token for an open scope that may promote one handle to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapableHandleScope {
    id: u32,
}

impl HandleScope {
    pub fn to_bits(self) -> u32 {
        self.id
    }

    pub fn from_bits(id: u32) -> Self {
        Self { id }
    }
}

impl EscapableHandleScope {
    pub fn to_bits(self) -> u32 {
        self.id
    }

    pub fn from_bits(id: u32) -> Self {
        Self { id }
    }
}

/// Snapshot of the handle arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleStats {
    /// Handles currently attached to an open scope
    pub live: usize,
    /// Slots ever allocated; never exceeds the peak of concurrently live handles
    pub pooled: usize,
    pub open_scopes: usize,
}

struct Slot {
    value: JSValue,
    generation: u32,
    live: bool,
}

struct Frame {
    id: u32,
    handles: Vec<u32>,
    escapable: bool,
    escaped: bool,
}

pub(crate) struct HandleStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    frames: Vec<Frame>,
    spare: Vec<Vec<u32>>,
    next_id: u32,
    live: usize,
    released: Vec<JSValue>,
}

impl HandleStore {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            frames: Vec::new(),
            spare: Vec::new(),
            next_id: 1,
            live: 0,
            released: Vec::new(),
        }
    }

    fn open(&mut self, escapable: bool) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let handles = self.spare.pop().unwrap_or_default();
        self.frames.push(Frame {
            id,
            handles,
            escapable,
            escaped: false,
        });
        id
    }

    /// Pop the innermost frame, returning the engine values it owned
    fn close(&mut self, id: u32, escapable: bool) -> NapiResult<Vec<JSValue>> {
        match self.frames.last() {
            Some(top) if top.id == id && top.escapable == escapable => {}
            _ => return Err(Status::HandleScopeEmpty),
        }
        let Some(mut frame) = self.frames.pop() else {
            return Err(Status::HandleScopeEmpty);
        };

        let mut released = mem::take(&mut self.released);
        for index in frame.handles.drain(..) {
            let slot = &mut self.slots[index as usize];
            released.push(mem::replace(&mut slot.value, qjs::JS_UNDEFINED));
            slot.live = false;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
        }
        self.live -= released.len();
        self.spare.push(frame.handles);
        Ok(released)
    }

    fn recycle(&mut self, mut released: Vec<JSValue>) {
        released.clear();
        if self.released.capacity() < released.capacity() {
            self.released = released;
        }
    }

    fn push_at(&mut self, frame: usize, value: JSValue) -> NapiResult<Value> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|i| *i < u32::MAX)
                    .ok_or(Status::MemoryError)?;
                self.slots.push(Slot {
                    value: qjs::JS_UNDEFINED,
                    generation: 0,
                    live: false,
                });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.value = value;
        slot.live = true;
        let handle = Value::new(index, slot.generation);
        self.frames[frame].handles.push(index);
        self.live += 1;
        Ok(handle)
    }

    fn push(&mut self, value: JSValue) -> NapiResult<Value> {
        if self.frames.is_empty() {
            return Err(Status::HandleScopeEmpty);
        }
        self.push_at(self.frames.len() - 1, value)
    }

    pub(crate) fn get(&self, handle: Value) -> NapiResult<JSValue> {
        match self.slots.get(handle.index()) {
            Some(slot) if slot.live && slot.generation == handle.generation() => Ok(slot.value),
            _ => Err(Status::InvalidArg),
        }
    }

    /// Mark an escapable frame as used and return the index of its parent
    fn claim_escape(&mut self, id: u32) -> NapiResult<usize> {
        let position = self
            .frames
            .iter()
            .rposition(|frame| frame.id == id && frame.escapable)
            .ok_or(Status::InvalidArg)?;
        let frame = &mut self.frames[position];
        if frame.escaped {
            return Err(Status::EscapeCalledTwice);
        }
        if position == 0 {
            return Err(Status::HandleScopeEmpty);
        }
        frame.escaped = true;
        Ok(position - 1)
    }

    fn top(&self) -> Option<(u32, bool)> {
        self.frames.last().map(|frame| (frame.id, frame.escapable))
    }

    fn contains(&self, id: u32) -> bool {
        self.frames.iter().any(|frame| frame.id == id)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Close every frame, innermost first, for environment teardown
    pub(crate) fn drain_all(&mut self) -> Vec<JSValue> {
        let mut all = Vec::new();
        while let Some(top) = self.frames.last() {
            let (id, escapable) = (top.id, top.escapable);
            if let Ok(mut released) = self.close(id, escapable) {
                all.append(&mut released);
            }
        }
        all
    }

    fn stats(&self) -> HandleStats {
        HandleStats {
            live: self.live,
            pooled: self.slots.len(),
            open_scopes: self.frames.len(),
        }
    }
}

impl Env {
    pub fn open_handle_scope(&self) -> HandleScope {
        let id = self.handles.borrow_mut().open(false);
        trace!(scope = id, "handle scope opened");
        HandleScope { id }
    }

    /// Close a scope, releasing every handle it owns
    ///
    /// Only the innermost open scope can be closed; anything else is rejected and
    /// the scope stack is left untouched.
    pub fn close_handle_scope(&self, scope: HandleScope) -> NapiResult<()> {
        self.close_frame(scope.id, false)
    }

    pub fn open_escapable_handle_scope(&self) -> EscapableHandleScope {
        let id = self.handles.borrow_mut().open(true);
        trace!(scope = id, "escapable handle scope opened");
        EscapableHandleScope { id }
    }

    pub fn close_escapable_handle_scope(&self, scope: EscapableHandleScope) -> NapiResult<()> {
        self.close_frame(scope.id, true)
    }

    /// Promote `value` into the scope enclosing `scope`
    ///
    /// Allowed once per escapable scope.
    pub fn escape_handle(&self, scope: &EscapableHandleScope, value: Value) -> NapiResult<Value> {
        let ctx = self.core()?.ctx;
        let mut store = self.handles.borrow_mut();
        let raw = store.get(value)?;
        let parent = store.claim_escape(scope.id)?;
        // SAFETY: raw is live while its scope is open; duplicating runs no script
        let dup = unsafe { qjs::JS_DupValue(ctx, raw) };
        store.push_at(parent, dup)
    }

    /// Run `f` inside a fresh handle scope
    pub fn scope<R>(&self, f: impl FnOnce(&Env) -> R) -> R {
        let scope = self.open_handle_scope();
        let result = f(self);
        if let Err(status) = self.close_handle_scope(scope) {
            warn!(%status, "handle scope left open by nested code");
        }
        result
    }

    /// Close `scope` together with any scopes nested code left open inside it
    pub(crate) fn unwind_handle_scope(&self, scope: HandleScope) {
        loop {
            let top = self.handles.borrow().top();
            match top {
                Some((id, escapable)) if id == scope.id && !escapable => {
                    if let Err(status) = self.close_frame(id, false) {
                        warn!(scope = id, %status, "callback scope failed to close");
                    }
                    return;
                }
                Some((id, escapable)) if self.handles.borrow().contains(scope.id) => {
                    warn!(scope = id, "closing scope leaked by native callback");
                    if let Err(status) = self.close_frame(id, escapable) {
                        warn!(scope = id, %status, "leaked scope failed to close");
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.handles.borrow().stats()
    }

    fn close_frame(&self, id: u32, escapable: bool) -> NapiResult<()> {
        let closed = self.handles.borrow_mut().close(id, escapable);
        let released = match closed {
            Ok(released) => released,
            Err(status) => {
                warn!(scope = id, "handle scope closed out of order");
                return Err(status);
            }
        };
        trace!(scope = id, handles = released.len(), "handle scope closed");

        for value in &released {
            // SAFETY: each slot owned one reference; no borrow is held while freeing
            unsafe { qjs::JS_FreeValueRT(self.runtime.rt, *value) };
        }

        let outermost = {
            let mut store = self.handles.borrow_mut();
            store.recycle(released);
            store.depth() == 0
        };
        if outermost {
            self.drain_finalizers();
        }
        Ok(())
    }

    /// Attach an owned engine value to the innermost scope
    pub(crate) fn push(&self, value: Owned) -> NapiResult<Value> {
        let pushed = self.handles.borrow_mut().push(value.raw());
        match pushed {
            Ok(handle) => {
                value.into_raw();
                Ok(handle)
            }
            Err(status) => {
                drop(value);
                Err(status)
            }
        }
    }

    /// Attach a value that carries no reference count (numbers, booleans, null...)
    pub(crate) fn push_plain(&self, value: JSValue) -> NapiResult<Value> {
        self.handles.borrow_mut().push(value)
    }

    /// Borrow the engine value behind a handle
    pub(crate) fn raw(&self, handle: Value) -> NapiResult<JSValue> {
        self.handles.borrow().get(handle)
    }
}
