//! Strong and weak references
//!
//! A reference with a positive count owns one engine reference to its value. At
//! count zero an object is only observed, through an engine `WeakRef` owned by the
//! slot: the engine empties it when that exact object is freed, whatever its kind
//! (Proxy, frozen, sealed). Primitives cannot be collected early, so a weak
//! primitive just keeps its value.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::engine::{self, JSRuntime, JSValue, Owned, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::scope::Value;

/// Caller-managed binding to an engine value, independent of handle scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference(usize);

impl Reference {
    /// Non-zero bits used to pass the reference through the C ABI
    pub fn to_bits(self) -> usize {
        self.0 + 1
    }

    pub fn from_bits(bits: usize) -> Option<Self> {
        bits.checked_sub(1).map(Self)
    }
}

/// What a slot holds; every variant but `Cleared` owns one engine reference
pub(crate) enum Link {
    Strong(JSValue),
    /// Owned primitive; it cannot be collected out from under the reference
    Primitive(JSValue),
    /// Owned `WeakRef` to the object
    Weak(JSValue),
    Cleared,
}

pub(crate) struct RefSlot {
    count: Cell<u32>,
    link: RefCell<Link>,
}

impl RefSlot {
    /// Release whatever the slot owns; used by `delete_reference` and teardown
    pub(crate) fn release(&self, rt: *mut JSRuntime) {
        match self.link.replace(Link::Cleared) {
            Link::Strong(value) | Link::Primitive(value) | Link::Weak(value) => {
                // SAFETY: the slot owned this reference; no borrow is held
                unsafe { qjs::JS_FreeValueRT(rt, value) };
            }
            Link::Cleared => {}
        }
    }
}

impl Env {
    fn slot(&self, reference: Reference) -> NapiResult<Rc<RefSlot>> {
        self.references
            .borrow()
            .get(reference.0)
            .cloned()
            .ok_or(Status::InvalidArg)
    }

    /// Weak link for `value`, which is dup'd when it is a primitive
    ///
    /// # Safety
    /// `value` must be live in `core.ctx`.
    unsafe fn weak_link(&self, core: Core, value: JSValue) -> NapiResult<Link> {
        // SAFETY: forwarded from the caller
        unsafe {
            if !engine::is_object(value) {
                return Ok(Link::Primitive(qjs::JS_DupValue(core.ctx, value)));
            }
            let weak = engine::call(core.ctx, core.helpers.make_weak_ref, qjs::JS_UNDEFINED, &[value])?;
            Ok(Link::Weak(weak.into_raw()))
        }
    }

    /// Target of a `WeakRef`, `None` once the object has been freed
    ///
    /// # Safety
    /// `weak` must be a live `WeakRef` of `core.ctx`.
    unsafe fn deref_weak(&self, core: Core, weak: JSValue) -> NapiResult<Option<Owned>> {
        // SAFETY: forwarded from the caller
        let target = unsafe { engine::call(core.ctx, core.helpers.deref_weak, qjs::JS_UNDEFINED, &[weak])? };
        Ok((!engine::is_undefined(target.raw())).then_some(target))
    }

    /// Create a reference starting at `initial_count`
    ///
    /// A count of zero makes the reference weak from the start.
    pub fn create_reference(&self, value: Value, initial_count: u32) -> NapiResult<Reference> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        let link = if initial_count > 0 {
            // SAFETY: raw is live while its handle is
            Link::Strong(unsafe { qjs::JS_DupValue(core.ctx, raw) })
        } else {
            // SAFETY: raw is live while its handle is
            unsafe { self.weak_link(core, raw)? }
        };
        let slot = Rc::new(RefSlot {
            count: Cell::new(initial_count),
            link: RefCell::new(link),
        });

        let key = self.references.borrow_mut().insert(slot);
        trace!(reference = key, count = initial_count, "reference created");
        Ok(Reference(key))
    }

    pub fn delete_reference(&self, reference: Reference) -> NapiResult<()> {
        let slot = self
            .references
            .borrow_mut()
            .try_remove(reference.0)
            .ok_or(Status::InvalidArg)?;
        slot.release(self.runtime.rt);
        trace!(reference = reference.0, "reference deleted");
        Ok(())
    }

    /// Increment the count, taking strong ownership on the 0 -> 1 transition
    ///
    /// A weak reference whose object is already gone stays empty.
    pub fn reference_ref(&self, reference: Reference) -> NapiResult<u32> {
        let core = self.core()?;
        let slot = self.slot(reference)?;
        let count = slot.count.get().checked_add(1).ok_or(Status::GenericFailure)?;
        if count == 1 {
            let link = match slot.link.replace(Link::Cleared) {
                Link::Weak(weak) => {
                    // SAFETY: the slot owned the WeakRef; it is released once read
                    let target = unsafe {
                        let target = self.deref_weak(core, weak);
                        qjs::JS_FreeValue(core.ctx, weak);
                        target?
                    };
                    target.map_or(Link::Cleared, |target| Link::Strong(target.into_raw()))
                }
                Link::Primitive(value) => Link::Strong(value),
                other => other,
            };
            slot.link.replace(link);
            trace!(reference = reference.0, "reference promoted to strong");
        }
        slot.count.set(count);
        Ok(count)
    }

    /// Decrement the count, dropping to a weak observation on the 1 -> 0 transition
    pub fn reference_unref(&self, reference: Reference) -> NapiResult<u32> {
        let core = self.core()?;
        let slot = self.slot(reference)?;
        let count = slot.count.get();
        if count == 0 {
            return Err(Status::GenericFailure);
        }
        if count > 1 {
            slot.count.set(count - 1);
            return Ok(count - 1);
        }

        let strong = match &*slot.link.borrow() {
            Link::Strong(value) => Some(*value),
            _ => None,
        };
        if let Some(value) = strong {
            if engine::is_object(value) {
                // SAFETY: the strong link keeps the object alive while the WeakRef is made
                let weak = unsafe { self.weak_link(core, value)? };
                slot.link.replace(weak);
                // Freeing may collect the object, which empties the new WeakRef
                // SAFETY: the strong link owned this reference
                unsafe { qjs::JS_FreeValue(core.ctx, value) };
            } else {
                slot.link.replace(Link::Primitive(value));
            }
        }
        slot.count.set(0);
        trace!(reference = reference.0, "reference demoted to weak");
        Ok(0)
    }

    /// Current value, or `None` once a weak reference's object has been collected
    pub fn get_reference_value(&self, reference: Reference) -> NapiResult<Option<Value>> {
        let core = self.core()?;
        let slot = self.slot(reference)?;
        let value = match &*slot.link.borrow() {
            // SAFETY: the slot owns the value
            Link::Strong(value) | Link::Primitive(value) => Some(unsafe { Owned::dup(core.ctx, *value) }),
            // SAFETY: the slot owns the WeakRef
            Link::Weak(weak) => unsafe { self.deref_weak(core, *weak)? },
            Link::Cleared => None,
        };
        value.map(|value| self.push(value)).transpose()
    }

    pub fn reference_count(&self, reference: Reference) -> NapiResult<u32> {
        Ok(self.slot(reference)?.count.get())
    }

    pub fn live_references(&self) -> usize {
        self.references.borrow().len()
    }
}
