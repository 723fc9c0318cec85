// Reuse pools for per-probe message objects
//
// Every probe step needs a Request, a Response and a scratch buffer for the
// raw wire text. Under a few hundred concurrent rule executions that is a lot
// of short-lived allocations, so they are recycled through free lists.
//
// Ownership:
//   Pool::acquire() -> Pooled<T>   (exclusive owner, Deref to T)
//   drop(Pooled<T>)                (reset + returned to the free list, once)
//
// A Pooled<T> is moved, never copied, so nothing can observe the object after
// it went back to the pool.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{Request, Response};

/// Objects that can be wiped and handed out again.
pub trait Recycle: Default {
    /// Clear every field. Keeps allocations where it can.
    fn reset(&mut self);
}

struct Shared<T> {
    free: Mutex<Vec<Box<T>>>,
    max_idle: usize,
}

impl<T> Shared<T> {
    fn free_list(&self) -> MutexGuard<'_, Vec<Box<T>>> {
        // a panic while holding the lock cannot leave a half-reset object
        // behind: objects are reset before the lock is taken
        match self.free.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A thread-safe free list of `T`.
pub struct Pool<T: Recycle> {
    shared: Arc<Shared<T>>,
}

impl<T: Recycle> Pool<T> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                free: Mutex::new(Vec::new()),
                max_idle,
            }),
        }
    }

    /// Take an empty object, reusing an idle one when available.
    pub fn acquire(&self) -> Pooled<T> {
        let obj = self.shared.free_list().pop().unwrap_or_default();
        Pooled {
            obj: Some(obj),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Explicit release; equivalent to dropping the handle.
    pub fn release(&self, obj: Pooled<T>) {
        drop(obj);
    }

    /// Number of idle objects waiting for reuse.
    pub fn idle(&self) -> usize {
        self.shared.free_list().len()
    }
}

impl<T: Recycle> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Recycle> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("max_idle", &self.shared.max_idle)
            .finish()
    }
}

/// Exclusive handle to a pooled object. Returns it to the pool on drop.
pub struct Pooled<T: Recycle> {
    obj: Option<Box<T>>,
    shared: Arc<Shared<T>>,
}

impl<T: Recycle> Pooled<T> {
    /// Detach the object from the pool; it will not be recycled.
    pub fn into_inner(mut self) -> T {
        match self.obj.take() {
            Some(obj) => *obj,
            None => T::default(),
        }
    }
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // only None after into_inner/drop, both of which consume self
        self.obj.as_deref().expect("pooled object already released")
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.obj
            .as_deref_mut()
            .expect("pooled object already released")
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(mut obj) = self.obj.take() {
            obj.reset();
            let mut free = self.shared.free_list();
            if free.len() < self.shared.max_idle {
                free.push(obj);
            }
        }
    }
}

/// Scratch buffer for rendering raw wire text.
#[derive(Debug, Default)]
pub struct RawText {
    pub head: String,
    pub body: String,
}

impl RawText {
    /// Header block, blank line, body.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.head.len() + self.body.len() + 2);
        out.push_str(&self.head);
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

impl Recycle for RawText {
    fn reset(&mut self) {
        self.head.clear();
        self.body.clear();
    }
}

/// The three pools a scan needs, shared by every worker.
#[derive(Debug, Clone)]
pub struct MessagePool {
    pub requests: Pool<Request>,
    pub responses: Pool<Response>,
    pub scratch: Pool<RawText>,
}

impl MessagePool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            requests: Pool::new(max_idle),
            responses: Pool::new(max_idle),
            scratch: Pool::new(max_idle),
        }
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        MessagePool::new(256)
    }
}
