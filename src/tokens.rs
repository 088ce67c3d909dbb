//! Reference counters and the linear tokens they mint.
//!
//! A token is a zero-sized proof that one reference was registered with a
//! particular counter. Dropping a token panics; the only valid way to dispose
//! of it is to return it through `RefCount::put`. This keeps every increment
//! paired with exactly one decrement even though handles count through
//! `Clone`/`Drop`.

use core::cell::Cell;
use core::marker::PhantomData;

/// Linear proof of one registered reference.
#[must_use = "a Token must be returned through RefCount::put"]
pub(crate) struct Token {
    // !Send + !Sync, same as the counters it comes from.
    _nosend: PhantomData<*mut ()>,
}

impl Token {
    #[inline]
    fn new() -> Self {
        Self {
            _nosend: PhantomData,
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        // A panic elsewhere already unwinds through the owner; a second
        // panic here would abort the process.
        if !std::thread::panicking() {
            panic!("Token dropped without RefCount::put");
        }
    }
}

/// Single-threaded per-entry reference counter.
///
/// Counting only needs `&self`, so references can be registered and released
/// while the surrounding storage is shared-borrowed.
#[derive(Debug, Default)]
pub(crate) struct RefCount {
    count: Cell<usize>,
}

impl RefCount {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }

    /// Register one reference.
    #[inline]
    pub(crate) fn get(&self) -> Token {
        let n = self.count.get().wrapping_add(1);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
        self.count.set(n);
        Token::new()
    }

    /// Return a previously registered reference. True if the count is now zero.
    #[inline]
    pub(crate) fn put(&self, t: Token) -> bool {
        let c = self.count.get();
        assert!(c > 0, "RefCount underflow");
        self.count.set(c - 1);
        core::mem::forget(t);
        c == 1
    }
}
