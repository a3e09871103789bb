//! Keeps tile renderer panics off stderr.
//!
//! Panics raised inside a tile pass are caught and reported through the
//! pass's [`FailureThrottle`](crate::FailureThrottle). The process-wide hook
//! installed here skips those and chains to the previous hook for every other
//! panic.

use std::cell::{Cell, RefCell};
use std::panic::{self, PanicHookInfo};
use std::sync::Once;

static INSTALL_HOOK: Once = Once::new();

thread_local! {
    static SILENCED: Cell<bool> = const { Cell::new(false) };
    static LAST_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            if SILENCED.with(Cell::get) {
                let location = info
                    .location()
                    .map(|location| format!("{}:{}", location.file(), location.line()));
                LAST_LOCATION.with(|slot| *slot.borrow_mut() = location);
                return;
            }
            previous(info);
        }));
    });
}

/// Silences panic output on the current thread until dropped.
pub(crate) struct SilencedPanics {
    previous: bool,
}

impl SilencedPanics {
    pub(crate) fn enter() -> Self {
        install_hook();
        LAST_LOCATION.with(|slot| slot.borrow_mut().take());
        Self {
            previous: SILENCED.with(|flag| flag.replace(true)),
        }
    }

    /// Source location of the last panic silenced on this thread.
    pub(crate) fn take_location(&self) -> Option<String> {
        LAST_LOCATION.with(|slot| slot.borrow_mut().take())
    }
}

impl Drop for SilencedPanics {
    fn drop(&mut self) {
        SILENCED.with(|flag| flag.set(self.previous));
    }
}

#[cfg(test)]
pub(crate) fn panics_silenced() -> bool {
    SILENCED.with(Cell::get)
}
