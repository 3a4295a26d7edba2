//! ssoward: single sign-on coordination for a family of partner applications.
//!
//! A user logs in once against an ordered chain of credential stores; the resulting global
//! session is shared with partner apps through single-use tickets, and ending the session
//! anywhere ends it everywhere.

pub mod error;
pub mod config;
pub mod identity;
pub mod event;
pub mod session;
pub mod agent;
pub mod gateway;
pub mod server;

// Test-only printing helper: expands to eprintln! in tests and debug builds, absent otherwise.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
