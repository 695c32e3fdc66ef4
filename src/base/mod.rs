//! Base types shared across the transport core.
//!
//! - [`error::NetError`]: network error taxonomy with transient/fatal
//!   classification
//! - [`ring::RingBuffer`]: bounded overwrite-oldest history container
//! - [`timer::TimerService`]: cooperative timer list polled by the dispatch
//!   tick

pub mod error;
pub mod ring;
pub mod timer;
