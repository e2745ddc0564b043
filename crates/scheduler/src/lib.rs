//! Cooperative scheduling primitives for the annotation editor.
//!
//! The editor runs on a single event loop. Long operations (export) poll a
//! [`CancellationToken`] at safe boundaries, and deferred UI transitions
//! (note auto-collapse) are queued in a [`DelayQueue`] that the host fires
//! from its tick.
//!
//! # Example
//!
//! ```
//! use pdf_annotator_scheduler::DelayQueue;
//! use std::time::{Duration, Instant};
//!
//! let start = Instant::now();
//! let mut queue = DelayQueue::new();
//! queue.schedule("collapse-note", start + Duration::from_secs(2));
//!
//! assert!(queue.pop_due(start).is_empty());
//! assert_eq!(queue.pop_due(start + Duration::from_secs(3)), vec!["collapse-note"]);
//! ```

pub mod cancel;
pub mod delay;

pub use cancel::CancellationToken;
pub use delay::DelayQueue;
