#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! The expiry subsystem (spec §4.4): the 4-ary deadline heap, the mailbox
//! that decouples external threads from it, the background thread that
//! drains both, and the touch-policy/event-callback helpers that ride
//! along with it.

pub mod clock;
pub mod engine;
pub mod events;
pub mod heap;
pub mod mailbox;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ExpiryEngine, ReaperFn};
pub use events::{EventList, ExpiryEvent};
pub use heap::{ExpiryHeap, key_from_deadline};
pub use mailbox::{Mail, MailOp, Mailbox};
