//! Platform surface the tracker runs against: page storage, idle scheduling
//! and the window.
//!
//! Each surface is a trait with a deterministic in-process implementation so
//! the tracker can be driven outside a browser and in tests.

pub mod idle;
pub mod storage;
pub mod window;

pub use idle::{IdleHandle, IdleQueue, IdleScheduler, TimeoutScheduler};
pub use storage::{JsonFileStorage, MemoryStorage, PageStorage};
pub use window::{RecordingWindow, Window, WindowLog};
