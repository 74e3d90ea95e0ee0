//! Application Services
//!
//! Services that drive the domain on a schedule and route its output.
//!
//! - `Poller`: pulls batches on a fixed cadence and owns the session table
//! - `ViewController`: lazy chart construction, forwarding, and teardown

mod poller;
mod view_controller;

pub use poller::{Poller, PollerEvent, PollerState, SessionStats};
pub use view_controller::{StreamStatus, ViewController};
