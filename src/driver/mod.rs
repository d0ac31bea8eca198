//! Browser automation module for replaying case plans.
//!
//! This module drives a headless browser through a case's scripted actions
//! using Playwright via Node.js, waits for the page to go quiet, and writes
//! the resulting screenshot.
//!
//! # Module Structure
//!
//! - [`session`] - Page session management with concurrency control
//! - [`script`] - The inline driver script, wire types and availability checks
//!
//! # Example
//!
//! ```no_run
//! use vrt_lib::{CasePlan, CaptureTarget, DriverOptions, PageDriver};
//!
//! # async fn example() -> vrt_lib::Result<()> {
//! let driver = PageDriver::new(DriverOptions::default());
//! let plan = CasePlan {
//!     name: "loaded".to_string(),
//!     attempt: 1,
//!     actions: Vec::new(),
//!     capture: CaptureTarget::viewport(),
//!     capture_path: "out/loaded/attempt-1/capture.png".into(),
//! };
//! let outcome = driver.run_case(&plan).await?;
//! println!("captured {}x{}", outcome.width, outcome.height);
//! # Ok(())
//! # }
//! ```

mod script;
mod session;

pub use script::StepTiming;
// Re-export public types from session
pub use session::{
    CasePlan, DriveOutcome, DriverOptions, PageDriver, DEFAULT_NAVIGATION_TIMEOUT,
    DEFAULT_PROCESS_TIMEOUT, DEFAULT_STEP_TIMEOUT,
};
