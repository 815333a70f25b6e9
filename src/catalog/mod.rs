//! Built-in upgrade step sources
//!
//! Upgrade steps are authored outside the engine. A catalog packages a set of
//! them behind the [`UpgradeSource`](crate::migrate::UpgradeSource) trait so
//! the CLI and library users can build a `StepRegistry` from it.

mod calendar;

pub use calendar::{CalendarStoreCatalog, CALENDAR_STORE_LATEST};
