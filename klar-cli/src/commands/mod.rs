//! CLI command implementations

pub mod report;
pub mod scan;

pub use scan::scan;
