// Common helpers shared across the proxy module
pub mod utils;
