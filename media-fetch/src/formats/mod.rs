//! Format discovery: ranking the streams a source offers.

pub mod resolver;

pub use resolver::{MANIFEST_ONLY_PROTOCOLS, fixed_formats, resolve_formats};
