//! Firmware protocol implementations
//!
//! Supported controllers:
//! - GRBL: line protocol with `ok`/`error:` acknowledgements and `<...>` status reports

pub mod grbl;
