// handlers/elevated/mod.rs - Elevated handlers
//
// Administrative endpoints under /api/root/*. Access control is expected
// in front of this service; the handlers only honor the purge kill switch.

pub mod root;

pub use root::*;
