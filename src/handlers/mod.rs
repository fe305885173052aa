// handlers/mod.rs - Route handlers
//
// Only the elevated tier exists: every route here is an administrative
// operation under /api/root/*. Routing and shared state live in app.rs.
pub mod elevated;

pub use elevated::*;
