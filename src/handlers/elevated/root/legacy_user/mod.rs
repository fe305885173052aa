// handlers/elevated/root/legacy_user/mod.rs - Legacy user purge handlers
//
// Both endpoints run the same cascading delete; preview rolls it back.

pub mod delete;  // DELETE /api/root/legacy-user/:id
pub mod preview; // GET /api/root/legacy-user/:id/preview

pub use delete::legacy_user_delete;
pub use preview::legacy_user_preview;
