//! Session-domain models: the sealed token record, its read-only projection, and freshness rules.

pub mod identity;
pub mod record;
pub mod secret;
pub mod state;

pub use identity::*;
pub use record::*;
pub use secret::*;
pub use state::*;
