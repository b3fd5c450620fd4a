//! Session: a named container for one coordinated batch of runner
//! invocations, backed by a single on-disk directory of logs.

pub mod meta;
pub mod session;

pub use meta::SessionMeta;
pub use session::Session;
