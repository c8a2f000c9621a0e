//! OBEX transaction engine.
//!
//! The transport layer feeds `(event, command, object)` tuples into
//! [`dispatch`]; the dispatcher authorizes and routes them to one command
//! handler per OBEX command, and the handler leaves its answer in the
//! session's [`Response`]. One [`Session`] exists per connection and is
//! owned by exactly one thread, so nothing here locks.
//!
//! Lifecycle of a request, as seen by a handler:
//!
//! ```text
//! RequestHint ─▶ [StreamAvailable]* ─▶ Request ─▶ [StreamEmpty]* ─▶ RequestComplete
//!       └──────────────── Abort / LinkError / ParseError ─────────────────┘
//! ```

mod config;
mod dispatch;
mod event;
mod handler;
mod session;

pub use config::{AccessControl, AllowList, DEFAULT_MTU, EngineConfig, Services, SessionIds};
pub use dispatch::dispatch;
pub use event::{Event, Object};
pub use session::{Response, Session, Target};
