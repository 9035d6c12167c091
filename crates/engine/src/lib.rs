pub mod backend;
pub mod bible;
pub mod config;
pub mod error;
pub mod progress;
pub mod session;

pub use backend::{Backend, BackendError, HttpBackend};
pub use error::{RejectReason, SessionError};
pub use session::{open_session, SessionHandle};
