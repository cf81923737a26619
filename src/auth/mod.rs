//! Authentication: session lifecycle and invalidation detectors

pub mod detector;
pub mod session;

pub use detector::{is_double_session, is_login_page};
pub use session::{extract_session_token, AuthMode, SessionManager};
