pub mod input;
pub mod session;

pub use input::Input;
pub use session::{CurrentUser, SESSION_COOKIE, clear_session_cookie, session_cookie};
