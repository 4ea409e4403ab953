//! Request-independent business logic, one service per flow.

pub mod accounts;
pub mod mailer;
pub mod password_reset;
pub mod sessions;

pub use accounts::{AccountService, UserView};
pub use mailer::{LogMailer, Mailer, MemoryMailer, OutgoingMail, SmtpMailer, mailer_from_config};
pub use password_reset::PasswordResetService;
