//! Authentication: local username + password accounts and session binding.

mod password;
mod session;

pub use password::{check_password, hash_password, verify_password, MIN_PASSWORD_LEN};
pub use session::{session_user_id, start_session, CurrentUser, SESSION_USER_ID_KEY};
