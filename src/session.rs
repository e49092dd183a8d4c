//! Keys stored in the cookie session.

pub const USER_ID: &str = "user_id";
