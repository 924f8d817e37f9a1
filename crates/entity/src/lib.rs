pub mod company;
pub mod credential;
pub mod password_reset;
pub mod user;
pub mod user_identity;
pub mod user_secret;
