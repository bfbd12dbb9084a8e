pub mod auth;
pub mod google;
pub mod init;
pub mod sharing;
