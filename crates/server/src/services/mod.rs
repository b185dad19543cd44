pub mod accounts;
pub mod activity;
pub mod archive;
pub mod mailer;
pub mod publisher;
pub mod storage;
pub mod tokens;
