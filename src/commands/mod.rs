pub mod carryover;
pub mod compare;
pub mod create;
pub mod escalate;
pub mod export;
pub mod init;
pub mod list;
pub mod meeting;
pub mod note;
pub mod show;
pub mod status;
