pub mod api;
pub mod auth;
pub mod config;
pub mod humanize;
pub mod manager;
pub mod observability;
pub mod queue;
pub mod resolver;
pub mod task;
pub mod worker;

pub use manager::DownloadManager;
pub use queue::{Dispatcher, ProgressEvent};
pub use task::{TaskId, TaskSnapshot, TaskStatus};
