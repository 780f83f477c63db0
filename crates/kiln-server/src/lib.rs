//! Live preview server, file watching and task graph for kiln.
//!
//! The [`TaskGraph`] composes pipeline runs into named tasks. Its watch task
//! maps file changes to rebuilds, and every rebuild ends with a reload signal
//! broadcast to browsers connected to the [`DevServer`].

pub mod server;
pub mod tasks;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError};
pub use tasks::{default_subscriptions, Task, TaskError, TaskGraph, WatchSubscription, TASK_NAMES};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{ReloadHub, ReloadMessage};
