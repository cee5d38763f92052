//! Built-in stage actions and probes.

pub mod await_ready;
pub mod fs;
pub mod http;
pub mod process;

pub use await_ready::AwaitReadyAction;
pub use fs::{DirExistsProbe, EnsureDirAction, RemoveDirAction};
pub use http::{CreateClientAction, HttpProbe};
pub use process::{ProcessAction, ProcessProbe};
