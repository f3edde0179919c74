mod error;
pub use error::{ExecError, ExecResult};

mod util;

pub mod config;
pub use config::WorkerArgs;

pub mod launcher;
pub use launcher::{EmbeddedLauncher, Launcher, WorkerCommand, WorkerExit, WorkerProcess};

pub mod runner;
pub use runner::{PolicyRunner, RunnerSettings};

