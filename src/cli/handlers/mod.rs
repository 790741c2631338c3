//! Command handlers, one per subcommand.

pub mod migrate;
pub mod serve;
pub mod worker;

pub use migrate::MigrateCommandHandler;
pub use serve::ServeCommandHandler;
pub use worker::WorkerCommandHandler;
