// Application Layer - Use Cases

pub mod archival;
pub mod shutdown;

// Re-exports
pub use archival::{
    ArchivalConfig, ArchivalHandle, ArchivalPipeline, ArchivalScheduler, ArchivalState,
    CycleReport, MigrationOutcome, MigrationReport,
};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
