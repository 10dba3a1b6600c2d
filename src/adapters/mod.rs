// Adapters layer: concrete implementations of the domain ports (state file, directory, orchestrator).

pub mod directory;
pub mod orchestrator;
pub mod storage;

pub use directory::ScimDirectoryClient;
pub use orchestrator::BoshDirectorClient;
pub use storage::StateStore;
