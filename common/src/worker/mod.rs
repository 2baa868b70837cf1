// Background worker framework and the workers this service runs

pub mod dependencies;
pub mod image_checker;
pub mod lifecycle;
pub mod manager;

pub use dependencies::Dependencies;
pub use lifecycle::{Worker, WorkerTask};
pub use manager::{registered_workers, WorkerManager};
