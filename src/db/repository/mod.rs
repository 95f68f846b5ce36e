pub mod device_repository;
pub mod preferences_repository;
pub mod queue_repository;
pub mod record_repository;

pub use device_repository::DeviceRepository;
pub use preferences_repository::PreferencesRepository;
pub use queue_repository::{QueueRepository, QueueScope};
pub use record_repository::RecordRepository;
