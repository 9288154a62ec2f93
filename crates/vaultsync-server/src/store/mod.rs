pub mod files;
pub mod model;

pub use files::{valid_name, Store};
pub use model::{BackupInfo, ConfigRecord, DeviceInfo};
