pub mod lock_manager;
pub mod resource;

pub use lock_manager::LockManager;
pub use resource::Resource;
