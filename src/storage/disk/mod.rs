mod disk_manager;
mod disk_manager_memory;
mod disk_scheduler;

pub use disk_manager::*;
pub use disk_manager_memory::*;
pub use disk_scheduler::*;
