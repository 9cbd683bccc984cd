pub mod device;
pub mod queue;
