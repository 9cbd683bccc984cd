pub mod barrier;
pub mod command_recorder;
pub mod rendering_info;
pub mod submit_info;
