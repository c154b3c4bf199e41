pub mod intensity;
pub mod mqtt;
pub mod reporter;
pub mod scheduler;
pub mod settings;
pub mod sink;
pub mod source;
