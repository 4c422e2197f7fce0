pub mod config;
pub mod resource_manager;
pub mod structs;
pub mod systems;
pub mod util;

pub use config::EngineConfig;
pub use resource_manager::ResourceManager;
pub use systems::*;
