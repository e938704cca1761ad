mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{Config, PingResetPolicy, ServerConfig, SimulatedDeviceConfig, SimulationConfig};
pub use validation::warn_unknown_fields;
