//! Engine configuration

pub mod null_handling;
pub mod settings;

pub use null_handling::NullConfig;
pub use settings::SessionSettings;
