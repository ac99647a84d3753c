//! Configuration Module
//!
//! Configuration loading for the recorder service.

mod settings;

pub use settings::{
    CollectionSettings, ConfigError, Credentials, ExchangeSettings, RecorderConfig,
    ServerSettings, StoreSettings, TradeSettings,
};
