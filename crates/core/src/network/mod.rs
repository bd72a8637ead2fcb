//! Connectivity monitoring

pub mod debounce;
pub mod errors;
pub mod monitor;
pub mod ports;
pub mod provider;

pub use debounce::{Debouncer, NetworkEvent};
pub use errors::MonitorError;
pub use monitor::NetworkMonitor;
pub use ports::{NetworkStatusProvider, SyncTrigger};
pub use provider::WatchNetworkProvider;
