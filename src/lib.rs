//! Checkpoint service lifecycle library
//!
//! Installs, controls, inspects and removes checkpoint's background jobs
//! (file watchers, hourly backup runners, health watchdogs) on whichever
//! per-user service manager the host has: launchd, systemd or cron.
//!
//! ```no_run
//! use checkpoint_service::{ManagerConfig, ServiceDescriptor, ServiceManager, ServiceType};
//!
//! # fn main() -> checkpoint_service::Result<()> {
//! let manager = ServiceManager::new(ManagerConfig::load(None)?)?;
//! manager.install(&ServiceDescriptor::new(
//!     "myproj-watcher",
//!     "/opt/checkpoint/bin/checkpoint-watch",
//!     "/home/dev/myproj",
//!     "myproj",
//!     ServiceType::Watcher,
//! ))?;
//! assert!(manager.status("myproj-watcher")?.is_running());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod detection;
pub mod error;
mod file_ops;
pub mod identity;
pub mod manager;
pub mod runner;
pub mod service;
pub mod template;

pub use config::ManagerConfig;
pub use control::{Driver, DriverContext};
pub use detection::{BackendDetector, BackendKind, HostProbe, detect};
pub use error::{Result, ServiceError};
pub use identity::parse_service_name;
pub use manager::ServiceManager;
pub use runner::{CommandOutput, CommandRunner, SystemRunner, ToolCommand};
pub use service::{ServiceDescriptor, ServiceStatus, ServiceType};
pub use template::{TemplateEngine, TemplateError};
