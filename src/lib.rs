pub mod analysis;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod expand;
pub mod model;
pub mod monitor;
pub mod project;
pub mod routes;
pub mod rpc;
pub mod scan;
pub mod store;
pub mod syntax;
pub mod tsconfig;
pub mod util;
pub mod watch;

pub use bridge::{BridgeMode, CompilerServiceBridge};
pub use error::{EngineError, EngineResult};
pub use expand::{CancellationToken, ContextExpander, ExpandOptions};
pub use monitor::{MonitorEvent, RoutesMonitor};
pub use project::{Project, expand_function};
pub use store::FileVersionStore;
