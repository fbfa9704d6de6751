pub mod api;
pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod logging;
pub mod member;
pub mod metrics;
pub mod storage;
pub mod sync;
pub mod validation;
pub mod wrapper;
pub mod xml;

pub use api::{Credentials, NeoApi, NeoClient};
pub use config::NeoConfig;
pub use error::{NeoError, Result};
pub use member::{Member, Snapshot};
pub use sync::ConsumerSync;
