pub mod engine;
pub mod expander;
pub mod exporter;
pub mod poller;
pub mod trigger;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::domain::model::{ParameterSet, QuerySpec};
pub use crate::domain::ports::{ConfigProvider, RefreshApi, Storage};
pub use crate::utils::error::Result;
