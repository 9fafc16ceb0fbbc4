pub mod clear;
pub mod info;
pub mod push;
pub mod schedule;
pub mod size;
pub mod work;

use anyhow::Result;
use std::sync::Arc;

use mailflow_queue::{QueueBackend, QueueManager};

/// Backend for `--connection`, or the configured default
pub(crate) async fn backend(
    manager: &QueueManager,
    connection: Option<&str>,
) -> Result<Arc<dyn QueueBackend>> {
    let name = connection.unwrap_or(manager.default_connection());
    Ok(manager.driver(name).await?)
}
