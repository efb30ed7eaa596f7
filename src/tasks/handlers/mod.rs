pub mod blind_index_rebuild;
pub mod clean_up;
pub mod hello_world;
pub mod stats_visitor_enhance;

pub use blind_index_rebuild::BlindIndexRebuildTask;
pub use clean_up::CleanUpTask;
pub use hello_world::HelloWorldTask;
pub use stats_visitor_enhance::StatsVisitorEnhanceTask;

use super::{TaskError, TaskRegistry};

/// Register every built-in handler.
///
/// Handlers are registered whether or not their stores are configured; a missing
/// store is reported in the task log when the handler runs.
pub fn register_tasks(registry: &mut TaskRegistry) -> Result<(), TaskError> {
    registry.register(|| Box::new(BlindIndexRebuildTask))?;
    registry.register(|| Box::new(CleanUpTask))?;
    registry.register(|| Box::new(HelloWorldTask))?;
    registry.register(|| Box::new(StatsVisitorEnhanceTask))?;
    Ok(())
}
