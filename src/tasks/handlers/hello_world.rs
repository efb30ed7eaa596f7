use crate::tasks::{TaskContext, TaskHandler, TaskOutcome, TaskParams};

pub const ALIAS: &str = "HelloWorldTask";

pub struct HelloWorldTask;

impl TaskHandler for HelloWorldTask {
    fn alias(&self) -> &'static str {
        ALIAS
    }

    fn title(&self) -> &'static str {
        "Hello World"
    }

    fn description(&self) -> &'static str {
        "Say hello world"
    }

    fn handle(&self, ctx: &mut TaskContext) -> TaskOutcome {
        if self.enqueue_if_requested(ctx, TaskParams::new()) {
            return TaskOutcome::Succeeded;
        }

        ctx.log_info("Hello World!");
        TaskOutcome::Succeeded
    }
}
