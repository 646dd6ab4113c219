pub mod sim;

pub use sim::bus::{dispatch, BusHandler, EventBus, SubscriptionId};
pub use sim::clock::{ScheduledTask, Scheduler, SimClock};
pub use sim::loop_runner::{plan_steps, FixedStepLoop, StepConfig, StepPlan};
pub use sim::scene::{
    CountingSink, DrawLayer, DrawSink, EntityId, NodeSpec, SceneError, SceneGraph, SceneNode, Vec2,
};
pub use sim::spatial::{nearest_in_box, RangeBox};
pub use sim::stats::{LoopStatsAccumulator, LoopStatsSnapshot};
