//! 仿真核心模块
//!
//! 此模块包含事件驱动仿真的核心组件，如仿真时间、事件、一次性信号、世界和仿真器。

// 子模块声明
mod event;
mod scheduled_event;
mod signal;
mod simulator;
mod time;
mod world;

// 重新导出公共接口
pub use event::Event;
pub use scheduled_event::ScheduledEvent;
pub use signal::{SignalId, SignalValue, Waiter};
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;
