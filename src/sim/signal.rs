//! 一次性信号
//!
//! 任务可以挂起在某个信号上，直到其他代码以一个值触发（succeed）它。
//! 每个信号只触发一次、只有一个等待者；触发后等待者在当前时刻按 FIFO 顺序恢复。

use super::event::Event;
use super::simulator::Simulator;
use super::world::World;
use std::any::Any;

/// 信号标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub u64);

/// 信号携带的值（由等待者自行 downcast）
pub type SignalValue = Box<dyn Any + Send>;

/// 挂起在信号上的续体
pub trait Waiter: Send + 'static {
    fn wake(self: Box<Self>, value: SignalValue, sim: &mut Simulator, world: &mut dyn World);
}

pub(crate) enum SignalSlot {
    /// 尚未触发；可能已有等待者
    Pending(Option<Box<dyn Waiter>>),
    /// 已触发但还没有等待者取走值
    Fired(SignalValue),
}

/// 事件：在触发时刻唤醒等待者。
pub(crate) struct WakeWaiter {
    pub(crate) waiter: Box<dyn Waiter>,
    pub(crate) value: SignalValue,
}

impl Event for WakeWaiter {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let WakeWaiter { waiter, value } = *self;
        waiter.wake(value, sim, world);
    }
}
