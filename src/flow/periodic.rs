//! 周期回调

use tracing::{trace, warn};

use super::flow_world::flow_world;
use crate::error::SimError;
use crate::sim::{Event, SimTime, Simulator, World};

/// 事件：触发一次周期回调并调度下一次
#[derive(Debug)]
pub(crate) struct PeriodicTick {
    pub(crate) label: String,
    pub(crate) interval: SimTime,
}

impl Event for PeriodicTick {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let w = flow_world(world);
        trace!(label = %self.label, now = ?sim.now(), "周期回调");
        match w.with_coordinator(sim.now(), |c, ctx| c.on_periodic(&self.label, ctx)) {
            Some(Err(e)) if !matches!(e, SimError::Protocol { .. }) => {
                warn!(label = %self.label, error = %e, "周期回调出错")
            }
            _ => {}
        }
        let interval = self.interval;
        sim.schedule_in(interval, *self);
    }
}
