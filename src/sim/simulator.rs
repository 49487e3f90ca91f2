//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间、事件队列与一次性信号。

use super::event::Event;
use super::scheduled_event::ScheduledEvent;
use super::signal::{SignalId, SignalSlot, SignalValue, WakeWaiter, Waiter};
use super::time::SimTime;
use super::world::World;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, info, trace, warn};

/// 事件驱动仿真器：维护当前时间与事件队列。
///
/// 单线程协作式调度：队列按 `(时间, 序列号)` 排序，同一时刻按入队顺序执行；
/// 时钟只会前进。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
    next_signal: u64,
    signals: HashMap<SignalId, SignalSlot>,
    executed: u64,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 已执行的事件数量
    pub fn executed_events(&self) -> u64 {
        self.executed
    }

    /// 队列中待执行的事件数量
    pub fn pending_events(&self) -> usize {
        self.q.len()
    }

    /// 下一个事件的时间（队列为空时为 None）
    pub fn peek_time(&self) -> Option<SimTime> {
        self.q.peek().map(|e| e.at)
    }

    /// 调度事件在指定时间执行；早于当前时间的请求会被钳到 `now`。
    #[tracing::instrument(level = "trace", skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) {
        self.push(at, Box::new(ev));
    }

    /// 在当前时刻之后的 `delay` 执行（timeout）
    pub fn schedule_in<E: Event>(&mut self, delay: SimTime, ev: E) {
        let at = self.now.saturating_add(delay);
        self.push(at, Box::new(ev));
    }

    /// 在当前时刻执行（排在同一时刻已入队事件之后）
    pub fn schedule_now<E: Event>(&mut self, ev: E) {
        self.push(self.now, Box::new(ev));
    }

    fn push(&mut self, at: SimTime, ev: Box<dyn Event>) {
        let at = if at < self.now {
            warn!(now = ?self.now, at = ?at, "调度时间早于当前时间，已钳到 now");
            self.now
        } else {
            at
        };
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent { at, seq, ev });
    }

    /// 创建一个新的一次性信号
    pub fn signal(&mut self) -> SignalId {
        let id = SignalId(self.next_signal);
        self.next_signal = self.next_signal.wrapping_add(1);
        self.signals.insert(id, SignalSlot::Pending(None));
        id
    }

    /// 信号是否仍在等待触发
    pub fn is_signal_pending(&self, id: SignalId) -> bool {
        matches!(self.signals.get(&id), Some(SignalSlot::Pending(_)))
    }

    /// 挂起在信号上。若信号已触发，等待者在当前时刻恢复。
    ///
    /// 返回 false 表示信号不存在或已有等待者。
    pub fn wait(&mut self, id: SignalId, waiter: Box<dyn Waiter>) -> bool {
        match self.signals.remove(&id) {
            Some(SignalSlot::Pending(None)) => {
                self.signals.insert(id, SignalSlot::Pending(Some(waiter)));
                true
            }
            Some(SignalSlot::Fired(value)) => {
                self.push(self.now, Box::new(WakeWaiter { waiter, value }));
                true
            }
            Some(slot @ SignalSlot::Pending(Some(_))) => {
                self.signals.insert(id, slot);
                false
            }
            None => false,
        }
    }

    /// 以 `value` 触发信号。返回 false 表示信号不存在或已触发。
    pub fn succeed(&mut self, id: SignalId, value: SignalValue) -> bool {
        match self.signals.remove(&id) {
            Some(SignalSlot::Pending(Some(waiter))) => {
                debug!(signal = ?id, "触发信号，唤醒等待者");
                self.push(self.now, Box::new(WakeWaiter { waiter, value }));
                true
            }
            Some(SignalSlot::Pending(None)) => {
                self.signals.insert(id, SignalSlot::Fired(value));
                true
            }
            Some(slot @ SignalSlot::Fired(_)) => {
                self.signals.insert(id, slot);
                false
            }
            None => false,
        }
    }

    /// 恰好执行一个事件，并把时钟推进到该事件的时间。队列为空时返回 false。
    pub fn step(&mut self, world: &mut dyn World) -> bool {
        let Some(item) = self.q.pop() else {
            return false;
        };
        debug_assert!(item.at >= self.now, "clock must not move backward");
        self.now = item.at;
        self.executed += 1;
        item.ev.execute(self, world);
        world.on_tick(self);
        true
    }

    /// 运行直到事件队列为空、世界停止，或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while let Some(top) = self.q.peek() {
            if top.at > until || world.halted() {
                break;
            }
            self.step(world);
        }
        if !world.halted() {
            self.now = self.now.max(until);
        }
    }

    /// 运行所有事件直到队列为空或世界停止。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        let mut event_count = 0u64;
        while !world.halted() && self.step(world) {
            event_count += 1;
        }

        info!(
            total_events = event_count,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }
}
