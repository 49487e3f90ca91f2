//! 算法接口与控制器

mod action;
mod context;
mod controller;
mod coordinator;
mod flow_simulator;
mod state;

pub use action::SimulatorAction;
pub use context::SimContext;
pub use controller::{DurationController, FlowController};
pub use coordinator::{Coordinator, PassOutcome, Periodic};
pub use flow_simulator::FlowSimulator;
pub use state::{DecisionState, SimulatorState};
