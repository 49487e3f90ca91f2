//! Simulation configuration (YAML).
//!
//! All keys are optional. Time is in ms, data rates in Mbit/s, sizes in Mbit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Mean inter-arrival time: one value for every ingress or a per-ingress map keyed by node name.
/// `null` (scalar or map value) leaves the ingress quiescent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterArrivalMean {
    Scalar(f64),
    PerIngress(BTreeMap<String, Option<f64>>),
}

/// How the next node of a flow is chosen when no rule overlay applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// Weighted round-robin over the schedule table.
    #[default]
    Aggregate,
    /// Ask an external agent for every decision (see `FlowController`).
    PerFlow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub run_duration: f64,
    #[serde(default = "default_inter_arrival_mean")]
    pub inter_arrival_mean: Option<InterArrivalMean>,
    pub flow_dr_mean: f64,
    pub flow_dr_stdev: f64,
    pub flow_size_shape: f64,
    pub deterministic_arrival: bool,
    pub deterministic_size: bool,
    /// Fixed flow duration; derived from size and data rate when absent.
    pub flow_duration: Option<f64>,
    pub ttl_choices: Vec<f64>,
    /// Idle time after which an SF removed from the placement is evicted.
    pub vnf_timeout: Option<f64>,
    /// Trace CSV, relative paths are resolved against the config file directory.
    pub trace_path: Option<PathBuf>,
    pub prediction: bool,
    pub decision_mode: DecisionMode,
    /// Upper bound of the random backoff between conflicting per-flow decisions.
    pub max_decision_backoff: f64,
}

fn default_inter_arrival_mean() -> Option<InterArrivalMean> {
    Some(InterArrivalMean::Scalar(10.0))
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            run_duration: 100.0,
            inter_arrival_mean: default_inter_arrival_mean(),
            flow_dr_mean: 1.0,
            flow_dr_stdev: 0.0,
            flow_size_shape: 1.0,
            deterministic_arrival: false,
            deterministic_size: false,
            flow_duration: None,
            ttl_choices: vec![1000.0],
            vnf_timeout: None,
            trace_path: None,
            prediction: false,
            decision_mode: DecisionMode::Aggregate,
            max_decision_backoff: 0.1,
        }
    }
}

impl SimConfig {
    pub fn from_yaml_str(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Reads and validates a config file; a relative `trace_path` becomes relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let mut cfg = Self::from_yaml_str(&raw).map_err(|source| SimError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if let (Some(trace), Some(dir)) = (cfg.trace_path.as_ref(), path.parent()) {
            if trace.is_relative() {
                cfg.trace_path = Some(dir.join(trace));
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SimError::InvalidInput(msg));
        if !(self.run_duration > 0.0) {
            return bad(format!("run_duration must be positive, got {}", self.run_duration));
        }
        if !(self.flow_dr_mean > 0.0 && self.flow_dr_mean.is_finite() && self.flow_dr_stdev >= 0.0) {
            return bad("flow_dr_mean must be positive and flow_dr_stdev non-negative".to_string());
        }
        if !(self.flow_size_shape > 0.0) {
            return bad(format!("flow_size_shape must be positive, got {}", self.flow_size_shape));
        }
        if self.ttl_choices.is_empty() {
            return bad("ttl_choices must not be empty".to_string());
        }
        if self.max_decision_backoff < 0.0 {
            return bad("max_decision_backoff must be non-negative".to_string());
        }
        if let Some(d) = self.flow_duration {
            if !(d >= 0.0) {
                return bad(format!("flow_duration must be non-negative, got {d}"));
            }
        }
        let check_mean = |m: f64| {
            if m > 0.0 {
                Ok(())
            } else {
                bad(format!("inter_arrival_mean must be positive, got {m}"))
            }
        };
        match &self.inter_arrival_mean {
            Some(InterArrivalMean::Scalar(m)) => check_mean(*m)?,
            Some(InterArrivalMean::PerIngress(map)) => {
                for m in map.values().flatten() {
                    check_mean(*m)?;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Inter-arrival mean for an ingress node by name.
    pub fn inter_arrival_mean_for(&self, node_name: &str) -> Option<f64> {
        match &self.inter_arrival_mean {
            Some(InterArrivalMean::Scalar(m)) => Some(*m),
            Some(InterArrivalMean::PerIngress(map)) => map.get(node_name).copied().flatten(),
            None => None,
        }
    }
}
