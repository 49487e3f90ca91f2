//! CSV result files written at every controller `apply` boundary.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SimError};
use crate::metrics::Metrics;
use crate::params::SimulatorParams;
use crate::sim::SimTime;

pub const METRICS_HEADER: [&str; 15] = [
    "time",
    "total_flows",
    "successful_flows",
    "dropped_flows",
    "in_network_flows",
    "avg_end2end_delay_of_dropped",
    "avg_end2end_delay_of_processed",
    "avg_sf_processing_delay",
    "avg_sfc_length",
    "avg_crossed_link_delay",
    "avg_path_delay",
    "avg_path_delay_of_processed",
    "avg_ingress2egress_delay_of_processed",
    "avg_node_load",
    "avg_link_load",
];

const PLACEMENTS: &str = "placements.csv";
const METRICS: &str = "metrics.csv";
const RUNTIMES: &str = "runtimes.csv";
const DROP_REASONS: &str = "drop_reasons.csv";

pub struct ResultWriter {
    dir: PathBuf,
    placements: csv::Writer<File>,
    metrics: csv::Writer<File>,
    runtimes: csv::Writer<File>,
    drop_reasons: csv::Writer<File>,
}

impl ResultWriter {
    /// Creates `dir` and the result files, truncating existing ones.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| SimError::io(dir, e))?;
        let mut placements = csv::Writer::from_path(dir.join(PLACEMENTS))?;
        placements.write_record(["time", "node", "sf"])?;
        let mut metrics = csv::Writer::from_path(dir.join(METRICS))?;
        metrics.write_record(METRICS_HEADER)?;
        let mut runtimes = csv::Writer::from_path(dir.join(RUNTIMES))?;
        runtimes.write_record(["run", "runtime_ms"])?;
        let mut drop_reasons = csv::Writer::from_path(dir.join(DROP_REASONS))?;
        drop_reasons.write_record(["time", "reason", "count"])?;
        let mut writer = Self {
            dir: dir.to_path_buf(),
            placements,
            metrics,
            runtimes,
            drop_reasons,
        };
        writer.flush()?;
        Ok(writer)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends the current placement, metrics and drop counters.
    pub fn write_state(&mut self, now: SimTime, params: &SimulatorParams, metrics: &Metrics) -> Result<()> {
        let time = now.as_millis_f64().to_string();
        for (node, sf) in params.placement.iter() {
            self.placements
                .write_record([time.as_str(), params.network.name(node), sf.as_str()])?;
        }

        let s = metrics.stats();
        let row = [
            s.total_flows as f64,
            s.successful_flows as f64,
            s.dropped_flows as f64,
            s.in_network_flows as f64,
            s.avg_end2end_delay_of_dropped,
            s.avg_end2end_delay,
            s.avg_sf_processing_delay,
            s.avg_sfc_length,
            s.avg_crossed_link_delay,
            s.avg_path_delay,
            s.avg_path_delay_of_processed,
            s.avg_ingress2egress_delay_of_processed,
            params.network.avg_node_load(),
            params.network.avg_link_load(),
        ];
        let mut record = vec![time.clone()];
        record.extend(row.iter().map(|v| v.to_string()));
        self.metrics.write_record(&record)?;

        for (reason, count) in &metrics.drop_reasons {
            self.drop_reasons
                .write_record([time.as_str(), reason.as_str(), count.to_string().as_str()])?;
        }
        debug!(dir = %self.dir.display(), now = ?now, "写入结果");
        self.flush()
    }

    pub fn write_runtime(&mut self, run: u64, runtime_ms: f64) -> Result<()> {
        self.runtimes
            .write_record([run.to_string(), runtime_ms.to_string()])?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        let files = [PLACEMENTS, METRICS, RUNTIMES, DROP_REASONS];
        let writers = [
            &mut self.placements,
            &mut self.metrics,
            &mut self.runtimes,
            &mut self.drop_reasons,
        ];
        for (name, writer) in files.into_iter().zip(writers) {
            writer.flush().map_err(|e| SimError::io(self.dir.join(name), e))?;
        }
        Ok(())
    }
}
