//! 服务功能定义

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resource_function::ResourceFunction;
use super::{SfId, SfcId};

/// 服务功能：处理时延分布（|Normal(mean, stdev)|）、启动时延与资源函数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFunction {
    pub id: SfId,
    pub processing_delay_mean: f64,
    pub processing_delay_stdev: f64,
    /// 新放置的实例在 `startup_time + startup_delay` 之前尚未就绪（ms）
    pub startup_delay: f64,
    /// 资源函数的名字（`identity` 为缺省）
    pub resource_function_id: String,
    pub resource_function: ResourceFunction,
}

impl ServiceFunction {
    pub fn new(id: impl Into<SfId>, processing_delay_mean: f64, processing_delay_stdev: f64) -> Self {
        Self {
            id: id.into(),
            processing_delay_mean,
            processing_delay_stdev,
            startup_delay: 0.0,
            resource_function_id: "identity".to_string(),
            resource_function: ResourceFunction::Identity,
        }
    }

    pub fn with_startup_delay(mut self, startup_delay: f64) -> Self {
        self.startup_delay = startup_delay;
        self
    }

    pub fn with_resource_function(mut self, name: impl Into<String>, f: ResourceFunction) -> Self {
        self.resource_function_id = name.into();
        self.resource_function = f;
        self
    }

    /// 该 SF 在 `load` 下占用的节点容量
    pub fn resources(&self, load: f64) -> f64 {
        self.resource_function.eval(load)
    }
}

/// 所有 SF，按 id 排序
pub type SfList = BTreeMap<SfId, ServiceFunction>;

/// 所有 SFC：id -> 有序 SF 序列
pub type SfcList = BTreeMap<SfcId, Vec<SfId>>;
