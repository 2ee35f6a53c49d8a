use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sup::{ConfigError, SupConfig, SupMode};
use crate::wire::FrameSpec;

/// 一段回放轨迹：初始配置加按时间排列的事件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub config: SupConfig,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// 事件时刻（毫秒），必须单调不减
    #[serde(default)]
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: TraceAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceAction {
    /// 主机协议栈交给驱动一个待发送的帧
    Tx {
        #[serde(default)]
        ifidx: usize,
        frame: FrameSpec,
        /// 报文 id；省略时按出现顺序从 1 开始分配
        #[serde(default)]
        id: Option<u64>,
    },
    /// 驱动从无线收到一个帧
    Rx { frame: FrameSpec },
    /// 发送队列真正发出一个报文；省略 id 时发出队头
    XmitDone {
        #[serde(default)]
        id: Option<u64>,
    },
    SetMode { mode: SupMode },
    SetRatio { ratio: u32 },
    SetDelay { delay_ms: u64 },
    Clean,
}

impl Trace {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let trace: Trace = serde_json::from_str(raw)?;
        trace.config.validate()?;
        Ok(trace)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}
