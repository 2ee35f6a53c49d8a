//! 配置
//!
//! 表容量、老化超时以及 HOLD 默认参数；JSON 中每个字段都可省略，缺省即驱动常量。

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::mode::{BusKind, SupMode};
use crate::error::SupError;

/// ACK 表容量
pub const TCPACK_INFO_MAXNUM: usize = 4;
/// 数据流表容量
pub const TCPDATA_INFO_MAXNUM: usize = 4;
/// PSH 段记录池容量
pub const TCPDATA_PSH_INFO_MAXNUM: usize = 8 * TCPDATA_INFO_MAXNUM;
/// 数据流空闲老化阈值（毫秒）
pub const TCPDATA_INFO_TIMEOUT: u64 = 5_000;
/// HOLD 模式默认抑制比
pub const TCPACK_SUPP_RATIO: u32 = 3;
/// HOLD 模式默认持有时间（毫秒）
pub const TCPACK_DELAY_TIME: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub ack_slots: usize,
    pub data_flows: usize,
    pub psh_segments: usize,
    pub data_timeout_ms: u64,
    /// 每次进入 HOLD 时恢复的抑制比
    pub hold_ratio: u32,
    /// 每次进入 HOLD 时恢复的持有时间
    pub hold_delay_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            ack_slots: TCPACK_INFO_MAXNUM,
            data_flows: TCPDATA_INFO_MAXNUM,
            psh_segments: TCPDATA_PSH_INFO_MAXNUM,
            data_timeout_ms: TCPDATA_INFO_TIMEOUT,
            hold_ratio: TCPACK_SUPP_RATIO,
            hold_delay_ms: TCPACK_DELAY_TIME,
        }
    }
}

impl Limits {
    pub fn validate(&self) -> Result<(), SupError> {
        if self.ack_slots == 0 || self.data_flows == 0 || self.psh_segments == 0 {
            return Err(SupError::BadArgument(format!(
                "table capacities must be non-zero: {self:?}"
            )));
        }
        if self.hold_ratio == 0 {
            return Err(SupError::BadArgument("hold_ratio must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupConfig {
    #[serde(default)]
    pub mode: SupMode,
    #[serde(default)]
    pub bus: BusKind,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] SupError),
}

impl SupConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: SupConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), SupError> {
        self.limits.validate()?;
        if !self.mode.allowed_on(self.bus) {
            return Err(SupError::BadArgument(format!(
                "mode {} not supported on {:?} bus",
                self.mode, self.bus
            )));
        }
        Ok(())
    }
}
