//! 抑制模式与总线类型

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SupError;

/// 抑制模式。整数编码与驱动配置接口一致：0..=3。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupMode {
    #[default]
    Off,
    /// 用更新的 ACK 原地替换发送队列中同一流的旧 ACK
    Replace,
    /// 在 Replace 的基础上，对端 PSH 数据未被确认前保持“优先接收”调度
    DelayTx,
    /// 持有 ACK 一段时间，按抑制比合并
    Hold,
}

impl SupMode {
    pub const ALL: [SupMode; 4] = [SupMode::Off, SupMode::Replace, SupMode::DelayTx, SupMode::Hold];

    pub fn as_u32(self) -> u32 {
        match self {
            SupMode::Off => 0,
            SupMode::Replace => 1,
            SupMode::DelayTx => 2,
            SupMode::Hold => 3,
        }
    }

    /// 该模式是否能在给定总线上启用（DELAY_TRANSMIT 依赖 SDIO 的 txinrx 调度）
    pub fn allowed_on(self, bus: BusKind) -> bool {
        self != SupMode::DelayTx || bus == BusKind::Sdio
    }

    /// 使用压缩排列 ACK 表（按报文身份查找）的模式
    pub fn uses_replace_table(self) -> bool {
        matches!(self, SupMode::Replace | SupMode::DelayTx)
    }
}

impl TryFrom<u32> for SupMode {
    type Error = SupError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(SupMode::Off),
            1 => Ok(SupMode::Replace),
            2 => Ok(SupMode::DelayTx),
            3 => Ok(SupMode::Hold),
            other => Err(SupError::BadArgument(format!("invalid mode {other}"))),
        }
    }
}

impl fmt::Display for SupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupMode::Off => "off",
            SupMode::Replace => "replace",
            SupMode::DelayTx => "delay_tx",
            SupMode::Hold => "hold",
        };
        f.write_str(name)
    }
}

/// 底层总线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[default]
    Sdio,
    Pcie,
    Usb,
}
