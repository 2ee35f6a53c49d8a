//! 错误类型
//!
//! 抑制只是优化：除配置接口外，任何失败的安全默认都是“不抑制，照常发送”。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupError {
    /// PSH 段记录池已空，本次数据段不再跟踪
    #[error("PSH segment pool exhausted")]
    PoolExhausted,
    /// 固定容量的表已满，报文不做抑制
    #[error("{0} table full")]
    TableFull(&'static str),
    /// 编程错误：重复释放、记录泄漏、计数不一致等
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// 配置接口收到非法参数
    #[error("bad argument: {0}")]
    BadArgument(String),
    /// 激活模式时分配失败，模式已回退为 OFF
    #[error("out of memory allocating {0}")]
    NoMemory(&'static str),
}

/// 报告内部不变式被破坏：记录 error 日志；debug 构建直接中止，release 构建尽力继续。
#[track_caller]
pub(crate) fn invariant_violation(what: impl Into<String>) -> SupError {
    let what = what.into();
    tracing::error!(%what, "内部不变式被破坏");
    debug_assert!(false, "invariant violation: {what}");
    SupError::InvariantViolation(what)
}
