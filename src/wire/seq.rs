//! TCP 序号比较（RFC 1982 串行数算术）

const HALF_SPACE: u32 = 1 << 31;

/// `a >= b`（序号空间意义下，正确处理回绕）
#[inline]
pub fn seq_ge(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) < HALF_SPACE
}

/// `a > b`（序号空间意义下），即 `!(a <= b)`；相距正好半个空间时视为大于
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) >= HALF_SPACE
}
