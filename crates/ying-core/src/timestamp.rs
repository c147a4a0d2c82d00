//! 时间戳工具.

use crate::rational::Rational;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 时间戳换算为秒, 未定义或时间基无效时返回 `f64::NAN`
pub fn to_seconds(pts: i64, time_base: Rational) -> f64 {
    if pts == NOPTS_VALUE || !time_base.is_valid() {
        return f64::NAN;
    }
    pts as f64 * time_base.to_f64()
}
