//! 区域统计量.
//!
//! 每个统计量都是形如 `fn(val, var) -> f64` 的纯函数, `val` 为 ROI 内的样本,
//! `var` 为对应体素的方差. 不需要方差的统计量直接忽略 `var`.
//!
//! # 注意
//!
//! 统计量不会对退化输入 (空样本, 零方差等) 做特殊处理, 结果可能是 NaN 或 Inf.
//! 样本量不足时不调用统计函数, 由 [`extract`] 模块负责.

use itertools::izip;
use log::warn;
use ordered_float::OrderedFloat;

pub mod extract;

pub use extract::{region_stats, Cell, ExtractOptions, StatFields};

/// 统计函数. 参数依次为样本和等长的方差数组.
pub type StatFn = fn(&[f64], &[f64]) -> f64;

/// 有序的统计量注册表. 输出列的顺序与注册顺序一致.
#[derive(Clone)]
pub struct StatRegistry {
    entries: Vec<(&'static str, StatFn)>,
}

impl StatRegistry {
    /// 空注册表.
    #[inline]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// 标准统计量: `Mean`, `Std`, `Median`, `IQR`, `Precision-weighted mean`, `I2`.
    pub fn standard() -> Self {
        Self::empty()
            .with("Mean", mean)
            .with("Std", std)
            .with("Median", median)
            .with("IQR", iqr)
            .with("Precision-weighted mean", precision_weighted_mean)
            .with("I2", i2)
    }

    /// 追加一个统计量. 同名统计量会替换原有的函数, 但保留原来的位置.
    pub fn with(mut self, name: &'static str, f: StatFn) -> Self {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = f,
            None => self.entries.push((name, f)),
        }
        self
    }

    /// 从自身选出 `names` 中的统计量, 顺序以 `names` 为准. 未知名称会被忽略.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let mut ans = Self::empty();
        for name in names {
            let name = name.as_ref();
            match self.entries.iter().find(|(n, _)| *n == name) {
                Some(&(n, f)) => ans = ans.with(n, f),
                None => warn!("Unknown statistic `{name}` ignored"),
            }
        }
        ans
    }

    /// 按注册顺序遍历 `(名称, 函数)`.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, StatFn)> + '_ {
        self.entries.iter().copied()
    }

    /// 统计量名称.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|&(n, _)| n).collect()
    }

    /// 统计量个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StatRegistry {
    #[inline]
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for StatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// 算术平均.
pub fn mean(val: &[f64], _var: &[f64]) -> f64 {
    val.iter().sum::<f64>() / val.len() as f64
}

/// 总体标准差 (除以 `n`).
pub fn std(val: &[f64], var: &[f64]) -> f64 {
    let m = mean(val, var);
    let ss: f64 = val.iter().map(|v| (v - m).powi(2)).sum();
    (ss / val.len() as f64).sqrt()
}

/// 中位数. 样本含 NaN 时为 NaN.
pub fn median(val: &[f64], _var: &[f64]) -> f64 {
    percentile(val, 50.0)
}

/// 四分位距, 即第 75 与第 25 百分位数之差. 样本含 NaN 时为 NaN.
pub fn iqr(val: &[f64], _var: &[f64]) -> f64 {
    match sorted(val) {
        Some(s) => percentile_sorted(&s, 75.0) - percentile_sorted(&s, 25.0),
        None => f64::NAN,
    }
}

/// 精度 (方差倒数) 加权平均.
///
/// 精度不是有限值 (方差为 0 或非有限) 的体素权重为 0. 全部权重为 0 时结果为 NaN.
pub fn precision_weighted_mean(val: &[f64], var: &[f64]) -> f64 {
    let (num, den) = izip!(val, var).fold((0.0, 0.0), |(num, den), (&v, &s)| {
        let p = 1.0 / s;
        let p = if p.is_finite() { p } else { 0.0 };
        (num + v * p, den + p)
    });
    num / den
}

/// I² 异质性 (百分比).
///
/// 权重 `w = 1 / var`, `mu = Σ(w·val) / Σw`, `Q = Σ w·(val - mu)²`,
/// 结果为 `100 · (Q - (n - 1)) / Q + 0.5` 向零截断后的整数值.
///
/// # 注意
///
/// 结果不会被截断到 `>= 0`. `Q == 0` 时为 `-Inf` (`n >= 2`) 或 NaN (`n == 1`),
/// 零方差体素产生的无穷权重同样会传播为 NaN.
pub fn i2(val: &[f64], var: &[f64]) -> f64 {
    let n = val.len() as f64;
    let w: Vec<f64> = var.iter().map(|s| 1.0 / s).collect();
    let w_sum: f64 = w.iter().sum();
    let mu = izip!(&w, val).map(|(w, v)| w * v).sum::<f64>() / w_sum;
    let q: f64 = izip!(&w, val).map(|(w, v)| w * (v - mu).powi(2)).sum();
    let i2 = (q - (n - 1.0)) / q;
    (100.0 * i2 + 0.5).trunc()
}

/// 排序后的样本. 样本含 NaN 时返回 `None`.
fn sorted(val: &[f64]) -> Option<Vec<f64>> {
    if val.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut s = val.to_vec();
    s.sort_unstable_by_key(|&v| OrderedFloat(v));
    Some(s)
}

/// 线性插值的百分位数, `q` 取值 `[0, 100]`.
fn percentile(val: &[f64], q: f64) -> f64 {
    sorted(val).map_or(f64::NAN, |s| percentile_sorted(&s, q))
}

fn percentile_sorted(s: &[f64], q: f64) -> f64 {
    if s.is_empty() {
        return f64::NAN;
    }
    let pos = q / 100.0 * (s.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;
    if frac == 0.0 || lo + 1 >= s.len() {
        return s[lo];
    }
    s[lo] + (s[lo + 1] - s[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn ones(n: usize) -> Vec<f64> {
        vec![1.0; n]
    }

    #[test]
    fn test_standard_order() {
        let r = StatRegistry::standard();
        assert_eq!(
            r.names(),
            ["Mean", "Std", "Median", "IQR", "Precision-weighted mean", "I2"]
        );
    }

    #[test]
    fn test_select_subset() {
        let r = StatRegistry::standard().select(&["I2", "Mean", "Mode"]);
        assert_eq!(r.names(), ["I2", "Mean"]);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_with_replaces_in_place() {
        let r = StatRegistry::standard().with("Std", mean);
        assert_eq!(r.len(), 6);
        let (name, f) = r.iter().nth(1).unwrap();
        assert_eq!(name, "Std");
        assert_eq!(f(&[1.0, 3.0], &[1.0, 1.0]), 2.0);
    }

    #[test]
    fn test_basic_reductions() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let s = ones(v.len());
        assert_eq!(mean(&v, &s), 5.0);
        assert_eq!(std(&v, &s), 2.0);
        assert_eq!(median(&v, &s), 4.5);
        // 25%: pos 1.75 -> 4.0; 75%: pos 5.25 -> 5.5
        assert!((iqr(&v, &s) - 1.5).abs() < EPS);
    }

    #[test]
    fn test_median_odd_and_unsorted() {
        let v = [9.0, 1.0, 5.0];
        assert_eq!(median(&v, &ones(3)), 5.0);
        assert_eq!(iqr(&v, &ones(3)), 4.0);
    }

    #[test]
    fn test_nan_propagates() {
        let v = [1.0, f64::NAN, 3.0];
        assert!(median(&v, &ones(3)).is_nan());
        assert!(iqr(&v, &ones(3)).is_nan());
        assert!(mean(&v, &ones(3)).is_nan());
    }

    #[test]
    fn test_empty_sample_is_nan() {
        assert!(mean(&[], &[]).is_nan());
        assert!(median(&[], &[]).is_nan());
        assert!(precision_weighted_mean(&[], &[]).is_nan());
    }

    #[test]
    fn test_pwm_equal_variance_is_mean() {
        let v = [1.0, 2.0, 6.0];
        assert!((precision_weighted_mean(&v, &[3.0; 3]) - 3.0).abs() < EPS);
    }

    #[test]
    fn test_pwm_zero_variance_excluded() {
        // 方差为 0 -> 精度 Inf -> 权重 0
        let v = [100.0, 1.0, 3.0];
        let var = [0.0, 1.0, 1.0];
        assert_eq!(precision_weighted_mean(&v, &var), 2.0);
        assert!(precision_weighted_mean(&[1.0], &[0.0]).is_nan());
    }

    #[test]
    fn test_pwm_bounded() {
        let v = [-3.0, 0.5, 2.0, 10.0, 7.5];
        let var = [0.1, 4.0, 2.5, 0.3, 9.0];
        let p = precision_weighted_mean(&v, &var);
        assert!((-3.0..=10.0).contains(&p));
        // 方差越小, 权重越大
        assert!(p < mean(&v, &var));
    }

    #[test]
    fn test_i2_heterogeneous() {
        // w = 1, mu = 0, Q = 200, I2 = (200 - 1) / 200 = 0.995 -> 99.5 + 0.5 -> 100
        assert_eq!(i2(&[-10.0, 10.0], &[1.0, 1.0]), 100.0);
        // w = 1, mu = 0, Q = 2, I2 = 0.5 -> 50.5 -> 50
        assert_eq!(i2(&[-1.0, 1.0], &[1.0, 1.0]), 50.0);
    }

    #[test]
    fn test_i2_not_clamped() {
        // Q = 0.5, I2 = (0.5 - 1) / 0.5 = -1 -> -99.5 -> -99
        assert_eq!(i2(&[-0.5, 0.5], &[1.0, 1.0]), -99.0);
    }

    #[test]
    fn test_i2_constant_sample() {
        assert_eq!(i2(&[3.0; 4], &[2.0; 4]), f64::NEG_INFINITY);
        assert!(i2(&[3.0], &[2.0]).is_nan());
    }
}
