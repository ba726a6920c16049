//! 单个 (ROI, 数据集) 组合的样本提取与统计.

use ndarray::{ArrayView3, Zip};

use super::StatRegistry;
use crate::consts::DEFAULT_MIN_NVOXELS;
use crate::error::{RoiError, RoiResult};
use crate::Mask3d;

/// 样本提取选项.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// 忽略值为 NaN 的体素.
    pub ignore_nan: bool,

    /// 忽略值为 ±Inf 的体素.
    pub ignore_inf: bool,

    /// 有效体素少于该值时, 所有统计量为 `None`.
    pub min_nvoxels: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            ignore_nan: true,
            ignore_inf: true,
            min_nvoxels: DEFAULT_MIN_NVOXELS,
        }
    }
}

impl ExtractOptions {
    /// 使用指定的最少体素数, 其余为默认值.
    #[inline]
    pub fn with_min_nvoxels(min_nvoxels: usize) -> Self {
        Self {
            min_nvoxels,
            ..Self::default()
        }
    }
}

/// 统计表格中的一格.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Cell {
    /// 有效体素数.
    Count(usize),

    /// 统计量. `None` 表示有效体素不足, NaN/Inf 表示数据存在但数值退化.
    Value(Option<f64>),
}

/// 有序的 `列名 -> 值` 映射.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatFields {
    columns: Vec<(String, Cell)>,
}

impl StatFields {
    /// 空映射.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一列. 列已存在时原地替换.
    pub fn insert(&mut self, column: impl Into<String>, cell: Cell) {
        let column = column.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = cell,
            None => self.columns.push((column, cell)),
        }
    }

    /// 将 `other` 的所有列按顺序写入自身.
    pub fn merge(&mut self, other: StatFields) {
        for (c, v) in other.columns {
            self.insert(c, v);
        }
    }

    /// 读取一列.
    pub fn get(&self, column: &str) -> Option<Cell> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|&(_, v)| v)
    }

    /// 按顺序遍历所有列.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, Cell)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), *v))
    }

    /// 列数.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// 是否没有任何列.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// 计算有效 ROI: ROI 内, 值有效且位于额外掩膜内的体素.
///
/// 调用前需保证各数组形状一致.
pub fn effective_roi(
    value: ArrayView3<f32>,
    roi: ArrayView3<bool>,
    mask: Option<ArrayView3<bool>>,
    opts: &ExtractOptions,
) -> Mask3d {
    let mut eff = Zip::from(&roi).and(&value).map_collect(|&r, &v| {
        r && !(opts.ignore_nan && v.is_nan()) && !(opts.ignore_inf && !v.is_finite())
    });
    if let Some(mask) = mask {
        Zip::from(&mut eff).and(&mask).for_each(|e, &m| *e &= m);
    }
    eff
}

/// 计算 ROI 内的全部统计量.
///
/// 结果包含 `Nvoxels<suffix>` 以及 `registry` 中每个统计量的 `<name><suffix>` 列.
/// 有效体素数少于 `opts.min_nvoxels` 时, 统计量列均为 `None`.
///
/// # 注意
///
/// `value`, `variance` 和 `mask` 的形状必须与 `roi` 一致, 依次检查,
/// 否则分别返回 `ImageShape`, `VarianceShape`, `MaskShape` 错误.
pub fn region_stats(
    registry: &StatRegistry,
    value: ArrayView3<f32>,
    variance: ArrayView3<f32>,
    roi: ArrayView3<bool>,
    mask: Option<ArrayView3<bool>>,
    suffix: &str,
    opts: &ExtractOptions,
) -> RoiResult<StatFields> {
    let shape = roi.dim();
    if value.dim() != shape {
        return Err(RoiError::ImageShape(value.dim(), shape));
    }
    if variance.dim() != shape {
        return Err(RoiError::VarianceShape(variance.dim(), shape));
    }
    if let Some(m) = &mask {
        if m.dim() != shape {
            return Err(RoiError::MaskShape(m.dim(), shape));
        }
    }

    let eff = effective_roi(value, roi, mask, opts);
    let mut sample = Vec::new();
    let mut sample_var = Vec::new();
    Zip::from(&eff)
        .and(&value)
        .and(&variance)
        .for_each(|&e, &v, &s| {
            if e {
                sample.push(v as f64);
                sample_var.push(s as f64);
            }
        });

    let n = sample.len();
    let mut fields = StatFields::new();
    fields.insert(format!("Nvoxels{suffix}"), Cell::Count(n));
    for (name, f) in registry.iter() {
        let v = (n >= opts.min_nvoxels).then(|| f(&sample, &sample_var));
        fields.insert(format!("{name}{suffix}"), Cell::Value(v));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn line<T: Clone>(v: Vec<T>) -> Array3<T> {
        let n = v.len();
        Array3::from_shape_vec((1, 1, n), v).unwrap()
    }

    #[test]
    fn test_effective_roi_filters() {
        let value = line(vec![1.0, f32::NAN, f32::INFINITY, 4.0, 5.0]);
        let roi = line(vec![true, true, true, true, false]);
        let mask = line(vec![true, true, true, false, true]);

        let all = ExtractOptions::default();
        let eff = effective_roi(value.view(), roi.view(), None, &all);
        assert_eq!(eff, line(vec![true, false, false, true, false]));

        let eff = effective_roi(value.view(), roi.view(), Some(mask.view()), &all);
        assert_eq!(eff, line(vec![true, false, false, false, false]));

        let keep_inf = ExtractOptions {
            ignore_inf: false,
            ..all
        };
        let eff = effective_roi(value.view(), roi.view(), None, &keep_inf);
        assert_eq!(eff, line(vec![true, false, true, true, false]));

        let keep_all = ExtractOptions {
            ignore_nan: false,
            ignore_inf: false,
            ..all
        };
        let eff = effective_roi(value.view(), roi.view(), None, &keep_all);
        assert_eq!(eff, roi);
    }

    #[test]
    fn test_effective_roi_is_subset() {
        let value = Array3::from_shape_fn((3, 4, 5), |(i, j, k)| match (i + j + k) % 4 {
            0 => f32::NAN,
            1 => f32::NEG_INFINITY,
            _ => (i * j) as f32,
        });
        let roi = Array3::from_shape_fn((3, 4, 5), |(i, _, k)| i != k);
        let mask = Array3::from_shape_fn((3, 4, 5), |(_, j, _)| j > 0);
        let eff = effective_roi(value.view(), roi.view(), Some(mask.view()), &Default::default());
        assert!(Zip::from(&eff).and(&roi).all(|&e, &r| !e || r));
    }

    #[test]
    fn test_region_stats_columns() {
        let n = 12;
        let value = line((0..n).map(|i| i as f32).collect());
        let var = line(vec![1.0; n]);
        let roi = line(vec![true; n]);
        let fields = region_stats(
            &StatRegistry::standard(),
            value.view(),
            var.view(),
            roi.view(),
            None,
            " GM",
            &ExtractOptions::default(),
        )
        .unwrap();

        let cols: Vec<&str> = fields.iter().map(|(c, _)| c).collect();
        assert_eq!(
            cols,
            [
                "Nvoxels GM",
                "Mean GM",
                "Std GM",
                "Median GM",
                "IQR GM",
                "Precision-weighted mean GM",
                "I2 GM"
            ]
        );
        assert_eq!(fields.get("Nvoxels GM"), Some(Cell::Count(12)));
        assert_eq!(fields.get("Mean GM"), Some(Cell::Value(Some(5.5))));
        assert_eq!(
            fields.get("Precision-weighted mean GM"),
            Some(Cell::Value(Some(5.5)))
        );
    }

    #[test]
    fn test_region_stats_below_minimum() {
        let value = line(vec![1.0, 2.0, f32::NAN, 3.0]);
        let var = line(vec![1.0; 4]);
        let roi = line(vec![true; 4]);
        let fields = region_stats(
            &StatRegistry::standard(),
            value.view(),
            var.view(),
            roi.view(),
            None,
            "",
            &ExtractOptions::default(),
        )
        .unwrap();

        // 计数为过滤后的真实值, 而不是 0
        assert_eq!(fields.get("Nvoxels"), Some(Cell::Count(3)));
        for (c, v) in fields.iter().skip(1) {
            assert_eq!(v, Cell::Value(None), "{c}");
        }
    }

    #[test]
    fn test_region_stats_degenerate_is_not_none() {
        let value = line(vec![2.0; 3]);
        let var = line(vec![1.0; 3]);
        let roi = line(vec![true; 3]);
        let fields = region_stats(
            &StatRegistry::standard(),
            value.view(),
            var.view(),
            roi.view(),
            None,
            "",
            &ExtractOptions::with_min_nvoxels(1),
        )
        .unwrap();
        assert_eq!(fields.get("Std"), Some(Cell::Value(Some(0.0))));
        assert_eq!(fields.get("I2"), Some(Cell::Value(Some(f64::NEG_INFINITY))));
    }

    #[test]
    fn test_shape_errors_in_order() {
        let good = Array3::<f32>::zeros((2, 2, 2));
        let bad = Array3::<f32>::zeros((2, 2, 3));
        let roi = Array3::from_elem((2, 2, 2), true);
        let bad_mask = Array3::from_elem((1, 2, 2), true);
        let reg = StatRegistry::standard();
        let opts = ExtractOptions::default();

        let r = region_stats(&reg, bad.view(), bad.view(), roi.view(), None, "", &opts);
        assert!(matches!(r, Err(RoiError::ImageShape((2, 2, 3), (2, 2, 2)))));

        let r = region_stats(&reg, good.view(), bad.view(), roi.view(), None, "", &opts);
        assert!(matches!(r, Err(RoiError::VarianceShape(..))));

        let r = region_stats(
            &reg,
            good.view(),
            good.view(),
            roi.view(),
            Some(bad_mask.view()),
            "",
            &opts,
        );
        assert!(matches!(r, Err(RoiError::MaskShape((1, 2, 2), _))));
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut a = StatFields::new();
        a.insert("Nvoxels", Cell::Count(1));
        a.insert("Mean", Cell::Value(None));
        let mut b = StatFields::new();
        b.insert("Nvoxels GM", Cell::Count(2));
        b.insert("Mean", Cell::Value(Some(1.0)));
        a.merge(b);

        let cols: Vec<_> = a.iter().collect();
        assert_eq!(
            cols,
            [
                ("Nvoxels", Cell::Count(1)),
                ("Mean", Cell::Value(Some(1.0))),
                ("Nvoxels GM", Cell::Count(2)),
            ]
        );
    }
}
