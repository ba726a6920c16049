//! 灌注数据集的选择与读取.
//!
//! 每个数据集是一对 (灌注, 方差) 图像, 加上可选的 GM/WM 掩膜. 数据集的后缀会附加到
//! 其所有统计量列名之后.
//!
//! # 注意
//!
//! 是否存在 PVC 结果目录决定了整个策略:
//!
//! 1. 存在时, GM/WM 使用 PVC 专用的灌注/方差图像, 掩膜阈值较宽松 (0.1).
//! 2. 不存在时, GM/WM 复用未校正的图像, 掩膜阈值较严格 (0.8), 后缀中带有百分比.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::info;

use crate::consts::names::*;
use crate::consts::{percent, PVE_THRESHOLD_NOPVC, PVE_THRESHOLD_PVC};
use crate::stats::{region_stats, ExtractOptions, StatFields, StatRegistry};
use crate::{Mask3d, RoiResult, Volume};

/// 组织类型.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tissue {
    /// 灰质.
    Gm,

    /// 白质.
    Wm,
}

impl Tissue {
    /// 用于列名后缀与 ROI 名称的缩写.
    #[inline]
    pub fn abbr(self) -> &'static str {
        match self {
            Tissue::Gm => "GM",
            Tissue::Wm => "WM",
        }
    }
}

/// 数据集的读取计划. 图像路径相对于原生空间目录, 不带扩展名.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    /// 列名后缀.
    pub suffix: String,

    /// 灌注图像.
    pub value: PathBuf,

    /// 方差图像.
    pub variance: PathBuf,

    /// 额外掩膜: 原生空间中该组织的 PVE 大于阈值的体素.
    pub mask: Option<(Tissue, f64)>,
}

/// 原生空间目录下是否存在 PVC 结果.
#[inline]
pub fn has_pvc(native_dir: &Path) -> bool {
    native_dir.join(PVC_DIR).is_dir()
}

/// 根据是否存在 PVC 结果, 给出三个数据集的读取计划: 不加掩膜, GM, WM.
pub fn plan_datasets(pvc: bool) -> Vec<DatasetSpec> {
    let plain = DatasetSpec {
        suffix: String::new(),
        value: PERFUSION.into(),
        variance: PERFUSION_VAR.into(),
        mask: None,
    };
    if pvc {
        let pvc_dir = Path::new(PVC_DIR);
        vec![
            plain,
            DatasetSpec {
                suffix: format!(" {}", Tissue::Gm.abbr()),
                value: pvc_dir.join(PERFUSION),
                variance: pvc_dir.join(PERFUSION_VAR),
                mask: Some((Tissue::Gm, PVE_THRESHOLD_PVC)),
            },
            DatasetSpec {
                suffix: format!(" {}", Tissue::Wm.abbr()),
                value: pvc_dir.join(PERFUSION_WM),
                variance: pvc_dir.join(PERFUSION_WM_VAR),
                mask: Some((Tissue::Wm, PVE_THRESHOLD_PVC)),
            },
        ]
    } else {
        let masked = |t: Tissue| DatasetSpec {
            suffix: format!(" {}%+{}", percent(PVE_THRESHOLD_NOPVC), t.abbr()),
            mask: Some((t, PVE_THRESHOLD_NOPVC)),
            ..plain.clone()
        };
        let gm = masked(Tissue::Gm);
        let wm = masked(Tissue::Wm);
        vec![plain, gm, wm]
    }
}

/// 已读入内存的灌注数据集.
#[derive(Debug, Clone)]
pub struct PerfusionDataset {
    /// 列名后缀.
    pub suffix: String,

    /// 灌注图像. 不同数据集可能共享同一图像.
    pub value: Rc<Volume>,

    /// 方差图像.
    pub variance: Rc<Volume>,

    /// 额外掩膜.
    pub mask: Option<Mask3d>,
}

impl PerfusionDataset {
    /// 计算 `roi` 内该数据集的统计量.
    pub fn region_stats(
        &self,
        registry: &StatRegistry,
        roi: &Mask3d,
        opts: &ExtractOptions,
    ) -> RoiResult<StatFields> {
        region_stats(
            registry,
            self.value.data(),
            self.variance.data(),
            roi.view(),
            self.mask.as_ref().map(|m| m.view()),
            &self.suffix,
            opts,
        )
    }
}

/// 读取原生空间目录 `native_dir` 下的灌注数据集.
///
/// `gm_pve`, `wm_pve` 为已变换到原生空间的 PVE 图像. 同一图像只读取一次.
pub fn load_datasets(
    native_dir: &Path,
    gm_pve: &Volume,
    wm_pve: &Volume,
) -> RoiResult<Vec<PerfusionDataset>> {
    let pvc = has_pvc(native_dir);
    if pvc {
        info!(
            " - Found partial volume corrected results - will mask ROIs using GM/WM PVE (threshold: {PVE_THRESHOLD_PVC:.2})"
        );
    } else {
        info!(
            " - No partial volume corrected results - will mask ROIs using GM/WM PVE (threshold: {PVE_THRESHOLD_NOPVC:.2})"
        );
    }

    let mut cache: Vec<(PathBuf, Rc<Volume>)> = Vec::new();
    let mut open = |rel: &Path| -> RoiResult<Rc<Volume>> {
        if let Some((_, v)) = cache.iter().find(|(p, _)| p == rel) {
            return Ok(Rc::clone(v));
        }
        let v = Rc::new(Volume::open_resolved(native_dir.join(rel))?);
        cache.push((rel.to_owned(), Rc::clone(&v)));
        Ok(v)
    };

    plan_datasets(pvc)
        .into_iter()
        .map(|spec| {
            let mask = spec.mask.map(|(tissue, threshold)| match tissue {
                Tissue::Gm => gm_pve.threshold_mask(threshold),
                Tissue::Wm => wm_pve.threshold_mask(threshold),
            });
            Ok(PerfusionDataset {
                value: open(&spec.value)?,
                variance: open(&spec.variance)?,
                suffix: spec.suffix,
                mask,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::NiftiHeader;

    fn suffixes(pvc: bool) -> Vec<String> {
        plan_datasets(pvc).into_iter().map(|d| d.suffix).collect()
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(suffixes(true), ["", " GM", " WM"]);
        assert_eq!(suffixes(false), ["", " 80%+GM", " 80%+WM"]);
    }

    #[test]
    fn test_thresholds() {
        let thresholds = |pvc| -> Vec<Option<f64>> {
            plan_datasets(pvc)
                .into_iter()
                .map(|d| d.mask.map(|(_, t)| t))
                .collect()
        };
        assert_eq!(thresholds(true), [None, Some(0.1), Some(0.1)]);
        assert_eq!(thresholds(false), [None, Some(0.8), Some(0.8)]);
    }

    #[test]
    fn test_pvc_images() {
        let plan = plan_datasets(true);
        assert_eq!(plan[0].value, Path::new("perfusion_calib"));
        assert_eq!(plan[1].value, Path::new("pvcorr/perfusion_calib"));
        assert_eq!(plan[2].variance, Path::new("pvcorr/perfusion_wm_var_calib"));
        assert_eq!(plan[2].mask.map(|m| m.0), Some(Tissue::Wm));

        // 无 PVC 时三个数据集共用同一对图像
        let plan = plan_datasets(false);
        assert!(plan.iter().all(|d| d.value == Path::new("perfusion_calib")));
        assert!(plan.iter().all(|d| d.variance == Path::new("perfusion_var_calib")));
    }

    #[test]
    fn test_load_shares_images() -> RoiResult<()> {
        let dir = tempfile::tempdir()?;
        let h = NiftiHeader::default();
        let v = Volume::from_parts(&h, Array3::from_elem((2, 2, 2), 1.0))?;
        v.save(dir.path().join("perfusion_calib.nii.gz"))?;
        v.save(dir.path().join("perfusion_var_calib.nii.gz"))?;

        let gm = Volume::from_parts(&h, Array3::from_elem((2, 2, 2), 0.9))?;
        let wm = Volume::from_parts(&h, Array3::from_elem((2, 2, 2), 0.5))?;
        let ds = load_datasets(dir.path(), &gm, &wm)?;

        assert_eq!(ds.len(), 3);
        assert!(Rc::ptr_eq(&ds[0].value, &ds[1].value));
        assert!(ds[0].mask.is_none());
        assert!(ds[1].mask.as_ref().unwrap().iter().all(|&m| m));
        assert!(ds[2].mask.as_ref().unwrap().iter().all(|&m| !m));
        Ok(())
    }
}
