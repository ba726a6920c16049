//! 整体流程编排.
//!
//! 1. 读取原生空间参考, 结构空间参考, GM/WM PVE 与形变场.
//! 2. 求 std -> struct 形变场与 struct -> native 仿射矩阵.
//! 3. 将 GM/WM PVE 变换到原生空间, 读取灌注数据集.
//! 4. 注册固定的 GM/WM ROI, 用户给出的 ROI 与图谱 ROI.
//! 5. 对每个 (ROI, 数据集) 组合计算统计量, 写出表格与附属图像.
//!
//! 任何一步出错都会终止整个流程.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::atlas::AtlasService;
use crate::consts::names::*;
use crate::consts::{
    percent, ATLAS_RESOLUTION_MM, DEFAULT_ATLAS_THRESHOLD, DEFAULT_MIN_NVOXELS,
    DEFAULT_ROI_THRESHOLD, GENERIC_ROI_PVE_THRESHOLDS, STANDARD_ATLASES,
};
use crate::dataset::{load_datasets, PerfusionDataset, Tissue};
use crate::report::{write_report, SidecarKinds, StatsRow};
use crate::roi::{Registrar, Retain, Roi};
use crate::stats::{ExtractOptions, StatRegistry};
use crate::transform::{SpaceTransform, Warp, WarpRequest};
use crate::{Affine, NiftiHeaderAttr, RoiError, RoiResult, Volume};

/// 一次运行的全部配置.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// oxford_asl 输出目录.
    pub oxasl_dir: PathBuf,

    /// fsl_anat 输出目录.
    pub fslanat_dir: PathBuf,

    /// 输出目录.
    pub output_dir: PathBuf,

    /// 报告统计量所需的最少有效体素数.
    pub min_nvoxels: usize,

    /// 原生空间 ROI 文件.
    pub native_rois: Vec<PathBuf>,

    /// 结构空间 ROI 文件.
    pub struct_rois: Vec<PathBuf>,

    /// 标准空间 ROI 文件.
    pub standard_rois: Vec<PathBuf>,

    /// 是否加入 Harvard-Oxford 皮层/皮层下图谱的全部区域.
    pub add_atlas_rois: bool,

    /// 需要保存的附属图像.
    pub sidecars: SidecarKinds,
}

impl RunConfig {
    /// 只包含必需目录的配置, 其余为默认值.
    pub fn new<P, Q, R>(oxasl_dir: P, fslanat_dir: Q, output_dir: R) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
        R: Into<PathBuf>,
    {
        Self {
            oxasl_dir: oxasl_dir.into(),
            fslanat_dir: fslanat_dir.into(),
            output_dir: output_dir.into(),
            min_nvoxels: DEFAULT_MIN_NVOXELS,
            native_rois: Vec::new(),
            struct_rois: Vec::new(),
            standard_rois: Vec::new(),
            add_atlas_rois: false,
            sidecars: SidecarKinds::default(),
        }
    }

    /// oxford_asl 输出中的原生空间目录.
    #[inline]
    pub fn native_dir(&self) -> PathBuf {
        self.oxasl_dir.join(NATIVE_SPACE_DIR)
    }

    /// 检查必需的输入目录是否存在. 不读取任何图像.
    pub fn check_inputs(&self) -> RoiResult<()> {
        for dir in [&self.oxasl_dir, &self.fslanat_dir, &self.native_dir()] {
            if !dir.is_dir() {
                return Err(RoiError::MissingInput(dir.to_owned()));
            }
        }
        Ok(())
    }

    fn retain(&self) -> Retain {
        Retain {
            native: self.sidecars.native_rois,
            standard: self.sidecars.mni_rois,
        }
    }
}

/// 从 oxford_asl 与 fsl_anat 输出中读取的参考数据.
#[derive(Debug)]
pub struct Inputs {
    /// 原生空间参考图像.
    pub native_ref: Volume,

    /// 结构空间参考图像.
    pub struct_ref: Volume,

    /// 结构空间 GM PVE.
    pub gm_pve: Volume,

    /// 结构空间 WM PVE.
    pub wm_pve: Volume,

    /// struct -> std 非线性形变场.
    pub struct2std: Warp,

    /// native -> struct 仿射矩阵.
    pub native2struct: Affine,
}

impl Inputs {
    /// 按固定的文件名读取.
    pub fn load(config: &RunConfig) -> RoiResult<Self> {
        let native_dir = config.native_dir();
        let anat = &config.fslanat_dir;
        Ok(Self {
            native_ref: Volume::open_resolved(native_dir.join(NATIVE_REF))?,
            struct_ref: Volume::open_resolved(anat.join(STRUCT_REF))?,
            gm_pve: Volume::open_resolved(anat.join(GM_PVE))?,
            wm_pve: Volume::open_resolved(anat.join(WM_PVE))?,
            struct2std: Warp::from_file(anat.join(STRUCT_TO_STD_WARP))?,
            native2struct: Affine::from_file(native_dir.join(NATIVE_TO_STRUCT_MAT))?,
        })
    }
}

/// 由文件路径得到 ROI 名称: 文件名中第一个 `.` 之前的部分.
pub fn roi_name_from_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .and_then(|n| n.split('.').next().map(str::to_owned))
        .unwrap_or_default()
}

/// 对每个 ROI 计算全部数据集的统计量, 每个 ROI 得到一行.
pub fn compute_rows(
    registry: &StatRegistry,
    rois: &[Roi],
    datasets: &[PerfusionDataset],
    opts: &ExtractOptions,
) -> RoiResult<Vec<StatsRow>> {
    rois.iter()
        .map(|roi| {
            let mut row = StatsRow::new(&roi.name);
            for ds in datasets {
                row.merge(ds.region_stats(registry, &roi.mask_native, opts)?);
            }
            debug!("{}: {} columns", roi.name, row.fields.len());
            Ok(row)
        })
        .collect()
}

/// 将结构空间的 PVE 变换到原生空间, 不二值化.
fn pve_to_native<T: SpaceTransform + ?Sized>(
    transform: &T,
    pve: &Volume,
    native_ref: &Volume,
    struct2native: &Affine,
) -> RoiResult<Volume> {
    transform.apply(&WarpRequest::new(pve, native_ref).premat(struct2native))
}

/// 执行完整流程, 写出结果并返回统计表格的所有行.
///
/// `atlases` 仅在 `config.add_atlas_rois` 时使用, 此时不能为 `None`.
pub fn run<T, A>(config: &RunConfig, transform: &T, atlases: Option<&A>) -> RoiResult<Vec<StatsRow>>
where
    T: SpaceTransform + ?Sized,
    A: AtlasService + ?Sized,
{
    info!("Regionwise analysis");
    info!(" - Using oxford_asl output in {}", config.oxasl_dir.display());
    info!(" - Using fsl_anat output in {}", config.fslanat_dir.display());
    config.check_inputs()?;

    let inputs = Inputs::load(config)?;
    let std2struct = transform.invert_warp(&inputs.struct2std, &inputs.struct_ref)?;
    let struct2native = inputs.native2struct.inverse()?;
    debug!("struct -> native:\n{struct2native}");

    info!("Loading perfusion images");
    let native_ref = &inputs.native_ref;
    let gm_native = pve_to_native(transform, &inputs.gm_pve, native_ref, &struct2native)?;
    let wm_native = pve_to_native(transform, &inputs.wm_pve, native_ref, &struct2native)?;
    let datasets = load_datasets(&config.native_dir(), &gm_native, &wm_native)?;

    let mut registrar = Registrar::new(
        transform,
        native_ref,
        &struct2native,
        &std2struct,
        config.retain(),
    );

    info!("Loading generic ROIs");
    for pv in GENERIC_ROI_PVE_THRESHOLDS {
        for (tissue, pve) in [(Tissue::Gm, &inputs.gm_pve), (Tissue::Wm, &inputs.wm_pve)] {
            let name = format!("{}%+{}", percent(pv), tissue.abbr());
            registrar.add_struct(&name, pve, pv)?;
        }
    }

    info!("Loading user-specified ROIs");
    for p in &config.native_rois {
        registrar.add_native(&roi_name_from_path(p), &Volume::open_resolved(p)?);
    }
    for p in &config.struct_rois {
        let roi = Volume::open_resolved(p)?;
        registrar.add_struct(&roi_name_from_path(p), &roi, DEFAULT_ROI_THRESHOLD)?;
    }
    for p in &config.standard_rois {
        let roi = Volume::open_resolved(p)?;
        registrar.add_standard(&roi_name_from_path(p), roi, DEFAULT_ROI_THRESHOLD)?;
    }

    if config.add_atlas_rois {
        let atlases = atlases.ok_or_else(|| {
            RoiError::Atlas("atlas ROIs requested but no atlas service configured".to_owned())
        })?;
        for id in STANDARD_ATLASES {
            registrar.add_atlas_from(atlases, id, ATLAS_RESOLUTION_MM, DEFAULT_ATLAS_THRESHOLD)?;
        }
    }
    let rois = registrar.into_rois();

    info!(
        "Getting stats - minimum of {} voxels to report in region",
        config.min_nvoxels
    );
    let opts = ExtractOptions::with_min_nvoxels(config.min_nvoxels);
    let rows = compute_rows(&StatRegistry::standard(), &rois, &datasets, &opts)?;

    write_report(
        &config.output_dir,
        &rows,
        &rois,
        native_ref.header(),
        config.sidecars,
    )?;
    info!("DONE - Output in {}", config.output_dir.display());
    Ok(rows)
}
