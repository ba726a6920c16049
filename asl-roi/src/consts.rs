//! 通用常量.

/// 存在部分容积校正结果时, GM/WM 掩膜使用的 PVE 阈值.
///
/// PVC 结果已经在空间上做过校正, 因此宽松的掩膜即可.
pub const PVE_THRESHOLD_PVC: f64 = 0.1;

/// 不存在部分容积校正结果时, GM/WM 掩膜使用的 PVE 阈值.
pub const PVE_THRESHOLD_NOPVC: f64 = 0.8;

/// 结构空间中固定 GM/WM ROI 的 PVE 阈值. 每个阈值分别生成一个 GM 和一个 WM ROI.
pub const GENERIC_ROI_PVE_THRESHOLDS: [f64; 2] = [0.1, 0.8];

/// 结构空间/标准空间 ROI 变换后的二值化阈值 (`[0, 1]` 尺度).
pub const DEFAULT_ROI_THRESHOLD: f64 = 0.5;

/// 图谱 ROI 变换后的二值化阈值.
///
/// 注意它是 `[0, 100]` 的百分比尺度, 与 [`DEFAULT_ROI_THRESHOLD`] 不同.
pub const DEFAULT_ATLAS_THRESHOLD: f64 = 50.0;

/// 报告统计量所需的最少有效体素数.
pub const DEFAULT_MIN_NVOXELS: usize = 10;

/// `--add-atlas-rois` 时加入的标准空间图谱.
pub const STANDARD_ATLASES: [&str; 2] = ["harvardoxford-cortical", "harvardoxford-subcortical"];

/// 标准空间图谱的分辨率 (单位: 毫米).
pub const ATLAS_RESOLUTION_MM: f64 = 2.0;

/// 附属图像文件扩展名.
pub const NIFTI_EXT: &str = ".nii.gz";

/// 输入/输出文件名.
pub mod names {
    /// oxford_asl 输出目录下的原生空间子目录.
    pub const NATIVE_SPACE_DIR: &str = "native_space";

    /// 原生空间目录下的部分容积校正结果子目录.
    pub const PVC_DIR: &str = "pvcorr";

    /// 原生空间参考图像.
    pub const NATIVE_REF: &str = "perfusion";

    /// 标定后的灌注图像.
    pub const PERFUSION: &str = "perfusion_calib";

    /// 标定后的灌注方差图像.
    pub const PERFUSION_VAR: &str = "perfusion_var_calib";

    /// PVC 目录下标定后的 WM 灌注图像.
    pub const PERFUSION_WM: &str = "perfusion_wm_calib";

    /// PVC 目录下标定后的 WM 灌注方差图像.
    pub const PERFUSION_WM_VAR: &str = "perfusion_wm_var_calib";

    /// 原生空间 -> 结构空间的仿射矩阵文本文件.
    pub const NATIVE_TO_STRUCT_MAT: &str = "asl2struct.mat";

    /// fsl_anat 目录下的结构参考图像.
    pub const STRUCT_REF: &str = "T1";

    /// fsl_anat 目录下的 GM PVE.
    pub const GM_PVE: &str = "T1_fast_pve_1";

    /// fsl_anat 目录下的 WM PVE.
    pub const WM_PVE: &str = "T1_fast_pve_2";

    /// fsl_anat 目录下的结构空间 -> 标准空间非线性形变系数.
    pub const STRUCT_TO_STD_WARP: &str = "T1_to_MNI_nonlin_coeff";

    /// 输出统计表格. 表格以逗号分隔, 使用 csv 扩展名方便表格软件直接打开.
    pub const OUTPUT_TABLE: &str = "region_analysis.csv";

    /// 原生空间 (未二值化) ROI 输出子目录.
    pub const ROIS_NATIVE_DIR: &str = "rois_native";

    /// 原生空间二值掩膜输出子目录.
    pub const MASKS_NATIVE_DIR: &str = "masks_native";

    /// 标准空间 ROI 输出子目录.
    pub const ROIS_MNI_DIR: &str = "rois_mni";
}

/// 将 `[0, 1]` 尺度的阈值转换为整数百分比, 用于 ROI 名称和列名后缀.
///
/// 小数部分直接截断, 例如 `0.29 * 100.0 == 28.999999999999996` 得到 `28`.
#[inline]
pub fn percent(threshold: f64) -> i64 {
    (threshold * 100.0) as i64
}
