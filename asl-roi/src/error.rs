//! 运行时错误.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::Idx3d;

/// 区域统计流程的运行时错误.
///
/// 数值退化 (方差为零, 体素不足等) 不属于错误, 它们以 `None` 或 NaN/Inf
/// 的形式出现在统计结果中.
#[derive(Debug)]
pub enum RoiError {
    /// 灌注图像与 ROI 形状不一致. `(image, roi)`
    ImageShape(Idx3d, Idx3d),

    /// 方差图像与 ROI 形状不一致. `(variance, roi)`
    VarianceShape(Idx3d, Idx3d),

    /// 额外掩膜与 ROI 形状不一致. `(mask, roi)`
    MaskShape(Idx3d, Idx3d),

    /// 必需的输入目录或图像不存在.
    MissingInput(PathBuf),

    /// 图像无法被视为 3D 体数据, 或维度超出 NIfTI-1 的记录范围. 参数为原始形状.
    ImageDimension(Vec<usize>),

    /// 仿射矩阵文本格式错误.
    MatrixParse(String),

    /// 仿射矩阵不可逆.
    SingularMatrix,

    /// 外部配准/变换程序运行失败.
    Transform {
        /// 程序名.
        program: String,
        /// 退出码. 被信号终止时为 `None`.
        status: Option<i32>,
        /// 程序的标准错误输出.
        stderr: String,
    },

    /// 图谱查找或解析失败.
    Atlas(String),

    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// NIfTI 读写错误.
    Nifti(nifti::NiftiError),

    /// 输出表格写入错误.
    Csv(csv::Error),

    /// 图谱描述文件解析错误.
    Xml(roxmltree::Error),
}

/// 区域统计流程的运行结果.
pub type RoiResult<T> = Result<T, RoiError>;

impl Display for RoiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RoiError::ImageShape(image, roi) => {
                write!(f, "image must have same dimensions as ROI ({image:?} vs {roi:?})")
            }
            RoiError::VarianceShape(var, roi) => write!(
                f,
                "variance image must have same dimensions as ROI ({var:?} vs {roi:?})"
            ),
            RoiError::MaskShape(mask, roi) => {
                write!(f, "mask must have same dimensions as ROI ({mask:?} vs {roi:?})")
            }
            RoiError::MissingInput(p) => write!(f, "required input not found: {}", p.display()),
            RoiError::ImageDimension(shape) => {
                write!(f, "unsupported image shape {shape:?}, expected a 3D volume")
            }
            RoiError::MatrixParse(msg) => write!(f, "invalid affine matrix: {msg}"),
            RoiError::SingularMatrix => write!(f, "affine matrix is not invertible"),
            RoiError::Transform {
                program,
                status,
                stderr,
            } => match status {
                Some(code) => write!(f, "`{program}` exited with status {code}: {stderr}"),
                None => write!(f, "`{program}` terminated by signal: {stderr}"),
            },
            RoiError::Atlas(msg) => write!(f, "atlas error: {msg}"),
            RoiError::Io(e) => write!(f, "I/O error: {e}"),
            RoiError::Nifti(e) => write!(f, "NIfTI error: {e}"),
            RoiError::Csv(e) => write!(f, "CSV error: {e}"),
            RoiError::Xml(e) => write!(f, "atlas XML error: {e}"),
        }
    }
}

impl std::error::Error for RoiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RoiError::Io(e) => Some(e),
            RoiError::Nifti(e) => Some(e),
            RoiError::Csv(e) => Some(e),
            RoiError::Xml(e) => Some(e),
            _ => None,
        }
    }
}

macro_rules! impl_from_error {
    ($($source: ty => $variant: ident),+) => {
        $(
            impl From<$source> for RoiError {
                #[inline]
                fn from(e: $source) -> Self {
                    RoiError::$variant(e)
                }
            }
        )+
    };
}

impl_from_error!(
    std::io::Error => Io,
    nifti::NiftiError => Nifti,
    csv::Error => Csv,
    roxmltree::Error => Xml
);
