use std::ops::Index;
use std::path::{Path, PathBuf};

use ndarray::{Array3, Array4, ArrayD, ArrayView3, Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::NIFTI_EXT;
use crate::error::{RoiError, RoiResult};
use crate::{Idx3d, Mask3d};

pub mod affine;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 不带扩展名的 FSL 风格图像路径会依次尝试这些扩展名.
const CANDIDATE_EXTS: [&str; 2] = [NIFTI_EXT, ".nii"];

/// nii 格式 3D 图像, 包括 header 和体素值. 体素值以 `f32` 保存.
///
/// 数据按 NIfTI 的体素顺序 `(i, j, k)` 索引. 读入时已经应用了
/// `scl_slope`/`scl_inter` 缩放, 因此内部 header 的缩放参数总是恒等变换.
#[derive(Debug, Clone)]
pub struct Volume {
    header: BoxedHeader,
    data: Array3<f32>,
    source: Option<PathBuf>,
}

/// nii 文件 header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// header 中记录的前三维形状.
    #[inline]
    fn header_shape(&self) -> Idx3d {
        let [_, x, y, z, ..] = self.header().dim;
        (x as usize, y as usize, z as usize)
    }

    /// 获取单个体素分辨率, 以毫米为单位.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [x as f64, y as f64, z as f64]
    }
}

impl NiftiHeaderAttr for NiftiHeader {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        self
    }
}

impl NiftiHeaderAttr for Volume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 打开 nii 文件格式的 3D 图像. `path` 为 `.nii` 或 `.nii.gz` 文件的本地路径.
    ///
    /// 多于三维但额外维度全部为 1 的图像会被压缩为 3D; 其他情况返回
    /// `Err(RoiError::ImageDimension)`.
    pub fn open<P: AsRef<Path>>(path: P) -> RoiResult<Self> {
        let path = path.as_ref();
        let obj = ReaderOptions::new().read_file(path)?;
        let mut header = Box::new(obj.header().clone());
        let data = squeeze_to_3d(obj.into_volume().into_ndarray::<f32>()?)?;

        // into_ndarray 已经应用了缩放
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;

        Ok(Self {
            header,
            data,
            source: Some(path.to_owned()),
        })
    }

    /// 同 `Volume::open`, 但 `base` 可以是不带扩展名的 FSL 风格路径.
    #[inline]
    pub fn open_resolved<P: AsRef<Path>>(base: P) -> RoiResult<Self> {
        Self::open(resolve_image(base)?)
    }

    /// 以 `header` 为参考, 直接从体素数据创建图像. header 中的维度信息会被改写为
    /// `data` 的形状.
    ///
    /// NIfTI-1 的每个维度以 `u16` 记录, 任一维度超过 `u16::MAX` 时返回
    /// `Err(RoiError::ImageDimension)`.
    pub fn from_parts(header: &NiftiHeader, data: Array3<f32>) -> RoiResult<Self> {
        let (x, y, z) = data.dim();
        let dim = |n: usize| u16::try_from(n).map_err(|_| RoiError::ImageDimension(vec![x, y, z]));

        let mut header = Box::new(header.clone());
        header.dim = [3, dim(x)?, dim(y)?, dim(z)?, 1, 1, 1, 1];
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        Ok(Self {
            header,
            data,
            source: None,
        })
    }

    /// 图像形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 图像来自的文件. 仅当图像由文件读入且未经修改时存在.
    #[inline]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 丢弃来源文件信息. 用于读入临时文件的场合.
    #[inline]
    pub fn without_source(mut self) -> Self {
        self.source = None;
        self
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 体素值严格大于 `threshold` 的位置为 `true`. NaN 总是 `false`.
    pub fn threshold_mask(&self, threshold: f64) -> Mask3d {
        self.data.mapv(|v| v as f64 > threshold)
    }

    /// 体素值非零的位置为 `true`. 用于直接读入的二值 ROI 文件.
    pub fn nonzero_mask(&self) -> Mask3d {
        self.data.mapv(|v| v != 0.0)
    }

    /// 以自身 header 为参考, 将图像保存到 `path`. 扩展名为 `.gz` 时自动压缩.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> RoiResult<()> {
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&self.data)?;
        Ok(())
    }
}

/// 将布尔掩膜以 `u8` (0/1) 格式保存到 `path`, 并携带 `header` 的空间信息.
pub fn save_mask<P: AsRef<Path>>(mask: &Mask3d, header: &NiftiHeader, path: P) -> RoiResult<()> {
    let data: Array3<u8> = mask.mapv(u8::from);
    WriterOptions::new(path.as_ref())
        .reference_header(header)
        .write_nifti(&data)?;
    Ok(())
}

/// 解析 FSL 风格的图像路径.
///
/// 依次尝试 `base`, `base.nii.gz`, `base.nii`, 返回第一个存在的文件.
/// 都不存在时返回 `Err(RoiError::MissingInput)`.
pub fn resolve_image<P: AsRef<Path>>(base: P) -> RoiResult<PathBuf> {
    let base = base.as_ref();
    if base.is_file() {
        return Ok(base.to_owned());
    }
    CANDIDATE_EXTS
        .iter()
        .map(|ext| {
            let mut s = base.as_os_str().to_owned();
            s.push(ext);
            PathBuf::from(s)
        })
        .find(|p| p.is_file())
        .ok_or_else(|| RoiError::MissingInput(base.to_owned()))
}

/// 读入 3D 或 4D 图像, 统一为 4D 数组. 3D 图像视为只有一个 volume.
pub(crate) fn open_4d<P: AsRef<Path>>(path: P) -> RoiResult<(NiftiHeader, Array4<f32>)> {
    let obj = ReaderOptions::new().read_file(path.as_ref())?;
    let mut header = obj.header().clone();
    let mut data = obj.into_volume().into_ndarray::<f32>()?;
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    if data.ndim() == 3 {
        data = data.insert_axis(Axis(3));
    }
    let shape = data.shape().to_vec();
    let data = data
        .into_dimensionality::<Ix4>()
        .map_err(|_| RoiError::ImageDimension(shape))?;
    Ok((header, data))
}

/// 去掉末尾长度为 1 的维度, 得到 3D 数组.
fn squeeze_to_3d(mut data: ArrayD<f32>) -> RoiResult<Array3<f32>> {
    while data.ndim() > 3 && data.len_of(Axis(data.ndim() - 1)) == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    let shape = data.shape().to_vec();
    data.into_dimensionality::<Ix3>()
        .map_err(|_| RoiError::ImageDimension(shape))
}
