//! 空间变换引擎.
//!
//! 本 crate 不实现重采样, 所有变换通过 [`SpaceTransform`] 委托给外部引擎.
//! ROI 注册器只负责选择形变场与前/后仿射矩阵, 以及对结果二值化.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{resolve_image, Affine, RoiResult, Volume};

mod fsl;

pub use fsl::FslTransform;

/// 非线性形变场.
///
/// 形变场是 4D 图像, 只以文件形式在变换引擎之间传递. 由引擎生成的形变场
/// 持有其临时目录, 随 `Warp` 一起释放.
#[derive(Debug)]
pub struct Warp {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl Warp {
    /// 引用已有的形变场文件. `base` 可以是不带扩展名的 FSL 风格路径.
    pub fn from_file<P: AsRef<Path>>(base: P) -> RoiResult<Self> {
        Ok(Self {
            path: resolve_image(base)?,
            _scratch: None,
        })
    }

    /// 位于临时目录 `scratch` 中的形变场. `scratch` 在 `Warp` 被 drop 时删除.
    pub fn in_scratch(path: PathBuf, scratch: TempDir) -> Self {
        Self {
            path,
            _scratch: Some(scratch),
        }
    }

    /// 形变场文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 一次重采样请求: 将 `image` 变换到 `reference` 的体素网格上.
///
/// 变换顺序为 `premat`, `warp`, `postmat`.
#[derive(Debug, Clone, Copy)]
pub struct WarpRequest<'a> {
    /// 待变换图像.
    pub image: &'a Volume,

    /// 参考图像, 决定输出网格.
    pub reference: &'a Volume,

    /// 非线性形变场 (相对位移).
    pub warp: Option<&'a Warp>,

    /// 形变前的仿射矩阵.
    pub premat: Option<&'a Affine>,

    /// 形变后的仿射矩阵.
    pub postmat: Option<&'a Affine>,
}

impl<'a> WarpRequest<'a> {
    /// 不带任何变换的请求.
    pub fn new(image: &'a Volume, reference: &'a Volume) -> Self {
        Self {
            image,
            reference,
            warp: None,
            premat: None,
            postmat: None,
        }
    }

    /// 设置形变场.
    #[inline]
    pub fn warp(mut self, warp: &'a Warp) -> Self {
        self.warp = Some(warp);
        self
    }

    /// 设置前置仿射矩阵.
    #[inline]
    pub fn premat(mut self, premat: &'a Affine) -> Self {
        self.premat = Some(premat);
        self
    }

    /// 设置后置仿射矩阵.
    #[inline]
    pub fn postmat(mut self, postmat: &'a Affine) -> Self {
        self.postmat = Some(postmat);
        self
    }
}

/// 外部变换引擎.
pub trait SpaceTransform {
    /// 按 `request` 重采样, 返回位于参考网格上的图像.
    fn apply(&self, request: &WarpRequest<'_>) -> RoiResult<Volume>;

    /// 求形变场的逆. `reference` 为原形变场源空间的参考图像.
    fn invert_warp(&self, warp: &Warp, reference: &Volume) -> RoiResult<Warp>;
}

impl<T: SpaceTransform + ?Sized> SpaceTransform for &T {
    #[inline]
    fn apply(&self, request: &WarpRequest<'_>) -> RoiResult<Volume> {
        (**self).apply(request)
    }

    #[inline]
    fn invert_warp(&self, warp: &Warp, reference: &Volume) -> RoiResult<Warp> {
        (**self).invert_warp(warp, reference)
    }
}
