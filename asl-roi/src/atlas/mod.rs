//! 标准空间图谱.
//!
//! 图谱的发现与解析由 [`AtlasService`] 完成. 对 ROI 注册器而言, 图谱只是一组
//! 带名称的标签, 每个标签对应一张 `[0, 100]` 尺度的标准空间图像.

use ndarray::{Array4, Axis};
use nifti::NiftiHeader;

use crate::{NiftiHeaderAttr, RoiError, RoiResult, Volume};

mod fsl;

pub use fsl::{AtlasDescription, FslAtlasRegistry};

/// 标签图中前景的取值, 与概率图谱的满概率一致.
const LABEL_FOREGROUND: f32 = 100.0;

/// 图谱类型.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AtlasKind {
    /// 概率图谱. 第 `i` 个 volume 是标签 `i` 的概率图, 取值 `[0, 100]`.
    Probabilistic,

    /// 离散标签图谱. 单个 volume, 体素值为标签索引加 1, 0 为背景.
    Label,
}

/// 图谱中的一个区域.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasLabel {
    /// 标签索引.
    pub index: usize,

    /// 区域名称, 同时用作 ROI 名称.
    pub name: String,
}

/// 已读入内存的图谱.
#[derive(Debug, Clone)]
pub struct Atlas {
    id: String,
    name: String,
    kind: AtlasKind,
    labels: Vec<AtlasLabel>,
    header: Box<NiftiHeader>,
    data: Array4<f32>,
}

impl NiftiHeaderAttr for Atlas {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Atlas {
    /// 由各部分组装图谱. 3D 图像需以长度为 1 的第 4 维给出.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: AtlasKind,
        labels: Vec<AtlasLabel>,
        header: NiftiHeader,
        data: Array4<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            labels,
            header: Box::new(header),
            data,
        }
    }

    /// 图谱标识, 如 `harvardoxford-cortical`.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 可读名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 图谱类型.
    #[inline]
    pub fn kind(&self) -> AtlasKind {
        self.kind
    }

    /// 全部标签, 按描述文件中的顺序.
    #[inline]
    pub fn labels(&self) -> &[AtlasLabel] {
        &self.labels
    }

    /// 标签 `label` 的标准空间图像, 取值 `[0, 100]`.
    ///
    /// 概率图谱返回第 `label.index` 个 volume; 标签图谱在体素值等于
    /// `label.index + 1` 处为 100, 其余为 0.
    pub fn label_map(&self, label: &AtlasLabel) -> RoiResult<Volume> {
        let map = match self.kind {
            AtlasKind::Probabilistic => {
                let n = self.data.len_of(Axis(3));
                if label.index >= n {
                    return Err(RoiError::Atlas(format!(
                        "label {} (`{}`) out of range, atlas `{}` has {n} volumes",
                        label.index, label.name, self.id
                    )));
                }
                self.data.index_axis(Axis(3), label.index).to_owned()
            }
            AtlasKind::Label => {
                // 标签索引从 0 开始, 图像中 0 为背景
                let value = (label.index + 1) as f32;
                self.data
                    .index_axis(Axis(3), 0)
                    .mapv(|v| if v == value { LABEL_FOREGROUND } else { 0.0 })
            }
        };
        Volume::from_parts(&self.header, map)
    }
}

/// 外部图谱服务.
pub trait AtlasService {
    /// 按标识加载图谱, 选择与 `resolution_mm` 最接近的分辨率.
    fn load(&self, atlas_id: &str, resolution_mm: f64) -> RoiResult<Atlas>;
}

impl<T: AtlasService + ?Sized> AtlasService for &T {
    #[inline]
    fn load(&self, atlas_id: &str, resolution_mm: f64) -> RoiResult<Atlas> {
        (**self).load(atlas_id, resolution_mm)
    }
}
