#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对 ASL (arterial spin labeling) 灌注成像流程的输出, 在原生空间
//! (采集空间) 中计算各 ROI 的区域统计量.
//!
//! ROI 可以定义在三个坐标空间中: 原生空间, 结构空间 (T1) 和标准空间 (MNI).
//! 本 crate 负责将所有 ROI 变换到原生空间, 根据是否存在部分容积校正 (PVC)
//! 结果选择需要统计的灌注/方差图像对, 然后对每个 (ROI, 数据集) 组合计算统计量.
//!
//! # 注意
//!
//! 1. 该 crate 不实现任何配准或重采样算法. 图像变换委托给外部变换引擎
//!   (见 [`transform::SpaceTransform`], 默认实现调用 FSL 的 `applywarp`/`invwarp`).
//! 2. 图谱的发现与概率图提取同样委托给外部图谱服务 (见 [`atlas::AtlasService`]).
//! 3. 整个流程是单线程, 单次执行的批处理. 任何一步出错都会直接终止, 不做重试.
//!
//! # 模块
//!
//! - `stats`: 统计量注册表, 以及对单个 (ROI, 数据集) 组合的样本提取与统计.
//! - `roi`: 跨空间 ROI 注册器.
//! - `dataset`: 根据 PVC 结果是否存在, 选择灌注数据集与 GM/WM 掩膜策略.
//! - `run`: 整体流程编排.
//! - `report`: 统计表格与附属 ROI 图像的输出.

use ndarray::Array3;

/// 三维索引, 同时也作为 3D 图像的形状.
pub type Idx3d = (usize, usize, usize);

/// 原生空间中的布尔体素掩膜.
pub type Mask3d = Array3<bool>;

/// NIfTI 图像与仿射矩阵的基础数据结构.
mod data;

pub use data::affine::Affine;
pub use data::{resolve_image, save_mask, NiftiHeaderAttr, Volume};

pub mod atlas;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod prelude;
pub mod report;
pub mod roi;
pub mod run;
pub mod stats;
pub mod transform;

pub use error::{RoiError, RoiResult};
