//! 跨空间 ROI 注册器.
//!
//! ROI 可以来自原生空间, 结构空间, 标准空间的掩膜文件, 或标准空间图谱中的标签.
//! 注册器将它们统一变换到原生空间并二值化, 按加入顺序保存.
//!
//! # 注意
//!
//! 1. 结构空间 ROI 只经过 struct -> native 仿射变换 (作为 premat).
//! 2. 标准空间 ROI 先经过 std -> struct 形变场, 再经过 struct -> native 仿射变换 (作为 postmat).
//! 3. 二值化规则为变换后的值严格大于阈值. 图谱 ROI 的阈值是 `[0, 100]` 尺度,
//!   其他 ROI 是 `[0, 1]` 尺度.

use log::info;

use crate::atlas::{Atlas, AtlasService};
use crate::transform::{SpaceTransform, Warp, WarpRequest};
use crate::{Affine, Mask3d, RoiResult, Volume};

/// ROI 的来源空间.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Space {
    /// 原生 (采集) 空间.
    Native,

    /// 结构 (T1) 空间.
    Structural,

    /// 标准 (MNI) 空间.
    Standard,
}

/// 一个已注册的 ROI.
#[derive(Debug, Clone)]
pub struct Roi {
    /// 显示名称. 不保证唯一.
    pub name: String,

    /// 来源空间.
    pub space: Space,

    /// 原生空间二值掩膜. 形状与原生空间参考图像一致.
    pub mask_native: Mask3d,

    /// 标准空间中的原始 ROI 图像. 仅在 [`Retain::standard`] 时保存.
    pub standard: Option<Volume>,

    /// 变换到原生空间但未二值化的图像. 仅在 [`Retain::native`] 时保存,
    /// 原生空间 ROI 没有该图像.
    pub native: Option<Volume>,
}

/// 注册时额外保留哪些中间图像.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Retain {
    /// 保留原生空间中未二值化的图像.
    pub native: bool,

    /// 保留标准空间 ROI 的原始图像.
    pub standard: bool,
}

/// 跨空间 ROI 注册器.
pub struct Registrar<'a, T: SpaceTransform + ?Sized> {
    transform: &'a T,
    native_ref: &'a Volume,
    struct2native: &'a Affine,
    std2struct: &'a Warp,
    retain: Retain,
    rois: Vec<Roi>,
}

impl<'a, T: SpaceTransform + ?Sized> Registrar<'a, T> {
    /// 创建空注册器.
    ///
    /// `native_ref` 决定原生空间网格, `struct2native` 为结构空间到原生空间的仿射矩阵,
    /// `std2struct` 为标准空间到结构空间的形变场.
    pub fn new(
        transform: &'a T,
        native_ref: &'a Volume,
        struct2native: &'a Affine,
        std2struct: &'a Warp,
        retain: Retain,
    ) -> Self {
        Self {
            transform,
            native_ref,
            struct2native,
            std2struct,
            retain,
            rois: Vec::new(),
        }
    }

    /// 加入原生空间 ROI. 非零体素属于 ROI.
    pub fn add_native(&mut self, name: &str, roi: &Volume) {
        self.push(Roi {
            name: name.to_owned(),
            space: Space::Native,
            mask_native: roi.nonzero_mask(),
            standard: None,
            native: None,
        });
    }

    /// 加入结构空间 ROI, 变换后按 `threshold` 二值化.
    pub fn add_struct(&mut self, name: &str, roi: &Volume, threshold: f64) -> RoiResult<()> {
        let request = WarpRequest::new(roi, self.native_ref).premat(self.struct2native);
        let native = self.transform.apply(&request)?;
        self.push(Roi {
            name: name.to_owned(),
            space: Space::Structural,
            mask_native: native.threshold_mask(threshold),
            standard: None,
            native: self.retain.native.then_some(native),
        });
        Ok(())
    }

    /// 加入标准空间 ROI, 变换后按 `threshold` 二值化.
    pub fn add_standard(&mut self, name: &str, roi: Volume, threshold: f64) -> RoiResult<()> {
        let request = WarpRequest::new(&roi, self.native_ref)
            .warp(self.std2struct)
            .postmat(self.struct2native);
        let native = self.transform.apply(&request)?;
        self.push(Roi {
            name: name.to_owned(),
            space: Space::Standard,
            mask_native: native.threshold_mask(threshold),
            standard: self.retain.standard.then_some(roi),
            native: self.retain.native.then_some(native),
        });
        Ok(())
    }

    /// 将图谱的每个标签作为标准空间 ROI 加入. `threshold` 为 `[0, 100]` 尺度.
    pub fn add_atlas(&mut self, atlas: &Atlas, threshold: f64) -> RoiResult<()> {
        for label in atlas.labels() {
            self.add_standard(&label.name, atlas.label_map(label)?, threshold)?;
        }
        Ok(())
    }

    /// 从图谱服务加载图谱 `atlas_id` 并加入其所有标签.
    pub fn add_atlas_from<A: AtlasService + ?Sized>(
        &mut self,
        service: &A,
        atlas_id: &str,
        resolution_mm: f64,
        threshold: f64,
    ) -> RoiResult<()> {
        info!("{}", atlas_banner(atlas_id, resolution_mm, threshold));
        let atlas = service.load(atlas_id, resolution_mm)?;
        self.add_atlas(&atlas, threshold)
    }

    fn push(&mut self, roi: Roi) {
        info!(" - {}...DONE", roi.name);
        self.rois.push(roi);
    }

    /// 已注册的 ROI, 按加入顺序.
    #[inline]
    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    /// 消费自我, 获得全部 ROI.
    #[inline]
    pub fn into_rois(self) -> Vec<Roi> {
        self.rois
    }
}

/// 加入图谱时的日志. 阈值按 `[0, 1]` 尺度显示.
fn atlas_banner(atlas_id: &str, resolution_mm: f64, threshold: f64) -> String {
    format!(
        "Adding ROIs from standard atlas: {atlas_id} (resolution={resolution_mm}mm, thresholding at {:.2})",
        threshold / 100.0
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::atlas::{AtlasKind, AtlasLabel};
    use crate::NiftiHeaderAttr;
    use ndarray::{Array3, Array4};
    use nifti::NiftiHeader;

    /// 记录每次请求, 并将图像原样 (乘以 `gain`) 放到参考网格上.
    struct Recorder {
        gain: f32,
        calls: RefCell<Vec<(bool, bool, bool)>>,
    }

    impl SpaceTransform for Recorder {
        fn apply(&self, r: &WarpRequest<'_>) -> RoiResult<Volume> {
            self.calls.borrow_mut().push((
                r.warp.is_some(),
                r.premat.is_some(),
                r.postmat.is_some(),
            ));
            let data = r.image.data().mapv(|v| v * self.gain);
            Volume::from_parts(r.reference.header(), data)
        }

        fn invert_warp(&self, warp: &Warp, _: &Volume) -> RoiResult<Warp> {
            Warp::from_file(warp.path())
        }
    }

    fn volume(v: Vec<f32>) -> Volume {
        let n = v.len();
        Volume::from_parts(
            &NiftiHeader::default(),
            Array3::from_shape_vec((1, 1, n), v).unwrap(),
        )
        .unwrap()
    }

    fn mask_of(roi: &Roi) -> Vec<bool> {
        roi.mask_native.iter().copied().collect()
    }

    fn fixture() -> (tempfile::TempDir, Warp) {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("warp.nii.gz");
        volume(vec![0.0]).save(&p).unwrap();
        let w = Warp::from_file(&p).unwrap();
        (dir, w)
    }

    #[test]
    fn test_transform_choice_per_space() {
        let (_dir, warp) = fixture();
        let t = Recorder {
            gain: 1.0,
            calls: RefCell::new(Vec::new()),
        };
        let reference = volume(vec![0.0; 3]);
        let mat = Affine::identity();
        let mut reg = Registrar::new(&t, &reference, &mat, &warp, Retain::default());

        reg.add_native("n", &volume(vec![0.0, 2.0, -1.0]));
        reg.add_struct("s", &volume(vec![0.2, 0.5, 0.7]), 0.5).unwrap();
        reg.add_standard("m", volume(vec![0.6, 0.4, 0.0]), 0.5).unwrap();

        // (warp, premat, postmat)
        assert_eq!(*t.calls.borrow(), [(false, true, false), (true, false, true)]);

        let rois = reg.into_rois();
        assert_eq!(rois.len(), 3);
        assert_eq!(mask_of(&rois[0]), [false, true, true]);
        assert_eq!(mask_of(&rois[1]), [false, false, true]);
        assert_eq!(mask_of(&rois[2]), [true, false, false]);
        assert_eq!(rois[0].space, Space::Native);
        assert!(rois.iter().all(|r| r.native.is_none() && r.standard.is_none()));
    }

    #[test]
    fn test_binarized_voxels_exceed_threshold() {
        let (_dir, warp) = fixture();
        let t = Recorder {
            gain: 0.5,
            calls: RefCell::new(Vec::new()),
        };
        let reference = volume(vec![0.0; 6]);
        let mat = Affine::identity();
        let retain = Retain {
            native: true,
            standard: true,
        };
        let mut reg = Registrar::new(&t, &reference, &mat, &warp, retain);
        reg.add_standard("m", volume(vec![0.1, 0.3, 0.6, 1.2, 1.0, 2.0]), 0.5)
            .unwrap();

        let roi = &reg.rois()[0];
        let native = roi.native.as_ref().unwrap();
        assert!(roi.standard.is_some());
        for (&m, &v) in roi.mask_native.iter().zip(native.data().iter()) {
            assert_eq!(m, v as f64 > 0.5);
        }
        assert_eq!(mask_of(roi), [false, false, false, true, false, true]);
    }

    #[test]
    fn test_atlas_banner_uses_fraction() {
        assert_eq!(
            atlas_banner("harvardoxford-cortical", 2.0, 50.0),
            "Adding ROIs from standard atlas: harvardoxford-cortical (resolution=2mm, thresholding at 0.50)"
        );
    }

    #[test]
    fn test_atlas_labels_in_order() {
        let (_dir, warp) = fixture();
        let t = Recorder {
            gain: 1.0,
            calls: RefCell::new(Vec::new()),
        };
        let data = Array4::from_shape_vec(
            (1, 1, 3, 2),
            vec![80.0, 10.0, 50.0, 51.0, 20.0, 90.0],
        )
        .unwrap();
        let labels = vec![
            AtlasLabel {
                index: 0,
                name: "Frontal Pole".into(),
            },
            AtlasLabel {
                index: 1,
                name: "Insular Cortex".into(),
            },
        ];
        let atlas = Atlas::new(
            "test",
            "Test",
            AtlasKind::Probabilistic,
            labels,
            NiftiHeader::default(),
            data,
        );
        let reference = volume(vec![0.0; 3]);
        let mat = Affine::identity();
        let mut reg = Registrar::new(&t, &reference, &mat, &warp, Retain::default());
        reg.add_atlas(&atlas, 50.0).unwrap();

        let rois = reg.rois();
        assert_eq!(rois[0].name, "Frontal Pole");
        assert_eq!(mask_of(&rois[0]), [true, false, false]);
        assert_eq!(rois[1].name, "Insular Cortex");
        assert_eq!(mask_of(&rois[1]), [false, true, true]);
        assert!(rois.iter().all(|r| r.space == Space::Standard));
    }
}
