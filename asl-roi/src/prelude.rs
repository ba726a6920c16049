//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Mask3d};

pub use crate::{resolve_image, save_mask, Affine, NiftiHeaderAttr, Volume};
pub use crate::{RoiError, RoiResult};

pub use crate::atlas::{Atlas, AtlasKind, AtlasLabel, AtlasService, FslAtlasRegistry};
pub use crate::dataset::{PerfusionDataset, Tissue};
pub use crate::report::{SidecarKinds, StatsRow};
pub use crate::roi::{Registrar, Retain, Roi, Space};
pub use crate::run::{run, RunConfig};
pub use crate::stats::{Cell, ExtractOptions, StatFields, StatRegistry};
pub use crate::transform::{FslTransform, SpaceTransform, Warp, WarpRequest};
