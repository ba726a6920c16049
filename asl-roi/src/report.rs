//! 统计表格与附属 ROI 图像的输出.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::debug;
use nifti::NiftiHeader;

use crate::consts::names::{MASKS_NATIVE_DIR, OUTPUT_TABLE, ROIS_MNI_DIR, ROIS_NATIVE_DIR};
use crate::consts::NIFTI_EXT;
use crate::roi::Roi;
use crate::stats::{Cell, StatFields};
use crate::{save_mask, RoiResult, Volume};

/// 名称列的表头.
const NAME_COLUMN: &str = "name";

/// 输出表格中的一行, 对应一个 ROI.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRow {
    /// ROI 名称.
    pub name: String,

    /// 所有数据集的统计量, 按数据集顺序.
    pub fields: StatFields,
}

impl StatsRow {
    /// 不含统计量的空行.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: StatFields::new(),
        }
    }

    /// 合并一个数据集的统计量.
    #[inline]
    pub fn merge(&mut self, fields: StatFields) {
        self.fields.merge(fields);
    }

    /// 本行的表头: `name` 以及所有统计量列.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(NAME_COLUMN.to_owned())
            .chain(self.fields.iter().map(|(c, _)| c.to_owned()))
            .collect()
    }

    /// 按 `header` 的列顺序输出本行. 本行没有的列输出空字符串.
    pub fn record(&self, header: &[String]) -> Vec<String> {
        header
            .iter()
            .map(|col| {
                if col == NAME_COLUMN {
                    self.name.clone()
                } else {
                    self.fields.get(col).map(format_cell).unwrap_or_default()
                }
            })
            .collect()
    }
}

/// 单元格的文本形式. `None` 为空字符串, 非有限值写作 `nan`, `inf`, `-inf`.
pub fn format_cell(cell: Cell) -> String {
    match cell {
        Cell::Count(n) => n.to_string(),
        Cell::Value(Some(v)) if v.is_nan() => "nan".to_owned(),
        Cell::Value(Some(v)) => v.to_string(),
        Cell::Value(None) => String::new(),
    }
}

/// 附属图像的文件名: 空格替换为 `_`, 删除逗号, 转为小写, 加上 `.nii.gz`.
pub fn sidecar_file_name(roi_name: &str) -> String {
    let stem: String = roi_name
        .chars()
        .filter(|&c| c != ',')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    format!("{}{NIFTI_EXT}", stem.to_lowercase())
}

/// 需要保存的附属图像.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SidecarKinds {
    /// 原生空间中未二值化的 ROI 图像, 保存到 `rois_native/`.
    pub native_rois: bool,

    /// 原生空间二值掩膜, 保存到 `masks_native/`.
    pub native_masks: bool,

    /// 标准空间 ROI 图像, 保存到 `rois_mni/`.
    pub mni_rois: bool,
}

impl SidecarKinds {
    /// 是否不需要保存任何图像.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.native_rois || self.native_masks || self.mni_rois)
    }
}

fn save_in(output_dir: &Path, sub: &str, file_name: &str, image: &Volume) -> RoiResult<()> {
    let dir = output_dir.join(sub);
    std::fs::create_dir_all(&dir)?;
    image.save(dir.join(file_name))
}

/// 保存 `roi` 的附属图像. 不存在的图像 (如原生空间 ROI 的未二值化图像) 会被跳过.
///
/// 二值掩膜使用原生空间参考图像的 `native_header`.
pub fn save_sidecars(
    roi: &Roi,
    native_header: &NiftiHeader,
    output_dir: &Path,
    kinds: SidecarKinds,
) -> RoiResult<()> {
    let file_name = sidecar_file_name(&roi.name);
    if kinds.native_rois {
        if let Some(native) = &roi.native {
            save_in(output_dir, ROIS_NATIVE_DIR, &file_name, native)?;
        }
    }
    if kinds.native_masks {
        let dir = output_dir.join(MASKS_NATIVE_DIR);
        std::fs::create_dir_all(&dir)?;
        save_mask(&roi.mask_native, native_header, dir.join(&file_name))?;
    }
    if kinds.mni_rois {
        if let Some(standard) = &roi.standard {
            save_in(output_dir, ROIS_MNI_DIR, &file_name, standard)?;
        }
    }
    Ok(())
}

/// 将所有行写成 CSV. 表头取自第一行, 没有任何行时不输出内容.
pub fn write_table<W: Write>(rows: &[StatsRow], writer: W) -> RoiResult<()> {
    let mut table = TableWriter::new(writer);
    for row in rows {
        table.write_row(row)?;
    }
    table.finish()
}

/// 逐行写入的 CSV 表格. 表头在写入第一行时确定.
struct TableWriter<W: Write> {
    csv: csv::Writer<W>,
    header: Option<Vec<String>>,
}

impl<W: Write> TableWriter<W> {
    fn new(writer: W) -> Self {
        Self {
            csv: csv::Writer::from_writer(writer),
            header: None,
        }
    }

    fn write_row(&mut self, row: &StatsRow) -> RoiResult<()> {
        if self.header.is_none() {
            let h = row.header();
            self.csv.write_record(&h)?;
            self.header = Some(h);
        }
        let header = self.header.as_deref().unwrap_or_default();
        self.csv.write_record(row.record(header))?;
        Ok(())
    }

    fn finish(mut self) -> RoiResult<()> {
        self.csv.flush()?;
        Ok(())
    }
}

/// 在 `output_dir` 中写出统计表格, 并按 `kinds` 保存各 ROI 的附属图像.
///
/// `rows` 与 `rois` 一一对应. 表格行与附属图像按 ROI 顺序交替写出.
pub fn write_report(
    output_dir: &Path,
    rows: &[StatsRow],
    rois: &[Roi],
    native_header: &NiftiHeader,
    kinds: SidecarKinds,
) -> RoiResult<()> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(OUTPUT_TABLE);
    debug!("Writing {}", path.display());

    let mut table = TableWriter::new(File::create(&path)?);
    for (row, roi) in rows.iter().zip(rois) {
        table.write_row(row)?;
        save_sidecars(roi, native_header, output_dir, kinds)?;
    }
    table.finish()
}
