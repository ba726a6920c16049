use std::path::{Path, PathBuf};

use log::debug;
use nifti::NiftiHeader;
use ordered_float::OrderedFloat;
use roxmltree::{Document, Node};

use super::{Atlas, AtlasKind, AtlasLabel, AtlasService};
use crate::data::open_4d;
use crate::{resolve_image, NiftiHeaderAttr, RoiError, RoiResult};

/// FSL 图谱描述文件 (`$FSLDIR/data/atlases/*.xml`) 的内容.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasDescription {
    /// 图谱标识, 即小写的描述文件名 (不含扩展名).
    pub id: String,

    /// 可读名称.
    pub name: String,

    /// 图谱类型.
    pub kind: AtlasKind,

    /// 各分辨率的图像, 不带扩展名.
    pub images: Vec<PathBuf>,

    /// 区域标签.
    pub labels: Vec<AtlasLabel>,
}

/// 基于 FSL 图谱目录的图谱服务.
#[derive(Debug, Clone)]
pub struct FslAtlasRegistry {
    dir: PathBuf,
}

impl FslAtlasRegistry {
    /// 使用图谱目录 `dir`, 即包含 `*.xml` 描述文件的目录.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }

    /// 使用 `$FSLDIR/data/atlases`.
    pub fn from_fsl_dir<P: AsRef<Path>>(fsl_dir: P) -> Self {
        Self::new(fsl_dir.as_ref().join("data").join("atlases"))
    }

    /// 查找并解析标识为 `atlas_id` 的图谱描述文件.
    pub fn describe(&self, atlas_id: &str) -> RoiResult<AtlasDescription> {
        let wanted = atlas_id.to_lowercase();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |e| e != "xml") {
                continue;
            }
            let id = match path.file_stem() {
                Some(s) => s.to_string_lossy().to_lowercase(),
                None => continue,
            };
            if id == wanted {
                debug!("Atlas `{id}` described by {}", path.display());
                let text = std::fs::read_to_string(&path)?;
                return parse_description(&id, &text, &self.dir);
            }
        }
        Err(RoiError::Atlas(format!(
            "no atlas `{atlas_id}` in {}",
            self.dir.display()
        )))
    }
}

/// 解析描述文件. 图像路径相对于 `atlas_dir`.
pub fn parse_description(id: &str, xml: &str, atlas_dir: &Path) -> RoiResult<AtlasDescription> {
    let doc = Document::parse(xml)?;
    let header = child(doc.root_element(), "header")
        .ok_or_else(|| RoiError::Atlas(format!("atlas `{id}` has no <header>")))?;

    let name = child(header, "name")
        .and_then(|n| n.text())
        .map_or_else(|| id.to_owned(), |s| s.trim().to_owned());
    let kind = match child(header, "type").and_then(|n| n.text()).map(str::trim) {
        Some(t) if t.eq_ignore_ascii_case("probabilistic") => AtlasKind::Probabilistic,
        Some(t) if t.eq_ignore_ascii_case("label") => AtlasKind::Label,
        other => {
            return Err(RoiError::Atlas(format!(
                "atlas `{id}` has unknown type {other:?}"
            )))
        }
    };
    let images: Vec<PathBuf> = header
        .children()
        .filter(|n| n.has_tag_name("images"))
        .filter_map(|n| child(n, "imagefile").and_then(|f| f.text()))
        .map(|f| atlas_dir.join(f.trim().trim_start_matches('/')))
        .collect();
    if images.is_empty() {
        return Err(RoiError::Atlas(format!("atlas `{id}` lists no images")));
    }

    let labels = doc
        .descendants()
        .filter(|n| n.has_tag_name("label"))
        .map(|n| {
            let index = n
                .attribute("index")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| RoiError::Atlas(format!("atlas `{id}` has a label without index")))?;
            Ok(AtlasLabel {
                index,
                name: n.text().unwrap_or_default().trim().to_owned(),
            })
        })
        .collect::<RoiResult<Vec<_>>>()?;

    Ok(AtlasDescription {
        id: id.to_owned(),
        name,
        kind,
        images,
        labels,
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

impl AtlasService for FslAtlasRegistry {
    fn load(&self, atlas_id: &str, resolution_mm: f64) -> RoiResult<Atlas> {
        let desc = self.describe(atlas_id)?;

        let mut candidates = Vec::with_capacity(desc.images.len());
        for base in &desc.images {
            let path = resolve_image(base)?;
            let [res, ..] = NiftiHeader::from_file(&path)?.pix_dim();
            candidates.push((path, res));
        }
        let (path, res) = candidates
            .into_iter()
            .min_by_key(|(_, res)| OrderedFloat((res - resolution_mm).abs()))
            .ok_or_else(|| RoiError::Atlas(format!("atlas `{atlas_id}` lists no images")))?;
        debug!("Loading atlas `{atlas_id}` at {res}mm from {}", path.display());

        let (header, data) = open_4d(&path)?;
        Ok(Atlas::new(
            desc.id,
            desc.name,
            desc.kind,
            desc.labels,
            header,
            data,
        ))
    }
}
