use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use super::{SpaceTransform, Warp, WarpRequest};
use crate::{resolve_image, Affine, RoiError, RoiResult, Volume};

const APPLYWARP: &str = "applywarp";
const INVWARP: &str = "invwarp";

/// 调用 FSL `applywarp`/`invwarp` 的变换引擎.
///
/// 每次调用都在独立的临时目录中交换数据, 无论成功与否, 目录都会在返回前删除
/// (由 [`FslTransform::invert_warp`] 生成的形变场除外, 它随 [`Warp`] 一起释放).
#[derive(Debug, Clone, Default)]
pub struct FslTransform {
    bin_dir: Option<PathBuf>,
}

impl FslTransform {
    /// 从 `PATH` 中查找 FSL 程序.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用 `$FSLDIR/bin` 下的 FSL 程序.
    pub fn with_fsl_dir<P: AsRef<Path>>(fsl_dir: P) -> Self {
        Self {
            bin_dir: Some(fsl_dir.as_ref().join("bin")),
        }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn run(&self, name: &str, mut cmd: Command) -> RoiResult<()> {
        debug!("Running {cmd:?}");
        let output = cmd.output()?;
        if output.status.success() {
            return Ok(());
        }
        Err(RoiError::Transform {
            program: name.to_owned(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// 将图像落盘供外部程序读取. 来自文件且未修改的图像直接使用原文件.
fn staged(image: &Volume, scratch: &Path, name: &str) -> RoiResult<PathBuf> {
    if let Some(p) = image.source() {
        return Ok(p.to_owned());
    }
    let p = scratch.join(format!("{name}.nii.gz"));
    image.save(&p)?;
    Ok(p)
}

fn staged_mat(mat: &Affine, scratch: &Path, name: &str) -> RoiResult<PathBuf> {
    let p = scratch.join(format!("{name}.mat"));
    std::fs::write(&p, mat.to_fsl_text())?;
    Ok(p)
}

/// `--name=value` 形式的参数.
fn flag(name: &str, value: &Path) -> String {
    format!("--{name}={}", value.display())
}

impl SpaceTransform for FslTransform {
    fn apply(&self, request: &WarpRequest<'_>) -> RoiResult<Volume> {
        let scratch = tempfile::tempdir()?;
        let dir = scratch.path();
        let input = staged(request.image, dir, "in")?;
        let reference = staged(request.reference, dir, "ref")?;
        let out = dir.join("out");

        let mut cmd = Command::new(self.program(APPLYWARP));
        cmd.arg(flag("in", &input))
            .arg(flag("ref", &reference))
            .arg(flag("out", &out));
        if let Some(w) = request.warp {
            cmd.arg(flag("warp", w.path()));
        }
        if let Some(m) = request.premat {
            cmd.arg(flag("premat", &staged_mat(m, dir, "premat")?));
        }
        if let Some(m) = request.postmat {
            cmd.arg(flag("postmat", &staged_mat(m, dir, "postmat")?));
        }
        cmd.args([
            "--rel",
            "--super",
            "--superlevel=a",
            "--interp=trilinear",
            "--paddingsize=1",
        ]);
        self.run(APPLYWARP, cmd)?;

        // 输出扩展名取决于 FSLOUTPUTTYPE
        Ok(Volume::open_resolved(&out)?.without_source())
    }

    fn invert_warp(&self, warp: &Warp, reference: &Volume) -> RoiResult<Warp> {
        let scratch = tempfile::tempdir()?;
        let reference = staged(reference, scratch.path(), "ref")?;
        let out = scratch.path().join("inv_warp");

        let mut cmd = Command::new(self.program(INVWARP));
        cmd.arg(flag("warp", warp.path()))
            .arg(flag("ref", &reference))
            .arg(flag("out", &out));
        self.run(INVWARP, cmd)?;

        let path = resolve_image(&out)?;
        Ok(Warp::in_scratch(path, scratch))
    }
}
