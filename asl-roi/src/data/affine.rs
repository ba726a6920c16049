//! FSL 风格 4x4 仿射矩阵.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use nalgebra::Matrix4;

use crate::error::{RoiError, RoiResult};

/// FSL (FLIRT) 格式的 4x4 仿射矩阵. 文本格式为 4 行, 每行 4 个以空白分隔的数.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(Matrix4<f64>);

impl Affine {
    /// 单位矩阵.
    #[inline]
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// 从 FSL 文本解析. 空行会被忽略.
    pub fn parse(text: &str) -> RoiResult<Self> {
        let rows: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if rows.len() != 4 {
            return Err(RoiError::MatrixParse(format!(
                "expected 4 rows, found {}",
                rows.len()
            )));
        }
        let mut values = Vec::with_capacity(16);
        for (i, row) in rows.iter().enumerate() {
            let parsed = row
                .split_whitespace()
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| RoiError::MatrixParse(format!("bad number `{s}` in row {i}")))
                })
                .collect::<RoiResult<Vec<f64>>>()?;
            if parsed.len() != 4 {
                return Err(RoiError::MatrixParse(format!(
                    "expected 4 columns in row {i}, found {}",
                    parsed.len()
                )));
            }
            values.extend(parsed);
        }
        Ok(Self(Matrix4::from_row_slice(&values)))
    }

    /// 读取 FSL 矩阵文件.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RoiResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RoiError::MissingInput(path.to_owned()));
        }
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// 逆矩阵. 矩阵奇异时返回 `Err(RoiError::SingularMatrix)`.
    pub fn inverse(&self) -> RoiResult<Self> {
        self.0
            .try_inverse()
            .map(Self)
            .ok_or(RoiError::SingularMatrix)
    }

    /// 底层矩阵.
    #[inline]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    /// 转换为可以被 FSL 工具读取的文本.
    pub fn to_fsl_text(&self) -> String {
        let mut text = self
            .0
            .row_iter()
            .map(|row| row.iter().join(" "))
            .join("\n");
        text.push('\n');
        text
    }
}

impl From<Matrix4<f64>> for Affine {
    #[inline]
    fn from(m: Matrix4<f64>) -> Self {
        Self(m)
    }
}

impl FromStr for Affine {
    type Err = RoiError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Affine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_fsl_text())
    }
}
