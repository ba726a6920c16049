use std::path::PathBuf;

use asl_roi::consts::DEFAULT_MIN_NVOXELS;
use asl_roi::report::SidecarKinds;
use asl_roi::run::RunConfig;
use clap::Parser;

/// Generates perfusion stats within various ROIs
#[derive(Debug, Parser)]
#[command(name = "roi_stats", version)]
pub struct Cli {
    /// OXFORD_ASL or OXASL output directory
    #[arg(long = "oxasl-output")]
    pub oxasl_output: PathBuf,

    /// FSL_ANAT output directory
    #[arg(long)]
    pub fslanat: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Minimum number of relevant voxels required to report statistics
    #[arg(long, default_value_t = DEFAULT_MIN_NVOXELS)]
    pub min_nvoxels: usize,

    /// Additional ROI as binarised mask in ASL space. The name of the ROI will be the stripped
    /// filename. May be specified multiple times
    #[arg(long, num_args = 1..)]
    pub roi_native: Vec<PathBuf>,

    /// Additional ROI as binarised mask in structural space. The name of the ROI will be the
    /// stripped filename. May be specified multiple times
    #[arg(long, num_args = 1..)]
    pub roi_struct: Vec<PathBuf>,

    /// Additional ROI as binarised mask in MNI space. The name of the ROI will be the stripped
    /// filename. May be specified multiple times
    #[arg(long, num_args = 1..)]
    pub roi_mni: Vec<PathBuf>,

    /// Add ROIs from Harvard-Oxford cortical/subcortical atlases
    #[arg(long)]
    pub add_atlas_rois: bool,

    /// Save ROIs in MNI space
    #[arg(long)]
    pub save_mni_rois: bool,

    /// Save ROIs in native (ASL) space
    #[arg(long)]
    pub save_native_rois: bool,

    /// Save binary masks in native (ASL) space
    #[arg(long)]
    pub save_native_masks: bool,

    /// FSL installation directory. Without it FSL programs are looked up on PATH
    #[arg(long, env = "FSLDIR")]
    pub fsldir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// 转换为库的运行配置.
    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            min_nvoxels: self.min_nvoxels,
            native_rois: self.roi_native.clone(),
            struct_rois: self.roi_struct.clone(),
            standard_rois: self.roi_mni.clone(),
            add_atlas_rois: self.add_atlas_rois,
            sidecars: SidecarKinds {
                native_rois: self.save_native_rois,
                native_masks: self.save_native_masks,
                mni_rois: self.save_mni_rois,
            },
            ..RunConfig::new(&self.oxasl_output, &self.fslanat, &self.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("roi_stats").chain(args.iter().copied())).unwrap()
    }

    const REQUIRED: [&str; 6] = ["--oxasl-output", "oxasl", "--fslanat", "T1.anat", "-o", "out"];

    #[test]
    fn test_defaults() {
        let c = parse(&REQUIRED).to_config();
        assert_eq!(c.oxasl_dir, Path::new("oxasl"));
        assert_eq!(c.fslanat_dir, Path::new("T1.anat"));
        assert_eq!(c.output_dir, Path::new("out"));
        assert_eq!(c.min_nvoxels, 10);
        assert!(c.native_rois.is_empty());
        assert!(!c.add_atlas_rois);
        assert!(c.sidecars.is_empty());
    }

    #[test]
    fn test_repeatable_rois() {
        let mut args = REQUIRED.to_vec();
        args.extend([
            "--roi-mni",
            "a.nii.gz",
            "b.nii.gz",
            "--roi-native",
            "n.nii",
            "--roi-mni",
            "c.nii.gz",
            "--min-nvoxels",
            "3",
            "--save-native-masks",
            "--add-atlas-rois",
        ]);
        let c = parse(&args).to_config();
        assert_eq!(c.standard_rois.len(), 3);
        assert_eq!(c.native_rois, [PathBuf::from("n.nii")]);
        assert_eq!(c.min_nvoxels, 3);
        assert!(c.add_atlas_rois);
        assert!(c.sidecars.native_masks);
        assert!(!c.sidecars.native_rois);
    }

    #[test]
    fn test_missing_required() {
        let r = Cli::try_parse_from(["roi_stats", "--oxasl-output", "oxasl"]);
        assert!(r.is_err());
    }
}
