use std::error::Error;
use std::process::ExitCode;

use asl_roi::atlas::FslAtlasRegistry;
use asl_roi::run::run;
use asl_roi::transform::FslTransform;
use clap::Parser;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

mod cli;

use cli::Cli;

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Cli::parse();
    let level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    let config = args.to_config();
    if let Err(e) = config.check_inputs() {
        error!("{e}");
        return Ok(ExitCode::FAILURE);
    }

    let transform = match &args.fsldir {
        Some(dir) => FslTransform::with_fsl_dir(dir),
        None => FslTransform::new(),
    };
    let atlases = args.fsldir.as_ref().map(FslAtlasRegistry::from_fsl_dir);
    if config.add_atlas_rois && atlases.is_none() {
        error!("--add-atlas-rois requires FSLDIR (or --fsldir) to locate the atlases");
        return Ok(ExitCode::FAILURE);
    }

    run(&config, &transform, atlases.as_ref())?;
    Ok(ExitCode::SUCCESS)
}
