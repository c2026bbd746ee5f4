use std::path::PathBuf;
use anyhow::{anyhow, Result};
use directories::{BaseDirs, ProjectDirs};

pub fn get_global_config_dir() -> Result<PathBuf> {
    let (config_dir, _) = get_global_dirs()?;
    Ok(config_dir)
}

pub fn get_global_data_dir() -> Result<PathBuf> {
    let (_, data_dir) = get_global_dirs()?;
    Ok(data_dir)
}

/// Path of the `config.toml` read at startup when `--config` is not given.
pub fn get_global_config_file() -> Result<PathBuf> {
    Ok(get_global_config_dir()?.join("config.toml"))
}

pub fn get_home_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(base.home_dir().to_path_buf())
}

pub fn get_global_dirs() -> Result<(PathBuf, PathBuf)> {
    let proj_dirs = ProjectDirs::from("org", "recon-tools", "recon-tools")
        .ok_or_else(|| anyhow!("Could not get project directories"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    let data_dir = proj_dirs.data_dir().to_path_buf();

    Ok((config_dir, data_dir))
}
