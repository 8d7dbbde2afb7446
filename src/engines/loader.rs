use std::path::Path;

use log::info;
use tokio::fs::read_to_string;

use crate::error::ScanError;

/// 读取 path 字典，每行一个
pub async fn load_paths(file: &Path) -> Result<Vec<String>, ScanError> {
    let content = read_to_string(file).await.map_err(|source| ScanError::Load {
        path: file.to_path_buf(),
        source,
    })?;

    let paths = parse_paths(&content);
    info!("loaded {} paths from {:?}", paths.len(), file);
    Ok(paths)
}

fn parse_paths(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        // skip empty line and comment line
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}
