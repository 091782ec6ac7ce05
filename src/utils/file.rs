use std::path::{Path, PathBuf};

use directories::ProjectDirs;

pub fn get_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

/// 绝对路径原样返回，相对路径拼接到 `base_dir`
pub fn resolve_file_path(base_dir: &Path, file_path: &str) -> String {
    let path = Path::new(file_path);
    if path.is_absolute() {
        return path.to_string_lossy().to_string();
    }
    base_dir.join(file_path).to_string_lossy().to_string()
}

/// 未指定配置文件时的数据目录：系统应用数据目录，取不到时退回当前目录
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "hovsco", "clipsearch")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .filter(|dir| dir.is_dir())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
