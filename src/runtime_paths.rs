use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn platform_app_root() -> PathBuf {
    if let Some(project_dirs) = ProjectDirs::from("", "", "wayfarer") {
        return project_dirs.data_dir().to_path_buf();
    }

    if let Some(base_dirs) = BaseDirs::new() {
        return base_dirs.data_local_dir().join("wayfarer");
    }

    std::env::temp_dir().join("wayfarer")
}

pub fn app_root() -> PathBuf {
    platform_app_root()
}

pub fn default_db_path() -> String {
    app_root()
        .join("data")
        .join("wayfarer.db")
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_db_path_ends_with_db_file() {
        let path = default_db_path();
        assert!(path.ends_with("wayfarer.db"));
    }
}
