pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{AwsSettings, CloudflareSettings, DnsSettings, Settings, TimingSettings};

use std::path::{Path, PathBuf};

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["stackflow.local.yaml", "stackflow.yaml"];

/// StackFlowのグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stackflow.local.yaml, stackflow.yaml
/// 3. ./.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/config.yaml (グローバル設定)
///
/// どこにも無ければ `None`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigPathMissing(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    if let Some(path) = first_existing(&current_dir) {
        return Ok(Some(path));
    }

    // 3. ./.stackflow/ ディレクトリで検索
    let local_dir = current_dir.join(".stackflow");
    if local_dir.is_dir()
        && let Some(path) = first_existing(&local_dir)
    {
        return Ok(Some(path));
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackflow").join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// 設定ファイルを読み込む（見つからなければデフォルト値）
pub fn load() -> Result<Settings> {
    match find_config_file()? {
        Some(path) => load_from(&path),
        None => {
            tracing::debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}

/// 指定パスの設定ファイルを読み込む
pub fn load_from(path: &Path) -> Result<Settings> {
    tracing::debug!("Loading settings from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("stackflow"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackflow.yaml"), "aws: {}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file().unwrap().unwrap();
        assert!(result.ends_with("stackflow.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        // stackflow.yaml と stackflow.local.yaml の両方を作成
        fs::write(temp_dir.path().join("stackflow.yaml"), "# shared").unwrap();
        fs::write(temp_dir.path().join("stackflow.local.yaml"), "# local").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file().unwrap().unwrap();

        // stackflow.local.yaml が優先される
        assert!(result.ends_with("stackflow.local.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_stackflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let local_dir = temp_dir.path().join(".stackflow");
        fs::create_dir(&local_dir).unwrap();
        fs::write(local_dir.join("stackflow.yaml"), "# in dir").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file().unwrap().unwrap();
        assert!(result.ends_with(".stackflow/stackflow.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "dns:\n  managed_marker: stackflow\n").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
        }

        let result = find_config_file().unwrap();
        assert_eq!(result, Some(config_path));
        let settings = load().unwrap();
        assert_eq!(settings.dns.managed_marker, "stackflow");

        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_is_an_error() {
        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, "/nonexistent/stackflow.yaml");
        }

        let result = find_config_file();
        assert!(matches!(result, Err(ConfigError::ConfigPathMissing(_))));

        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        // グローバル設定が存在する環境では比較できない
        if find_config_file().unwrap().is_none() {
            assert_eq!(load().unwrap(), Settings::default());
        }

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "timing:\n  max_retries: many\n").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty.yaml");
        fs::write(&path, "").unwrap();

        assert_eq!(load_from(&path).unwrap(), Settings::default());
    }
}
