//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KURIKULUM__*` 覆盖（双下划线表示嵌套，如 `KURIKULUM__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub generation: GenerationSection,
}

/// [app] 段：应用名、数据库路径
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("workspace/kurikulum.db")
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

/// [generation] 段：分块、节流、课时单位与默认值
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    /// 达成标准按多少行一块请求
    #[serde(default = "default_criteria_chunk_size")]
    pub criteria_chunk_size: usize,
    /// 分块之间的最小间隔（毫秒）
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// 课时单位，如 JP（jam pelajaran）
    #[serde(default = "default_time_unit")]
    pub time_unit: String,
    /// 单行课时非法时的默认值
    #[serde(default = "default_time_budget")]
    pub default_time_budget: u32,
    #[serde(default = "default_weekly_hours")]
    pub weekly_hours: u32,
    #[serde(default = "default_weeks_per_semester")]
    pub weeks_per_semester: usize,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            criteria_chunk_size: default_criteria_chunk_size(),
            pacing_ms: default_pacing_ms(),
            time_unit: default_time_unit(),
            default_time_budget: default_time_budget(),
            weekly_hours: default_weekly_hours(),
            weeks_per_semester: default_weeks_per_semester(),
        }
    }
}

impl GenerationSection {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

fn default_criteria_chunk_size() -> usize {
    5
}

fn default_pacing_ms() -> u64 {
    1500
}

fn default_time_unit() -> String {
    "JP".to_string()
}

fn default_time_budget() -> u32 {
    2
}

fn default_weekly_hours() -> u32 {
    4
}

fn default_weeks_per_semester() -> usize {
    18
}

/// 从 config 目录加载配置，环境变量 KURIKULUM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 KURIKULUM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KURIKULUM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "deepseek");
        assert_eq!(config.generation.criteria_chunk_size, 5);
        assert_eq!(config.generation.pacing(), Duration::from_millis(1500));
        assert_eq!(config.generation.time_unit, "JP");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nprovider = \"mock\"\n\n[generation]\npacing_ms = 0\nweekly_hours = 5"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.generation.pacing_ms, 0);
        assert_eq!(config.generation.weekly_hours, 5);
        assert_eq!(config.generation.default_time_budget, 2);
    }
}
