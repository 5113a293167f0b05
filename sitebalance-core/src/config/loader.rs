use crate::config::model::Config;

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "SITEBALANCE_CONFIG";

pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_config() -> Result<Config, anyhow::Error> {
    load_config_from_path(&get_config_path())
}

pub fn load_config_from_path(config_path: &str) -> Result<Config, anyhow::Error> {
    let config_str = std::fs::read_to_string(config_path)?;
    parse_config(&config_str)
}

pub fn parse_config(config_str: &str) -> Result<Config, anyhow::Error> {
    let config: Config = toml::from_str(config_str)?;
    Ok(config)
}
