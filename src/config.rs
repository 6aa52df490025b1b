use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_command:       String,
    pub server_args:          Vec<String>,
    pub host:                 String,
    pub port:                 u16,
    pub user_name:            String,
    pub shell:                String,
    pub execute_commands:     bool,
    pub startup_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub window_size:          [f32; 2],
}
impl Default for Config {
    fn default() -> Self {
        Self {
            server_command:       "python3".into(),
            server_args:          vec!["-m".into(), "clai.server.clai_server".into()],
            host:                 "localhost".into(),
            port:                 8010,
            user_name:            std::env::var("USER").unwrap_or_else(|_| "user".into()),
            shell:                std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into()),
            execute_commands:     false,
            startup_timeout_secs: 10,
            request_timeout_secs: 30,
            window_size:          [900.0, 600.0],
        }
    }
}
impl Config {
    pub fn load() -> Self {
        let path = Self::path();
        if !path.exists() {
            let c = Self::default();
            c.save();
            return c;
        }
        match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<Config>(&data) {
                Ok(c) => return c,
                Err(e) => log::warn!("ignoring malformed {}: {e}", path.display()),
            },
            Err(e) => log::warn!("cannot read {}: {e}", path.display()),
        }
        Self::default()
    }
    pub fn save(&self) {
        if let Some(dir) = Self::path().parent() { let _ = std::fs::create_dir_all(dir); }
        if let Ok(json) = serde_json::to_string_pretty(self) { let _ = std::fs::write(Self::path(), json); }
    }
    fn path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("clai-emulator").join("config.json")
    }

    pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
    pub fn startup_timeout(&self) -> Duration { Duration::from_secs(self.startup_timeout_secs) }
    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs.max(1)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: Config = serde_json::from_str(r#"{ "port": 9000, "execute_commands": true }"#).unwrap();
        assert_eq!(c.port, 9000);
        assert!(c.execute_commands);
        assert_eq!(c.host, "localhost");
        assert_eq!(c.startup_timeout_secs, 10);
        assert_eq!(c.window_size, [900.0, 600.0]);
    }

    #[test]
    fn test_address_and_timeouts() {
        let c = Config { host: "127.0.0.1".into(), port: 8123, request_timeout_secs: 0, ..Config::default() };
        assert_eq!(c.address(), "127.0.0.1:8123");
        assert_eq!(c.request_timeout(), Duration::from_secs(1));
        assert_eq!(c.startup_timeout(), Duration::from_secs(10));
    }
}
