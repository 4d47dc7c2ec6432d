use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub home: PathBuf,
    pub cache_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl EnginePaths {
    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir.join("audit.log")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<EnginePaths> {
    let home = match env::var("CHATTODO_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".chat-todo"),
    };
    let cache_dir = env_or_default_path("CHATTODO_CACHE_DIR", home.join("cache"));
    let logs_dir = env_or_default_path("CHATTODO_LOGS_DIR", home.join("logs"));

    Ok(EnginePaths {
        home,
        cache_dir,
        logs_dir,
    })
}
