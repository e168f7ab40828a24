use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use assay_axum::HttpOptions;
use assay_core::{AssayConfig, AssayConfigSnapshot};
use assay_queue::execution::ScriptRunnerConfig;
use assay_queue::QueueConfig;
use url::Url;

/// Prefix of the environment variables read into the configuration.
pub const ENV_PREFIX: &str = "ASSAY__";

const DAY: u64 = 24 * 60 * 60;

/// Documented defaults; anything already set wins.
pub fn apply_defaults(config: &mut AssayConfig) {
    // HTTP
    config.set_default("http.host", "0.0.0.0");
    config.set_default("http.port", "8080");
    config.set_default("http.public_url", "http://localhost:8080");
    config.set_default("http.body_limit_bytes", assay_axum::DEFAULT_BODY_LIMIT.to_string());
    config.set_default("assets.dir", "assets");

    // Queue
    config.set_default("queue.results_dir", "assets/results");
    config.set_default("queue.snapshot_path", "assets/queue.snapshot");
    config.set_default("queue.snapshot_codec", "msgpack");
    config.set_default("queue.idle_secs", "60");
    config.set_default("queue.job_timeout_secs", "14400");
    config.set_default("queue.retention_days", "31");
    config.set_default("queue.fetch_timeout_secs", "60");
    config.set_default("callback.timeout_secs", "30");

    // Analysis scripts
    config.set_default("runner.scripts_dir", ".");
    config.set_default("runner.interpreter", "bash");
    config.set_default("runner.script", "run_analysis.bash");
    config.set_default("runner.columns_script", "run_analysis_columns.bash");
    config.set_default("runner.dev_script", "run_analysis_dev.bash");
    config.set_default("app.development_mode", "false");
}

/// Typed server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub http: HttpOptions,
    pub queue: QueueConfig,
    pub runner: ScriptRunnerConfig,
}

impl Settings {
    /// Settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = AssayConfig::new();
        config.load_env(ENV_PREFIX);
        Self::from_config(config, std::env::var("WEBAPP_HOST").ok())
    }

    /// Settings from `config`. A non-empty `webapp_host` (`host[:port]`)
    /// replaces the host of the public URL unless `http.public_url` was set
    /// explicitly.
    pub fn from_config(mut config: AssayConfig, webapp_host: Option<String>) -> Result<Self> {
        if let Some(host) = webapp_host.filter(|h| !h.trim().is_empty()) {
            if !config.has("http.public_url") {
                config.set("http.public_url", format!("http://{}", host.trim()));
            }
        }
        apply_defaults(&mut config);
        let snapshot = config.snapshot();

        let public_url = string(&snapshot, "http.public_url")?;
        let public_url = Url::parse(&public_url)
            .with_context(|| format!("invalid value for http.public_url: {:?}", public_url))?;

        let assets_dir = PathBuf::from(string(&snapshot, "assets.dir")?);
        let results_dir = PathBuf::from(string(&snapshot, "queue.results_dir")?);
        let results_url_path = served_path(&assets_dir, &results_dir)?;

        let port = string(&snapshot, "http.port")?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| anyhow!("invalid value for http.port: {:?}", port))?;

        let retention_days = number(&snapshot, "queue.retention_days")?;
        let retention_secs = retention_days
            .checked_mul(DAY)
            .ok_or_else(|| anyhow!("queue.retention_days is too large: {}", retention_days))?;

        let queue = QueueConfig {
            results_dir,
            results_url_path,
            snapshot_path: PathBuf::from(string(&snapshot, "queue.snapshot_path")?),
            snapshot_codec: string(&snapshot, "queue.snapshot_codec")?,
            idle_interval: duration(&snapshot, "queue.idle_secs")?,
            job_timeout: duration(&snapshot, "queue.job_timeout_secs")?,
            retention: Duration::from_secs(retention_secs),
            public_url: public_url.to_string(),
            callback_timeout: duration(&snapshot, "callback.timeout_secs")?,
            fetch_timeout: duration(&snapshot, "queue.fetch_timeout_secs")?,
        };

        let runner = ScriptRunnerConfig {
            scripts_dir: PathBuf::from(string(&snapshot, "runner.scripts_dir")?),
            interpreter: string(&snapshot, "runner.interpreter")?,
            script: string(&snapshot, "runner.script")?,
            columns_script: string(&snapshot, "runner.columns_script")?,
            dev_script: string(&snapshot, "runner.dev_script")?,
            development_mode: flag(&snapshot, "app.development_mode")?,
        };

        let body_limit = number(&snapshot, "http.body_limit_bytes")?;
        let http = HttpOptions {
            assets_dir,
            body_limit: usize::try_from(body_limit)
                .map_err(|_| anyhow!("http.body_limit_bytes is too large: {}", body_limit))?,
        };

        Ok(Self {
            host: string(&snapshot, "http.host")?,
            port,
            http,
            queue,
            runner,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn string(snapshot: &AssayConfigSnapshot, key: &str) -> Result<String> {
    snapshot
        .get_string(key)
        .ok_or_else(|| anyhow!("missing configuration key {}", key))
}

fn number(snapshot: &AssayConfigSnapshot, key: &str) -> Result<u64> {
    let raw = string(snapshot, key)?;
    snapshot
        .get_u64(key)
        .ok_or_else(|| anyhow!("invalid value for {}: {:?}", key, raw))
}

fn duration(snapshot: &AssayConfigSnapshot, key: &str) -> Result<Duration> {
    let raw = string(snapshot, key)?;
    snapshot
        .get_duration_secs(key)
        .ok_or_else(|| anyhow!("invalid value for {}: {:?}", key, raw))
}

fn flag(snapshot: &AssayConfigSnapshot, key: &str) -> Result<bool> {
    let raw = string(snapshot, key)?;
    snapshot
        .get_bool(key)
        .ok_or_else(|| anyhow!("invalid value for {}: {:?}", key, raw))
}

/// URL path of `results_dir`, which has to live inside the served `assets_dir`.
fn served_path(assets_dir: &Path, results_dir: &Path) -> Result<String> {
    let Ok(relative) = results_dir.strip_prefix(assets_dir) else {
        bail!(
            "queue.results_dir ({}) must be inside assets.dir ({})",
            results_dir.display(),
            assets_dir.display()
        );
    };

    let mut path = String::from("assets");
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                path.push('/');
                path.push_str(&segment.to_string_lossy());
            }
            Component::CurDir => {}
            _ => bail!("queue.results_dir must not leave assets.dir"),
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_deployment() {
        let settings = Settings::from_config(AssayConfig::new(), None).unwrap();

        assert_eq!(settings.addr(), "0.0.0.0:8080");
        assert_eq!(settings.http.assets_dir, PathBuf::from("assets"));
        assert_eq!(settings.queue.results_url_path, "assets/results");
        assert_eq!(settings.queue.job_timeout, Duration::from_secs(4 * 60 * 60));
        assert_eq!(settings.queue.retention, Duration::from_secs(31 * DAY));
        assert_eq!(settings.queue.idle_interval, Duration::from_secs(60));
        assert_eq!(settings.queue.public_url.as_str(), "http://localhost:8080/");
        assert_eq!(settings.runner.script, "run_analysis.bash");
        assert!(!settings.runner.development_mode);
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut config = AssayConfig::new();
        let vars = vec![
            ("ASSAY__HTTP__PORT".to_string(), "9000".to_string()),
            ("ASSAY__QUEUE__JOB_TIMEOUT_SECS".to_string(), "5".to_string()),
            ("ASSAY__APP__DEVELOPMENT_MODE".to_string(), "on".to_string()),
            ("ASSAY__QUEUE__SNAPSHOT_CODEC".to_string(), "json".to_string()),
        ];
        config.load_vars(ENV_PREFIX, vars);

        let settings = Settings::from_config(config, None).unwrap();

        assert_eq!(settings.port, 9000);
        assert_eq!(settings.queue.job_timeout, Duration::from_secs(5));
        assert_eq!(settings.queue.snapshot_codec, "json");
        assert!(settings.runner.development_mode);
    }

    #[test]
    fn webapp_host_sets_public_url_unless_explicit() {
        let settings =
            Settings::from_config(AssayConfig::new(), Some("analysis.example:3000".into())).unwrap();
        assert_eq!(
            settings.queue.public_url.as_str(),
            "http://analysis.example:3000/"
        );

        let mut config = AssayConfig::new();
        config.set("http.public_url", "https://reports.example");
        let settings = Settings::from_config(config, Some("ignored:1".into())).unwrap();
        assert_eq!(settings.queue.public_url.as_str(), "https://reports.example/");
    }

    #[test]
    fn invalid_values_are_errors() {
        for (key, value) in [
            ("http.port", "eighty"),
            ("queue.idle_secs", "-1"),
            ("app.development_mode", "maybe"),
            ("http.public_url", "not a url"),
            ("queue.retention_days", "213503982334602"),
        ] {
            let mut config = AssayConfig::new();
            config.set(key, value);
            let err = Settings::from_config(config, None).unwrap_err();
            assert!(err.to_string().contains(key), "{}: {}", key, err);
        }
    }

    #[test]
    fn results_must_be_served_from_assets() {
        assert_eq!(
            served_path(Path::new("data"), Path::new("data/runs/results")).unwrap(),
            "assets/runs/results"
        );
        assert!(served_path(Path::new("assets"), Path::new("/tmp/results")).is_err());
    }
}
