mod engine;

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use crate::core::config::NudgeConfig;
use crate::core::terminal::{self, GuideSection, print_error, print_success, print_warn};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("serve", "Run the engine and its HTTP API in the foreground")
        .command("check-config", "Validate the configuration file and print it")
        .command("help", "Show this message")
        .print();

    GuideSection::new("Options")
        .text("--config <path>     Config file (default: ~/.nudge/nudge.toml)")
        .text("--api-host <host>   Override api_host")
        .text("--api-port <port>   Override api_port")
        .print();

    println!(
        " {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("nudge").green()
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CliOptions {
    pub config: Option<PathBuf>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
}

pub(crate) fn parse_options(args: &[String], start: usize) -> Result<CliOptions> {
    let mut options = CliOptions::default();
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config", Some(v)) => {
                options.config = Some(PathBuf::from(v));
                i += 2;
            }
            ("--api-host", Some(v)) => {
                options.api_host = Some(v.clone());
                i += 2;
            }
            ("--api-port", Some(v)) => {
                let port = v
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid --api-port value '{}'", v))?;
                options.api_port = Some(port);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(options)
}

fn load_config(options: &CliOptions) -> Result<NudgeConfig> {
    let mut config = NudgeConfig::load(options.config.as_deref())?;
    if let Some(host) = &options.api_host {
        config.api_host = host.clone();
    }
    if let Some(port) = options.api_port {
        config.api_port = port;
    }
    Ok(config)
}

fn print_config(config: &NudgeConfig) {
    let or_fallback = |url: &Option<String>, fallback: &str| {
        url.clone().unwrap_or_else(|| fallback.to_string())
    };
    GuideSection::new("Configuration")
        .status("Data", &config.data_dir().display().to_string())
        .status(
            "API Endpoint",
            &format!("http://{}:{}", config.api_host, config.api_port),
        )
        .status("Public URL", &config.public_base_url())
        .status("Timezone", &config.timezone)
        .status("Sweep", &format!("every {}s", config.sweep_interval_secs))
        .status("Executor", &or_fallback(&config.executor.url, "echo (local)"))
        .status("Channel", &or_fallback(&config.channel.url, "log only (local)"))
        .status("Owners", &config.owners.len().to_string())
        .print();
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "serve" | "daemon-run" => {
            let config = load_config(&parse_options(&args, 2)?)?;
            engine::run_engine(config).await?;
        }
        "check-config" => {
            let config = load_config(&parse_options(&args, 2)?)?;
            print_config(&config);
            if config.owners.is_empty() {
                print_warn("No owners configured; only the ping event can be triggered.");
            }
            print_success("Configuration is valid.");
        }
        "help" | "--help" | "-h" => print_help(),
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_overrides() {
        let parsed = parse_options(
            &args(&[
                "nudge",
                "serve",
                "--config",
                "/etc/nudge.toml",
                "--api-port",
                "9000",
                "--api-host",
                "0.0.0.0",
            ]),
            2,
        )
        .unwrap();
        assert_eq!(
            parsed,
            CliOptions {
                config: Some(PathBuf::from("/etc/nudge.toml")),
                api_host: Some("0.0.0.0".to_string()),
                api_port: Some(9000),
            }
        );
    }

    #[test]
    fn ignores_unknown_and_dangling_flags() {
        let parsed = parse_options(&args(&["nudge", "serve", "--verbose", "--config"]), 2).unwrap();
        assert_eq!(parsed, CliOptions::default());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse_options(&args(&["nudge", "serve", "--api-port", "high"]), 2).is_err());
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nudge.toml");
        std::fs::write(&path, "api_port = 9000\napi_host = \"10.0.0.1\"\n").unwrap();
        let config = load_config(&CliOptions {
            config: Some(path),
            api_host: None,
            api_port: Some(9100),
        })
        .unwrap();
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.api_host, "10.0.0.1");
    }
}
