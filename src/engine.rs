use std::{io::ErrorKind, path::PathBuf, process::Output};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::EngineError, models::RawMediaInfo, planner::DownloadPlan, strategy::StrategyOptions,
};

#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn fetch_info(
        &self,
        url: &str,
        options: &StrategyOptions,
    ) -> Result<RawMediaInfo, EngineError>;

    /// Writes the planned output and returns the final path the engine
    /// reported, if it printed one.
    async fn materialize(
        &self,
        url: &str,
        options: &StrategyOptions,
        plan: &DownloadPlan,
    ) -> Result<Option<String>, EngineError>;
}

pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, EngineError> {
        debug!("yt-dlp {:?}", args);
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    EngineError::NotInstalled
                } else {
                    EngineError::Spawn(error)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::Failed(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaEngine for YtDlp {
    async fn fetch_info(
        &self,
        url: &str,
        options: &StrategyOptions,
    ) -> Result<RawMediaInfo, EngineError> {
        let mut args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(strategy_args(options));
        args.push(url.to_string());

        let output = self.run(args).await?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn materialize(
        &self,
        url: &str,
        options: &StrategyOptions,
        plan: &DownloadPlan,
    ) -> Result<Option<String>, EngineError> {
        let mut args = download_args(plan);
        args.extend(strategy_args(options));
        args.push(url.to_string());

        let output = self.run(args).await?;
        Ok(extract_printed_path(&output.stdout))
    }
}

pub fn strategy_args(options: &StrategyOptions) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(client) = options.player_client.as_deref() {
        args.push("--extractor-args".to_string());
        args.push(format!("youtube:player_client={client}"));
    }
    if let Some(user_agent) = options.user_agent.as_deref() {
        args.push("--user-agent".to_string());
        args.push(user_agent.to_string());
    }
    if let Some(proxy) = options.proxy.as_deref() {
        args.push("--proxy".to_string());
        args.push(proxy.to_string());
    }
    if let Some(cookie_file) = options.cookie_file.as_ref() {
        args.push("--cookies".to_string());
        args.push(cookie_file.to_string_lossy().into_owned());
    }
    if options.prefer_free_formats {
        args.push("--prefer-free-formats".to_string());
    }

    args
}

fn download_args(plan: &DownloadPlan) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-o".to_string(),
        plan.output_template.to_string_lossy().into_owned(),
        "-f".to_string(),
        plan.selector.clone(),
    ];

    if plan.extract_audio {
        args.extend([
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "0".to_string(),
        ]);
    }
    if plan.merge {
        args.push("--merge-output-format".to_string());
        args.push(plan.container.to_string());
    }

    args
}

/// Last meaningful stderr line, preferring yt-dlp's own `ERROR:` lines.
fn run_error_message(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.to_string())
        .unwrap_or_else(|| "yt-dlp could not complete the operation".to_string())
}

fn extract_printed_path(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}
