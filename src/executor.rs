use tracing::{info, warn};

use crate::{
    engine::MediaEngine,
    error::{EngineError, ResolveError},
    models::RawMediaInfo,
    strategy::Strategy,
};

#[derive(Debug)]
pub struct Resolved {
    pub info: RawMediaInfo,
    pub strategy: Strategy,
}

#[derive(Debug)]
enum Attempt {
    Success(RawMediaInfo),
    Failure(EngineError),
}

async fn attempt(engine: &dyn MediaEngine, url: &str, strategy: &Strategy) -> Attempt {
    match engine.fetch_info(url, &strategy.options).await {
        Ok(info) => Attempt::Success(info),
        Err(error) => Attempt::Failure(error),
    }
}

/// Tries each strategy once, in order, stopping at the first success.
/// Attempts never overlap.
pub async fn resolve(
    engine: &dyn MediaEngine,
    url: &str,
    strategies: &[Strategy],
) -> Result<Resolved, ResolveError> {
    let mut last_error = None;

    for (index, strategy) in strategies.iter().enumerate() {
        info!(
            "Trying strategy {}/{}: {}",
            index + 1,
            strategies.len(),
            strategy.name
        );

        match attempt(engine, url, strategy).await {
            Attempt::Success(info) => {
                info!("Strategy {} succeeded for {:?}", strategy.name, url);
                return Ok(Resolved {
                    info,
                    strategy: strategy.clone(),
                });
            }
            Attempt::Failure(error) => {
                warn!("Strategy {} failed: {error}", strategy.name);
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(last_error) => Err(ResolveError::AllStrategiesFailed {
            attempts: strategies.len(),
            last_error,
        }),
        None => Err(ResolveError::NoStrategies),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::{planner::DownloadPlan, strategy::StrategyOptions};

    #[derive(Default)]
    pub(crate) struct ScriptedEngine {
        responses: Mutex<VecDeque<Result<RawMediaInfo, EngineError>>>,
        pub(crate) calls: Mutex<Vec<StrategyOptions>>,
        pub(crate) downloads: Mutex<Vec<(StrategyOptions, DownloadPlan)>>,
        pub(crate) download_body: Option<Vec<u8>>,
        download_delay: Option<tokio::time::Duration>,
    }

    impl ScriptedEngine {
        pub(crate) fn new(responses: Vec<Result<RawMediaInfo, EngineError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        pub(crate) fn with_download_body(mut self, body: &[u8]) -> Self {
            self.download_body = Some(body.to_vec());
            self
        }

        pub(crate) fn with_download_delay(mut self, delay: tokio::time::Duration) -> Self {
            self.download_delay = Some(delay);
            self
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }
    }

    #[async_trait]
    impl MediaEngine for ScriptedEngine {
        async fn fetch_info(
            &self,
            _url: &str,
            options: &StrategyOptions,
        ) -> Result<RawMediaInfo, EngineError> {
            self.calls.lock().expect("calls lock").push(options.clone());
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::Failed("no scripted response".to_string())))
        }

        async fn materialize(
            &self,
            _url: &str,
            options: &StrategyOptions,
            plan: &DownloadPlan,
        ) -> Result<Option<String>, EngineError> {
            self.downloads
                .lock()
                .expect("downloads lock")
                .push((options.clone(), plan.clone()));

            let template = plan.output_template.to_string_lossy().into_owned();
            if let Some(delay) = self.download_delay {
                let partial = template.replace("%(ext)s", "mp4.part");
                tokio::fs::write(&partial, b"partial")
                    .await
                    .map_err(EngineError::Spawn)?;
                tokio::time::sleep(delay).await;
            }

            let Some(body) = self.download_body.as_ref() else {
                return Err(EngineError::Failed("ERROR: download failed".to_string()));
            };
            let path = template.replace("%(ext)s", plan.container);
            tokio::fs::write(&path, body)
                .await
                .map_err(EngineError::Spawn)?;
            Ok(Some(path))
        }
    }

    fn strategy(name: &'static str, client: &str) -> Strategy {
        Strategy {
            name,
            options: StrategyOptions {
                player_client: Some(client.to_string()),
                ..StrategyOptions::default()
            },
        }
    }

    fn info(title: &str) -> RawMediaInfo {
        RawMediaInfo {
            title: Some(title.to_string()),
            ..RawMediaInfo::default()
        }
    }

    #[tokio::test]
    async fn returns_first_success_and_its_strategy() {
        let engine = ScriptedEngine::new(vec![
            Err(EngineError::Failed("A broke".to_string())),
            Err(EngineError::Failed("B broke".to_string())),
            Ok(info("from C")),
        ]);
        let strategies = [strategy("A", "a"), strategy("B", "b"), strategy("C", "c")];

        let resolved = resolve(&engine, "https://example.com/v", &strategies)
            .await
            .expect("C should succeed");

        assert_eq!(resolved.strategy.name, "C");
        assert_eq!(resolved.info.title.as_deref(), Some("from C"));
        let clients = engine
            .calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|options| options.player_client.clone().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(clients, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stops_after_first_success() {
        let engine = ScriptedEngine::new(vec![Ok(info("first")), Ok(info("second"))]);
        let strategies = [strategy("A", "a"), strategy("B", "b")];

        let resolved = resolve(&engine, "u", &strategies).await.expect("resolves");

        assert_eq!(resolved.strategy.name, "A");
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn all_failing_keeps_last_error() {
        let engine = ScriptedEngine::new(vec![
            Err(EngineError::Failed("first".to_string())),
            Err(EngineError::Failed("second".to_string())),
            Err(EngineError::Failed("last".to_string())),
        ]);
        let strategies = [strategy("A", "a"), strategy("B", "b"), strategy("C", "c")];

        let error = resolve(&engine, "u", &strategies)
            .await
            .expect_err("every strategy fails");

        match error {
            ResolveError::AllStrategiesFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.to_string(), "last");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_strategy_list_is_reported() {
        let engine = ScriptedEngine::new(Vec::new());
        let error = resolve(&engine, "u", &[]).await.expect_err("nothing to try");
        assert!(matches!(error, ResolveError::NoStrategies));
        assert_eq!(engine.call_count(), 0);
    }
}
