use crate::engine::batch::Batch;
use crate::engine::cache::{CachedResponse, ResponseCache, cache_key};
use crate::engine::types::{ClassifiedActivity, TokenUsage};
use crate::engine::validate::{self, DroppedItem};
use crate::engine::warn::{self, WarnEvent};
use crate::error::{ClassifierError, ClassifierResult};
use crate::providers::{Provider, ProviderResponse};

/// Result of checking the cache for one batch, computed before any
/// network traffic so callers can report whether a batch is free.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub key: String,
    pub hit: Option<CachedResponse>,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        self.hit.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub activities: Vec<ClassifiedActivity>,
    pub usage: TokenUsage,
    pub from_cache: bool,
    /// `name/model` of the provider that produced the text.
    pub provider: String,
    pub dropped: Vec<DroppedItem>,
}

/// Sends batches through an ordered provider chain with a response
/// cache in front. Only rate-limit failures move on to the next provider.
pub struct Gateway<'a> {
    chain: &'a [Box<dyn Provider>],
    cache: &'a dyn ResponseCache,
    ttl_secs: u64,
}

impl<'a> Gateway<'a> {
    pub fn new(chain: &'a [Box<dyn Provider>], cache: &'a dyn ResponseCache, ttl_secs: u64) -> Self {
        Self {
            chain,
            cache,
            ttl_secs,
        }
    }

    fn primary(&self) -> ClassifierResult<&dyn Provider> {
        self.chain
            .first()
            .map(|p| p.as_ref())
            .ok_or_else(|| ClassifierError::Config("provider chain is empty".to_string()))
    }

    /// Cache key for a batch, always addressed by the primary provider so
    /// a fallback answer is found again on the next run.
    pub fn cache_key(&self, batch: &Batch) -> ClassifierResult<String> {
        let primary = self.primary()?;
        Ok(cache_key(
            primary.name(),
            primary.model(),
            batch
                .candidates
                .iter()
                .map(|c| (c.message_id, c.content.as_str())),
        ))
    }

    pub fn lookup(&self, batch: &Batch) -> ClassifierResult<CacheLookup> {
        let key = self.cache_key(batch)?;
        let hit = self
            .cache
            .get(&key)
            .map_err(|err| ClassifierError::Cache(format!("{err:#}")))?
            .map(|entry| entry.data);
        Ok(CacheLookup { key, hit })
    }

    /// Try each provider in order until one answers. Returns the response
    /// and the label of the provider that produced it.
    pub fn send_with_fallback(&self, prompt: &str) -> ClassifierResult<(ProviderResponse, String)> {
        self.primary()?;
        let mut exhausted = Vec::new();
        for provider in self.chain {
            match provider.send(prompt) {
                Ok(response) => {
                    if !exhausted.is_empty() {
                        tracing::info!(
                            provider = %provider.label(),
                            skipped = exhausted.len(),
                            "fallback provider answered"
                        );
                    }
                    return Ok((response, provider.label()));
                }
                Err(err) if err.is_rate_limit() => {
                    tracing::warn!(provider = %provider.label(), "rate limited; trying next provider");
                    exhausted.push(provider.label());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ClassifierError::RateLimit {
            providers: exhausted,
        })
    }

    /// Fetch (from cache or network), validate and resolve one batch.
    pub fn classify_batch(&self, batch: &Batch, prompt: &str) -> ClassifierResult<BatchResult> {
        let lookup = self.lookup(batch)?;
        self.classify_with_lookup(batch, prompt, lookup)
    }

    pub fn classify_with_lookup(
        &self,
        batch: &Batch,
        prompt: &str,
        lookup: CacheLookup,
    ) -> ClassifierResult<BatchResult> {
        let (text, usage, provider, from_cache) = match lookup.hit {
            Some(cached) => (cached.text, TokenUsage::default(), cached.provider, true),
            None => {
                let (response, provider) = self.send_with_fallback(prompt)?;
                let record = CachedResponse {
                    provider: provider.clone(),
                    text: response.text,
                    usage: response.usage,
                };
                self.cache
                    .set(&lookup.key, &record, self.ttl_secs)
                    .map_err(|err| ClassifierError::Cache(format!("{err:#}")))?;
                (record.text, record.usage, provider, false)
            }
        };

        let (parsed, mut dropped) = validate::parse_response(&text, &batch.message_ids())?;
        let (activities, resolve_drops) = validate::build_activities(batch, parsed);
        dropped.extend(resolve_drops);
        for item in &dropped {
            warn::emit(WarnEvent {
                code: item.code,
                stage: "validate",
                batch: batch.index,
                message: item.message_id,
                reason: &item.reason,
            });
        }

        Ok(BatchResult {
            activities,
            usage,
            from_cache,
            provider,
            dropped,
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::engine::types::TokenUsage;
    use crate::providers::{Provider, ProviderError, ProviderErrorKind, ProviderResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that replays a fixed script of outcomes, then repeats
    /// the fallback reply.
    pub struct ScriptedProvider {
        pub name: String,
        pub model: String,
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        fallback: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                model: format!("{name}-model"),
                script: Mutex::new(VecDeque::new()),
                fallback: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn reply(self, text: &str, input_tokens: u64, output_tokens: u64) -> Self {
            self.push(Ok(ProviderResponse {
                text: text.to_string(),
                usage: TokenUsage {
                    input_tokens,
                    output_tokens,
                },
            }))
        }

        pub fn fail(self, kind: ProviderErrorKind) -> Self {
            let err = ProviderError::new(kind, &self.name, "scripted failure");
            self.push(Err(err))
        }

        pub fn always(mut self, text: &str) -> Self {
            self.fallback = Some(text.to_string());
            self
        }

        fn push(self, outcome: Result<ProviderResponse, ProviderError>) -> Self {
            if let Ok(mut script) = self.script.lock() {
                script.push_back(outcome);
            }
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn send(&self, _prompt: &str) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().expect("script lock").pop_front();
            match (next, &self.fallback) {
                (Some(outcome), _) => outcome,
                (None, Some(text)) => Ok(ProviderResponse {
                    text: text.clone(),
                    usage: TokenUsage {
                        input_tokens: 10,
                        output_tokens: 5,
                    },
                }),
                (None, None) => Err(ProviderError::new(
                    ProviderErrorKind::InvalidResponse,
                    &self.name,
                    "script exhausted",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::ScriptedProvider;
    use super::*;
    use crate::engine::cache::MemoryCache;
    use crate::engine::types::CandidateType;
    use crate::engine::types::fixtures::candidate;
    use crate::providers::ProviderErrorKind;
    use std::sync::Arc;

    /// Shares a scripted provider between the chain and the test body.
    struct Shared(Arc<ScriptedProvider>);

    impl Provider for Shared {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn model(&self) -> &str {
            self.0.model()
        }
        fn send(&self, prompt: &str) -> Result<ProviderResponse, crate::providers::ProviderError> {
            self.0.send(prompt)
        }
    }

    fn chain_of(providers: &[Arc<ScriptedProvider>]) -> Vec<Box<dyn Provider>> {
        providers
            .iter()
            .map(|p| Box::new(Shared(Arc::clone(p))) as Box<dyn Provider>)
            .collect()
    }

    fn batch() -> Batch {
        Batch {
            index: 0,
            candidate_type: CandidateType::Suggestion,
            candidates: vec![
                candidate(1, CandidateType::Suggestion, "we should try the pottery class"),
                candidate(2, CandidateType::Suggestion, "kayaking at piha?"),
            ],
            estimated_tokens: 0,
        }
    }

    const REPLY: &str = "```json\n[{\"msg\": 2, \"title\": \"Kayaking at Piha\", \"fun\": 4, \"int\": 3}]\n```";

    #[test]
    fn falls_back_through_rate_limits_in_order() {
        let primary = Arc::new(ScriptedProvider::new("anthropic").fail(ProviderErrorKind::RateLimit));
        let first = Arc::new(ScriptedProvider::new("openai").fail(ProviderErrorKind::RateLimit));
        let second = Arc::new(ScriptedProvider::new("gemini").reply(REPLY, 700, 40));
        let chain = chain_of(&[primary.clone(), first.clone(), second.clone()]);
        let cache = MemoryCache::new();
        let gateway = Gateway::new(&chain, &cache, 60);

        let result = gateway.classify_batch(&batch(), "prompt").expect("classify");
        assert_eq!(result.provider, "gemini/gemini-model");
        assert_eq!(result.activities.len(), 1);
        assert_eq!(result.activities[0].activity, "Kayaking at Piha");
        assert_eq!(
            result.usage,
            TokenUsage {
                input_tokens: 700,
                output_tokens: 40
            }
        );
        assert!(!result.from_cache);
        assert_eq!((primary.calls(), first.calls(), second.calls()), (1, 1, 1));
    }

    #[test]
    fn exhausted_chain_names_every_provider() {
        let a = Arc::new(ScriptedProvider::new("anthropic").fail(ProviderErrorKind::RateLimit));
        let b = Arc::new(ScriptedProvider::new("openai").fail(ProviderErrorKind::RateLimit));
        let chain = chain_of(&[a, b]);
        let cache = MemoryCache::new();
        let err = Gateway::new(&chain, &cache, 60)
            .classify_batch(&batch(), "prompt")
            .expect_err("should exhaust");
        assert_eq!(err.kind().as_str(), "rate_limit");
        let text = err.to_string();
        assert!(text.contains("anthropic/anthropic-model"));
        assert!(text.contains("openai/openai-model"));
        assert!(cache.is_empty());
    }

    #[test]
    fn non_rate_limit_failure_stops_the_chain() {
        let primary = Arc::new(ScriptedProvider::new("anthropic").fail(ProviderErrorKind::RateLimit));
        let broken = Arc::new(ScriptedProvider::new("openai").fail(ProviderErrorKind::Auth));
        let unused = Arc::new(ScriptedProvider::new("gemini").reply(REPLY, 1, 1));
        let chain = chain_of(&[primary, broken, unused.clone()]);
        let cache = MemoryCache::new();
        let err = Gateway::new(&chain, &cache, 60)
            .classify_batch(&batch(), "prompt")
            .expect_err("auth failure");
        assert_eq!(err.kind().as_str(), "auth");
        assert_eq!(unused.calls(), 0);
    }

    #[test]
    fn network_failure_on_primary_is_not_retried() {
        let primary = Arc::new(ScriptedProvider::new("anthropic").fail(ProviderErrorKind::Network));
        let fallback = Arc::new(ScriptedProvider::new("openai").reply(REPLY, 1, 1));
        let chain = chain_of(&[primary, fallback.clone()]);
        let cache = MemoryCache::new();
        let err = Gateway::new(&chain, &cache, 60)
            .classify_batch(&batch(), "prompt")
            .expect_err("network failure");
        assert_eq!(err.kind().as_str(), "network");
        assert_eq!(fallback.calls(), 0);
    }

    #[test]
    fn cache_hit_skips_network_and_costs_nothing() {
        let provider = Arc::new(ScriptedProvider::new("anthropic").reply(REPLY, 500, 20));
        let chain = chain_of(&[provider.clone()]);
        let cache = MemoryCache::new();
        let gateway = Gateway::new(&chain, &cache, 60);

        let first = gateway.classify_batch(&batch(), "prompt").expect("miss");
        assert!(!first.from_cache);
        assert!(gateway.lookup(&batch()).expect("lookup").is_hit());

        let second = gateway.classify_batch(&batch(), "prompt").expect("hit");
        assert!(second.from_cache);
        assert_eq!(second.usage, TokenUsage::default());
        assert_eq!(second.activities, first.activities);
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn fallback_answers_are_cached_under_the_primary_key() {
        let primary = Arc::new(ScriptedProvider::new("anthropic").fail(ProviderErrorKind::RateLimit));
        let fallback = Arc::new(ScriptedProvider::new("openai").reply(REPLY, 9, 9));
        let chain = chain_of(&[primary.clone(), fallback]);
        let cache = MemoryCache::new();
        let gateway = Gateway::new(&chain, &cache, 60);
        gateway.classify_batch(&batch(), "prompt").expect("classify");

        let key = cache_key(
            "anthropic",
            "anthropic-model",
            [(1, "we should try the pottery class"), (2, "kayaking at piha?")],
        );
        let entry = cache.get(&key).expect("get").expect("cached");
        assert_eq!(entry.data.provider, "openai/openai-model");

        gateway.classify_batch(&batch(), "prompt").expect("hit");
        assert_eq!(primary.calls(), 1);
    }

    #[test]
    fn raw_text_is_cached_even_when_validation_fails() {
        let provider = Arc::new(
            ScriptedProvider::new("anthropic").reply("[{\"msg\": 99, \"title\": \"Elsewhere\"}]", 5, 5),
        );
        let chain = chain_of(&[provider]);
        let cache = MemoryCache::new();
        let gateway = Gateway::new(&chain, &cache, 60);
        let err = gateway
            .classify_batch(&batch(), "prompt")
            .expect_err("cross-check fails");
        assert_eq!(err.kind().as_str(), "validation_error");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_chain_is_a_config_error() {
        let chain: Vec<Box<dyn Provider>> = Vec::new();
        let cache = MemoryCache::new();
        let err = Gateway::new(&chain, &cache, 60)
            .classify_batch(&batch(), "prompt")
            .expect_err("no providers");
        assert_eq!(err.kind().as_str(), "config");
    }
}
