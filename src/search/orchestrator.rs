//! Search orchestrator
//!
//! One call runs as:
//! 1. validate the request and build every matcher (no fetch on input errors)
//! 2. resolve target spaces and fetch them, windowed, with bounded fan-out
//! 3. evaluate each strategy under its date policy on blocking workers; an
//!    empty semantic window pass triggers one unbounded fetch and pass
//! 4. fuse, cap at `max_results`, paginate
//!
//! The embedding cache and the loaded model are the only state shared
//! between calls.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use super::cache::EmbeddingCache;
use super::date_policy::{
    needs_fallback, run_strict, semantic_fallback_pass, semantic_window_pass, SemanticOutcome,
};
use super::embedder::{create_embedder, Embedder};
use super::fusion::{fuse, FusedResult, FusionConfig};
use super::matcher::{LiteralMatcher, Matcher, PatternMatcher, StrategyResult};
use super::pagination::{paginate, Page, PageToken};
use super::params::{MessageHit, SearchMetadata, SearchParams, SearchResponse};
use super::query::{SearchMode, SearchQuery, Strategy};
use super::semantic::SemanticMatcher;
use crate::core::config::Settings;
use crate::core::datetime::DateWindow;
use crate::core::error::{Result, SearchError};
use crate::core::message::Message;
use crate::source::{FetchOptions, MessageSource};

/// Embedder availability for the semantic strategy
enum EmbedderSlot {
    Ready(Arc<dyn Embedder>),
    Unavailable(String),
    Disabled,
}

/// Outcome of fetching one space
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceStatus {
    Fetched { messages: usize },
    Failed { reason: String },
}

/// Per-space fetch results, sorted by space name
///
/// A space whose fallback fetch failed is listed twice: fetched, then failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub spaces: Vec<(String, SpaceStatus)>,
}

impl FetchReport {
    pub fn succeeded(&self) -> Vec<String> {
        self.spaces
            .iter()
            .filter(|(_, status)| matches!(status, SpaceStatus::Fetched { .. }))
            .map(|(space, _)| space.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<String> {
        self.spaces
            .iter()
            .filter(|(_, status)| matches!(status, SpaceStatus::Failed { .. }))
            .map(|(space, _)| space.clone())
            .collect()
    }

    /// Every requested space failed; distinct from an empty result
    pub fn all_failed(&self) -> bool {
        !self.spaces.is_empty() && self.succeeded().is_empty()
    }

    /// Add the failures of a later fetch of the same spaces
    fn record_failures(&mut self, later: FetchReport) {
        self.spaces.extend(
            later
                .spaces
                .into_iter()
                .filter(|(_, status)| matches!(status, SpaceStatus::Failed { .. })),
        );
        self.spaces.sort_by(|a, b| a.0.cmp(&b.0));
    }
}

/// Ranked page plus what the call did to produce it
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub page: Page<FusedResult>,
    pub metadata: SearchMetadata,
    pub fetch_report: FetchReport,
}

/// Matchers built for one call before anything is fetched
struct Plan {
    strict: Vec<Arc<dyn Matcher>>,
    semantic: Option<SemanticMatcher>,
    skipped: Vec<Strategy>,
}

impl Plan {
    fn strategies(&self) -> Vec<Strategy> {
        let mut strategies: Vec<Strategy> = self.strict.iter().map(|m| m.strategy()).collect();
        if self.semantic.is_some() {
            strategies.push(Strategy::Semantic);
        }
        strategies.sort();
        strategies
    }
}

/// What the evaluation stage produced
struct Evaluation {
    results: Vec<StrategyResult>,
    semantic: SemanticStatus,
    /// Messages fetched without the window for the semantic fallback
    fallback_messages: Vec<Message>,
}

enum SemanticStatus {
    NotRun,
    Ran(SemanticOutcome),
    Failed,
}

/// Multi-strategy search engine over a message source
pub struct SearchEngine {
    source: Arc<dyn MessageSource>,
    settings: Settings,
    fusion: FusionConfig,
    cache: Arc<EmbeddingCache>,
    /// Loaded on the first semantic call
    embedder: OnceCell<EmbedderSlot>,
}

impl SearchEngine {
    /// Create an engine over `source`
    ///
    /// The embedding model is loaded on the first semantic call. A model that
    /// fails to load is not an error here: semantic searches report it per call.
    pub fn new(source: Arc<dyn MessageSource>, settings: Settings) -> Result<Self> {
        settings.validate()?;
        let semantic = settings.semantic_options()?;
        let cache = Arc::new(EmbeddingCache::new(
            semantic.cache_max_size,
            semantic.eviction_policy,
        ));

        Ok(Self {
            source,
            fusion: FusionConfig::from_settings(&settings),
            settings,
            cache,
            embedder: OnceCell::new(),
        })
    }

    /// Use `embedder` for the semantic strategy instead of the configured model
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        if self.settings.is_enabled(Strategy::Semantic) {
            self.embedder = OnceCell::new_with(Some(EmbedderSlot::Ready(embedder)));
        }
        self
    }

    /// Load the model on the blocking pool; the first caller does the work
    async fn embedder_slot(&self) -> &EmbedderSlot {
        self.embedder
            .get_or_init(|| async {
                if !self.settings.is_enabled(Strategy::Semantic) {
                    return EmbedderSlot::Disabled;
                }
                let loaded = match self.settings.semantic_options() {
                    Ok(options) => {
                        join(tokio::task::spawn_blocking(move || create_embedder(&options)))
                            .await
                            .and_then(|loaded| loaded)
                    }
                    Err(e) => Err(e),
                };
                match loaded {
                    Ok(embedder) => EmbedderSlot::Ready(embedder),
                    Err(e) => {
                        tracing::warn!(error = %e, "Semantic strategy unavailable");
                        EmbedderSlot::Unavailable(e.to_string())
                    }
                }
            })
            .await
    }

    /// Share an embedding cache with other engines
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Run one search call
    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse> {
        let query = params.to_query(&self.settings)?;
        let page_size = params.effective_page_size()?;
        let offset = match params.page_token.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(token) => PageToken::decode(token, &query.signature())?.offset,
        };

        let outcome = self.run(&query, offset, page_size).await?;
        let messages = outcome
            .page
            .items
            .into_iter()
            .map(|result| MessageHit::from_fused(result, params.include_sender_info))
            .collect();

        Ok(SearchResponse {
            messages,
            next_page_token: outcome.page.next_page_token,
            search_metadata: outcome.metadata,
        })
    }

    /// Run one search call under a deadline
    ///
    /// On expiry in-flight fetches are dropped and nothing partial is returned.
    pub async fn search_with_timeout(
        &self,
        params: &SearchParams,
        timeout: Duration,
    ) -> Result<SearchResponse> {
        match tokio::time::timeout(timeout, self.search(params)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Search cancelled");
                Err(SearchError::Timeout(timeout))
            }
        }
    }

    /// Ranked page for a validated query, starting at `offset`
    ///
    /// Ranking depends only on the query and the fetched messages, so the
    /// same query always yields the same list to paginate over.
    pub async fn run(
        &self,
        query: &SearchQuery,
        offset: usize,
        page_size: usize,
    ) -> Result<SearchOutcome> {
        query.validate()?;
        let window = query.window()?;
        let plan = self.plan(query).await?;
        let strategies = plan.strategies();

        tracing::info!(
            query = %query.raw_query,
            mode = %query.mode,
            strategies = ?strategies,
            spaces = ?query.target_spaces,
            "Search started"
        );

        let spaces = self.resolve_spaces(query).await?;
        let options = FetchOptions {
            window,
            limit: self.settings.search.max_results_per_space,
            extra_filter: query.extra_filter.clone(),
        };
        let (messages, mut fetch_report) = self.fetch_all(&spaces, &options).await?;

        let messages = Arc::new(messages);
        let evaluation = self
            .evaluate(&plan, query, &spaces, &options, &messages, &mut fetch_report)
            .await?;

        let mut index: HashMap<&str, &Message> =
            messages.iter().map(|m| (m.id.as_str(), m)).collect();
        for message in &evaluation.fallback_messages {
            index.entry(message.id.as_str()).or_insert(message);
        }
        let mut ranked = fuse(&evaluation.results, &index, &self.fusion);
        ranked.truncate(query.max_results);
        let total_results = ranked.len();

        let mut skipped = plan.skipped.clone();
        let mut fell_back = false;
        let mut used = strategies.clone();
        match evaluation.semantic {
            SemanticStatus::Ran(outcome) => fell_back = outcome.fell_back,
            SemanticStatus::Failed => {
                skipped.push(Strategy::Semantic);
                used.retain(|s| *s != Strategy::Semantic);
            }
            SemanticStatus::NotRun => {}
        }

        let page = paginate(ranked, &query.signature(), offset, page_size)?;

        tracing::info!(
            mode = %query.mode,
            spaces = spaces.len(),
            failed_spaces = fetch_report.failed().len(),
            messages = index.len(),
            matches = total_results,
            returned = page.items.len(),
            semantic_fallback = fell_back,
            "Search completed"
        );

        let metadata = SearchMetadata {
            mode: query.mode.as_str().to_string(),
            strategies: used,
            searched_spaces: fetch_report.succeeded(),
            failed_spaces: fetch_report.failed(),
            skipped_strategies: skipped,
            messages_searched: index.len(),
            total_results,
            semantic_date_fallback: fell_back,
        };

        Ok(SearchOutcome {
            page,
            metadata,
            fetch_report,
        })
    }

    /// Build every matcher the mode implies; input errors surface here
    async fn plan(&self, query: &SearchQuery) -> Result<Plan> {
        let explicit = query.mode != SearchMode::Hybrid;
        let mut plan = Plan {
            strict: Vec::new(),
            semantic: None,
            skipped: Vec::new(),
        };

        for strategy in query.mode.strategies() {
            if !self.settings.is_enabled(strategy) {
                if explicit {
                    return Err(SearchError::invalid(
                        "search_mode",
                        format!("strategy '{}' is disabled in configuration", strategy),
                    ));
                }
                continue;
            }

            match strategy {
                Strategy::Regex => {
                    let options = self.settings.pattern_options()?;
                    let matcher = PatternMatcher::new(&query.raw_query, &options)?;
                    plan.strict.push(Arc::new(matcher));
                }
                Strategy::Exact => {
                    let options = self.settings.literal_options()?;
                    plan.strict
                        .push(Arc::new(LiteralMatcher::new(&query.raw_query, &options)));
                }
                Strategy::Semantic => match self.semantic_matcher(query).await {
                    Ok(matcher) => plan.semantic = Some(matcher),
                    Err(e) if explicit => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping semantic strategy");
                        plan.skipped.push(Strategy::Semantic);
                    }
                },
            }
        }

        if plan.strict.is_empty() && plan.semantic.is_none() {
            return Err(match plan.skipped.first() {
                Some(_) => SearchError::EmbeddingUnavailable(
                    "no other strategy is enabled".to_string(),
                ),
                None => SearchError::invalid("search_mode", "no search strategy is enabled"),
            });
        }

        Ok(plan)
    }

    /// Semantic matcher bound to the query; the query is embedded off the runtime
    async fn semantic_matcher(&self, query: &SearchQuery) -> Result<SemanticMatcher> {
        let embedder = match self.embedder_slot().await {
            EmbedderSlot::Ready(embedder) => Arc::clone(embedder),
            EmbedderSlot::Unavailable(reason) => {
                return Err(SearchError::EmbeddingUnavailable(reason.clone()))
            }
            EmbedderSlot::Disabled => {
                return Err(SearchError::EmbeddingUnavailable(
                    "semantic strategy is disabled".to_string(),
                ))
            }
        };

        let options = self.settings.semantic_options()?;
        let cache = Arc::clone(&self.cache);
        let raw_query = query.raw_query.clone();
        join(tokio::task::spawn_blocking(move || {
            SemanticMatcher::new(&raw_query, embedder, cache, options)
        }))
        .await?
    }

    async fn resolve_spaces(&self, query: &SearchQuery) -> Result<Vec<String>> {
        match &query.target_spaces {
            Some(spaces) => Ok(spaces.iter().cloned().collect()),
            None => {
                let spaces = self.source.list_spaces().await?;
                let unique: BTreeSet<String> = spaces.into_iter().collect();
                tracing::debug!(source = self.source.name(), spaces = unique.len(), "Resolved spaces");
                Ok(unique.into_iter().collect())
            }
        }
    }

    /// Fetch every space with at most `max_concurrency` requests in flight
    ///
    /// Fails only when every space failed. Deleted messages are dropped and
    /// duplicates keep their first occurrence.
    async fn fetch_all(
        &self,
        spaces: &[String],
        options: &FetchOptions,
    ) -> Result<(Vec<Message>, FetchReport)> {
        let concurrency = self.settings.search.max_concurrency.max(1);
        let source = &self.source;

        let mut fetched: Vec<(String, Result<Vec<Message>>)> = stream::iter(spaces.iter().cloned())
            .map(|space| async move {
                let result = source.list_messages(&space, options).await;
                (space, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        fetched.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = FetchReport::default();
        let mut messages = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut first_error = None;

        for (space, result) in fetched {
            match result {
                Ok(batch) => {
                    report.spaces.push((
                        space,
                        SpaceStatus::Fetched {
                            messages: batch.len(),
                        },
                    ));
                    for message in batch {
                        if message.is_searchable() && seen.insert(message.id.clone()) {
                            messages.push(message);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(space = %space, error = %e, "Failed to fetch space");
                    report.spaces.push((
                        space,
                        SpaceStatus::Failed {
                            reason: e.to_string(),
                        },
                    ));
                    first_error.get_or_insert(e);
                }
            }
        }

        if report.all_failed() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok((messages, report))
    }

    /// Evaluate every planned strategy on blocking workers
    ///
    /// Strict strategies and the semantic window pass share the windowed
    /// candidates; only an empty window pass fetches again without the window.
    async fn evaluate(
        &self,
        plan: &Plan,
        query: &SearchQuery,
        spaces: &[String],
        options: &FetchOptions,
        messages: &Arc<Vec<Message>>,
        report: &mut FetchReport,
    ) -> Result<Evaluation> {
        let window = options.window;
        let strict: Vec<(Strategy, JoinHandle<Result<Vec<StrategyResult>>>)> = plan
            .strict
            .iter()
            .map(|matcher| {
                let matcher = Arc::clone(matcher);
                let messages = Arc::clone(messages);
                let strategy = matcher.strategy();
                let handle = tokio::task::spawn_blocking(move || {
                    run_strict(matcher.as_ref(), &messages, &window)
                });
                (strategy, handle)
            })
            .collect();

        let mut fallback_messages = Vec::new();
        let semantic = match &plan.semantic {
            None => SemanticStatus::NotRun,
            Some(matcher) => match self
                .run_semantic(matcher, spaces, options, messages, report)
                .await
            {
                Ok((outcome, fetched)) => {
                    tracing::debug!(
                        strategy = %Strategy::Semantic,
                        matches = outcome.matches.results.len(),
                        threshold = outcome.matches.threshold,
                        fell_back = outcome.fell_back,
                        "Strategy evaluated"
                    );
                    fallback_messages = fetched;
                    SemanticStatus::Ran(outcome)
                }
                Err(e) if query.mode == SearchMode::Semantic => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Semantic strategy failed, continuing without it");
                    SemanticStatus::Failed
                }
            },
        };

        let mut results = Vec::new();
        for (strategy, handle) in strict {
            let hits = join(handle).await??;
            tracing::debug!(strategy = %strategy, matches = hits.len(), "Strategy evaluated");
            results.extend(hits);
        }
        if let SemanticStatus::Ran(outcome) = &semantic {
            results.extend(outcome.matches.results.iter().cloned());
        }

        Ok(Evaluation {
            results,
            semantic,
            fallback_messages,
        })
    }

    /// Semantic window pass, then at most one unbounded fetch and pass
    ///
    /// Returns the outcome and the messages of the unbounded fetch, if any.
    async fn run_semantic(
        &self,
        matcher: &SemanticMatcher,
        spaces: &[String],
        options: &FetchOptions,
        messages: &Arc<Vec<Message>>,
        report: &mut FetchReport,
    ) -> Result<(SemanticOutcome, Vec<Message>)> {
        let window = options.window;
        let window_pass = {
            let matcher = matcher.clone();
            let messages = Arc::clone(messages);
            join(tokio::task::spawn_blocking(move || {
                semantic_window_pass(&matcher, &messages, &window)
            }))
            .await??
        };

        if !needs_fallback(&window_pass, &window) {
            let outcome = SemanticOutcome {
                matches: window_pass,
                fell_back: false,
            };
            return Ok((outcome, Vec::new()));
        }

        let unbounded = FetchOptions {
            window: DateWindow::unbounded(),
            ..options.clone()
        };
        let (fetched, fallback_report) = self.fetch_all(spaces, &unbounded).await?;
        report.record_failures(fallback_report);

        let candidates = Arc::new(fetched);
        let matches = {
            let matcher = matcher.clone();
            let candidates = Arc::clone(&candidates);
            join(tokio::task::spawn_blocking(move || {
                semantic_fallback_pass(&matcher, &candidates)
            }))
            .await??
        };

        let outcome = SemanticOutcome {
            matches,
            fell_back: true,
        };
        let fetched = Arc::try_unwrap(candidates).unwrap_or_else(|shared| (*shared).clone());
        Ok((outcome, fetched))
    }
}

async fn join<T>(handle: JoinHandle<T>) -> Result<T> {
    handle.await.map_err(|e| SearchError::Task(e.to_string()))
}
