//! Subject classification for the sovereign feed.
//!
//! Decisions flow cache -> override registry -> jurisdiction resolver, and
//! every ambiguity resolves to exclusion. The resolver seam exists because
//! keyword matching on subject identifiers is a development stand-in for a
//! real jurisdiction lookup; swapping the resolver must not change the
//! calling contract.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::SovereignConfig;
use crate::event::StreamEvent;

/// Upper bound on cached classifications before oldest entries are evicted
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Validity window for a cached classification
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Jurisdiction resolvers
// ============================================================================

/// A pluggable jurisdiction lookup for subjects the classifier has not seen.
///
/// `resolve` returns `Some(included)` when the resolver can decide, `None`
/// when it has no data for the subject. Implementations must be pure and
/// side-effect free: the classifier invokes them outside any lock.
pub trait JurisdictionResolver: Send + Sync {
    fn resolve(&self, subject: &str) -> Option<bool>;
    fn name(&self) -> &'static str;
}

/// Canadian city/region/country names, matched as substrings
const CA_KEYWORDS: &[&str] = &[
    "canadian",
    "canada",
    "toronto",
    "vancouver",
    "montreal",
    "calgary",
    "ottawa",
    "edmonton",
    "winnipeg",
    "quebec",
    "halifax",
    "victoria",
    "saskatoon",
    "regina",
    "fredericton",
];

/// Development-stub resolver: case-insensitive substring match of the
/// subject identifier against a fixed jurisdiction keyword table.
///
/// Jurisdictions without a table resolve everything to excluded.
pub struct KeywordResolver {
    keywords: &'static [&'static str],
}

impl KeywordResolver {
    pub fn for_country(country_code: &str) -> Self {
        let keywords = match country_code.to_uppercase().as_str() {
            "CA" => CA_KEYWORDS,
            _ => &[],
        };
        Self { keywords }
    }
}

impl JurisdictionResolver for KeywordResolver {
    fn resolve(&self, subject: &str) -> Option<bool> {
        let subject = subject.to_lowercase();
        Some(self.keywords.iter().any(|kw| subject.contains(kw)))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Explicit-registry resolver over a preloaded classification table, the
/// shape a registration-time or identity-document lookup plugs in as.
pub struct StaticRegistryResolver {
    entries: HashMap<String, bool>,
}

impl StaticRegistryResolver {
    pub fn from_entries(entries: HashMap<String, bool>) -> Self {
        Self { entries }
    }
}

impl JurisdictionResolver for StaticRegistryResolver {
    fn resolve(&self, subject: &str) -> Option<bool> {
        self.entries.get(subject).copied()
    }

    fn name(&self) -> &'static str {
        "static-registry"
    }
}

// ============================================================================
// Classification cache
// ============================================================================

struct CacheEntry {
    included: bool,
    inserted_at: Instant,
}

/// Bounded, time-indexed classification store.
///
/// Reads never mutate, so lookups run entirely under a shared lock; an entry
/// past its validity window simply reads as a miss and is overwritten by the
/// next commit. Inserts evict from the front of the expiry queue once the
/// capacity is reached. The queue may hold ghost entries for keys that were
/// re-inserted since; eviction detects them by comparing timestamps and
/// skips them.
struct ClassificationCache {
    entries: HashMap<String, CacheEntry>,
    expiry_order: VecDeque<(String, Instant)>,
    max_entries: usize,
    ttl: Duration,
}

impl ClassificationCache {
    fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            expiry_order: VecDeque::new(),
            max_entries,
            ttl,
        }
    }

    fn get(&self, subject: &str) -> Option<bool> {
        let entry = self.entries.get(subject)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.included)
    }

    fn insert(&mut self, subject: String, included: bool) {
        while self.entries.len() >= self.max_entries {
            let Some((candidate, queued_at)) = self.expiry_order.pop_front() else {
                break;
            };
            match self.entries.get(&candidate) {
                // Ghost entry: the key was re-inserted after this queue slot
                // was recorded, a newer slot exists further back.
                Some(live) if live.inserted_at != queued_at => continue,
                Some(_) => {
                    self.entries.remove(&candidate);
                }
                None => continue,
            }
        }

        let inserted_at = Instant::now();
        self.expiry_order.push_back((subject.clone(), inserted_at));
        self.entries.insert(
            subject,
            CacheEntry {
                included,
                inserted_at,
            },
        );
    }

    fn snapshot(&self) -> HashMap<String, bool> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() < self.ttl)
            .map(|(subject, entry)| (subject.clone(), entry.included))
            .collect()
    }
}

// ============================================================================
// Geographic classifier
// ============================================================================

/// Per-subject inclusion decisions for the sovereign feed.
pub struct GeographicClassifier {
    cache: RwLock<ClassificationCache>,
    overrides: RwLock<HashMap<String, bool>>,
    resolver: Box<dyn JurisdictionResolver>,
    overrides_path: Option<String>,
}

impl GeographicClassifier {
    pub fn new(sovereign: &SovereignConfig) -> Self {
        Self::with_resolver(
            Box::new(KeywordResolver::for_country(&sovereign.country_code)),
            sovereign.overrides_path.clone(),
        )
    }

    pub fn with_resolver(
        resolver: Box<dyn JurisdictionResolver>,
        overrides_path: Option<String>,
    ) -> Self {
        Self {
            cache: RwLock::new(ClassificationCache::new(
                DEFAULT_CACHE_CAPACITY,
                DEFAULT_CACHE_TTL,
            )),
            overrides: RwLock::new(HashMap::new()),
            resolver,
            overrides_path,
        }
    }

    /// Loads the operator override file when one is configured.
    ///
    /// A configured path that cannot be read or parsed is a hard error so a
    /// misconfigured sovereign deployment fails at startup instead of
    /// silently running without its override data.
    pub fn initialize(&self) -> Result<()> {
        let Some(path) = &self.overrides_path else {
            return Ok(());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read subject overrides from {path}"))?;
        let entries: HashMap<String, bool> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse subject overrides from {path}"))?;

        let count = entries.len();
        for (subject, included) in entries {
            self.add_known_subject(&subject, included);
        }

        tracing::info!(
            count = count,
            path = %path,
            resolver = self.resolver.name(),
            "Loaded subject classification overrides"
        );
        Ok(())
    }

    /// Whether the event's subject belongs to the governed jurisdiction.
    ///
    /// Never fails: a missing event, a missing subject, and an undecidable
    /// subject all classify as excluded.
    pub fn should_include(&self, event: Option<&StreamEvent>) -> bool {
        let Some(subject) = event.and_then(StreamEvent::subject) else {
            return false;
        };

        if let Some(cached) = self
            .cache
            .read()
            .expect("classification cache lock poisoned")
            .get(subject)
        {
            return cached;
        }

        if let Some(&known) = self
            .overrides
            .read()
            .expect("override registry lock poisoned")
            .get(subject)
        {
            self.commit(subject, known);
            return known;
        }

        // Pure computation, deliberately outside any lock. Concurrent misses
        // on the same subject recompute the same value and the last writer
        // commits it again unchanged.
        let included = self.resolver.resolve(subject).unwrap_or(false);
        self.commit(subject, included);
        included
    }

    /// Records an operator-asserted classification. Overrides win over any
    /// cached heuristic result; last write wins.
    pub fn add_known_subject(&self, subject: &str, included: bool) {
        self.overrides
            .write()
            .expect("override registry lock poisoned")
            .insert(subject.to_string(), included);
        self.commit(subject, included);
    }

    /// Defensive copy of the current cache contents
    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.cache
            .read()
            .expect("classification cache lock poisoned")
            .snapshot()
    }

    fn commit(&self, subject: &str, included: bool) {
        self.cache
            .write()
            .expect("classification cache lock poisoned")
            .insert(subject.to_string(), included);
    }
}
