use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::ProviderError;
use crate::types::QuestionBundle;

/// One catalog record a question can be built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub subject: String,
    pub answer: String,
}

/// category -> question kind -> entries.
pub type Catalog = HashMap<String, HashMap<String, Vec<CatalogEntry>>>;

/// A question under construction: everything but its sequence id.
#[derive(Debug, Clone)]
pub struct RawQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_key: usize,
}

/// Builds one question from a kind's catalog entries. Returns `None` when
/// the entries cannot yield enough distinct options.
pub type QuestionBuilder = fn(&[CatalogEntry]) -> Option<RawQuestion>;

/// Maps `"category/kind"` keys to question constructor functions.
///
/// New question kinds are added by registering a builder; the dispatch
/// in [`CatalogProvider`] never needs to change.
pub struct BuilderRegistry {
    builders: HashMap<String, QuestionBuilder>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self { builders: HashMap::new() }
    }

    /// The registry with every built-in question kind.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("geography/officialLanguage", official_language_question);
        registry.register("geography/capital", capital_question);
        registry.register("sport/nhlPoints", nhl_points_question);
        registry.register("history/warYear", war_year_question);
        registry
    }

    pub fn register(&mut self, key: &str, builder: QuestionBuilder) {
        self.builders.insert(key.to_string(), builder);
    }

    pub fn get(&self, key: &str) -> Option<QuestionBuilder> {
        self.builders.get(key).copied()
    }
}

fn official_language_question(entries: &[CatalogEntry]) -> Option<RawQuestion> {
    multiple_choice(entries, |e| {
        format!("What is the official language of {}?", e.subject)
    })
}

fn capital_question(entries: &[CatalogEntry]) -> Option<RawQuestion> {
    multiple_choice(entries, |e| format!("What is the capital of {}?", e.subject))
}

fn nhl_points_question(entries: &[CatalogEntry]) -> Option<RawQuestion> {
    multiple_choice(entries, |e| {
        format!("How many career NHL points did {} score?", e.subject)
    })
}

fn war_year_question(entries: &[CatalogEntry]) -> Option<RawQuestion> {
    multiple_choice(entries, |e| format!("In which year did {} begin?", e.subject))
}

/// Shared builder core: picks a random entry, takes its answer as the
/// correct option and three distinct sibling answers as distractors.
fn multiple_choice(
    entries: &[CatalogEntry],
    prompt: impl Fn(&CatalogEntry) -> String,
) -> Option<RawQuestion> {
    let mut rng = rand::rng();
    let picked = entries.choose(&mut rng)?;

    let mut distractors: Vec<String> = entries
        .iter()
        .map(|e| e.answer.clone())
        .filter(|a| *a != picked.answer)
        .collect();
    distractors.sort();
    distractors.dedup();
    if distractors.len() < 3 {
        return None;
    }
    distractors.shuffle(&mut rng);
    distractors.truncate(3);

    let mut options = distractors;
    options.push(picked.answer.clone());
    options.shuffle(&mut rng);
    let answer_key = options.iter().position(|o| *o == picked.answer)?;

    Some(RawQuestion {
        prompt: prompt(picked),
        options,
        answer_key,
    })
}

/// A question set being built in the background. The result arrives
/// through a oneshot resolved exactly once when construction finishes.
pub struct PendingQuestionSet {
    rx: oneshot::Receiver<Result<Vec<QuestionBundle>, ProviderError>>,
}

impl PendingQuestionSet {
    /// Waits for the builder task to finish.
    pub async fn resolve(self) -> Result<Vec<QuestionBundle>, ProviderError> {
        self.rx.await.unwrap_or(Err(ProviderError::Cancelled))
    }
}

/// Question provider backed by the configured catalog.
pub struct CatalogProvider {
    catalog: Arc<Catalog>,
    registry: Arc<BuilderRegistry>,
}

impl CatalogProvider {
    pub fn new(catalog: Catalog, registry: BuilderRegistry) -> Self {
        Self {
            catalog: Arc::new(catalog),
            registry: Arc::new(registry),
        }
    }

    /// Starts building `count` questions drawn from the selected categories
    /// (all catalog categories when the selector is empty). Runs in its own
    /// task so session ticks are never stalled by question construction.
    pub fn question_set(&self, categories: &[String], count: usize) -> PendingQuestionSet {
        let (tx, rx) = oneshot::channel();
        let catalog = self.catalog.clone();
        let registry = self.registry.clone();
        let categories = categories.to_vec();

        tokio::spawn(async move {
            let result = build_set(&catalog, &registry, &categories, count);
            let _ = tx.send(result);
        });

        PendingQuestionSet { rx }
    }
}

fn build_set(
    catalog: &Catalog,
    registry: &BuilderRegistry,
    categories: &[String],
    count: usize,
) -> Result<Vec<QuestionBundle>, ProviderError> {
    let selected: Vec<&String> = if categories.is_empty() {
        catalog.keys().collect()
    } else {
        for category in categories {
            if !catalog.contains_key(category) {
                return Err(ProviderError::UnknownKind(category.clone()));
            }
        }
        categories.iter().collect()
    };
    if selected.is_empty() {
        return Err(ProviderError::NotEnoughEntries("catalog".to_string()));
    }

    let mut rng = rand::rng();
    let mut questions = Vec::with_capacity(count);

    for id in 0..count {
        let category = selected
            .choose(&mut rng)
            .ok_or_else(|| ProviderError::NotEnoughEntries("catalog".to_string()))?;
        let kinds: Vec<&String> = catalog[*category].keys().collect();
        let kind = kinds
            .choose(&mut rng)
            .ok_or_else(|| ProviderError::NotEnoughEntries((*category).clone()))?;
        let key = format!("{}/{}", category, kind);

        let builder = registry
            .get(&key)
            .ok_or_else(|| ProviderError::UnknownKind(key.clone()))?;
        let raw = builder(&catalog[*category][*kind])
            .ok_or_else(|| ProviderError::NotEnoughEntries(key.clone()))?;

        questions.push(QuestionBundle {
            id,
            prompt: raw.prompt,
            options: raw.options,
            answer_key: raw.answer_key,
        });
    }

    Ok(questions)
}
