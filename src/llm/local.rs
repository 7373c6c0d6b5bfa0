//! Offline question-answering model
//!
//! Matches the latest user turn against a small set of training questions
//! using TF-IDF cosine similarity and replies with the paired answer.
//! Temperature requests are routed to the thermostat functions when they
//! are available.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::Result;
use crate::chat::{ChatSnapshot, Role};
use crate::functions::{FunctionCall, FunctionDefinition};
use crate::pipeline::{Completion, LanguageModel};
use crate::thermostat::Zone;

/// English stopwords removed before matching
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "am", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her", "here",
    "him", "his", "how", "i", "if", "in", "is", "it", "its", "just", "me", "my", "no", "not", "of",
    "on", "or", "our", "she", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "up", "us", "was", "we", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "would", "you", "your", "yours",
];

/// Built-in training pairs
const DEFAULT_PAIRS: &[(&str, &str)] = &[
    ("What is your name?", "Denis Emadi"),
    ("How are you?", "25"),
    ("Tell me a joke.", "humor"),
];

/// Reply when nothing matches
const NO_MATCH: &str = "Sorry, I didn't understand that.";

/// Normalize text into match tokens
///
/// Lowercases, strips punctuation, drops stopwords and stems. If every
/// word is a stopword the unfiltered words are kept so short questions
/// like "how are you" still match.
#[must_use]
pub fn preprocess(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let filtered: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !STOPWORDS.contains(w))
        .collect();

    let kept = if filtered.is_empty() { words } else { filtered };
    kept.into_iter().map(stem).collect()
}

/// Strip common English suffixes
fn stem(word: &str) -> String {
    for suffix in ["ing", "ed", "ly", "s"] {
        if let Some(base) = word.strip_suffix(suffix)
            && base.len() >= 3
        {
            return base.to_string();
        }
    }
    word.to_string()
}

/// TF-IDF vectors over a fixed document set
#[derive(Debug, Clone)]
struct TfIdfIndex {
    idf: HashMap<String, f64>,
    documents: Vec<BTreeMap<String, f64>>,
}

impl TfIdfIndex {
    #[allow(clippy::cast_precision_loss)]
    fn fit(documents: &[Vec<String>]) -> Self {
        let n = documents.len() as f64;
        let mut df: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let unique: HashSet<&String> = doc.iter().collect();
            for term in unique {
                *df.entry(term.clone()).or_default() += 1;
            }
        }

        // Smoothed idf: ln((1 + n) / (1 + df)) + 1
        let idf = df
            .into_iter()
            .map(|(term, count)| (term, ((1.0 + n) / (1.0 + count as f64)).ln() + 1.0))
            .collect();

        let mut index = Self {
            idf,
            documents: Vec::new(),
        };
        index.documents = documents.iter().map(|d| index.vectorize(d)).collect();
        index
    }

    /// L2-normalized tf-idf vector; unknown terms are ignored
    fn vectorize(&self, tokens: &[String]) -> BTreeMap<String, f64> {
        let mut vector: BTreeMap<String, f64> = BTreeMap::new();
        for token in tokens {
            if let Some(idf) = self.idf.get(token) {
                *vector.entry(token.clone()).or_default() += idf;
            }
        }

        let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in vector.values_mut() {
                *value /= norm;
            }
        }
        vector
    }

    /// Index and cosine similarity of the closest document
    fn best_match(&self, tokens: &[String]) -> Option<(usize, f64)> {
        let query = self.vectorize(tokens);
        self.documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let score: f64 = query
                    .iter()
                    .filter_map(|(term, q)| doc.get(term).map(|d| q * d))
                    .sum();
                (i, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Similarity-matching model with optional thermostat routing
#[derive(Debug, Clone)]
pub struct SimilarityModel {
    index: TfIdfIndex,
    answers: Vec<String>,
}

impl Default for SimilarityModel {
    fn default() -> Self {
        Self::new(
            DEFAULT_PAIRS
                .iter()
                .map(|(q, a)| ((*q).to_string(), (*a).to_string())),
        )
    }
}

impl SimilarityModel {
    /// Train on question/answer pairs
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let (questions, answers): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
        let documents: Vec<Vec<String>> = questions.iter().map(|q| preprocess(q)).collect();
        Self {
            index: TfIdfIndex::fit(&documents),
            answers,
        }
    }

    /// Answer a question from the training set
    #[must_use]
    pub fn predict(&self, question: &str) -> Option<&str> {
        let tokens = preprocess(question);
        let (best, score) = self.index.best_match(&tokens)?;
        tracing::trace!(question, best, score, "similarity match");
        self.answers.get(best).map(String::as_str)
    }
}

#[async_trait]
impl LanguageModel for SimilarityModel {
    async fn complete(
        &self,
        chat: &ChatSnapshot,
        functions: &[FunctionDefinition],
    ) -> Result<Completion> {
        let Some(last) = chat.last() else {
            return Ok(Completion::text(NO_MATCH));
        };

        if last.role == Role::Function {
            return Ok(Completion::text(describe_function_result(&last.text)));
        }

        let question = chat
            .last_with_role(Role::User)
            .map_or("", |t| t.text.as_str());

        if let Some(call) = temperature_intent(question, functions) {
            tracing::debug!(function = %call.name, "routing to function");
            return Ok(Completion::call(call));
        }

        Ok(Completion::text(self.predict(question).unwrap_or(NO_MATCH)))
    }
}

/// Recognize "what's the temperature in the kitchen" / "set the office to 19"
fn temperature_intent(question: &str, functions: &[FunctionDefinition]) -> Option<FunctionCall> {
    let available = |name: &str| functions.iter().any(|f| f.name == name);
    let lowered = question.to_lowercase();

    let zone = Zone::ALL
        .into_iter()
        .find(|z| lowered.contains(z.spoken()) || lowered.contains(z.as_str()))?;

    let wants_change = ["set", "change", "make", "turn"]
        .iter()
        .any(|verb| lowered.split_whitespace().any(|w| w == *verb));
    let target = lowered
        .split(|c: char| !c.is_ascii_digit() && c != '-')
        .find_map(|n| n.parse::<i64>().ok());

    match (wants_change, target) {
        (true, Some(temp)) if available("set_temperature") => Some(FunctionCall::new(
            "set_temperature",
            json!({"zone": zone, "temp": temp}),
        )),
        _ if available("get_temperature")
            && (lowered.contains("temperature")
                || lowered.contains("degrees")
                || lowered.contains("warm")
                || lowered.contains("cold")) =>
        {
            Some(FunctionCall::new("get_temperature", json!({"zone": zone})))
        }
        _ => None,
    }
}

/// Turn a function result payload into a spoken sentence
fn describe_function_result(payload: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return payload.to_string();
    };

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return format!("Sorry, I couldn't do that: {error}");
    }
    if let Some(message) = value.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    match (
        value.get("zone").and_then(Value::as_str),
        value.get("temperature").and_then(Value::as_str),
    ) {
        (Some(zone), Some(temperature)) => {
            let spoken = match zone.parse::<Zone>() {
                Ok(parsed) => parsed.spoken(),
                Err(_) => zone,
            };
            format!("The temperature in the {spoken} is {temperature}.")
        }
        _ => payload.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatContext;
    use crate::functions::FunctionRegistry;
    use crate::thermostat::{Thermostat, register_functions};

    #[test]
    fn preprocess_drops_stopwords_and_punctuation() {
        assert_eq!(preprocess("What is your name?"), vec!["name"]);
        assert_eq!(preprocess("Tell me a joke."), vec!["tell", "joke"]);
        assert_eq!(preprocess("How are you?"), vec!["how", "are", "you"]);
        assert_eq!(preprocess("Running jokes"), vec!["runn", "joke"]);
    }

    #[test]
    fn predicts_training_answers() {
        let model = SimilarityModel::default();
        assert_eq!(model.predict("What is your name?"), Some("Denis Emadi"));
        assert_eq!(model.predict("what's your NAME"), Some("Denis Emadi"));
        assert_eq!(model.predict("how are you"), Some("25"));
        assert_eq!(model.predict("tell me a joke please"), Some("humor"));
        assert_eq!(model.predict("quantum chromodynamics"), None);
    }

    fn thermostat_functions() -> Vec<FunctionDefinition> {
        let mut registry = FunctionRegistry::new();
        register_functions(&mut registry, std::sync::Arc::new(Thermostat::new())).unwrap();
        registry.definitions()
    }

    #[tokio::test]
    async fn routes_temperature_questions() {
        let model = SimilarityModel::default();
        let functions = thermostat_functions();

        let mut ctx = ChatContext::new();
        ctx.append(Role::User, "What's the temperature in the living room?");
        let completion = model.complete(&ctx.snapshot(), &functions).await.unwrap();
        let call = completion.function_call.unwrap();
        assert_eq!(call.name, "get_temperature");
        assert_eq!(call.arguments, json!({"zone": "living_room"}));

        ctx.append(Role::User, "Set the office to 19 degrees");
        let call = model
            .complete(&ctx.snapshot(), &functions)
            .await
            .unwrap()
            .function_call
            .unwrap();
        assert_eq!(call.name, "set_temperature");
        assert_eq!(call.arguments, json!({"zone": "office", "temp": 19}));
    }

    #[tokio::test]
    async fn ignores_temperature_without_functions() {
        let model = SimilarityModel::default();
        let mut ctx = ChatContext::new();
        ctx.append(Role::User, "What's the temperature in the kitchen?");
        let completion = model.complete(&ctx.snapshot(), &[]).await.unwrap();
        assert!(completion.function_call.is_none());
    }

    #[tokio::test]
    async fn verbalizes_function_results() {
        let model = SimilarityModel::default();
        let mut ctx = ChatContext::new();
        ctx.append(Role::User, "How warm is the kitchen?");
        ctx.append_function_result(
            FunctionCall::new("get_temperature", json!({"zone": "kitchen"})),
            r#"{"zone":"kitchen","temperature":"24C"}"#,
        );

        let completion = model.complete(&ctx.snapshot(), &[]).await.unwrap();
        assert_eq!(completion.text, "The temperature in the kitchen is 24C.");
    }

    #[test]
    fn describes_errors() {
        assert_eq!(
            describe_function_result(r#"{"error":"device offline"}"#),
            "Sorry, I couldn't do that: device offline"
        );
    }
}
