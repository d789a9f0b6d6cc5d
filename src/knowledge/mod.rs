// Knowledge base module
// Loads the curated question/answer document and flattens it into ordered records

#[cfg(test)]
mod tests;

pub mod ingest;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{FaqError, Result};

/// Key holding the category groups in the grouped layout
pub const GROUPED_ROOT_KEY: &str = "faq_data";

/// A single question/answer pair as it appears in the knowledge document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    /// Keys other than `question`/`answer`, written back unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QaPair {
    #[inline]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            extra: Map::new(),
        }
    }
}

/// Named group of question/answer pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub questions: Vec<QaPair>,
    /// Keys of a grouped entry other than `category`/`questions`
    pub extra: Map<String, Value>,
}

/// Flattened, indexable knowledge record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QARecord {
    /// Stable identifier, `<category>#<ordinal within category>`
    pub id: String,
    pub category: String,
    pub question: String,
    pub answer: String,
}

/// Shape of the document the knowledge base was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceLayout {
    /// `{"faq_data": [{"category": "...", "questions": [...]}]}`
    #[default]
    Grouped,
    /// `{"<category>": [{"question": "...", "answer": "..."}]}`
    Keyed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KnowledgeBase {
    categories: Vec<Category>,
    layout: SourceLayout,
    /// Top-level keys next to `faq_data` in the grouped layout
    extra: Map<String, Value>,
}

impl KnowledgeBase {
    #[inline]
    pub fn new(layout: SourceLayout) -> Self {
        Self {
            categories: Vec::new(),
            layout,
            extra: Map::new(),
        }
    }

    /// Load and validate a knowledge document from disk
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading knowledge base from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            FaqError::MalformedSource(format!("cannot read {}: {}", path.display(), e))
        })?;

        let knowledge = Self::from_json_str(&content)?;
        info!(
            "Loaded {} records in {} categories from {}",
            knowledge.len(),
            knowledge.categories.len(),
            path.display()
        );
        Ok(knowledge)
    }

    #[inline]
    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| FaqError::MalformedSource(format!("invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate a parsed document; every violation names its location
    #[inline]
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(root) = value else {
            return Err(FaqError::MalformedSource(
                "top level must be a JSON object".to_string(),
            ));
        };

        let knowledge = if root.contains_key(GROUPED_ROOT_KEY) {
            Self::parse_grouped(root)?
        } else {
            Self::parse_keyed(root)?
        };

        knowledge.validate_category_names()?;
        Ok(knowledge)
    }

    fn parse_grouped(mut root: Map<String, Value>) -> Result<Self> {
        let groups = match root.remove(GROUPED_ROOT_KEY) {
            Some(Value::Array(groups)) => groups,
            _ => {
                return Err(FaqError::MalformedSource(format!(
                    "'{}' must be an array of categories",
                    GROUPED_ROOT_KEY
                )));
            }
        };

        let mut categories = Vec::with_capacity(groups.len());
        for (group_index, group) in groups.into_iter().enumerate() {
            let location = format!("{}[{}]", GROUPED_ROOT_KEY, group_index);
            let Value::Object(mut group) = group else {
                return Err(FaqError::MalformedSource(format!(
                    "{} must be an object",
                    location
                )));
            };

            let name = match group.remove("category") {
                Some(Value::String(name)) => name,
                Some(_) => {
                    return Err(FaqError::MalformedSource(format!(
                        "{}.category must be a string",
                        location
                    )));
                }
                None => {
                    return Err(FaqError::MalformedSource(format!(
                        "{} is missing required key 'category'",
                        location
                    )));
                }
            };

            let questions = match group.remove("questions") {
                Some(Value::Array(questions)) => questions,
                Some(_) => {
                    return Err(FaqError::MalformedSource(format!(
                        "{}.questions must be an array",
                        location
                    )));
                }
                None => {
                    return Err(FaqError::MalformedSource(format!(
                        "{} is missing required key 'questions'",
                        location
                    )));
                }
            };

            let questions = parse_pairs(questions, &format!("{}.questions", location))?;
            categories.push(Category {
                name,
                questions,
                extra: group,
            });
        }

        Ok(Self {
            categories,
            layout: SourceLayout::Grouped,
            extra: root,
        })
    }

    fn parse_keyed(root: Map<String, Value>) -> Result<Self> {
        let mut categories = Vec::with_capacity(root.len());
        for (name, questions) in root {
            let Value::Array(questions) = questions else {
                return Err(FaqError::MalformedSource(format!(
                    "category '{}' must map to an array of question/answer pairs",
                    name
                )));
            };
            let questions = parse_pairs(questions, &name)?;
            categories.push(Category {
                name,
                questions,
                extra: Map::new(),
            });
        }

        Ok(Self {
            categories,
            layout: SourceLayout::Keyed,
            extra: Map::new(),
        })
    }

    fn validate_category_names(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.categories.len());
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(FaqError::MalformedSource(
                    "category names cannot be empty".to_string(),
                ));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(FaqError::MalformedSource(format!(
                    "duplicate category '{}'",
                    category.name
                )));
            }
        }
        Ok(())
    }

    /// Flatten into records, preserving document order
    #[inline]
    pub fn records(&self) -> Vec<QARecord> {
        self.categories
            .iter()
            .flat_map(|category| {
                category
                    .questions
                    .iter()
                    .enumerate()
                    .map(move |(ordinal, pair)| QARecord {
                        id: format!("{}#{}", category.name, ordinal),
                        category: category.name.clone(),
                        question: pair.question.clone(),
                        answer: pair.answer.clone(),
                    })
            })
            .collect()
    }

    #[inline]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[inline]
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    #[inline]
    pub fn layout(&self) -> SourceLayout {
        self.layout
    }

    /// Number of question/answer records across all categories
    #[inline]
    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.questions.len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a pair to `category` (exact, case-sensitive match), creating the
    /// category at the end when it does not exist. Returns true if created.
    pub(crate) fn push_pair(&mut self, category: &str, pair: QaPair) -> bool {
        if let Some(existing) = self.categories.iter_mut().find(|c| c.name == category) {
            existing.questions.push(pair);
            false
        } else {
            self.categories.push(Category {
                name: category.to_string(),
                questions: vec![pair],
                extra: Map::new(),
            });
            true
        }
    }

    /// Serialize back into the layout the document was loaded from
    #[inline]
    pub fn to_value(&self) -> Value {
        match self.layout {
            SourceLayout::Grouped => {
                let groups = self
                    .categories
                    .iter()
                    .map(|category| {
                        let mut group = Map::new();
                        group.insert("category".to_string(), Value::String(category.name.clone()));
                        group.insert("questions".to_string(), pairs_to_value(&category.questions));
                        group.extend(category.extra.clone());
                        Value::Object(group)
                    })
                    .collect();
                let mut root = Map::new();
                root.insert(GROUPED_ROOT_KEY.to_string(), Value::Array(groups));
                root.extend(self.extra.clone());
                Value::Object(root)
            }
            SourceLayout::Keyed => Value::Object(
                self.categories
                    .iter()
                    .map(|category| (category.name.clone(), pairs_to_value(&category.questions)))
                    .collect(),
            ),
        }
    }

    /// Write the document with four-space indentation. The file is replaced
    /// by renaming a sibling temp file, so readers never see a partial write.
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.to_value()
            .serialize(&mut serializer)
            .map_err(|e| FaqError::Other(anyhow::anyhow!("Failed to serialize knowledge base: {}", e)))?;
        buffer.push(b'\n');

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&buffer)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| FaqError::Io(e.error))?;
        debug!("Saved knowledge base with {} records to {}", self.len(), path.display());
        Ok(())
    }
}

fn parse_pairs(values: Vec<Value>, location: &str) -> Result<Vec<QaPair>> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| parse_pair(value, &format!("{}[{}]", location, index)))
        .collect()
}

fn parse_pair(value: Value, location: &str) -> Result<QaPair> {
    let Value::Object(mut pair) = value else {
        return Err(FaqError::MalformedSource(format!(
            "{} must be an object",
            location
        )));
    };

    let question = required_string(&mut pair, "question", location)?;
    if question.trim().is_empty() {
        return Err(FaqError::MalformedSource(format!(
            "{}.question cannot be empty",
            location
        )));
    }
    let answer = required_string(&mut pair, "answer", location)?;

    Ok(QaPair {
        question,
        answer,
        extra: pair,
    })
}

fn required_string(object: &mut Map<String, Value>, key: &str, location: &str) -> Result<String> {
    match object.remove(key) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(FaqError::MalformedSource(format!(
            "{}.{} must be a string",
            location, key
        ))),
        None => Err(FaqError::MalformedSource(format!(
            "{} is missing required key '{}'",
            location, key
        ))),
    }
}

fn pairs_to_value(pairs: &[QaPair]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|pair| {
                let mut object = Map::new();
                object.insert("question".to_string(), Value::String(pair.question.clone()));
                object.insert("answer".to_string(), Value::String(pair.answer.clone()));
                object.extend(pair.extra.clone());
                Value::Object(object)
            })
            .collect(),
    )
}
