// Ingestion of new FAQ entries
// Merges per-entry documents into the main knowledge document by category name


use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::{GROUPED_ROOT_KEY, KnowledgeBase, QaPair, SourceLayout};
use crate::{FaqError, Result};

/// One new entry; all three fields are required
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestEntry {
    pub category: String,
    pub question: String,
    pub answer: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IngestDocument {
    Wrapped {
        #[serde(rename = "faq_data")]
        entries: Vec<IngestEntry>,
    },
    Bare(Vec<IngestEntry>),
}

/// Outcome of merging a batch of entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub appended: usize,
    pub categories_created: Vec<String>,
}

/// Parse `{"faq_data": [entry, ...]}` or a bare `[entry, ...]`
#[inline]
pub fn parse_entries(content: &str) -> Result<Vec<IngestEntry>> {
    let document: IngestDocument = serde_json::from_str(content).map_err(|e| {
        FaqError::MalformedSource(format!(
            "ingestion document must be '{{\"{}\": [{{category, question, answer}}]}}': {}",
            GROUPED_ROOT_KEY, e
        ))
    })?;

    let entries = match document {
        IngestDocument::Wrapped { entries } | IngestDocument::Bare(entries) => entries,
    };

    for (index, entry) in entries.iter().enumerate() {
        if entry.category.trim().is_empty() {
            return Err(FaqError::MalformedSource(format!(
                "entry {} has an empty category",
                index
            )));
        }
        if entry.question.trim().is_empty() {
            return Err(FaqError::MalformedSource(format!(
                "entry {} has an empty question",
                index
            )));
        }
    }

    Ok(entries)
}

#[inline]
pub fn read_entries<P: AsRef<Path>>(path: P) -> Result<Vec<IngestEntry>> {
    let path = path.as_ref();
    debug!("Reading new FAQ entries from {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        FaqError::MalformedSource(format!("cannot read {}: {}", path.display(), e))
    })?;
    let entries = parse_entries(&content)?;
    info!("Read {} new FAQ entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Merge entries in order. A category matching exactly (case-sensitive) gets
/// the pair appended; otherwise one new category is created at the end.
///
/// A keyed document cannot hold a category named `faq_data`, since that key
/// marks the grouped layout on the next load. Such a batch is rejected before
/// anything is merged.
#[inline]
pub fn merge_entries(knowledge: &mut KnowledgeBase, entries: &[IngestEntry]) -> Result<MergeReport> {
    if knowledge.layout() == SourceLayout::Keyed {
        if let Some(index) = entries
            .iter()
            .position(|entry| entry.category == GROUPED_ROOT_KEY)
        {
            return Err(FaqError::MalformedSource(format!(
                "entry {} uses the reserved category name '{}'",
                index, GROUPED_ROOT_KEY
            )));
        }
    }

    let mut report = MergeReport::default();

    for entry in entries {
        let created = knowledge.push_pair(
            &entry.category,
            QaPair::new(entry.question.clone(), entry.answer.clone()),
        );

        if created {
            debug!("Created new category '{}'", entry.category);
            report.categories_created.push(entry.category.clone());
        } else {
            debug!("Added question to existing category '{}'", entry.category);
        }
        report.appended += 1;
    }

    Ok(report)
}

/// Load `source`, merge the entries from `new_entries`, and write `source` back
#[inline]
pub fn ingest_file<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    new_entries: Q,
) -> Result<(KnowledgeBase, MergeReport)> {
    let entries = read_entries(new_entries)?;
    let mut knowledge = KnowledgeBase::load(source.as_ref())?;

    let report = merge_entries(&mut knowledge, &entries)?;
    knowledge.save(source.as_ref())?;

    info!(
        "Merged {} entries into {} ({} new categories)",
        report.appended,
        source.as_ref().display(),
        report.categories_created.len()
    );
    Ok((knowledge, report))
}
