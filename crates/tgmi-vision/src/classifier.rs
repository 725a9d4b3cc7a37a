//! Rule-based mapping from raw detections to an [`ImageCategory`].

use std::collections::{BTreeSet, HashSet};

use tgmi_core::{ClassifiedDetection, DetectionResult, ImageCategory};

use crate::error::ClassifierError;

/// Labels that count as a person or as a product.
///
/// Matching is case-insensitive. The two sets must be disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSets {
    person: BTreeSet<String>,
    product: BTreeSet<String>,
}

impl LabelSets {
    /// # Errors
    ///
    /// Returns [`ClassifierError::OverlappingLabels`] if a label appears in
    /// both sets.
    pub fn new<P, Q, S>(person: P, product: Q) -> Result<Self, ClassifierError>
    where
        P: IntoIterator<Item = S>,
        Q: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let person: BTreeSet<String> = person.into_iter().map(|s| normalize(s.as_ref())).collect();
        let product: BTreeSet<String> =
            product.into_iter().map(|s| normalize(s.as_ref())).collect();

        let overlap: Vec<String> = person.intersection(&product).cloned().collect();
        if !overlap.is_empty() {
            return Err(ClassifierError::OverlappingLabels(overlap));
        }

        Ok(Self { person, product })
    }

    #[must_use]
    pub fn is_person(&self, label: &str) -> bool {
        self.person.contains(&normalize(label))
    }

    #[must_use]
    pub fn is_product(&self, label: &str) -> bool {
        self.product.contains(&normalize(label))
    }
}

impl Default for LabelSets {
    /// `person` versus the COCO classes used as product proxies.
    fn default() -> Self {
        Self {
            person: BTreeSet::from(["person".to_string()]),
            product: ["bottle", "cup", "bowl", "mouse", "keyboard"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// One row of the category decision table.
#[derive(Debug, Clone, Copy)]
struct CategoryRule {
    has_person: bool,
    has_product: bool,
    category: ImageCategory,
}

/// Evaluated top to bottom; the first matching row wins.
const DECISION_TABLE: &[CategoryRule] = &[
    CategoryRule {
        has_person: true,
        has_product: true,
        category: ImageCategory::Promotional,
    },
    CategoryRule {
        has_person: false,
        has_product: true,
        category: ImageCategory::ProductDisplay,
    },
    CategoryRule {
        has_person: true,
        has_product: false,
        category: ImageCategory::Lifestyle,
    },
    CategoryRule {
        has_person: false,
        has_product: false,
        category: ImageCategory::Other,
    },
];

fn decide(has_person: bool, has_product: bool) -> ImageCategory {
    DECISION_TABLE
        .iter()
        .find(|rule| rule.has_person == has_person && rule.has_product == has_product)
        .map_or(ImageCategory::Other, |rule| rule.category)
}

/// Assigns one semantic category per detection result. Pure; no I/O.
#[derive(Debug, Clone, Default)]
pub struct VisualClassifier {
    labels: LabelSets,
}

impl VisualClassifier {
    #[must_use]
    pub fn new(labels: LabelSets) -> Self {
        Self { labels }
    }

    #[must_use]
    pub fn labels(&self) -> &LabelSets {
        &self.labels
    }

    /// Classifies one result. An empty result yields `other` with score 0.
    ///
    /// Blank labels are ignored entirely. Labels differing only in case are
    /// listed once, under their first-seen spelling.
    #[must_use]
    pub fn classify(&self, result: &DetectionResult) -> ClassifiedDetection {
        let mut has_person = false;
        let mut has_product = false;
        let mut confidence_score = 0.0_f64;
        let mut seen: HashSet<String> = HashSet::new();
        let mut labels: Vec<&str> = Vec::new();

        for detection in &result.detections {
            let label = detection.label.trim();
            if label.is_empty() {
                continue;
            }
            has_person |= self.labels.is_person(label);
            has_product |= self.labels.is_product(label);
            confidence_score = confidence_score.max(detection.confidence);
            if seen.insert(normalize(label)) {
                labels.push(label);
            }
        }

        ClassifiedDetection {
            message_id: result.message_id,
            channel_name: result.channel_name.clone(),
            detected_objects: labels.join(", "),
            confidence_score,
            image_category: decide(has_person, has_product),
        }
    }
}

#[cfg(test)]
#[path = "classifier_test.rs"]
mod tests;
