//! Unread-count extraction.
//!
//! Sources are tried from least to most expensive: the page title, then
//! accessibility labels, then tooltips. Matching is on attribute text only,
//! so class-name churn in the page does not matter.

pub mod patterns;

pub use patterns::DetectionPattern;

use std::ops::ControlFlow;

use crate::config::DetectorConfig;
use crate::document::{Document, DocumentError};
use crate::error::BadgeResult;
use crate::signal::{UnreadCount, UnreadSignal};

pub const DEFAULT_LABEL_ATTRIBUTE: &str = "aria-label";
pub const DEFAULT_TOOLTIP_ATTRIBUTE: &str = "title";

/// Finds the unread count in a document. Holds only compiled patterns.
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    title_patterns: Vec<DetectionPattern>,
    label_patterns: Vec<DetectionPattern>,
    label_attribute: String,
    tooltip_attribute: String,
}

impl SignalExtractor {
    /// Extractor for `app_name` with the built-in locale table.
    pub fn new(app_name: &str) -> BadgeResult<Self> {
        Ok(SignalExtractor {
            title_patterns: patterns::title_patterns(app_name)?,
            label_patterns: patterns::builtin_label_patterns().to_vec(),
            label_attribute: DEFAULT_LABEL_ATTRIBUTE.to_string(),
            tooltip_attribute: DEFAULT_TOOLTIP_ATTRIBUTE.to_string(),
        })
    }

    /// Extractor built from user settings. Extra patterns rank after the
    /// built-in ones.
    pub fn from_config(config: &DetectorConfig) -> BadgeResult<Self> {
        let mut extractor = Self::new(&config.app_name)?;
        extractor.label_attribute = config.label_attribute.clone();
        extractor.tooltip_attribute = config.tooltip_attribute.clone();
        for extra in &config.extra_patterns {
            let rank = extractor.label_patterns.len();
            extractor
                .label_patterns
                .push(DetectionPattern::new(&extra.locale, rank, &extra.pattern)?);
        }
        Ok(extractor)
    }

    pub fn label_attribute(&self) -> &str {
        &self.label_attribute
    }

    pub fn label_patterns(&self) -> &[DetectionPattern] {
        &self.label_patterns
    }

    /// Current unread signal of `doc`.
    ///
    /// Unmatched or malformed content yields `Absent`; only a document that
    /// cannot be read at all returns an error.
    pub fn find(&self, doc: &dyn Document) -> Result<UnreadSignal, DocumentError> {
        if let Some(title) = doc.title()? {
            if let Some(count) = first_extract(&self.title_patterns, &title) {
                return Ok(UnreadSignal::Count(count));
            }
        }

        for attribute in [&self.label_attribute, &self.tooltip_attribute] {
            if let Some(count) = self.scan(doc, attribute)? {
                return Ok(UnreadSignal::Count(count));
            }
        }

        Ok(UnreadSignal::Absent)
    }

    fn scan(
        &self,
        doc: &dyn Document,
        attribute: &str,
    ) -> Result<Option<UnreadCount>, DocumentError> {
        let mut found = None;
        doc.scan_attribute(attribute, &mut |text: &str| {
            match first_extract(&self.label_patterns, text) {
                Some(count) => {
                    found = Some(count);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            }
        })?;
        Ok(found)
    }
}

fn first_extract(patterns: &[DetectionPattern], text: &str) -> Option<UnreadCount> {
    patterns
        .iter()
        .find_map(|p| p.extract(text))
        .and_then(UnreadCount::parse)
}
