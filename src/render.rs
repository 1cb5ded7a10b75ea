//! Markdown note rendering.
//!
//! Templates use `{{name}}` placeholders, substituted in a single pass.
//! Recognized names are `title`, `bibtex`, `date`, `key`, `authors`, `year`,
//! `doi` and `tier`, plus any variables from `[template.variables]`.
//! Unknown placeholders are left as written.

use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::{expand_home, TemplateConfig};
use crate::error::PipelineError;
use crate::models::{BibtexRecord, ConfidenceTier};

/// Template used when no template path is configured
pub const DEFAULT_TEMPLATE: &str = "---
start date: {{date}}
end date: //
tags:
  -
---
# {{title}}

```bibtex
{{bibtex}}
```

## Background, Motivation and Purpose

### Background

### Motivation

### Purpose

## Literature Review

## Research Questions

## Methods

### Materials

### Experimental Design

### Measurement

## Results

## Discussion
";

/// Where a note's template came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    BuiltIn,
    File(PathBuf),
}

/// Values available to a template
#[derive(Debug, Clone)]
pub struct NoteFields {
    pub key: String,
    pub title: String,
    pub bibtex: String,
    pub authors: Vec<String>,
    pub year: Option<String>,
    pub doi: Option<String>,
    pub tier: ConfidenceTier,
    pub date: NaiveDate,
}

impl NoteFields {
    /// Fields for a finalized record, rendered today
    pub fn from_record(record: &BibtexRecord) -> Self {
        Self::from_record_on(record, chrono::Local::now().date_naive())
    }

    pub fn from_record_on(record: &BibtexRecord, date: NaiveDate) -> Self {
        Self {
            key: record.key.clone(),
            title: record.title.clone(),
            bibtex: record.to_bibtex().trim_end().to_string(),
            authors: record.authors.clone(),
            year: record.year.clone(),
            doi: record.doi.clone(),
            tier: record.tier,
            date,
        }
    }

    fn variables(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("title", self.title.clone()),
            ("bibtex", self.bibtex.clone()),
            ("date", self.date.format("%Y/%-m/%-d").to_string()),
            ("key", self.key.clone()),
            ("authors", self.authors.join(" and ")),
            ("year", self.year.clone().unwrap_or_default()),
            ("doi", self.doi.clone().unwrap_or_default()),
            ("tier", self.tier.to_string()),
        ])
    }
}

/// A note ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNote {
    pub key: String,
    pub body: String,
    pub source: TemplateSource,
}

/// Renders notes from a template file or the built-in default
#[derive(Debug, Clone, Default)]
pub struct NoteRenderer {
    template_path: Option<PathBuf>,
    variables: BTreeMap<String, String>,
}

impl NoteRenderer {
    pub fn new(config: &TemplateConfig) -> Self {
        Self {
            template_path: config.path.as_deref().map(expand_home),
            variables: config.variables.clone(),
        }
    }

    /// Render a note, reading the template on each call
    ///
    /// An explicitly configured template that cannot be read fails with
    /// `TemplateNotFound`; there is no silent fallback to the default.
    pub fn render(&self, fields: &NoteFields) -> Result<RenderedNote, PipelineError> {
        let (template, source) = match &self.template_path {
            Some(path) => {
                let template = std::fs::read_to_string(path).map_err(|source| {
                    PipelineError::TemplateNotFound {
                        path: path.clone(),
                        source,
                    }
                })?;
                (template, TemplateSource::File(path.clone()))
            }
            None => (DEFAULT_TEMPLATE.to_string(), TemplateSource::BuiltIn),
        };

        Ok(RenderedNote {
            key: fields.key.clone(),
            body: self.substitute(&template, fields),
            source,
        })
    }

    fn substitute(&self, template: &str, fields: &NoteFields) -> String {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("valid placeholder regex")
        });

        let builtins = fields.variables();
        re.replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            builtins
                .get(name)
                .or_else(|| self.variables.get(name))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }
}
