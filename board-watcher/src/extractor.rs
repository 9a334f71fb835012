//! Snippet extraction.
//!
//! Reads the configured sub-fields out of one rendered item snippet and
//! assembles an [`OrderRecord`]. A snippet whose identity cannot be located
//! yields a record with an empty id; the caller drops it.

use crate::config::{FieldSelector, FieldsConfig};
use crate::surface::RenderSurface;
use crate::types::{SnippetHandle, SurfaceError};
use regex::Regex;
use seen_store::OrderRecord;
use std::collections::BTreeMap;
use tracing::trace;

/// A field selector with its pattern compiled
#[derive(Debug, Clone)]
struct CompiledField {
    selector: String,
    attribute: Option<String>,
    pattern: Option<Regex>,
}

impl CompiledField {
    fn compile(field: &FieldSelector) -> Result<Self, regex::Error> {
        Ok(Self {
            selector: field.selector.clone(),
            attribute: field.attribute.clone(),
            pattern: field.pattern.as_deref().map(Regex::new).transpose()?,
        })
    }

    /// Clean a raw value and run it through the pattern, if any
    fn refine(&self, raw: &str) -> Option<String> {
        let value = collapse_whitespace(raw);
        let value = match &self.pattern {
            Some(pattern) => {
                let captures = pattern.captures(&value)?;
                captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().trim().to_string())?
            }
            None => value,
        };
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    async fn read(
        &self,
        surface: &mut dyn RenderSurface,
        handle: &SnippetHandle,
    ) -> Result<Option<String>, SurfaceError> {
        let raw = match &self.attribute {
            Some(attribute) => {
                surface
                    .read_attribute(handle, &self.selector, attribute)
                    .await?
            }
            None => surface.read_text(handle, &self.selector).await?,
        };
        Ok(raw.and_then(|raw| self.refine(&raw)))
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turns snippets into candidate records
#[derive(Debug, Clone)]
pub struct SnippetExtractor {
    id: CompiledField,
    title: CompiledField,
    description: CompiledField,
    extra: Vec<(String, CompiledField)>,
}

impl SnippetExtractor {
    pub fn new(fields: &FieldsConfig) -> Result<Self, regex::Error> {
        let extra = fields
            .extra
            .iter()
            .map(|(name, field)| Ok((name.clone(), CompiledField::compile(field)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            id: CompiledField::compile(&fields.id)?,
            title: CompiledField::compile(&fields.title)?,
            description: CompiledField::compile(&fields.description)?,
            extra,
        })
    }

    /// Read one snippet.
    ///
    /// Missing sub-elements are not errors; only failures of the surface
    /// itself are.
    pub async fn extract(
        &self,
        surface: &mut dyn RenderSurface,
        handle: &SnippetHandle,
    ) -> Result<OrderRecord, SurfaceError> {
        let id = self.id.read(surface, handle).await?.unwrap_or_default();
        if id.is_empty() {
            trace!("Snippet #{} has no readable id", handle.index);
            return Ok(OrderRecord::new("", "", ""));
        }

        let title = self.title.read(surface, handle).await?.unwrap_or_default();
        let description = self
            .description
            .read(surface, handle)
            .await?
            .unwrap_or_default();

        let mut raw_fields = BTreeMap::new();
        for (name, field) in &self.extra {
            if let Some(value) = field.read(surface, handle).await? {
                raw_fields.insert(name.clone(), value);
            }
        }

        Ok(OrderRecord {
            id,
            title,
            description,
            raw_fields,
        })
    }
}
