//! Document metadata stored in `docProps/core.xml` and `docProps/app.xml`.
//!
//! [`PropertySet`] is the shape shared with every other producer or consumer of workbook
//! metadata: each key is optional, and a `None` value means "not present" on read and "leave
//! untouched" on write.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

mod read;
mod write;

pub use read::read_properties;
pub use write::write_properties;

pub const CORE_PROPERTIES_PART: &str = "docProps/core.xml";
pub const APP_PROPERTIES_PART: &str = "docProps/app.xml";

pub(crate) const NS_CORE_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
pub(crate) const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub(crate) const NS_DCTERMS: &str = "http://purl.org/dc/terms/";
pub(crate) const NS_DCMITYPE: &str = "http://purl.org/dc/dcmitype/";
pub(crate) const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub(crate) const NS_EXTENDED_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties";
pub(crate) const NS_DOC_PROPS_VTYPES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertySet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// `AppVersion` in the extended properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `Application` in the extended properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_printed: Option<DateTime<Utc>>,

    /// `ScaleCrop` in the extended properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<bool>,
    /// Inverse of `LinksUpToDate` in the extended properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_dirty: Option<bool>,
}

impl PropertySet {
    pub fn is_empty(&self) -> bool {
        *self == PropertySet::default()
    }

    /// Overlay every defined value of `edits` onto `self`.
    pub fn merge(&mut self, edits: &PropertySet) {
        fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        overlay(&mut self.title, &edits.title);
        overlay(&mut self.subject, &edits.subject);
        overlay(&mut self.creator, &edits.creator);
        overlay(&mut self.keywords, &edits.keywords);
        overlay(&mut self.description, &edits.description);
        overlay(&mut self.last_modified_by, &edits.last_modified_by);
        overlay(&mut self.category, &edits.category);
        overlay(&mut self.content_status, &edits.content_status);
        overlay(&mut self.revision, &edits.revision);
        overlay(&mut self.version, &edits.version);
        overlay(&mut self.program_name, &edits.program_name);
        overlay(&mut self.company, &edits.company);
        overlay(&mut self.manager, &edits.manager);
        overlay(&mut self.language, &edits.language);
        overlay(&mut self.created, &edits.created);
        overlay(&mut self.modified, &edits.modified);
        overlay(&mut self.last_printed, &edits.last_printed);
        overlay(&mut self.scale, &edits.scale);
        overlay(&mut self.links_dirty, &edits.links_dirty);
    }
}

/// W3CDTF only has four-digit years.
pub(crate) fn is_w3cdtf_representable(value: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&value.year())
}

/// Parse a W3CDTF timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        Some(dt.with_timezone(&Utc))
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        Some(naive.and_utc())
    } else {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    };
    parsed.filter(is_w3cdtf_representable)
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
