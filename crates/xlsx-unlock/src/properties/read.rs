use chrono::{DateTime, Utc};

use super::{parse_timestamp, PropertySet, APP_PROPERTIES_PART, CORE_PROPERTIES_PART};
use crate::package::XlsxPackage;
use crate::xml::XmlPart;

/// Extract metadata from both property parts.
///
/// Best-effort: a missing or malformed part contributes nothing, and the other part is still read.
pub fn read_properties(package: &XlsxPackage) -> PropertySet {
    let mut props = PropertySet::default();
    if let Some(core) = load_part(package, CORE_PROPERTIES_PART) {
        read_core(&core, &mut props);
    }
    if let Some(app) = load_part(package, APP_PROPERTIES_PART) {
        read_app(&app, &mut props);
    }
    props
}

fn load_part(package: &XlsxPackage, name: &str) -> Option<XmlPart> {
    let bytes = package.part(name)?;
    match XmlPart::parse(bytes) {
        Ok(part) => Some(part),
        Err(err) => {
            log::warn!("ignoring unreadable {name}: {err}");
            None
        }
    }
}

fn read_core(part: &XmlPart, props: &mut PropertySet) {
    props.title = text(part, "title");
    props.subject = text(part, "subject");
    props.creator = text(part, "creator");
    props.keywords = text(part, "keywords");
    props.description = text(part, "description");
    props.last_modified_by = text(part, "lastModifiedBy");
    props.category = text(part, "category");
    props.content_status = text(part, "contentStatus");
    props.revision = text(part, "revision");
    props.language = text(part, "language");
    props.created = timestamp(part, "created");
    props.modified = timestamp(part, "modified");
    props.last_printed = timestamp(part, "lastPrinted");
}

fn read_app(part: &XmlPart, props: &mut PropertySet) {
    props.company = text(part, "Company");
    props.manager = text(part, "Manager");
    props.program_name = text(part, "Application");
    props.version = text(part, "AppVersion");
    props.scale = text(part, "ScaleCrop").and_then(|value| match value.trim() {
        "" => None,
        v => Some(v == "true" || v == "1"),
    });
    props.links_dirty = text(part, "LinksUpToDate").and_then(|value| match value.trim() {
        "" => None,
        v => Some(v == "false" || v == "0"),
    });
}

/// Text of the first element named `local` directly under the root. An element that is present but
/// empty yields `Some("")`.
fn text(part: &XmlPart, local: &str) -> Option<String> {
    part.children_by_local(part.root(), local)
        .next()
        .map(|id| part.text(id))
}

fn timestamp(part: &XmlPart, local: &str) -> Option<DateTime<Utc>> {
    let value = text(part, local)?;
    let parsed = parse_timestamp(&value);
    if parsed.is_none() && !value.trim().is_empty() {
        log::warn!("ignoring unparseable {local} timestamp {value:?}");
    }
    parsed
}
