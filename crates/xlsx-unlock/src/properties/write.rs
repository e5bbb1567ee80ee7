use chrono::{DateTime, Utc};

use super::{
    format_timestamp, is_w3cdtf_representable, PropertySet, APP_PROPERTIES_PART,
    CORE_PROPERTIES_PART, NS_CORE_PROPERTIES, NS_DC, NS_DCMITYPE, NS_DCTERMS, NS_DOC_PROPS_VTYPES, NS_EXTENDED_PROPERTIES, NS_XSI,
};
use crate::error::PackageError;
use crate::package::XlsxPackage;
use crate::xml::{NodeId, XmlDomError, XmlPart};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const PACKAGE_RELS_PART: &str = "_rels/.rels";

const CORE_CONTENT_TYPE: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const APP_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.extended-properties+xml";
const CORE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const APP_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";

/// A namespace together with the prefix used when it has to be declared.
#[derive(Debug, Clone, Copy)]
struct Namespace {
    uri: &'static str,
    prefix: &'static str,
}

const CP: Namespace = Namespace {
    uri: NS_CORE_PROPERTIES,
    prefix: "cp",
};
const DC: Namespace = Namespace {
    uri: NS_DC,
    prefix: "dc",
};
const DCTERMS: Namespace = Namespace {
    uri: NS_DCTERMS,
    prefix: "dcterms",
};
const XSI: Namespace = Namespace {
    uri: NS_XSI,
    prefix: "xsi",
};
const EXTENDED: Namespace = Namespace {
    uri: NS_EXTENDED_PROPERTIES,
    prefix: "ep",
};

fn core_template() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="{NS_CORE_PROPERTIES}" xmlns:dc="{NS_DC}" xmlns:dcterms="{NS_DCTERMS}" xmlns:dcmitype="{NS_DCMITYPE}" xmlns:xsi="{NS_XSI}"></cp:coreProperties>"#
    )
}

fn app_template() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="{NS_EXTENDED_PROPERTIES}" xmlns:vt="{NS_DOC_PROPS_VTYPES}"></Properties>"#
    )
}

/// Apply every defined value of `edits` to the package's property parts.
///
/// Both parts are always re-serialized. A missing part is created from a minimal template and
/// registered in `[Content_Types].xml` and `_rels/.rels`. An existing part that cannot be parsed is
/// an error rather than being replaced.
pub fn write_properties(package: &mut XlsxPackage, edits: &PropertySet) -> Result<(), PackageError> {
    check_timestamps(edits)?;

    let (mut core, core_created) = open_or_create(package, CORE_PROPERTIES_PART, core_template)?;
    apply_core(&mut core, edits).map_err(|err| PackageError::xml(CORE_PROPERTIES_PART, err))?;
    store(package, CORE_PROPERTIES_PART, &core)?;

    let (mut app, app_created) = open_or_create(package, APP_PROPERTIES_PART, app_template)?;
    apply_app(&mut app, edits).map_err(|err| PackageError::xml(APP_PROPERTIES_PART, err))?;
    store(package, APP_PROPERTIES_PART, &app)?;

    if core_created {
        register_part(package, CORE_PROPERTIES_PART, CORE_CONTENT_TYPE, CORE_REL_TYPE)?;
    }
    if app_created {
        register_part(package, APP_PROPERTIES_PART, APP_CONTENT_TYPE, APP_REL_TYPE)?;
    }
    Ok(())
}

/// Rejects timestamps W3CDTF cannot express before any part is touched.
fn check_timestamps(edits: &PropertySet) -> Result<(), PackageError> {
    let stamps = [
        ("created", &edits.created),
        ("modified", &edits.modified),
        ("lastPrinted", &edits.last_printed),
    ];
    for (property, value) in stamps {
        if let Some(value) = value.filter(|value| !is_w3cdtf_representable(value)) {
            return Err(PackageError::TimestampOutOfRange {
                property,
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

fn open_or_create(
    package: &XlsxPackage,
    name: &str,
    template: fn() -> String,
) -> Result<(XmlPart, bool), PackageError> {
    match package.part(name) {
        Some(bytes) => {
            let part = XmlPart::parse(bytes).map_err(|err| PackageError::xml(name, err))?;
            Ok((part, false))
        }
        None => {
            log::debug!("creating {name} from template");
            let part = XmlPart::parse(template().as_bytes())
                .map_err(|err| PackageError::xml(name, err))?;
            Ok((part, true))
        }
    }
}

fn store(package: &mut XlsxPackage, name: &str, part: &XmlPart) -> Result<(), PackageError> {
    let bytes = part
        .to_xml_bytes()
        .map_err(|err| PackageError::xml(name, err))?;
    package.set_part(name, bytes);
    Ok(())
}

fn apply_core(part: &mut XmlPart, edits: &PropertySet) -> Result<(), XmlDomError> {
    let texts = [
        (DC, "title", &edits.title),
        (DC, "subject", &edits.subject),
        (DC, "creator", &edits.creator),
        (CP, "keywords", &edits.keywords),
        (DC, "description", &edits.description),
        (CP, "lastModifiedBy", &edits.last_modified_by),
        (CP, "category", &edits.category),
        (CP, "contentStatus", &edits.content_status),
        (CP, "revision", &edits.revision),
        (DC, "language", &edits.language),
    ];
    for (ns, local, value) in texts {
        if let Some(value) = value {
            set_element_text(part, ns, local, value)?;
        }
    }

    let stamps = [
        (DCTERMS, "created", &edits.created, true),
        (DCTERMS, "modified", &edits.modified, true),
        (CP, "lastPrinted", &edits.last_printed, false),
    ];
    for (ns, local, value, typed) in stamps {
        if let Some(value) = value {
            set_timestamp(part, ns, local, value, typed)?;
        }
    }
    Ok(())
}

fn apply_app(part: &mut XmlPart, edits: &PropertySet) -> Result<(), XmlDomError> {
    let texts = [
        ("Company", &edits.company),
        ("Manager", &edits.manager),
        ("Application", &edits.program_name),
        ("AppVersion", &edits.version),
    ];
    for (local, value) in texts {
        if let Some(value) = value {
            set_element_text(part, EXTENDED, local, value)?;
        }
    }

    if let Some(scale) = edits.scale {
        set_element_text(part, EXTENDED, "ScaleCrop", bool_text(scale))?;
    }
    if let Some(dirty) = edits.links_dirty {
        set_element_text(part, EXTENDED, "LinksUpToDate", bool_text(!dirty))?;
    }
    Ok(())
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn set_timestamp(
    part: &mut XmlPart,
    ns: Namespace,
    local: &str,
    value: &DateTime<Utc>,
    typed: bool,
) -> Result<(), XmlDomError> {
    let id = set_element_text(part, ns, local, &format_timestamp(value))?;
    if typed {
        let xsi_type = qualified_name(part, XSI, "type")?;
        let w3cdtf = qualified_name(part, DCTERMS, "W3CDTF")?;
        part.set_attr(id, &xsi_type, &w3cdtf)?;
    }
    Ok(())
}

/// Set the text of the root's `local` child, appending the element when missing.
fn set_element_text(
    part: &mut XmlPart,
    ns: Namespace,
    local: &str,
    value: &str,
) -> Result<NodeId, XmlDomError> {
    let root = part.root();
    let existing = part.children_by_local(root, local).next();
    let id = match existing {
        Some(id) => id,
        None => {
            let name = qualified_name(part, ns, local)?;
            part.append_element(root, &name)?
        }
    };
    part.set_text(id, value);
    Ok(id)
}

/// Qualified name for `local` in `ns`, reusing the document's own prefix for the namespace and
/// declaring the conventional one on the root when the namespace is not bound yet.
fn qualified_name(part: &mut XmlPart, ns: Namespace, local: &str) -> Result<String, XmlDomError> {
    match part.prefix_for_namespace(ns.uri) {
        Some(Some(prefix)) => Ok(format!("{prefix}:{local}")),
        Some(None) => Ok(local.to_string()),
        None => {
            part.declare_namespace(ns.prefix, ns.uri)?;
            Ok(format!("{}:{local}", ns.prefix))
        }
    }
}

/// Wire a newly created property part into the package's content types and root relationships.
///
/// Packages without those parts are left as they are; this crate does not repair packages.
fn register_part(
    package: &mut XlsxPackage,
    part_name: &str,
    content_type: &str,
    rel_type: &str,
) -> Result<(), PackageError> {
    if let Some(bytes) = package.part(CONTENT_TYPES_PART) {
        let mut types =
            XmlPart::parse(bytes).map_err(|err| PackageError::xml(CONTENT_TYPES_PART, err))?;
        if add_override(&mut types, part_name, content_type)
            .map_err(|err| PackageError::xml(CONTENT_TYPES_PART, err))?
        {
            store(package, CONTENT_TYPES_PART, &types)?;
        }
    } else {
        log::warn!("package has no {CONTENT_TYPES_PART}; not registering {part_name}");
    }

    if let Some(bytes) = package.part(PACKAGE_RELS_PART) {
        let mut rels =
            XmlPart::parse(bytes).map_err(|err| PackageError::xml(PACKAGE_RELS_PART, err))?;
        if add_relationship(&mut rels, part_name, rel_type)
            .map_err(|err| PackageError::xml(PACKAGE_RELS_PART, err))?
        {
            store(package, PACKAGE_RELS_PART, &rels)?;
        }
    } else {
        log::warn!("package has no {PACKAGE_RELS_PART}; not registering {part_name}");
    }
    Ok(())
}

/// Name for a new child of the root, using the root's own prefix.
fn sibling_name(part: &XmlPart, local: &str) -> String {
    match part.prefix(part.root()) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn add_override(
    types: &mut XmlPart,
    part_name: &str,
    content_type: &str,
) -> Result<bool, XmlDomError> {
    let root = types.root();
    let target = format!("/{part_name}");
    let exists = types.children_by_local(root, "Override").any(|id| {
        types
            .attr(id, "PartName")
            .is_some_and(|name| crate::zip_util::part_names_equivalent(&name, &target))
    });
    if exists {
        return Ok(false);
    }

    let name = sibling_name(types, "Override");
    let id = types.append_element(root, &name)?;
    types.set_attr(id, "PartName", &target)?;
    types.set_attr(id, "ContentType", content_type)?;
    Ok(true)
}

fn add_relationship(rels: &mut XmlPart, part_name: &str, rel_type: &str) -> Result<bool, XmlDomError> {
    let root = rels.root();
    let existing: Vec<NodeId> = rels.children_by_local(root, "Relationship").collect();
    if existing
        .iter()
        .any(|id| rels.attr(*id, "Type").as_deref() == Some(rel_type))
    {
        return Ok(false);
    }

    let next_id = existing
        .iter()
        .filter_map(|id| rels.attr(*id, "Id"))
        .filter_map(|id| id.strip_prefix("rId")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;

    let name = sibling_name(rels, "Relationship");
    let id = rels.append_element(root, &name)?;
    rels.set_attr(id, "Id", &format!("rId{next_id}"))?;
    rels.set_attr(id, "Type", rel_type)?;
    rels.set_attr(id, "Target", part_name)?;
    Ok(true)
}
