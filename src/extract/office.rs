//! Documentos Word empaquetados en ZIP: propiedades del paquete y estructura del cuerpo.

use crate::error::{SourceError, SourceResult};
use crate::formatting::preview;
use crate::metadata::MetadataMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use xmltree::{Element, XMLNode};
use zip::ZipArchive;

const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const CP_NS: &str = "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
const APP_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties";
const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Las partes XML mayores se consideran corruptas.
const MAX_PART_SIZE: u64 = 64 * 1024 * 1024;

struct Field {
    key: &'static str,
    local_name: &'static str,
    namespace: &'static str,
}

const CORE_FIELDS: &[Field] = &[
    Field { key: "docx_title", local_name: "title", namespace: DC_NS },
    Field { key: "docx_author", local_name: "creator", namespace: DC_NS },
    Field { key: "docx_subject", local_name: "subject", namespace: DC_NS },
    Field { key: "docx_keywords", local_name: "keywords", namespace: CP_NS },
    Field { key: "docx_comments", local_name: "description", namespace: DC_NS },
    Field { key: "docx_category", local_name: "category", namespace: CP_NS },
    Field { key: "docx_created", local_name: "created", namespace: DCTERMS_NS },
    Field { key: "docx_modified", local_name: "modified", namespace: DCTERMS_NS },
    Field { key: "docx_last_modified_by", local_name: "lastModifiedBy", namespace: CP_NS },
    Field { key: "docx_revision", local_name: "revision", namespace: CP_NS },
    Field { key: "docx_content_status", local_name: "contentStatus", namespace: CP_NS },
];

const APP_FIELDS: &[Field] = &[
    Field { key: "docx_application", local_name: "Application", namespace: APP_NS },
    Field { key: "docx_app_version", local_name: "AppVersion", namespace: APP_NS },
    Field { key: "docx_company", local_name: "Company", namespace: APP_NS },
    Field { key: "docx_manager", local_name: "Manager", namespace: APP_NS },
    Field { key: "docx_template", local_name: "Template", namespace: APP_NS },
    Field { key: "docx_pages", local_name: "Pages", namespace: APP_NS },
    Field { key: "docx_words", local_name: "Words", namespace: APP_NS },
    Field { key: "docx_total_time_minutes", local_name: "TotalTime", namespace: APP_NS },
];

pub fn extract(path: &Path, preview_chars: usize, limit: usize) -> SourceResult {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(SourceError::parse)?;

    let mut map = MetadataMap::new();
    if let Some(core) = read_part(&mut archive, "docProps/core.xml")? {
        push_fields(&core, CORE_FIELDS, &mut map);
    }
    if let Some(app) = read_part(&mut archive, "docProps/app.xml")? {
        push_fields(&app, APP_FIELDS, &mut map);
    }
    if let Some(custom) = read_part(&mut archive, "docProps/custom.xml")? {
        for (name, value) in custom_properties(&custom).into_iter().take(limit) {
            map.insert(format!("docx_custom_{name}"), value);
        }
    }

    let document = read_part(&mut archive, "word/document.xml")?
        .ok_or_else(|| SourceError::Parse("missing word/document.xml".to_string()))?;
    let body = child(&document, "body", W_NS)
        .ok_or_else(|| SourceError::Parse("document has no body".to_string()))?;

    let paragraphs: Vec<&Element> = children(body, "p", W_NS).collect();
    map.insert("num_paragraphs", paragraphs.len());
    map.insert("num_tables", children(body, "tbl", W_NS).count());
    map.insert("num_sections", count_descendants(body, "sectPr", W_NS));
    if let Some(first) = paragraphs.first() {
        map.insert(
            "first_paragraph_preview",
            preview(&paragraph_text(first), preview_chars),
        );
    }

    Ok(map)
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> SourceResult<Option<Element>> {
    let part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(error) => return Err(SourceError::parse(error)),
    };
    let mut contents = Vec::new();
    part.take(MAX_PART_SIZE).read_to_end(&mut contents)?;
    let root = Element::parse(contents.as_slice()).map_err(SourceError::parse)?;
    Ok(Some(root))
}

fn push_fields(root: &Element, fields: &[Field], map: &mut MetadataMap) {
    for field in fields {
        if let Some(element) = child(root, field.local_name, field.namespace) {
            let value = text_content(element);
            if !value.is_empty() {
                map.insert(field.key, value);
            }
        }
    }
}

fn custom_properties(root: &Element) -> Vec<(String, String)> {
    elements(root)
        .filter(|element| element.name == "property")
        .filter_map(|element| {
            let name = element.attributes.get("name")?.trim();
            if name.is_empty() {
                return None;
            }
            let value = elements(element).next().map(text_content).unwrap_or_default();
            Some((name.replace(' ', "_"), value))
        })
        .collect()
}

fn elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|node| match node {
        XMLNode::Element(element) => Some(element),
        _ => None,
    })
}

fn is(element: &Element, local_name: &str, namespace: &str) -> bool {
    element.name == local_name && element.namespace.as_deref() == Some(namespace)
}

fn child<'a>(parent: &'a Element, local_name: &str, namespace: &str) -> Option<&'a Element> {
    elements(parent).find(|element| is(element, local_name, namespace))
}

fn children<'a>(
    parent: &'a Element,
    local_name: &'a str,
    namespace: &'a str,
) -> impl Iterator<Item = &'a Element> {
    elements(parent).filter(move |element| is(element, local_name, namespace))
}

fn count_descendants(parent: &Element, local_name: &str, namespace: &str) -> usize {
    elements(parent)
        .map(|element| {
            usize::from(is(element, local_name, namespace))
                + count_descendants(element, local_name, namespace)
        })
        .sum()
}

fn text_content(element: &Element) -> String {
    let mut content = String::new();
    for node in &element.children {
        if let XMLNode::Text(text) = node {
            content.push_str(text);
        }
    }
    content.trim().to_string()
}

/// Concatena los `w:t` del párrafo; tabulaciones y saltos cuentan como espacio.
fn paragraph_text(paragraph: &Element) -> String {
    let mut text = String::new();
    collect_runs(paragraph, &mut text);
    text
}

fn collect_runs(element: &Element, text: &mut String) {
    for child in elements(element) {
        if is(child, "t", W_NS) {
            for node in &child.children {
                if let XMLNode::Text(value) = node {
                    text.push_str(value);
                }
            }
        } else if is(child, "tab", W_NS) || is(child, "br", W_NS) {
            text.push(' ');
        } else {
            collect_runs(child, text);
        }
    }
}
