//! XSD identity-constraint extractor (§4.5): `xsd:key` / `xsd:keyref` /
//! `xsd:unique`, with their selector/field XPath-like expressions resolved
//! against the XML navigator.

use std::sync::OnceLock;

use regex::Regex;

use crate::navigator::{find_all, get_attr, get_child_text, inner_base_line, inner_base_offset};

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ConstraintKind {
    Key,
    Keyref,
    Unique,
}

#[derive(Debug, Clone)]
pub struct IdentityConstraint {
    pub kind: ConstraintKind,
    pub name: String,
    pub selector: String,
    pub fields: Vec<String>,
    /// Set only for `keyref`: the name of the key it refers to.
    pub refer: Option<String>,
}

/// Parse `xsd:key`/`xsd:keyref`/`xsd:unique` from raw XSD text, tolerant of
/// both `xsd:` and `xs:` prefixes. The extractor is purely structural: it
/// does not validate the XSD itself.
pub fn extract_constraints(xsd_text: &str) -> Vec<IdentityConstraint> {
    let mut constraints = Vec::new();
    for (tag, kind) in [
        ("key", ConstraintKind::Key),
        ("keyref", ConstraintKind::Keyref),
        ("unique", ConstraintKind::Unique),
    ] {
        for el in find_all(xsd_text, tag, 0, 1) {
            let Some(name) = get_attr(&el.open_tag, "name") else {
                continue;
            };
            let Some(selector) = get_child_text_xpath(&el.inner_xml) else {
                continue;
            };
            let fields = field_xpaths(&el.inner_xml);
            if fields.is_empty() {
                continue;
            }
            let refer = if kind == ConstraintKind::Keyref {
                get_attr(&el.open_tag, "refer").map(strip_prefix)
            } else {
                None
            };
            constraints.push(IdentityConstraint {
                kind,
                name,
                selector,
                fields,
                refer,
            });
        }
    }
    constraints
}

fn strip_prefix(qname: String) -> String {
    qname.split(':').next_back().unwrap_or(&qname).to_string()
}

fn get_child_text_xpath(constraint_inner: &str) -> Option<String> {
    find_all(constraint_inner, "selector", 0, 1)
        .into_iter()
        .next()
        .and_then(|el| get_attr(&el.open_tag, "xpath"))
}

fn field_xpaths(constraint_inner: &str) -> Vec<String> {
    find_all(constraint_inner, "field", 0, 1)
        .into_iter()
        .filter_map(|el| get_attr(&el.open_tag, "xpath"))
        .collect()
}

/// Resolve a selector XPath-like expression against `xml`, returning the
/// matched elements as raw fragments paired with their absolute base
/// offset/line (needed so field resolution can report positions if ever
/// required).
pub fn resolve_selector(xml: &str, selector: &str) -> Vec<crate::navigator::XmlElement> {
    let trimmed = selector.trim();
    if let Some(rest) = trimmed.strip_prefix(".//") {
        let name = strip_prefix(rest.to_string());
        return find_all(xml, &name, 0, 1);
    }
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Vec::new();
    }
    let mut current = vec![crate::navigator::XmlElement {
        local_name: String::new(),
        open_tag: String::new(),
        inner_xml: xml.to_string(),
        outer_xml: xml.to_string(),
        line: 1,
        offset: 0,
    }];
    for seg in segments {
        let name = strip_prefix(seg.to_string());
        let mut next = Vec::new();
        for el in &current {
            let base_offset = inner_base_offset(el);
            let base_line = inner_base_line(el);
            next.extend(find_all(&el.inner_xml, &name, base_offset, base_line));
        }
        current = next;
    }
    current
}

/// Resolve a field XPath-like expression (`@attr`, `text()`/`.`, `Child`,
/// or slash-compositions like `Child/@attr`) against one matched element.
pub fn resolve_field(el: &crate::navigator::XmlElement, field: &str) -> Option<String> {
    let field = field.trim();
    if field == "." || field == "text()" {
        let stripped = strip_tags(&el.inner_xml);
        let trimmed = stripped.trim();
        return if trimmed.is_empty() { None } else { Some(trimmed.to_string()) };
    }
    if let Some(attr) = field.strip_prefix('@') {
        return get_attr(&el.open_tag, attr);
    }
    if let Some((child, rest)) = field.split_once('/') {
        let child_name = strip_prefix(child.to_string());
        let child_el = find_all(&el.inner_xml, &child_name, 0, 1).into_iter().next()?;
        return resolve_field(&child_el, rest);
    }
    get_child_text(&el.inner_xml, &strip_prefix(field.to_string()))
}

fn strip_tags(xml: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    re.replace_all(xml, "").to_string()
}

/// Resolve every field for a selected element; `None` entries mean the
/// field was absent (used by rules to decide whether to skip a candidate).
pub fn resolve_fields(el: &crate::navigator::XmlElement, fields: &[String]) -> Vec<Option<String>> {
    fields.iter().map(|f| resolve_field(el, f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD: &str = r#"<xsd:schema>
        <xsd:unique name="UniqueStopPlaceId">
            <xsd:selector xpath=".//StopPlace"/>
            <xsd:field xpath="@id"/>
        </xsd:unique>
        <xsd:key name="LineKey">
            <xsd:selector xpath=".//Line"/>
            <xsd:field xpath="@id"/>
        </xsd:key>
        <xsd:keyref name="LineKeyRef" refer="LineKey">
            <xsd:selector xpath=".//LineRef"/>
            <xsd:field xpath="@ref"/>
        </xsd:keyref>
    </xsd:schema>"#;

    #[test]
    fn extracts_all_three_kinds() {
        let constraints = extract_constraints(XSD);
        assert_eq!(constraints.len(), 3);
        let keyref = constraints.iter().find(|c| c.kind == ConstraintKind::Keyref).unwrap();
        assert_eq!(keyref.refer.as_deref(), Some("LineKey"));
        assert_eq!(keyref.fields, vec!["@ref".to_string()]);
    }

    #[test]
    fn resolve_selector_anywhere() {
        let xml = "<root><a><StopPlace id=\"SP1\"/></a><StopPlace id=\"SP2\"/></root>";
        let matches = resolve_selector(xml, ".//StopPlace");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn resolve_field_attribute_and_child() {
        let xml = "<StopPlace id=\"SP1\"><Name>Central</Name></StopPlace>";
        let el = find_all(xml, "StopPlace", 0, 1).remove(0);
        assert_eq!(resolve_field(&el, "@id"), Some("SP1".to_string()));
        assert_eq!(resolve_field(&el, "Name"), Some("Central".to_string()));
    }

    #[test]
    fn resolve_field_composed_path() {
        let xml = "<PassengerStopAssignment><ScheduledStopPointRef ref=\"SSP1\"/></PassengerStopAssignment>";
        let el = find_all(xml, "PassengerStopAssignment", 0, 1).remove(0);
        assert_eq!(
            resolve_field(&el, "ScheduledStopPointRef/@ref"),
            Some("SSP1".to_string())
        );
    }
}
