//! XML navigator (§4.3).
//!
//! A restricted, regex-based walker rather than a general DOM: rules only
//! ever need element enumeration, attribute lookup, text extraction and
//! nested-fragment recursion, and they need absolute source positions that
//! DOM APIs typically discard once you start slicing fragments out.
//!
//! Regex lacks PCRE's `lastIndex` resume semantics, so scans below track an
//! explicit cursor and resume with `Regex::find_at` instead.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;

/// One matched element, with positions absolute to the *original* document
/// regardless of how many fragment recursions produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub local_name: String,
    pub open_tag: String,
    pub inner_xml: String,
    pub outer_xml: String,
    pub line: u32,
    pub offset: usize,
}

/// 1-based line containing `offset`.
pub fn line_at(xml: &str, offset: usize) -> u32 {
    1 + xml.as_bytes()[..offset.min(xml.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count() as u32
}

fn newlines_in(s: &str) -> u32 {
    s.bytes().filter(|&b| b == b'\n').count() as u32
}

/// Absolute line at which `el.inner_xml` begins.
pub fn inner_base_line(el: &XmlElement) -> u32 {
    el.line - 1 + newlines_in(&el.open_tag)
}

/// Absolute offset at which `el.inner_xml` begins.
pub fn inner_base_offset(el: &XmlElement) -> usize {
    el.offset + el.open_tag.len()
}

fn tag_regex_cache() -> &'static Mutex<HashMap<String, (Regex, Regex)>> {
    static CACHE: OnceLock<Mutex<HashMap<String, (Regex, Regex)>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn tag_regexes(name: &str) -> (Regex, Regex) {
    let cache = tag_regex_cache();
    if let Some(pair) = cache.lock().expect("cache lock").get(name) {
        return pair.clone();
    }
    let escaped = regex::escape(name);
    let open = Regex::new(&format!(
        r#"<(?:[A-Za-z_][\w.-]*:)?{escaped}\b(?:[^>"']|"[^"]*"|'[^']*')*?/?>"#
    ))
    .expect("generated open-tag regex is valid");
    let close = Regex::new(&format!(r"</(?:[A-Za-z_][\w.-]*:)?{escaped}\s*>"))
        .expect("generated close-tag regex is valid");
    cache
        .lock()
        .expect("cache lock")
        .insert(name.to_string(), (open.clone(), close.clone()));
    (open, close)
}

/// Extract the value of `name="..."` or `name='...'` from a raw open tag.
pub fn get_attr(open_tag: &str, name: &str) -> Option<String> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let re = {
        let mut guard = cache.lock().expect("cache lock");
        guard
            .entry(name.to_string())
            .or_insert_with(|| {
                let escaped = regex::escape(name);
                Regex::new(&format!(r#"\b{escaped}\s*=\s*(?:"([^"]*)"|'([^']*)')"#))
                    .expect("generated attribute regex is valid")
            })
            .clone()
    };
    let caps = re.captures(open_tag)?;
    Some(
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    )
}

/// Balanced-tag scan for the close tag matching the open tag that ended at
/// `from`. Returns the byte offset of the matching `</name>`, or `None` on
/// malformed/unterminated input (the caller is expected to skip the element
/// rather than abort the whole rule).
pub fn find_close_tag(xml: &str, name: &str, from: usize) -> Option<usize> {
    let (open_re, close_re) = tag_regexes(name);
    let mut depth: i32 = 1;
    let mut pos = from;
    loop {
        let next_open = open_re.find_at(xml, pos);
        let next_close = close_re.find_at(xml, pos);
        let use_open = match (&next_open, &next_close) {
            (Some(o), Some(c)) => o.start() < c.start(),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        if use_open {
            let m = next_open.expect("checked above");
            if !m.as_str().ends_with("/>") {
                depth += 1;
            }
            pos = m.end();
        } else {
            let m = next_close.expect("checked above");
            depth -= 1;
            if depth == 0 {
                return Some(m.start());
            }
            pos = m.end();
        }
    }
}

fn element_at(xml: &str, name: &str, start: usize, open_end_exclusive: usize) -> (String, usize) {
    let open_tag = xml[start..open_end_exclusive].to_string();
    if open_tag.ends_with("/>") {
        return (String::new(), open_end_exclusive);
    }
    match find_close_tag(xml, name, open_end_exclusive) {
        Some(close_start) => {
            let (_, close_re) = tag_regexes(name);
            let close_end = close_re
                .find_at(xml, close_start)
                .map(|m| m.end())
                .unwrap_or(xml.len());
            (xml[open_end_exclusive..close_start].to_string(), close_end)
        }
        None => (xml[open_end_exclusive..].to_string(), xml.len()),
    }
}

/// Direct children named `name`: after each match the scan resumes past the
/// matched element's close, so nested same-name descendants are not returned.
pub fn find_children(xml: &str, name: &str, base_offset: usize, base_line: u32) -> Vec<XmlElement> {
    let (open_re, _) = tag_regexes(name);
    let mut result = Vec::new();
    let mut pos = 0;
    while let Some(m) = open_re.find_at(xml, pos) {
        let (inner_xml, outer_end) = element_at(xml, name, m.start(), m.end());
        let line = base_line + line_at(xml, m.start()) - 1;
        result.push(XmlElement {
            local_name: name.to_string(),
            open_tag: m.as_str().to_string(),
            outer_xml: xml[m.start()..outer_end].to_string(),
            inner_xml,
            line,
            offset: base_offset + m.start(),
        });
        pos = outer_end;
    }
    result
}

/// Depth-first enumeration of every match named `name`, including nested
/// descendants sharing that name.
pub fn find_all(xml: &str, name: &str, base_offset: usize, base_line: u32) -> Vec<XmlElement> {
    let (open_re, _) = tag_regexes(name);
    let mut result = Vec::new();
    let mut pos = 0;
    while let Some(m) = open_re.find_at(xml, pos) {
        let (inner_xml, outer_end) = element_at(xml, name, m.start(), m.end());
        let line = base_line + line_at(xml, m.start()) - 1;
        result.push(XmlElement {
            local_name: name.to_string(),
            open_tag: m.as_str().to_string(),
            outer_xml: xml[m.start()..outer_end].to_string(),
            inner_xml,
            line,
            offset: base_offset + m.start(),
        });
        pos = m.end();
    }
    result
}

/// First occurrence of `name`'s text content, tags stripped and trimmed.
/// `None` when the element is absent or empty after trimming.
pub fn get_child_text(xml: &str, name: &str) -> Option<String> {
    let el = find_children(xml, name, 0, 0).into_iter().next()?;
    let stripped = strip_tags(&el.inner_xml);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn strip_tags(xml: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    re.replace_all(xml, "").to_string()
}

/// Segment-at-a-time descent through a `/`-separated path, returning the
/// final segment's matches with positions absolute to `xml`.
pub fn navigate_path(xml: &str, path: &str) -> Vec<XmlElement> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    navigate_segments(xml, &segments, 0, 1)
}

fn navigate_segments(xml: &str, segments: &[&str], base_offset: usize, base_line: u32) -> Vec<XmlElement> {
    if segments.is_empty() {
        return Vec::new();
    }
    let matches = find_children(xml, segments[0], base_offset, base_line);
    if segments.len() == 1 {
        return matches;
    }
    let mut result = Vec::new();
    for el in &matches {
        let offset = inner_base_offset(el);
        let line = inner_base_line(el);
        result.extend(navigate_segments(&el.inner_xml, &segments[1..], offset, line));
    }
    result
}

/// NeTEx documents legally nest frames two ways: composite (`CompositeFrame`
/// wrapping `<frames>`) or flat (frames directly under `dataObjects`). Path
/// macros below are pre-built for both and [`find_netex_elements`] tries
/// the composite path first, falling back to the flat path.
pub mod paths {
    pub const STOP_PLACES_COMPOSITE: &str =
        "CompositeFrame/frames/SiteFrame/stopPlaces/StopPlace";
    pub const STOP_PLACES_FLAT: &str = "PublicationDelivery/dataObjects/SiteFrame/stopPlaces/StopPlace";
    pub const SERVICE_JOURNEYS_COMPOSITE: &str =
        "CompositeFrame/frames/TimetableFrame/vehicleJourneys/ServiceJourney";
    pub const SERVICE_JOURNEYS_FLAT: &str =
        "PublicationDelivery/dataObjects/TimetableFrame/vehicleJourneys/ServiceJourney";
    pub const STOP_ASSIGNMENTS_COMPOSITE: &str =
        "CompositeFrame/frames/ServiceFrame/stopAssignments/PassengerStopAssignment";
    pub const STOP_ASSIGNMENTS_FLAT: &str =
        "PublicationDelivery/dataObjects/ServiceFrame/stopAssignments/PassengerStopAssignment";
    pub const FRAME_DEFAULTS_COMPOSITE: &str = "CompositeFrame/FrameDefaults";
    pub const FRAME_DEFAULTS_FLAT: &str = "PublicationDelivery/dataObjects/ServiceFrame/FrameDefaults";
}

/// Try the composite-frame path, then the flat-frame path; rules never need
/// to know which layout a given document uses.
pub fn find_netex_elements(xml: &str, composite_path: &str, flat_path: &str) -> Vec<XmlElement> {
    let composite = navigate_path(xml, composite_path);
    if !composite.is_empty() {
        return composite;
    }
    navigate_path(xml, flat_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_children_skips_nested_same_name() {
        let xml = "<root><A><A>inner</A></A><A>second</A></root>";
        let children = find_children(xml, "A", 0, 1);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].inner_xml, "<A>inner</A>");
        assert_eq!(children[1].inner_xml, "second");
    }

    #[test]
    fn find_all_includes_nested() {
        let xml = "<root><A><A>inner</A></A></root>";
        let all = find_all(xml, "A", 0, 1);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn get_attr_supports_both_quote_styles() {
        assert_eq!(get_attr(r#"<Foo id="X"/>"#, "id"), Some("X".to_string()));
        assert_eq!(get_attr("<Foo id='Y'/>", "id"), Some("Y".to_string()));
        assert_eq!(get_attr("<Foo/>", "id"), None);
    }

    #[test]
    fn line_at_counts_newlines() {
        let xml = "a\nb\nc";
        assert_eq!(line_at(xml, 0), 1);
        assert_eq!(line_at(xml, 2), 2);
        assert_eq!(line_at(xml, 4), 3);
    }

    #[test]
    fn absolute_positions_survive_nested_recursion() {
        let xml = "<root>\n  <Outer>\n    <Inner id=\"X\"/>\n  </Outer>\n</root>";
        let outer = find_children(xml, "Outer", 0, 1).remove(0);
        let inner_offset = inner_base_offset(&outer);
        let inner_line = inner_base_line(&outer);
        let inners = find_children(&outer.inner_xml, "Inner", inner_offset, inner_line);
        assert_eq!(inners.len(), 1);
        let expected_offset = xml.find("<Inner").unwrap();
        assert_eq!(inners[0].offset, expected_offset);
        assert_eq!(inners[0].line, line_at(xml, expected_offset));
    }

    #[test]
    fn navigate_path_descends_segments() {
        let xml = "<root><A><B><C id=\"1\"/></B></A></root>";
        let matches = navigate_path(xml, "A/B/C");
        assert_eq!(matches.len(), 1);
        assert_eq!(get_attr(&matches[0].open_tag, "id"), Some("1".to_string()));
    }

    #[test]
    fn get_child_text_strips_tags_and_trims() {
        let xml = "<Name>  <b>Central</b> Station  </Name>";
        assert_eq!(get_child_text(xml, "Name"), Some("Central Station".to_string()));
    }

    #[test]
    fn get_child_text_none_for_empty() {
        assert_eq!(get_child_text("<Name>   </Name>", "Name"), None);
    }

    #[test]
    fn find_close_tag_handles_malformed_input() {
        let xml = "<A><B>unterminated";
        assert_eq!(find_close_tag(xml, "B", 6), None);
    }

    #[test]
    fn find_netex_elements_falls_back_to_flat_layout() {
        let xml = "<PublicationDelivery><dataObjects><SiteFrame><stopPlaces><StopPlace id=\"SP1\"/></stopPlaces></SiteFrame></dataObjects></PublicationDelivery>";
        let elements = find_netex_elements(xml, paths::STOP_PLACES_COMPOSITE, paths::STOP_PLACES_FLAT);
        assert_eq!(elements.len(), 1);
    }
}
