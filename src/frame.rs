//! Frame parser (§4.4): enumerates NeTEx VersionFrames and the
//! prerequisite graph declared between them.

use std::collections::{HashMap, HashSet};

use crate::navigator::{find_all, get_attr, inner_base_line, inner_base_offset};
use crate::Document;

pub const FRAME_TYPES: &[&str] = &[
    "CompositeFrame",
    "ServiceFrame",
    "SiteFrame",
    "TimetableFrame",
    "ResourceFrame",
    "GeneralFrame",
    "SalesTransactionFrame",
    "FareFrame",
    "DriverScheduleFrame",
    "VehicleScheduleFrame",
    "InfrastructureFrame",
];

#[derive(Debug, Clone)]
pub struct PrerequisiteRef {
    pub frame_ref: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub id: String,
    pub version: Option<String>,
    pub frame_type: String,
    pub file_name: String,
    pub prerequisites: Vec<PrerequisiteRef>,
    pub inner_xml: String,
    pub line: u32,
}

/// `frame id -> set of prerequisite frame ids`. Frames without declared
/// prerequisites appear with an empty set. Duplicate frame ids across
/// documents collapse last-writer-wins; flagging duplicates is
/// `netexUniqueConstraints`'s job, not this graph's.
pub type PrerequisiteGraph = HashMap<String, HashSet<String>>;

/// Enumerate every frame in every document and build the prerequisite graph.
pub fn build_prerequisite_graph(documents: &[Document]) -> (Vec<FrameInfo>, PrerequisiteGraph) {
    let mut frames = Vec::new();
    for doc in documents {
        for frame_type in FRAME_TYPES {
            for el in find_all(&doc.xml, frame_type, 0, 1) {
                let Some(id) = get_attr(&el.open_tag, "id") else {
                    continue;
                };
                let version = get_attr(&el.open_tag, "version");
                let prerequisites = extract_prerequisites(&el.inner_xml, inner_base_offset(&el), inner_base_line(&el));
                frames.push(FrameInfo {
                    id,
                    version,
                    frame_type: frame_type.to_string(),
                    file_name: doc.file_name.clone(),
                    prerequisites,
                    inner_xml: el.inner_xml.clone(),
                    line: el.line,
                });
            }
        }
    }

    let mut graph: PrerequisiteGraph = HashMap::new();
    for frame in &frames {
        let entry = graph.entry(frame.id.clone()).or_default();
        for p in &frame.prerequisites {
            entry.insert(p.frame_ref.clone());
        }
    }
    (frames, graph)
}

fn extract_prerequisites(frame_inner_xml: &str, base_offset: usize, base_line: u32) -> Vec<PrerequisiteRef> {
    let Some(prereq_el) = find_all(frame_inner_xml, "prerequisites", base_offset, base_line)
        .into_iter()
        .next()
    else {
        return Vec::new();
    };

    frame_ref_elements(&prereq_el.inner_xml)
}

/// Every element whose local name ends in `FrameRef`, regardless of exact
/// frame-type prefix (`ServiceFrameRef`, `ResourceFrameRef`, ...).
fn frame_ref_elements(xml: &str) -> Vec<PrerequisiteRef> {
    use regex::Regex;
    use std::sync::OnceLock;

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"<(?:[A-Za-z_][\w.-]*:)?(\w*FrameRef)\b([^>]*?)/?>"#).expect("valid regex")
    });

    re.captures_iter(xml)
        .filter_map(|caps| {
            let tag = caps.get(0)?.as_str();
            let frame_ref = get_attr(tag, "ref")?;
            let version = get_attr(tag, "version");
            Some(PrerequisiteRef { frame_ref, version })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(file_name: &str, xml: &str) -> Document {
        Document {
            file_name: file_name.to_string(),
            xml: xml.to_string(),
        }
    }

    #[test]
    fn enumerates_frames_with_ids_only() {
        let docs = vec![doc(
            "a.xml",
            r#"<root><ServiceFrame id="SF1" version="1"></ServiceFrame><ServiceFrame></ServiceFrame></root>"#,
        )];
        let (frames, _) = build_prerequisite_graph(&docs);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, "SF1");
    }

    #[test]
    fn extracts_prerequisite_frame_refs() {
        let docs = vec![doc(
            "b.xml",
            r#"<root><ServiceFrame id="SF2"><prerequisites><ResourceFrameRef ref="RF1" version="1"/></prerequisites></ServiceFrame></root>"#,
        )];
        let (frames, graph) = build_prerequisite_graph(&docs);
        assert_eq!(frames[0].prerequisites.len(), 1);
        assert_eq!(frames[0].prerequisites[0].frame_ref, "RF1");
        assert!(graph.get("SF2").unwrap().contains("RF1"));
    }

    #[test]
    fn frame_without_prerequisites_has_empty_set() {
        let docs = vec![doc("c.xml", r#"<root><ServiceFrame id="SF3"></ServiceFrame></root>"#)];
        let (_, graph) = build_prerequisite_graph(&docs);
        assert!(graph.get("SF3").unwrap().is_empty());
    }
}
