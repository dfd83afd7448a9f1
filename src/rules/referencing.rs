use std::collections::{HashMap, HashSet};

use crate::error::{consistency_error, quality_error, ValidationError};
use crate::frame::build_prerequisite_graph;
use crate::navigator::{find_all, get_attr};
use crate::{Document, Format};

use super::{Rule, RuleRunConfig};

const NETEX_ONLY: &[Format] = &[Format::Netex];

/// Every `<Line id=...>` must be referenced by some `LineRef` in the
/// document set; every `LineRef` must point at a `Line` that exists.
pub struct EveryLineIsReferenced;

impl Rule for EveryLineIsReferenced {
    fn name(&self) -> &'static str {
        "everyLineIsReferenced"
    }
    fn display_name(&self) -> &'static str {
        "Every line is referenced"
    }
    fn description(&self) -> &'static str {
        "Every Line must be declared with an id and referenced by a LineRef somewhere in the document set."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut refs: HashSet<String> = HashSet::new();
        for doc in docs {
            for el in find_all(&doc.xml, "LineRef", 0, 1) {
                if let Some(r) = get_attr(&el.open_tag, "ref") {
                    refs.insert(r);
                }
            }
        }

        let mut errors = Vec::new();
        for doc in docs {
            for el in find_all(&doc.xml, "Line", 0, 1) {
                match get_attr(&el.open_tag, "id") {
                    None => errors.push(
                        consistency_error(self.name(), "Line is missing an `id` attribute")
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    ),
                    Some(id) if !refs.contains(&id) => errors.push(
                        consistency_error(self.name(), format!("Line `{}` is not referenced by any LineRef", id))
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    ),
                    Some(_) => {}
                }
            }
        }
        errors
    }
}

/// Symmetric check for `StopPlace` / `StopPlaceRef`.
pub struct EveryStopPlaceIsReferenced;

impl Rule for EveryStopPlaceIsReferenced {
    fn name(&self) -> &'static str {
        "everyStopPlaceIsReferenced"
    }
    fn display_name(&self) -> &'static str {
        "Every stop place is referenced"
    }
    fn description(&self) -> &'static str {
        "Every StopPlace must be declared with an id and referenced by a StopPlaceRef somewhere in the document set."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut refs: HashSet<String> = HashSet::new();
        for doc in docs {
            for el in find_all(&doc.xml, "StopPlaceRef", 0, 1) {
                if let Some(r) = get_attr(&el.open_tag, "ref") {
                    refs.insert(r);
                }
            }
        }

        let mut errors = Vec::new();
        for doc in docs {
            for el in find_all(&doc.xml, "StopPlace", 0, 1) {
                match get_attr(&el.open_tag, "id") {
                    None => errors.push(
                        consistency_error(self.name(), "StopPlace is missing an `id` attribute")
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                    ),
                    Some(id) if !refs.contains(&id) => errors.push(
                        consistency_error(
                            self.name(),
                            format!("StopPlace `{}` is not referenced by any StopPlaceRef", id),
                        )
                        .with_file_name(doc.file_name.clone())
                        .with_position(Some(el.line), None),
                    ),
                    Some(_) => {}
                }
            }
        }
        errors
    }
}

/// Every declared `<prerequisites>/*FrameRef` must resolve to a frame that
/// exists; every cross-file `*Ref` should be backed by a declared
/// prerequisite edge reaching the target file.
pub struct NetexPrerequisitesAreSatisfied;

impl Rule for NetexPrerequisitesAreSatisfied {
    fn name(&self) -> &'static str {
        "netexPrerequisitesAreSatisfied"
    }
    fn display_name(&self) -> &'static str {
        "NeTEx prerequisites are satisfied"
    }
    fn description(&self) -> &'static str {
        "Declared frame prerequisites must resolve, and cross-file references should be backed by a declared prerequisite edge."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let (frames, _graph) = build_prerequisite_graph(docs);
        let known_ids: HashSet<&str> = frames.iter().map(|f| f.id.as_str()).collect();
        let id_to_file: HashMap<&str, &str> = frames
            .iter()
            .map(|f| (f.id.as_str(), f.file_name.as_str()))
            .collect();

        let mut errors = Vec::new();
        for frame in &frames {
            for prereq in &frame.prerequisites {
                if !known_ids.contains(prereq.frame_ref.as_str()) {
                    errors.push(
                        consistency_error(
                            self.name(),
                            format!(
                                "frame `{}` declares a prerequisite on `{}`, which does not exist",
                                frame.id, prereq.frame_ref
                            ),
                        )
                        .with_file_name(frame.file_name.clone())
                        .with_position(Some(frame.line), None),
                    );
                }
            }
        }

        // Declared prerequisite edges per file, transitively would be more
        // precise, but a direct declared edge is what the source allows.
        let mut declared_edges: HashSet<(&str, &str)> = HashSet::new();
        for frame in &frames {
            for prereq in &frame.prerequisites {
                if let Some(&target_file) = id_to_file.get(prereq.frame_ref.as_str()) {
                    declared_edges.insert((frame.file_name.as_str(), target_file));
                }
            }
        }

        let mut warned_pairs: HashSet<(String, String)> = HashSet::new();
        // Generic cross-file *Ref scan: any element whose local name ends
        // in "Ref" and whose @ref resolves to an id declared in a
        // different file.
        for doc in docs {
            for el in generic_ref_elements(&doc.xml) {
                let Some(target_id) = get_attr(&el, "ref") else {
                    continue;
                };
                let Some(&target_file) = id_to_file.get(target_id.as_str()) else {
                    continue;
                };
                if target_file == doc.file_name {
                    continue;
                }
                let pair = (doc.file_name.clone(), target_file.to_string());
                if declared_edges.contains(&(doc.file_name.as_str(), target_file)) {
                    continue;
                }
                if warned_pairs.insert(pair.clone()) {
                    errors.push(
                        quality_error(
                            self.name(),
                            format!(
                                "`{}` references entities in `{}` without declaring a prerequisite on it",
                                pair.0, pair.1
                            ),
                        )
                        .with_file_name(doc.file_name.clone()),
                    );
                }
            }
        }

        errors
    }
}

fn generic_ref_elements(xml: &str) -> Vec<String> {
    use regex::Regex;
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"<(?:[A-Za-z_][\w.-]*:)?\w*Ref\b([^>]*?)/?>"#).expect("valid regex")
    });
    re.find_iter(xml).map(|m| m.as_str().to_string()).collect()
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
    fn every_line_is_referenced_passes_when_referenced() {
        let docs = vec![
            doc("lines.xml", r#"<ServiceFrame id="SF:lines" version="1"><lines><Line id="L1"/></lines></ServiceFrame>"#),
            doc(
                "routes.xml",
                r#"<ServiceFrame id="SF:routes" version="1"><prerequisites><ServiceFrameRef ref="SF:lines"/></prerequisites><routes><Route><LineRef ref="L1"/></Route></routes></ServiceFrame>"#,
            ),
        ];
        let errors = EveryLineIsReferenced.run(&docs, &RuleRunConfig::default());
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn every_line_is_referenced_flags_unreferenced_line() {
        let docs = vec![
            doc("a.xml", r#"<Line id="L1"/>"#),
            doc("b.xml", r#"<LineRef ref="L99"/>"#),
        ];
        let errors = EveryLineIsReferenced.run(&docs, &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file_name.as_deref(), Some("a.xml"));
        assert!(errors[0].message.contains("L1"));
    }

    #[test]
    fn prerequisites_must_resolve() {
        let docs = vec![doc(
            "a.xml",
            r#"<ServiceFrame id="SF1"><prerequisites><ResourceFrameRef ref="MISSING"/></prerequisites></ServiceFrame>"#,
        )];
        let errors = NetexPrerequisitesAreSatisfied.run(&docs, &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("MISSING"));
    }
}
