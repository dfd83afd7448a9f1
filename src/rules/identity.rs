use std::collections::HashMap;

use crate::error::{consistency_error, skipped_info, ValidationError};
use crate::frame::build_prerequisite_graph;
use crate::navigator::get_attr;
use crate::xsd_constraints::{extract_constraints, resolve_fields, resolve_selector, ConstraintKind};
use crate::{Document, Format};

use super::{Rule, RuleRunConfig};

const NETEX_ONLY: &[Format] = &[Format::Netex];

fn tuple_key(tuple: &[Option<String>]) -> Option<String> {
    if tuple.iter().all(Option::is_none) {
        return None;
    }
    Some(
        tuple
            .iter()
            .map(|v| v.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(";"),
    )
}

/// A `None` field in the candidate tuple is treated as a wildcard against the
/// corresponding key field, matching the identity-constraint spec's
/// partial-match relaxation for optional key parts.
fn tuple_matches(candidate: &[Option<String>], key: &[Option<String>]) -> bool {
    candidate.iter().zip(key).all(|(c, k)| c.is_none() || c == k)
}

/// Validates `xsd:keyref` constraints extracted from the active XSD against
/// the document set: every keyref instance must resolve to a declared key
/// tuple. Instances carrying `@versionRef` point at an externally versioned
/// object and are not checked. Requires XSD content; without it the rule is
/// skipped rather than silently passing.
pub struct NetexKeyRefConstraints;

impl Rule for NetexKeyRefConstraints {
    fn name(&self) -> &'static str {
        "netexKeyRefConstraints"
    }
    fn display_name(&self) -> &'static str {
        "NeTEx keyref constraints"
    }
    fn description(&self) -> &'static str {
        "Every xsd:keyref instance must resolve to a declared xsd:key tuple somewhere in the document set."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], config: &RuleRunConfig) -> Vec<ValidationError> {
        let Some(xsd_content) = &config.xsd_content else {
            return vec![skipped_info(
                self.name(),
                "no XSD content available; keyref constraints were not checked",
            )];
        };
        let constraints = extract_constraints(xsd_content);
        let keys: HashMap<&str, _> = constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Key)
            .map(|c| (c.name.as_str(), c))
            .collect();

        let mut errors = Vec::new();
        for keyref in constraints.iter().filter(|c| c.kind == ConstraintKind::Keyref) {
            let Some(refer_name) = &keyref.refer else { continue };
            let Some(key) = keys.get(refer_name.as_str()) else {
                errors.push(consistency_error(
                    self.name(),
                    format!("keyref `{}` refers to unknown key `{}`", keyref.name, refer_name),
                ));
                continue;
            };

            let mut key_tuples: Vec<Vec<Option<String>>> = Vec::new();
            for doc in docs {
                for el in resolve_selector(&doc.xml, &key.selector) {
                    key_tuples.push(resolve_fields(&el, &key.fields));
                }
            }

            for doc in docs {
                for el in resolve_selector(&doc.xml, &keyref.selector) {
                    if get_attr(&el.open_tag, "versionRef").is_some() {
                        continue;
                    }
                    let tuple = resolve_fields(&el, &keyref.fields);
                    if tuple.iter().all(Option::is_none) {
                        continue;
                    }
                    let resolves = key_tuples.iter().any(|k| tuple_matches(&tuple, k));
                    if !resolves {
                        let rendered = tuple
                            .iter()
                            .map(|v| v.as_deref().unwrap_or("?"))
                            .collect::<Vec<_>>()
                            .join(", ");
                        errors.push(
                            consistency_error(
                                self.name(),
                                format!(
                                    "keyref `{}` value ({}) does not resolve to any `{}` key",
                                    keyref.name, rendered, refer_name
                                ),
                            )
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                        );
                    }
                }
            }
        }
        errors
    }
}

/// Validates `xsd:unique` constraints: first within each document, then
/// between each frame and the frames it directly declares as prerequisites
/// (a frame two hops away, or one that only shares a file with a
/// prerequisite, is out of scope — NeTEx merges exactly the frames a
/// `prerequisites` block names, not their own transitive prerequisites).
pub struct NetexUniqueConstraints;

impl Rule for NetexUniqueConstraints {
    fn name(&self) -> &'static str {
        "netexUniqueConstraints"
    }
    fn display_name(&self) -> &'static str {
        "NeTEx unique constraints"
    }
    fn description(&self) -> &'static str {
        "Every xsd:unique constraint's key tuple must be unique within a document and between a frame and its direct prerequisites."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], config: &RuleRunConfig) -> Vec<ValidationError> {
        let Some(xsd_content) = &config.xsd_content else {
            return vec![skipped_info(
                self.name(),
                "no XSD content available; unique constraints were not checked",
            )];
        };
        let constraints = extract_constraints(xsd_content);
        let unique_constraints: Vec<_> = constraints.iter().filter(|c| c.kind == ConstraintKind::Unique).collect();
        if unique_constraints.is_empty() {
            return Vec::new();
        }

        let (frames, graph) = build_prerequisite_graph(docs);

        let mut errors = Vec::new();
        for constraint in &unique_constraints {
            // Pass 1: duplicates within a single document.
            for doc in docs {
                let mut seen_in_file: HashMap<String, u32> = HashMap::new();
                for el in resolve_selector(&doc.xml, &constraint.selector) {
                    let tuple = resolve_fields(&el, &constraint.fields);
                    let Some(key) = tuple_key(&tuple) else { continue };
                    if let Some(&first_line) = seen_in_file.get(&key) {
                        errors.push(
                            consistency_error(
                                self.name(),
                                format!(
                                    "`{}` value `{}` duplicates the one declared at line {} in the same document",
                                    constraint.name, key, first_line
                                ),
                            )
                            .with_file_name(doc.file_name.clone())
                            .with_position(Some(el.line), None),
                        );
                    } else {
                        seen_in_file.insert(key, el.line);
                    }
                }
            }

            // Pass 2: duplicates between a frame and its direct prerequisites.
            // frame id -> (file name, key -> line of first occurrence in the frame).
            let mut frame_keys: HashMap<&str, (&str, HashMap<String, u32>)> = HashMap::new();
            for frame in &frames {
                let mut keys: HashMap<String, u32> = HashMap::new();
                for el in resolve_selector(&frame.inner_xml, &constraint.selector) {
                    let tuple = resolve_fields(&el, &constraint.fields);
                    if let Some(key) = tuple_key(&tuple) {
                        keys.entry(key).or_insert(el.line);
                    }
                }
                frame_keys.insert(frame.id.as_str(), (frame.file_name.as_str(), keys));
            }

            for (frame_id, prereq_ids) in &graph {
                let Some(frame_entry) = frame_keys.get(frame_id.as_str()) else {
                    continue;
                };
                let frame_file = frame_entry.0;
                let frame_key_set = &frame_entry.1;
                for prereq_id in prereq_ids {
                    if prereq_id == frame_id {
                        continue;
                    }
                    let Some(prereq_entry) = frame_keys.get(prereq_id.as_str()) else {
                        continue;
                    };
                    let prereq_key_set = &prereq_entry.1;
                    for (key, &line) in frame_key_set {
                        if prereq_key_set.contains_key(key) {
                            errors.push(
                                consistency_error(
                                    self.name(),
                                    format!(
                                        "`{}` value `{}` duplicates a declaration in prerequisite frame `{}`",
                                        constraint.name, key, prereq_id
                                    ),
                                )
                                .with_file_name(frame_file.to_string())
                                .with_position(Some(line), None),
                            );
                        }
                    }
                }
            }
        }
        errors
    }
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

    fn doc(file_name: &str, xml: &str) -> Document {
        Document {
            file_name: file_name.to_string(),
            xml: xml.to_string(),
        }
    }

    fn config() -> RuleRunConfig {
        RuleRunConfig {
            xsd_content: Some(XSD.to_string()),
            distance_meters: None,
        }
    }

    #[test]
    fn keyref_flags_dangling_reference() {
        let docs = vec![doc("a.xml", r#"<root><Line id="L1"/><LineRef ref="L2"/></root>"#)];
        let errors = NetexKeyRefConstraints.run(&docs, &config());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("L2"));
    }

    #[test]
    fn keyref_with_version_ref_is_skipped() {
        let docs = vec![doc(
            "a.xml",
            r#"<root><Line id="L1"/><LineRef ref="L2" versionRef="1.0"/></root>"#,
        )];
        let errors = NetexKeyRefConstraints.run(&docs, &config());
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn keyref_resolves_across_documents() {
        let docs = vec![
            doc("a.xml", r#"<root><Line id="L1"/></root>"#),
            doc("b.xml", r#"<root><LineRef ref="L1"/></root>"#),
        ];
        let errors = NetexKeyRefConstraints.run(&docs, &config());
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn unique_flags_duplicate_within_document() {
        let docs = vec![doc(
            "a.xml",
            r#"<root><StopPlace id="SP1"/><StopPlace id="SP1"/></root>"#,
        )];
        let errors = NetexUniqueConstraints.run(&docs, &config());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("UniqueStopPlaceId"));
    }

    #[test]
    fn unique_skipped_without_xsd_content() {
        let docs = vec![doc("a.xml", r#"<root><StopPlace id="SP1"/></root>"#)];
        let errors = NetexUniqueConstraints.run(&docs, &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, crate::error::Category::Skipped);
    }

    #[test]
    fn unique_flags_duplicate_between_a_frame_and_its_direct_prerequisite() {
        let docs = vec![
            doc(
                "a.xml",
                r#"<root><ServiceFrame id="SFA"><prerequisites><ResourceFrameRef ref="SFB"/></prerequisites><StopPlace id="SP1"/></ServiceFrame></root>"#,
            ),
            doc("b.xml", r#"<root><ResourceFrame id="SFB"><StopPlace id="SP1"/></ResourceFrame></root>"#),
        ];
        let errors = NetexUniqueConstraints.run(&docs, &config());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("UniqueStopPlaceId"));
        assert_eq!(errors[0].file_name.as_deref(), Some("a.xml"));
    }

    #[test]
    fn unique_does_not_flag_duplicate_across_non_adjacent_frames() {
        // SFA declares SFB as a prerequisite, and SFB declares SFC, but SFA
        // does not declare SFC directly. The id duplicated between SFA and
        // SFC two hops away must not be flagged.
        let docs = vec![
            doc(
                "a.xml",
                r#"<root><ServiceFrame id="SFA"><prerequisites><ResourceFrameRef ref="SFB"/></prerequisites><StopPlace id="DUP"/></ServiceFrame></root>"#,
            ),
            doc(
                "b.xml",
                r#"<root><ResourceFrame id="SFB"><prerequisites><ResourceFrameRef ref="SFC"/></prerequisites><StopPlace id="OTHER"/></ResourceFrame></root>"#,
            ),
            doc("c.xml", r#"<root><ResourceFrame id="SFC"><StopPlace id="DUP"/></ResourceFrame></root>"#),
        ];
        let errors = NetexUniqueConstraints.run(&docs, &config());
        assert_eq!(errors.len(), 0);
    }
}
