//! Orchestrator (§4.9): the single pipeline behind both `validate` and
//! `validate_documents`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::archive;
use crate::cache;
use crate::error::{general_error, EngineError, EngineResult};
use crate::format::detect_format;
use crate::libxml2::LibXml2Wrapper;
use crate::progress::{Phase, ProgressCallback, ProgressEvent};
use crate::rules::{is_cross_doc_rule, ProfileRegistry, RuleRegistry, RuleRunConfig};
use crate::schema_catalogue;
use crate::{Document, FileResult, Format, ValidationResult};

/// Options shared by `validate` and `validate_documents` (§6's embedding
/// contract). `rule_config` carries only caller-supplied overrides
/// (`distance_meters`); `xsd_content` is always filled in by the
/// orchestrator itself at step 5, overwriting whatever the caller set.
pub struct ValidateOptions {
    pub format: Option<Format>,
    pub profile: Option<String>,
    pub schema_id: Option<String>,
    pub custom_schema_path: Option<PathBuf>,
    pub rules: Option<Vec<String>>,
    pub rule_config: RuleRunConfig,
    pub skip_xsd: bool,
    pub skip_rules: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            format: None,
            profile: None,
            schema_id: None,
            custom_schema_path: None,
            rules: None,
            rule_config: RuleRunConfig::default(),
            skip_xsd: false,
            skip_rules: false,
            on_progress: None,
        }
    }
}

pub struct Orchestrator {
    rules: RuleRegistry,
    profiles: ProfileRegistry,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            rules: RuleRegistry::default(),
            profiles: ProfileRegistry::default(),
        }
    }

    /// Reads `paths` into [`Document`]s (expanding archives per C11) then
    /// runs [`Self::validate_documents`].
    pub async fn validate(&self, paths: &[PathBuf], options: ValidateOptions) -> EngineResult<ValidationResult> {
        let documents = self.read_documents(paths).await?;
        self.validate_documents(documents, options).await
    }

    async fn read_documents(&self, paths: &[PathBuf]) -> EngineResult<Vec<Document>> {
        let mut documents = Vec::new();
        for path in paths {
            if archive::is_archive(path) {
                documents.extend(archive::extract_xml_from_archive(path)?);
                continue;
            }
            let xml = tokio::fs::read_to_string(path).await.map_err(|source| EngineError::UnreadableDocument {
                path: path.clone(),
                source,
            })?;
            let file_name = file_name_of(path);
            documents.push(Document { file_name, xml });
        }
        Ok(documents)
    }

    /// Steps 1-9 of §4.9, run strictly sequentially (§5's "Implementation
    /// note" forbids unordered fan-out here).
    pub async fn validate_documents(&self, documents: Vec<Document>, options: ValidateOptions) -> EngineResult<ValidationResult> {
        let start = Instant::now();
        if documents.is_empty() {
            return Ok(ValidationResult::empty());
        }

        let format = match options.format {
            Some(format) => format,
            None => detect_format(&documents[0].xml)?,
        };

        let profile_name = options
            .profile
            .clone()
            .unwrap_or_else(|| self.profiles.default_for_format(format).to_string());
        let profile = self.profiles.get_profile(&profile_name)?.clone();

        let rule_names: Vec<String> = match &options.rules {
            Some(names) => names.clone(),
            None => profile.enabled_rules.iter().map(|s| s.to_string()).collect(),
        };
        let mut resolved_rules = Vec::with_capacity(rule_names.len());
        for name in &rule_names {
            resolved_rules.push(self.rules.get_rule(name)?);
        }
        let (per_doc_rules, cross_doc_rules): (Vec<_>, Vec<_>) =
            resolved_rules.into_iter().partition(|rule| !is_cross_doc_rule(rule.name()));

        let schema_id = options.schema_id.clone().or_else(|| profile.schema_id.map(str::to_string));
        let xsd_text = self.resolve_xsd_text(schema_id.as_deref(), options.custom_schema_path.as_deref()).await;

        let mut rule_config = options.rule_config.clone();
        rule_config.xsd_content = xsd_text.clone();

        let schema_validator = if schema_id.is_some() && !options.skip_xsd {
            match &xsd_text {
                Some(xsd) => cache::get_or_parse_validator(xsd.as_bytes()).await.ok(),
                None => None,
            }
        } else {
            None
        };

        let total_files = documents.len();
        let mut file_results = Vec::with_capacity(total_files);

        for (index, doc) in documents.iter().enumerate() {
            emit(&options, Phase::Rules, Some(index), total_files, Some(doc.file_name.clone()));
            let mut file_result = FileResult::new(doc.file_name.clone(), format);

            if !options.skip_rules {
                for rule in &per_doc_rules {
                    run_timed(*rule, std::slice::from_ref(doc), &rule_config, &mut file_result);
                }
            }

            if schema_id.is_some() && !options.skip_xsd {
                emit(&options, Phase::Xsd, Some(index), total_files, Some(doc.file_name.clone()));
                if let Some(schema) = &schema_validator {
                    let xsd_start = Instant::now();
                    let wrapper = LibXml2Wrapper::new();
                    match wrapper.validate_memory(schema.as_ref(), doc.xml.as_bytes(), Some(&doc.file_name)) {
                        Ok(errors) => file_result
                            .errors
                            .extend(errors.into_iter().map(|e| e.with_file_name(doc.file_name.clone()))),
                        Err(e) => file_result.errors.push(general_error("xsd", e.to_string())),
                    }
                    file_result.rule_timing.insert("xsd".to_string(), xsd_start.elapsed().as_millis() as u64);
                }
            }

            file_result.recompute_passed();
            emit(&options, Phase::FileDone, Some(index), total_files, Some(doc.file_name.clone()));
            file_results.push(file_result);
        }

        if !cross_doc_rules.is_empty() && !options.skip_rules {
            emit(&options, Phase::CrossDoc, None, total_files, None);
            for rule in &cross_doc_rules {
                let rule_start = Instant::now();
                let errors = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rule.run(&documents, &rule_config))) {
                    Ok(errors) => errors,
                    Err(_) => vec![general_error(rule.name(), "rule panicked")],
                };
                let elapsed = rule_start.elapsed().as_millis() as u64;

                for mut error in errors {
                    let target = error.file_name.clone().unwrap_or_else(|| documents[0].file_name.clone());
                    error.file_name = Some(target.clone());
                    let slot_index = file_results.iter().position(|fr| fr.file_name == target).unwrap_or(0);
                    file_results[slot_index].errors.push(error);
                }
                for file_result in &mut file_results {
                    file_result.rules_run.push(rule.name().to_string());
                    file_result.rule_timing.insert(rule.name().to_string(), elapsed);
                }
            }
            for file_result in &mut file_results {
                file_result.recompute_passed();
            }
        }

        emit(&options, Phase::Complete, None, total_files, None);
        Ok(ValidationResult::aggregate(file_results, start.elapsed().as_millis() as u64))
    }

    /// Step 5: resolve the active schema's XSD text. Any failure here is
    /// swallowed to `None` — a missing schema only disables the XSD step
    /// and XSD-dependent rules, which report their own `skipped` info.
    async fn resolve_xsd_text(&self, schema_id: Option<&str>, custom_schema_path: Option<&Path>) -> Option<String> {
        let schema_id = schema_id?;
        if schema_id == "custom" {
            let path = custom_schema_path?;
            tokio::fs::read_to_string(path).await.ok()
        } else {
            schema_catalogue::resolve_schema_text(schema_id).await.ok()
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.display().to_string())
}

fn run_timed(rule: &dyn crate::rules::Rule, docs: &[Document], config: &RuleRunConfig, file_result: &mut FileResult) {
    let start = Instant::now();
    let errors = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rule.run(docs, config))) {
        Ok(errors) => errors,
        Err(_) => vec![general_error(rule.name(), "rule panicked")],
    };
    file_result.errors.extend(errors);
    file_result.rule_timing.insert(rule.name().to_string(), start.elapsed().as_millis() as u64);
    file_result.rules_run.push(rule.name().to_string());
}

fn emit(options: &ValidateOptions, phase: Phase, file_index: Option<usize>, total_files: usize, file_name: Option<String>) {
    if let Some(callback) = &options.on_progress {
        callback(&ProgressEvent {
            phase,
            file_index,
            total_files,
            file_name,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn netex_doc(file_name: &str, extra: &str) -> Document {
        Document {
            file_name: file_name.to_string(),
            xml: format!(
                r#"<PublicationDelivery xmlns="http://www.netex.org.uk/netex"><dataObjects>{}</dataObjects></PublicationDelivery>"#,
                extra
            ),
        }
    }

    #[tokio::test]
    async fn empty_document_set_returns_zero_result() {
        let orchestrator = Orchestrator::new();
        let result = orchestrator.validate_documents(vec![], ValidateOptions::default()).await.unwrap();
        assert_eq!(result.total_files, 0);
        assert_eq!(result.duration_ms, 0);
    }

    #[tokio::test]
    async fn unknown_rule_name_is_rejected_before_any_work() {
        let orchestrator = Orchestrator::new();
        let options = ValidateOptions {
            rules: Some(vec!["doesNotExist".to_string()]),
            ..Default::default()
        };
        let docs = vec![netex_doc("a.xml", "")];
        let err = orchestrator.validate_documents(docs, options).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownRule { .. }));
    }

    #[tokio::test]
    async fn per_doc_rules_run_without_a_schema_id() {
        let orchestrator = Orchestrator::new();
        let options = ValidateOptions {
            rules: Some(vec!["everyStopPlaceHasAName".to_string()]),
            schema_id: None,
            ..Default::default()
        };
        let docs = vec![netex_doc(
            "a.xml",
            r#"<SiteFrame><stopPlaces><StopPlace id="SP1"></StopPlace></stopPlaces></SiteFrame>"#,
        )];
        let result = orchestrator.validate_documents(docs, options).await.unwrap();
        assert_eq!(result.total_files, 1);
        assert!(result.files[0].rules_run.contains(&"everyStopPlaceHasAName".to_string()));
        assert!(!result.files[0].passed);
    }

    #[tokio::test]
    async fn progress_callback_fires_for_every_phase() {
        let orchestrator = Orchestrator::new();
        let phases = Arc::new(std::sync::Mutex::new(Vec::new()));
        let phases_clone = phases.clone();
        let options = ValidateOptions {
            rules: Some(vec!["everyStopPlaceHasAName".to_string()]),
            on_progress: Some(Arc::new(move |event: &ProgressEvent| {
                phases_clone.lock().unwrap().push(event.phase.clone());
            })),
            ..Default::default()
        };
        let docs = vec![netex_doc("a.xml", "")];
        orchestrator.validate_documents(docs, options).await.unwrap();
        let recorded = phases.lock().unwrap();
        assert_eq!(recorded.first(), Some(&Phase::Rules));
        assert_eq!(recorded.last(), Some(&Phase::Complete));
        assert!(recorded.contains(&Phase::FileDone));
    }

    #[tokio::test]
    async fn cross_doc_rule_errors_attribute_to_named_file() {
        let orchestrator = Orchestrator::new();
        let options = ValidateOptions {
            rules: Some(vec!["everyLineIsReferenced".to_string()]),
            ..Default::default()
        };
        let docs = vec![
            netex_doc(
                "lines.xml",
                r#"<ServiceFrame><lines><Line id="L1"/></lines></ServiceFrame>"#,
            ),
            netex_doc("routes.xml", r#"<ServiceFrame><routes></routes></ServiceFrame>"#),
        ];
        let result = orchestrator.validate_documents(docs, options).await.unwrap();
        assert_eq!(result.total_files, 2);
        assert!(result.files.iter().all(|f| f.rules_run.contains(&"everyLineIsReferenced".to_string())));
    }

    #[tokio::test]
    async fn skip_rules_still_allows_xsd_path_to_run() {
        let orchestrator = Orchestrator::new();
        let options = ValidateOptions {
            rules: Some(vec![]),
            skip_rules: true,
            ..Default::default()
        };
        let docs = vec![netex_doc("a.xml", "")];
        let result = orchestrator.validate_documents(docs, options).await.unwrap();
        assert_eq!(result.total_files, 1);
        assert!(result.files[0].rules_run.is_empty());
    }

    #[tokio::test]
    async fn unreadable_path_surfaces_as_engine_error() {
        let orchestrator = Orchestrator::new();
        let missing = PathBuf::from("/nonexistent/does-not-exist.xml");
        let err = orchestrator.validate(&[missing], ValidateOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::UnreadableDocument { .. }));
    }

    #[test]
    fn progress_counter_never_double_counts_file_done() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let callback: ProgressCallback = Arc::new(move |event: &ProgressEvent| {
            if event.phase == Phase::FileDone {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        callback(&ProgressEvent {
            phase: Phase::FileDone,
            file_index: Some(0),
            total_files: 1,
            file_name: Some("a.xml".to_string()),
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
