use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{consistency_error, skipped_info, ValidationError};
use crate::navigator::{self, find_children, get_child_text};
use crate::{Document, Format};

use super::{Rule, RuleRunConfig};

const NETEX_ONLY: &[Format] = &[Format::Netex];

const ZONEINFO_ROOT: &str = "/usr/share/zoneinfo";

const KNOWN_TIMEZONE_ABBREVIATIONS: &[&str] = &[
    "CET", "CEST", "EET", "EEST", "WET", "WEST", "GMT", "UTC", "BST", "IST", "MSK", "JST", "KST", "CST", "EST",
    "PST", "MST", "HST", "AKST", "AKDT", "CDT", "EDT", "MDT", "PDT", "HDT", "NZST", "NZDT", "AEST", "AEDT", "ACST",
    "ACDT", "AWST", "SST", "AST", "NST", "NDT", "ADT", "ChST",
];

/// `TimeZoneOffset` / `SummerTimeZoneOffset` carry a bare hour offset, no minutes.
fn offset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]\d{1,2}$").expect("valid regex"))
}

/// The `UTC+1`/`GMT+01:00`-style offset form accepted for `TimeZone`/`SummerTimeZone`.
fn utc_gmt_offset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(UTC|GMT)[+-]\d{1,2}(:\d{2})?$").expect("valid regex"))
}

fn language_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}$").expect("valid regex"))
}

/// Zone names under the host's IANA timezone database, relative to
/// `ZONEINFO_ROOT` (e.g. `Europe/Oslo`). The `posix/` and `right/` trees
/// mirror the same names under a different leap-second policy and are
/// skipped so they don't inflate the set with duplicates.
fn iana_zones() -> &'static HashSet<String> {
    static ZONES: OnceLock<HashSet<String>> = OnceLock::new();
    ZONES.get_or_init(|| {
        let root = Path::new(ZONEINFO_ROOT);
        let mut zones = HashSet::new();
        collect_zone_files(root, root, &mut zones);
        zones
    })
}

fn collect_zone_files(root: &Path, dir: &Path, zones: &mut HashSet<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        let path = entry.path();
        if file_type.is_dir() {
            collect_zone_files(root, &path, zones);
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else { continue };
        let Some(name) = relative.to_str() else { continue };
        if name.starts_with("posix/") || name.starts_with("right/") || name == "posixrules" || name == "localtime" {
            continue;
        }
        zones.insert(name.to_string());
    }
}

fn is_valid_timezone(value: &str) -> bool {
    KNOWN_TIMEZONE_ABBREVIATIONS.contains(&value)
        || iana_zones().contains(value)
        || utc_gmt_offset_regex().is_match(value)
}

/// `FrameDefaults/DefaultLocale` must carry a consistent locale: a
/// recognizable `TimeZone`/`SummerTimeZone` (real IANA zone, whitelisted
/// abbreviation, or `UTC`/`GMT` offset), well-formed
/// `TimeZoneOffset`/`SummerTimeZoneOffset` strings, and a two-letter
/// `DefaultLanguage`. A document with no `FrameDefaults` skips the check; one
/// with `FrameDefaults` but no `DefaultLocale` passes without comment.
pub struct FrameDefaultsHaveALocaleAndTimeZone;

impl Rule for FrameDefaultsHaveALocaleAndTimeZone {
    fn name(&self) -> &'static str {
        "frameDefaultsHaveALocaleAndTimeZone"
    }
    fn display_name(&self) -> &'static str {
        "Frame defaults have a locale and time zone"
    }
    fn description(&self) -> &'static str {
        "FrameDefaults' DefaultLocale TimeZone, SummerTimeZone, their offsets, and DefaultLanguage must be well-formed."
    }
    fn formats(&self) -> &'static [Format] {
        NETEX_ONLY
    }

    fn run(&self, docs: &[Document], _config: &RuleRunConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for doc in docs {
            let Some(frame_defaults) = navigator::find_netex_elements(
                &doc.xml,
                navigator::paths::FRAME_DEFAULTS_COMPOSITE,
                navigator::paths::FRAME_DEFAULTS_FLAT,
            )
            .into_iter()
            .next() else {
                errors.push(skipped_info(
                    self.name(),
                    "FrameDefaults is missing; locale and time zone check skipped",
                ));
                continue;
            };

            let Some(default_locale) = find_children(&frame_defaults.inner_xml, "DefaultLocale", 0, 0)
                .into_iter()
                .next()
            else {
                continue;
            };
            let inner = &default_locale.inner_xml;
            let line = Some(frame_defaults.line);

            for field in ["TimeZone", "SummerTimeZone"] {
                if let Some(value) = get_child_text(inner, field)
                    && !is_valid_timezone(&value)
                {
                    errors.push(
                        consistency_error(self.name(), format!("`{}` is not a timezone: `{}`", field, value))
                            .with_file_name(doc.file_name.clone())
                            .with_position(line, None),
                    );
                }
            }

            for field in ["TimeZoneOffset", "SummerTimeZoneOffset"] {
                if let Some(value) = get_child_text(inner, field)
                    && !offset_regex().is_match(&value)
                {
                    errors.push(
                        consistency_error(
                            self.name(),
                            format!("`{}` is not a valid offset: `{}`", field, value),
                        )
                        .with_file_name(doc.file_name.clone())
                        .with_position(line, None),
                    );
                }
            }

            if let Some(language) = get_child_text(inner, "DefaultLanguage")
                && !language_regex().is_match(&language)
            {
                errors.push(
                    consistency_error(
                        self.name(),
                        format!("DefaultLanguage `{}` is not a two-letter ISO 639-1 code", language),
                    )
                    .with_file_name(doc.file_name.clone())
                    .with_position(line, None),
                );
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(xml: &str) -> Document {
        Document {
            file_name: "a.xml".to_string(),
            xml: xml.to_string(),
        }
    }

    fn wrap(default_locale_inner: &str) -> String {
        format!(
            r#"<PublicationDelivery><dataObjects><ServiceFrame><FrameDefaults><DefaultLocale>{}</DefaultLocale></FrameDefaults></ServiceFrame></dataObjects></PublicationDelivery>"#,
            default_locale_inner
        )
    }

    #[test]
    fn accepts_known_abbreviation() {
        let xml = wrap("<TimeZone>CET</TimeZone><DefaultLanguage>en</DefaultLanguage>");
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(&xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn rejects_unrecognized_timezone() {
        let xml = wrap("<TimeZone>Mordor/Barad-dur</TimeZone>");
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(&xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not a timezone"));
    }

    #[test]
    fn rejects_malformed_language() {
        let xml = wrap("<DefaultLanguage>english</DefaultLanguage>");
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(&xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("DefaultLanguage"));
    }

    #[test]
    fn accepts_iana_zone_and_gmt_offset() {
        let xml = wrap("<TimeZone>Europe/Oslo</TimeZone><SummerTimeZone>GMT+1</SummerTimeZone><TimeZoneOffset>+1</TimeZoneOffset>");
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(&xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn rejects_offset_with_minutes() {
        let xml = wrap("<TimeZoneOffset>+01:00</TimeZoneOffset>");
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(&xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not a valid offset"));
    }

    #[test]
    fn passes_when_default_locale_is_absent() {
        let xml = r#"<PublicationDelivery><dataObjects><ServiceFrame><FrameDefaults><DefaultLocationSystem>EPSG:4326</DefaultLocationSystem></FrameDefaults></ServiceFrame></dataObjects></PublicationDelivery>"#;
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 0);
    }

    #[test]
    fn emits_skipped_info_when_frame_defaults_is_absent() {
        let xml = r#"<PublicationDelivery><dataObjects><ServiceFrame></ServiceFrame></dataObjects></PublicationDelivery>"#;
        let errors = FrameDefaultsHaveALocaleAndTimeZone.run(&[doc(xml)], &RuleRunConfig::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("skipped"));
    }
}
