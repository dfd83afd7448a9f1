//! Format detection (§4.2).

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Netex,
    Siri,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Netex => "netex",
            Format::Siri => "siri",
        }
    }
}

const NETEX_NAMESPACE: &str = "http://www.netex.org.uk/netex";
const SIRI_NAMESPACE: &str = "http://www.siri.org.uk/siri";
const SNIFF_WINDOW: usize = 4096;

/// Detects NeTEx vs SIRI by scanning the first 4 KiB for a namespace
/// substring. NeTEx wins when both appear, since NeTEx documents import
/// SIRI types into their own namespace declarations.
pub fn detect_format(xml: &str) -> Result<Format, EngineError> {
    let window_end = xml
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&i| i <= SNIFF_WINDOW)
        .last()
        .unwrap_or(0);
    let window = &xml[..window_end];

    if window.contains(NETEX_NAMESPACE) {
        Ok(Format::Netex)
    } else if window.contains(SIRI_NAMESPACE) {
        Ok(Format::Siri)
    } else {
        Err(EngineError::SchemaResolution(format!(
            "could not detect format: expected `{}` or `{}` in the first {} bytes",
            NETEX_NAMESPACE, SIRI_NAMESPACE, SNIFF_WINDOW
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_netex() {
        let xml = r#"<PublicationDelivery xmlns="http://www.netex.org.uk/netex"></PublicationDelivery>"#;
        assert_eq!(detect_format(xml).unwrap(), Format::Netex);
    }

    #[test]
    fn detects_siri() {
        let xml = r#"<Siri xmlns="http://www.siri.org.uk/siri"></Siri>"#;
        assert_eq!(detect_format(xml).unwrap(), Format::Siri);
    }

    #[test]
    fn prefers_netex_when_both_present() {
        let xml = format!(
            r#"<Root xmlns:n="{}" xmlns:s="{}"></Root>"#,
            NETEX_NAMESPACE, SIRI_NAMESPACE
        );
        assert_eq!(detect_format(&xml).unwrap(), Format::Netex);
    }

    #[test]
    fn errors_when_neither_present() {
        let xml = r#"<Unrelated/>"#;
        assert!(detect_format(xml).is_err());
    }
}
