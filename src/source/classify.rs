use std::path::Path;

use aho_corasick::{AhoCorasick, BuildError, MatchKind};
use compact_str::CompactString;

use crate::UNKNOWN_SERVICE;

/// Attributes a file found by a raw-directory scan to a service.
pub trait ServiceClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> CompactString;
}

/// Substring vocabulary classifier: the first rule (in declaration order)
/// whose fragment occurs anywhere in the path wins; no match yields
/// `unknown`.
#[derive(Debug, Clone)]
pub struct SubstringClassifier {
    matcher: AhoCorasick,
    services: Vec<CompactString>,
}

impl SubstringClassifier {
    /// Build from `(fragment, service)` rules.
    pub fn new<I, F, S>(rules: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (F, S)>,
        F: AsRef<str>,
        S: Into<CompactString>,
    {
        let (fragments, services): (Vec<F>, Vec<CompactString>) =
            rules.into_iter().map(|(f, s)| (f, s.into())).unzip();

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(fragments.iter().map(|f| f.as_ref()))?;

        Ok(Self { matcher, services })
    }

    /// The Snaproom service vocabulary.
    pub fn snaproom() -> Result<Self, BuildError> {
        Self::new([
            ("laravel", "snaproom-laravel"),
            ("react", "snaproom-react"),
            ("collector", "collector"),
        ])
    }
}

impl ServiceClassifier for SubstringClassifier {
    fn classify(&self, path: &Path) -> CompactString {
        let haystack = path.to_string_lossy();
        self.matcher
            .find_overlapping_iter(haystack.as_ref())
            .map(|m| m.pattern().as_usize())
            .min()
            .and_then(|idx| self.services.get(idx).cloned())
            .unwrap_or_else(|| CompactString::from(UNKNOWN_SERVICE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/logs/laravel/app.log", "snaproom-laravel")]
    #[case("/logs/react/build.log", "snaproom-react")]
    #[case("./logs/collector.log", "collector")]
    #[case("/var/log/nginx/access.log", "unknown")]
    #[case("/logs/react/laravel-bridge.log", "snaproom-laravel")]
    #[case("/srv/collector/react.log", "snaproom-react")]
    fn test_snaproom_vocabulary(#[case] path: &str, #[case] expected: &str) {
        let classifier = SubstringClassifier::snaproom().unwrap();
        assert_eq!(classifier.classify(Path::new(path)), expected);
    }

    #[test]
    fn test_empty_vocabulary_is_unknown() {
        let classifier = SubstringClassifier::new(Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(classifier.classify(Path::new("/logs/app.log")), UNKNOWN_SERVICE);
    }

    #[test]
    fn test_custom_rules_keep_declaration_priority() {
        let classifier =
            SubstringClassifier::new([("api", "gateway"), ("api-v2", "gateway-v2")]).unwrap();
        assert_eq!(classifier.classify(Path::new("/logs/api-v2/x.log")), "gateway");
    }
}
