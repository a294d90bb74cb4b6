//! Asset authorship and licensing metadata.
//!
//! Stored and round-tripped verbatim; nothing in the engine interprets it.

use serde::{Deserialize, Serialize};

/// Author, license and homepage of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetLicense {
    pub author: String,
    pub license: String,
    pub homepage: String,
    pub copyright: String,
}

impl AssetLicense {
    /// License with only the license name set.
    pub fn with_license(license: impl Into<String>) -> Self {
        Self {
            license: license.into(),
            ..Default::default()
        }
    }

    /// Update from a `# key: value` comment or a bare `key value` directive.
    ///
    /// Lines with an unrecognised key are ignored.
    pub fn update_from_comment(&mut self, line: &str) {
        let line = line.trim();
        let line = line
            .strip_prefix('#')
            .or_else(|| line.strip_prefix("//"))
            .unwrap_or(line);
        let mut words = line.split_whitespace();
        let Some(key) = words.next() else { return };
        let value = words.collect::<Vec<_>>().join(" ");
        self.set(&key.trim_end_matches(':').to_lowercase(), value);
    }

    fn set(&mut self, key: &str, value: String) -> bool {
        match key {
            "author" => self.author = value,
            "license" => self.license = value,
            "homepage" => self.homepage = value,
            "copyright" => self.copyright = value,
            _ => return false,
        }
        true
    }

    fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("author", &self.author),
            ("license", &self.license),
            ("homepage", &self.homepage),
            ("copyright", &self.copyright),
        ]
    }

    /// Alternating key/value list of the non-empty fields.
    pub fn to_string_list(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .flat_map(|(key, value)| [key.to_string(), value.to_string()])
            .collect()
    }

    /// Inverse of [`to_string_list`](Self::to_string_list). Unknown keys and
    /// a trailing unpaired key are dropped.
    pub fn from_string_list<S: AsRef<str>>(list: &[S]) -> Self {
        let mut license = Self::default();
        for pair in list.chunks_exact(2) {
            license.set(pair[0].as_ref(), pair[1].as_ref().to_string());
        }
        license
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_updates_known_keys() {
        let mut lic = AssetLicense::default();
        lic.update_from_comment("# author: Jane Doe");
        lic.update_from_comment("#license CC0");
        lic.update_from_comment("# Homepage: http://example.org/x");
        lic.update_from_comment("# this is a plain comment");
        lic.update_from_comment("#");
        assert_eq!(lic.author, "Jane Doe");
        assert_eq!(lic.license, "CC0");
        assert_eq!(lic.homepage, "http://example.org/x");
        assert!(lic.copyright.is_empty());
    }

    #[test]
    fn test_bare_directive_updates() {
        let mut lic = AssetLicense::with_license("AGPL3");
        lic.update_from_comment("license: CC-BY 4.0");
        assert_eq!(lic.license, "CC-BY 4.0");
    }

    #[test]
    fn test_string_list_round_trip_skips_empty() {
        let lic = AssetLicense {
            author: "A".into(),
            license: "CC0".into(),
            ..Default::default()
        };
        let list = lic.to_string_list();
        assert_eq!(list, vec!["author", "A", "license", "CC0"]);
        assert_eq!(AssetLicense::from_string_list(&list), lic);
    }

    #[test]
    fn test_from_string_list_ignores_odd_tail() {
        let lic = AssetLicense::from_string_list(&["homepage", "h", "author"]);
        assert_eq!(lic.homepage, "h");
        assert!(lic.author.is_empty());
    }
}
