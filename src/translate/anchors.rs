use std::ops::Range;

/// Characters that only occur in Vietnamese text among the supported inputs.
const VIETNAMESE_CHARS: &str = "àáạảãâầấậẩẫăằắặẳẵèéẹẻẽêềếệểễìíịỉĩòóọỏõôồốộổỗơờớợởỡùúụủũưừứựửữỳýỵỷỹđ\
ÀÁẠẢÃÂẦẤẬẨẪĂẰẮẶẲẴÈÉẸẺẼÊỀẾỆỂỄÌÍỊỈĨÒÓỌỎÕÔỒỐỘỔỖƠỜỚỢỞỠÙÚỤỦŨƯỪỨỰỬỮỲÝỴỶỸĐ";

/// A curated keyword found in the source query.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordAnchor {
    pub source: String,
    pub target: String,
    /// Byte span within the lowercased query
    pub span: Range<usize>,
}

/// Find every keyword occurrence in `query_lower`, longest phrases first.
/// An occurrence overlapping a span already claimed by a longer phrase is
/// skipped, so nested phrases never produce a second anchor.
pub fn find_anchors(query_lower: &str, keywords: &[(String, String)]) -> Vec<KeywordAnchor> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut anchors = Vec::new();

    for (source, target) in keywords {
        for (start, matched) in query_lower.match_indices(source.as_str()) {
            let span = start..start + matched.len();
            if claimed
                .iter()
                .any(|c| c.start < span.end && span.start < c.end)
            {
                continue;
            }
            claimed.push(span.clone());
            anchors.push(KeywordAnchor {
                source: source.clone(),
                target: target.clone(),
                span,
            });
        }
    }

    anchors
}

/// Anchor targets absent from `translated`, deduplicated case-insensitively
/// in discovery order.
pub fn missing_anchors(anchors: &[KeywordAnchor], translated: &str) -> Vec<String> {
    let translated_lower = translated.to_lowercase();
    let mut missing: Vec<String> = Vec::new();

    for anchor in anchors {
        let target_lower = anchor.target.to_lowercase();
        if translated_lower.contains(&target_lower) {
            continue;
        }
        if missing.iter().any(|m| m.to_lowercase() == target_lower) {
            continue;
        }
        missing.push(anchor.target.clone());
    }

    missing
}

/// `"<translated>, a1, a2"`, or the translation unchanged without anchors.
pub fn merge(translated: &str, anchors: &[String]) -> String {
    if anchors.is_empty() {
        translated.to_string()
    } else {
        format!("{translated}, {}", anchors.join(", "))
    }
}

/// Share of Vietnamese-only characters in `text`.
pub fn vietnamese_density(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let viet = text.chars().filter(|c| VIETNAMESE_CHARS.contains(*c)).count();
    viet as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_nested_phrase_emits_once() {
        let kw = keywords(&[("màu xanh lá", "green"), ("xanh lá", "green")]);
        let anchors = find_anchors("xe màu xanh lá", &kw);
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].source, "màu xanh lá");

        let missing = missing_anchors(&anchors, "car with leaves");
        assert_eq!(missing, vec!["green".to_string()]);
    }

    #[test]
    fn test_repeated_term_matches_every_occurrence() {
        let kw = keywords(&[("cháy", "fire")]);
        let anchors = find_anchors("cháy nhà cháy xe", &kw);
        assert_eq!(anchors.len(), 2);
        // Same target only emitted once
        assert_eq!(missing_anchors(&anchors, "house"), vec!["fire".to_string()]);
    }

    #[test]
    fn test_target_already_translated_is_not_missing() {
        let kw = keywords(&[("xe buýt", "bus")]);
        let anchors = find_anchors("xe buýt màu vàng", &kw);
        assert!(missing_anchors(&anchors, "Yellow BUS").is_empty());
    }

    #[test]
    fn test_merge() {
        assert_eq!(merge("a car", &[]), "a car");
        assert_eq!(
            merge("a car", &["green".to_string(), "smoke".to_string()]),
            "a car, green, smoke"
        );
    }

    #[test]
    fn test_density() {
        assert_eq!(vietnamese_density(""), 0.0);
        assert_eq!(vietnamese_density("a man walking"), 0.0);
        assert!(vietnamese_density("người đàn ông") > 0.05);
    }
}
