//! HTML extraction helpers shared by the validator and the article crawl.

use scraper::{Html, Selector};

/// Extract the document title, trimmed, if present and non-empty.
pub fn extract_title(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("title").expect("static selector");
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract every href from anchor tags, in document order.
pub fn extract_links(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("a[href]").expect("static selector");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| href.to_string())
        .collect()
}

/// Whether a link path looks like an article rather than navigation:
/// a dated path segment or a long hyphenated final segment.
pub fn is_article_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments
        .iter()
        .any(|s| s.len() == 4 && s.starts_with("20") && s.chars().all(|c| c.is_ascii_digit()))
    {
        return true;
    }
    segments
        .last()
        .map(|last| last.matches('-').count() >= 3)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><title> France news </title></head></html>"),
            Some("France news".to_string())
        );
        assert_eq!(extract_title("<html><head></head></html>"), None);
    }

    #[test]
    fn test_extract_links_in_order() {
        let body = r#"<a href="/one">1</a><p><a href="/two">2</a></p>"#;
        assert_eq!(extract_links(body), vec!["/one", "/two"]);
    }

    #[test]
    fn test_is_article_path() {
        assert!(is_article_path("/world/2024/some-story"));
        assert!(is_article_path("/news/a-very-long-hyphenated-headline"));
        assert!(!is_article_path("/world"));
        assert!(!is_article_path("/world/france"));
    }
}
