pub use ::url::Url;

/// Append path segments to `base`, percent-encoding each one.
///
/// A trailing empty segment on the base (`http://host/api/`) is dropped
/// first so the result never contains `//`. Returns `None` for URLs that
/// cannot carry a path, such as `mailto:` or `data:` URLs.
pub fn with_segments<'a, I>(base: &Url, segments: I) -> Option<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().ok()?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Some(url)
}

/// Return a copy of `url` with one extra query pair.
pub fn with_query(url: &Url, key: &str, value: &str) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut().append_pair(key, value);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_are_encoded() {
        let base = Url::parse("http://localhost:8080/api/").unwrap();
        let url = with_segments(&base, ["files", "Movie Facts", "titles_movie facts.txt"]).unwrap();

        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/files/Movie%20Facts/titles_movie%20facts.txt"
        );
    }

    #[test]
    fn test_cannot_be_a_base() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(with_segments(&base, ["files"]).is_none());
    }

    #[test]
    fn test_query_pair() {
        let base = Url::parse("http://localhost/files").unwrap();
        let url = with_query(&base, "prefix", "Movie Facts/");
        assert_eq!(url.as_str(), "http://localhost/files?prefix=Movie+Facts%2F");
    }
}
