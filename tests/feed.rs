use assert_matches::assert_matches;

use arxiv_watch::error::WatchError;
use arxiv_watch::feed::parse_atom_feed;

const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=cat:cs.AI</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2406.01234v2</id>
    <published>2024-06-03T17:59:59Z</published>
    <title>Planning with
      Language   Models</title>
    <summary>  We study planning &amp; acting.  </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2406.01234v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2406.01234v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/hep-th/9901001v1</id>
    <published>2024-06-02T08:00:00Z</published>
    <title>Legacy identifier</title>
    <summary>Old style.</summary>
    <author><name>Grace Hopper</name></author>
  </entry>
  <entry>
    <id>not an arxiv id</id>
    <published>2024-06-01T08:00:00Z</published>
    <title>Broken</title>
    <summary>Skipped.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2406.09999v1</id>
    <published>yesterday</published>
    <title>Bad date</title>
    <summary>Skipped too.</summary>
  </entry>
</feed>"#;

#[test]
fn parses_entries_and_skips_malformed_ones() {
    let items = parse_atom_feed(SAMPLE_FEED, "cat:cs.AI").unwrap();
    assert_eq!(items.len(), 2);

    let first = &items[0];
    assert_eq!(first.id.as_str(), "2406.01234");
    assert_eq!(first.title, "Planning with Language Models");
    assert_eq!(first.summary, "We study planning & acting.");
    assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
    assert_eq!(first.categories, vec!["cs.AI", "cs.LG"]);
    assert_eq!(first.asset_url, "http://arxiv.org/pdf/2406.01234v2");
    assert_eq!(first.origin_query, "cat:cs.AI");
    assert_eq!(first.published.to_rfc3339(), "2024-06-03T17:59:59+00:00");
}

#[test]
fn missing_pdf_link_falls_back_to_canonical_url() {
    let items = parse_atom_feed(SAMPLE_FEED, "cat:cs.AI").unwrap();
    let legacy = &items[1];
    assert_eq!(legacy.id.as_str(), "hep-th/9901001");
    assert_eq!(legacy.asset_url, "https://arxiv.org/pdf/hep-th/9901001.pdf");
    assert!(legacy.categories.is_empty());
}

#[test]
fn empty_feed_yields_no_items() {
    let xml = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
    assert!(parse_atom_feed(xml, "all:nothing").unwrap().is_empty());
}

#[test]
fn broken_document_is_an_error() {
    let xml = "<feed><entry><id>http://arxiv.org/abs/2406.01234</id></feed>";
    assert_matches!(parse_atom_feed(xml, "q"), Err(WatchError::FeedParse(_)));
}

#[test]
fn unknown_entity_skips_only_that_entry() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2406.00001v1</id>
    <published>2024-06-03T10:00:00Z</published>
    <title>Broken &nbsp; entity</title>
    <summary>Cannot be decoded.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2406.00002v1</id>
    <published>2024-06-03T11:00:00Z</published>
    <title>Clean title</title>
    <summary>Fine.</summary>
  </entry>
</feed>"#;

    let items = parse_atom_feed(xml, "cat:cs.AI").unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_str(), "2406.00002");
}
