pub mod blocks;
pub mod extract;
pub mod normalize;
pub mod records;

use tracing::debug;

use crate::config::ExtractConfig;
use records::ContactRecord;

/// A page handed over by the fetcher: identifier (final URL or file:// path) and its HTML.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub id: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct PageContacts {
    pub source: String,
    pub records: Vec<ContactRecord>,
    pub candidates: usize,
    pub rejected: usize,
}

/// Four-pass pipeline: html → blocks → candidates → canonical fields → records.
pub fn process_page(page: &PageSource, cfg: &ExtractConfig) -> PageContacts {
    let blocks = blocks::classify_html(&page.html);

    let mut candidates = 0;
    let mut rejected = 0;
    let mut fields = Vec::new();
    for candidate in extract::candidates(&blocks, cfg) {
        candidates += 1;
        match normalize::normalize(&candidate, cfg) {
            Ok(field) => fields.push((candidate.locator, field)),
            Err(reason) => {
                rejected += 1;
                debug!(page = %page.id, %reason, "Dropped {:?} candidate", candidate.kind);
            }
        }
    }

    let records = records::build_records(&page.id, fields);
    debug!(
        page = %page.id,
        blocks = blocks.len(),
        candidates,
        rejected,
        records = records.len(),
        "Processed page"
    );

    PageContacts {
        source: page.id.clone(),
        records,
        candidates,
        rejected,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, html: &str) -> PageSource {
        PageSource {
            id: id.to_string(),
            html: html.to_string(),
        }
    }

    fn fixture(name: &str) -> PageSource {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        page(&format!("file://tests/fixtures/{}.html", name), &html)
    }

    #[test]
    fn contact_strip_page() {
        let out = process_page(
            &page("a", "<p>Contact: Jane Smith, jane@site.com, (555) 000-1111</p>"),
            &ExtractConfig::default(),
        );
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert_eq!(r.name.as_deref(), Some("Jane Smith"));
        assert_eq!(r.email.as_deref(), Some("jane@site.com"));
        assert_eq!(r.phone.as_deref(), Some("555 000 1111"));
        assert_eq!(r.source, "a");
    }

    #[test]
    fn empty_page_yields_nothing() {
        let out = process_page(&page("a", ""), &ExtractConfig::default());
        assert!(out.records.is_empty());
        assert_eq!(out.candidates, 0);
    }

    #[test]
    fn rejected_candidates_counted() {
        let cfg = ExtractConfig::default();
        let html = r#"<table><tr><th>Name</th><th>Phone</th></tr>
            <tr><td>R2 D2</td><td>555 123 4567</td></tr></table>"#;
        let out = process_page(&page("a", html), &cfg);
        assert_eq!(out.candidates, 2);
        assert_eq!(out.rejected, 1);
        assert_eq!(out.records.len(), 1);
        assert!(out.records[0].name.is_none());
    }

    #[test]
    fn team_fixture() {
        let out = process_page(&fixture("team"), &ExtractConfig::default());
        let emails: Vec<_> = out.records.iter().filter_map(|r| r.email.as_deref()).collect();
        assert!(emails.contains(&"ann.lee@acme.test"));
        assert!(emails.contains(&"bob@acme.test"));
        assert!(emails.contains(&"press@acme.test"));

        let ann = out
            .records
            .iter()
            .find(|r| r.email.as_deref() == Some("ann.lee@acme.test"))
            .unwrap();
        assert_eq!(ann.name.as_deref(), Some("Ann Lee"));
        assert_eq!(ann.phone.as_deref(), Some("+1 555 010 2000"));

        let bob = out
            .records
            .iter()
            .find(|r| r.email.as_deref() == Some("bob@acme.test"))
            .unwrap();
        assert_eq!(bob.name.as_deref(), Some("Bob Stone"));

        // Script content and footer years never become contacts.
        assert!(out.records.iter().all(|r| r.email.as_deref() != Some("tracker@ads.test")));
        assert!(out.records.iter().all(|r| r.phone.as_deref() != Some("2019 2024")));
    }

    #[test]
    fn named_card_keeps_its_links() {
        let html = r#"<div class="profile-name"><span>Ann Lee</span> <a href="mailto:ann@x.com">Write to Ann</a> <a href="tel:+15550102000">Call</a></div>"#;
        let out = process_page(&page("a", html), &ExtractConfig::default());
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert_eq!(r.email.as_deref(), Some("ann@x.com"));
        assert_eq!(r.phone.as_deref(), Some("+1 555 010 2000"));
        assert!(r.name.is_none());
    }

    #[test]
    fn deeply_nested_page() {
        let depth = 10_000;
        let html = format!(
            "{}<p>deep@x.com</p>{}",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let out = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || process_page(&page("deep", &html), &ExtractConfig::default()))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].email.as_deref(), Some("deep@x.com"));
    }

    #[test]
    fn directory_fixture() {
        let out = process_page(&fixture("directory"), &ExtractConfig::default());
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].name.as_deref(), Some("Carla Diaz"));
        assert_eq!(out.records[0].email.as_deref(), Some("carla@dir.test"));
        assert_eq!(out.records[0].phone.as_deref(), Some("+44 207 946 0000"));
        assert_eq!(out.records[1].name.as_deref(), Some("Dev Patel"));
        assert!(out.records[1].phone.is_none());
        assert_eq!(out.records[2].name.as_deref(), Some("Erin Moss"));
        assert!(out.records[2].email.is_none());
    }
}
