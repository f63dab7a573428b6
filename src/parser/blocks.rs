use ego_tree::iter::Edge;
use ego_tree::NodeId;
use scraper::node::Node;
use scraper::{ElementRef, Html};

use super::extract::FieldKind;

/// One positional unit of a page. `group` identifies the container the block
/// was found in; blocks sharing a group may form a single contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub group: usize,
    pub kind: BlockKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Text(String),
    Mailto { address: String, label: String },
    Tel { number: String },
    Labeled { field: FieldKind, text: String },
}

const SKIPPED: &[&str] = &["head", "script", "style", "noscript", "template", "svg", "iframe"];

const CONTAINERS: &[&str] = &[
    "body", "div", "section", "article", "aside", "header", "footer", "main", "nav",
    "address", "li", "ul", "ol", "dl", "form", "fieldset", "figure", "blockquote", "tr",
];

const LINE_BREAKS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "dt", "dd", "pre", "td", "th", "caption",
    "figcaption", "label", "hr", "option",
];

/// Labeled elements with more text than this are walked as plain content.
const MAX_LABELED_TEXT: usize = 200;

pub fn classify_html(html: &str) -> Vec<Block> {
    if html.trim().is_empty() {
        return Vec::new();
    }

    let document = Html::parse_document(html);
    let mut walker = Walker::default();
    walker.walk(document.root_element());
    walker.flush();
    walker.blocks
}

/// Rows of the table being walked and the field each column holds.
struct TableCtx {
    id: NodeId,
    header: Option<NodeId>,
    columns: Vec<Option<FieldKind>>,
}

impl TableCtx {
    fn new(table: ElementRef) -> Self {
        let rows = table_rows(table);
        let columns: Vec<Option<FieldKind>> = rows
            .first()
            .map(|first| {
                row_cells(*first)
                    .into_iter()
                    .map(|cell| header_field(&element_text(cell)))
                    .collect()
            })
            .unwrap_or_default();
        let header = rows
            .first()
            .filter(|_| columns.iter().any(Option::is_some))
            .map(|row| row.id());
        TableCtx {
            id: table.id(),
            header,
            columns,
        }
    }
}

/// Walks the tree with an explicit open/close traversal, so nesting depth
/// costs heap, not stack.
#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    group: usize,
    next_group: usize,
    line: String,
    /// Subtree whose content is already emitted or ignored.
    skip: Option<NodeId>,
    tables: Vec<TableCtx>,
}

impl Walker {
    fn open_group(&mut self) {
        self.flush();
        self.next_group += 1;
        self.group = self.next_group;
    }

    /// Push buffered text as one Text block per non-empty line.
    fn flush(&mut self) {
        for line in self.line.lines() {
            let text = collapse_whitespace(line);
            if !text.is_empty() {
                self.blocks.push(Block {
                    group: self.group,
                    kind: BlockKind::Text(text),
                });
            }
        }
        self.line.clear();
    }

    fn push(&mut self, kind: BlockKind) {
        self.flush();
        self.blocks.push(Block {
            group: self.group,
            kind,
        });
    }

    fn walk(&mut self, root: ElementRef) {
        for edge in root.traverse() {
            match edge {
                Edge::Open(node) => {
                    if self.skip.is_some() {
                        continue;
                    }
                    match node.value() {
                        Node::Text(text) => self.line.push_str(&text),
                        Node::Element(_) => {
                            if let Some(el) = ElementRef::wrap(node) {
                                if !self.open(el) {
                                    self.skip = Some(node.id());
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Edge::Close(node) => {
                    if self.skip == Some(node.id()) {
                        self.skip = None;
                    } else if self.skip.is_none() {
                        if let Some(el) = ElementRef::wrap(node) {
                            self.close(el);
                        }
                    }
                }
            }
        }
    }

    /// Handle an opening tag. Returns false when the children must not be walked.
    fn open(&mut self, el: ElementRef) -> bool {
        let name = el.value().name();

        if SKIPPED.contains(&name) {
            return false;
        }
        if name == "br" {
            self.line.push('\n');
            return false;
        }
        if name == "a" && self.anchor(el) {
            return false;
        }
        if name == "table" {
            self.open_group();
            self.tables.push(TableCtx::new(el));
            return true;
        }
        if name == "tr" && self.tables.last().and_then(|t| t.header) == Some(el.id()) {
            return false;
        }
        if matches!(name, "td" | "th") {
            if let Some(field) = self.cell_field(el) {
                let text = element_text(el);
                if !text.is_empty() {
                    self.push(BlockKind::Labeled { field, text });
                }
                return false;
            }
        }
        if let Some(field) = semantic_field(el).filter(|_| !matches!(name, "html" | "body" | "main")) {
            if is_leaf_like(el) {
                let text = element_text(el);
                if !text.is_empty() && text.chars().count() <= MAX_LABELED_TEXT {
                    self.push(BlockKind::Labeled { field, text });
                    return false;
                }
            }
        }

        if CONTAINERS.contains(&name) {
            self.open_group();
        } else if LINE_BREAKS.contains(&name) {
            self.line.push('\n');
        }
        true
    }

    fn close(&mut self, el: ElementRef) {
        let name = el.value().name();
        if name == "table" {
            self.tables.pop();
            self.open_group();
        } else if CONTAINERS.contains(&name) {
            self.open_group();
        } else if LINE_BREAKS.contains(&name) {
            self.line.push('\n');
        }
    }

    /// Emit mailto:/tel: anchors as dedicated blocks. Returns false for other links.
    fn anchor(&mut self, el: ElementRef) -> bool {
        let Some(href) = el.value().attr("href") else {
            return false;
        };
        let href = href.trim();

        if let Some(rest) = strip_scheme(href, "mailto:") {
            let address = rest.split('?').next().unwrap_or("").trim().to_string();
            if address.is_empty() {
                return false;
            }
            let label = element_text(el);
            self.push(BlockKind::Mailto { address, label });
            return true;
        }

        if let Some(rest) = strip_scheme(href, "tel:") {
            let number = rest.trim().to_string();
            if number.is_empty() {
                return false;
            }
            self.push(BlockKind::Tel { number });
            return true;
        }

        false
    }

    /// Field of a body cell in a column with a recognized header.
    fn cell_field(&self, cell: ElementRef) -> Option<FieldKind> {
        let table = self.tables.last()?;
        table.header?;
        let row = cell.parent()?;
        let section = row.parent()?;
        let owner = if section.id() == table.id {
            section
        } else {
            section.parent()?
        };
        if owner.id() != table.id {
            return None;
        }
        let idx = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .position(|el| el.id() == cell.id())?;
        table.columns.get(idx).copied().flatten()
    }
}

fn strip_scheme<'a>(href: &'a str, scheme: &str) -> Option<&'a str> {
    let head = href.get(..scheme.len())?;
    if head.eq_ignore_ascii_case(scheme) {
        Some(&href[scheme.len()..])
    } else {
        None
    }
}

/// Direct rows of a table, looking through thead/tbody/tfoot but not into nested tables.
fn table_rows(table: ElementRef) -> Vec<ElementRef> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| el.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn row_cells(row: ElementRef) -> Vec<ElementRef> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .collect()
}

/// Map a table header cell to the field its column holds.
fn header_field(header: &str) -> Option<FieldKind> {
    let h = header.to_lowercase();
    if h.contains("email") || h.contains("e-mail") || h.contains("mail") {
        Some(FieldKind::Email)
    } else if h.contains("phone") || h.contains("tel") || h.contains("mobile") {
        Some(FieldKind::Phone)
    } else if h.contains("name") || h.contains("contact") || h.contains("person") {
        Some(FieldKind::Name)
    } else {
        None
    }
}

/// Field named by an element's class or id, e.g. `class="contact-email"`.
fn semantic_field(el: ElementRef) -> Option<FieldKind> {
    let value = el.value();
    value
        .classes()
        .chain(value.id())
        .find_map(|token| token_field(&token.to_lowercase()))
}

/// True when the element holds only inline text, so its whole text is one value.
fn is_leaf_like(el: ElementRef) -> bool {
    !el.descendants().skip(1).filter_map(ElementRef::wrap).any(|d| {
        let name = d.value().name();
        matches!(name, "a" | "table") || CONTAINERS.contains(&name) || LINE_BREAKS.contains(&name)
    })
}

const NOT_PERSON_NAMES: &[&str] = &[
    "username", "filename", "hostname", "pathname", "classname", "company", "org", "brand",
    "site", "product", "domain",
];

fn token_field(token: &str) -> Option<FieldKind> {
    if token.contains("email") || token.contains("e-mail") {
        return Some(FieldKind::Email);
    }
    if token.contains("phone")
        || token.contains("mobile")
        || token == "tel"
        || token.starts_with("tel-")
        || token.starts_with("tel_")
        || token.ends_with("-tel")
        || token.ends_with("_tel")
    {
        return Some(FieldKind::Phone);
    }
    if token.contains("name") && !NOT_PERSON_NAMES.iter().any(|n| token.contains(n)) {
        return Some(FieldKind::Name);
    }
    None
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(blocks: &[Block]) -> Vec<&str> {
        blocks
            .iter()
            .filter_map(|b| match &b.kind {
                BlockKind::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn empty_input() {
        assert!(classify_html("").is_empty());
        assert!(classify_html("   \n ").is_empty());
    }

    #[test]
    fn paragraphs_become_lines() {
        let blocks = classify_html("<p>Hello   there</p><p>second\nline</p>");
        assert_eq!(texts(&blocks), vec!["Hello there", "second", "line"]);
    }

    #[test]
    fn scripts_and_styles_skipped() {
        let html = "<html><head><title>T</title><style>.a{}</style></head>\
                    <body><script>var x = 'a@b.com';</script><p>visible</p></body></html>";
        let blocks = classify_html(html);
        assert_eq!(texts(&blocks), vec!["visible"]);
    }

    #[test]
    fn mailto_anchor() {
        let blocks = classify_html(r#"<p><a href="mailto:Jane@Site.com?subject=hi">Jane Smith</a></p>"#);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(
            &blocks[0].kind,
            BlockKind::Mailto { address, label } if address == "Jane@Site.com" && label == "Jane Smith"
        ));
    }

    #[test]
    fn tel_anchor() {
        let blocks = classify_html(r#"<a href="TEL:+1-555-000-1111">call</a>"#);
        assert!(matches!(&blocks[0].kind, BlockKind::Tel { number } if number == "+1-555-000-1111"));
    }

    #[test]
    fn plain_links_keep_text() {
        let blocks = classify_html(r#"<p>See <a href="/about">about us</a> page</p>"#);
        assert_eq!(texts(&blocks), vec!["See about us page"]);
    }

    #[test]
    fn containers_split_groups() {
        let html = "<ul><li>Name: Ann Lee<br>ann@x.com</li><li>bob@x.com</li></ul>";
        let blocks = classify_html(html);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].group, blocks[1].group);
        assert_ne!(blocks[1].group, blocks[2].group);
    }

    #[test]
    fn line_elements_share_group() {
        let blocks = classify_html("<div><h3>Jane</h3><p>jane@x.com</p></div>");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].group, blocks[1].group);
    }

    #[test]
    fn table_with_header() {
        let html = "<table>\
            <tr><th>Full Name</th><th>E-mail</th><th>Telephone</th><th>Notes</th></tr>\
            <tr><td>Ann Lee</td><td>ann@x.com</td><td>555 123 4567</td><td>VIP</td></tr>\
            <tr><td>Bob Stone</td><td>bob@x.com</td><td></td><td></td></tr>\
            </table>";
        let blocks = classify_html(html);
        let labeled: Vec<_> = blocks
            .iter()
            .filter_map(|b| match &b.kind {
                BlockKind::Labeled { field, text } => Some((b.group, *field, text.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(labeled.len(), 5);
        assert_eq!(labeled[0].1, FieldKind::Name);
        assert_eq!(labeled[0].2, "Ann Lee");
        assert_eq!(labeled[1].1, FieldKind::Email);
        assert_eq!(labeled[2].1, FieldKind::Phone);
        assert_eq!(labeled[0].0, labeled[2].0);
        assert_ne!(labeled[2].0, labeled[3].0);
        assert!(texts(&blocks).contains(&"VIP"));
        assert!(!texts(&blocks).contains(&"Full Name"));
    }

    #[test]
    fn table_without_header_is_text() {
        let html = "<table><tr><td>Ann Lee</td><td>ann@x.com</td></tr></table>";
        let blocks = classify_html(html);
        assert_eq!(texts(&blocks), vec!["Ann Lee", "ann@x.com"]);
    }

    #[test]
    fn semantic_classes() {
        let html = r#"<div class="card">
            <span class="person-name">Ann   Lee</span>
            <span class="contact-email">ann@x.com</span>
            <span id="tel">555 123 4567</span>
            <span class="company-name">Acme</span>
        </div>"#;
        let blocks = classify_html(html);
        let fields: Vec<_> = blocks
            .iter()
            .filter_map(|b| match &b.kind {
                BlockKind::Labeled { field, text } => Some((*field, text.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            vec![
                (FieldKind::Name, "Ann Lee"),
                (FieldKind::Email, "ann@x.com"),
                (FieldKind::Phone, "555 123 4567"),
            ]
        );
        assert!(blocks.iter().all(|b| b.group == blocks[0].group));
        assert!(texts(&blocks).contains(&"Acme"));
    }

    #[test]
    fn labeled_container_walks_its_links() {
        let html = r#"<div class="profile-name"><span>Ann Lee</span> <a href="mailto:ann@x.com">Write to Ann</a> <a href="tel:+15550102000">Call</a></div>"#;
        let blocks = classify_html(html);
        assert!(!blocks.iter().any(|b| matches!(b.kind, BlockKind::Labeled { .. })));
        assert!(blocks.iter().any(
            |b| matches!(&b.kind, BlockKind::Mailto { address, .. } if address == "ann@x.com")
        ));
        assert!(blocks
            .iter()
            .any(|b| matches!(&b.kind, BlockKind::Tel { number } if number == "+15550102000")));
        assert!(texts(&blocks).contains(&"Ann Lee"));
    }

    #[test]
    fn nested_tables_keep_their_own_header() {
        let html = "<table>\
            <tr><th>Name</th><th>Details</th></tr>\
            <tr><td>Ann Lee</td><td><table><tr><td>ann@x.com</td></tr></table></td></tr>\
            </table>";
        let blocks = classify_html(html);
        let labeled: Vec<_> = blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Labeled { .. }))
            .collect();
        assert_eq!(labeled.len(), 1);
        assert_eq!(texts(&blocks), vec!["ann@x.com"]);
    }

    #[test]
    fn deep_nesting_does_not_grow_the_stack() {
        let depth = 10_000;
        let html = format!(
            "{}<p>deep@x.com</p>{}",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let blocks = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || classify_html(&html))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(texts(&blocks), vec!["deep@x.com"]);
    }

    #[test]
    fn team_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/team.html").unwrap();
        let blocks = classify_html(&html);
        assert!(blocks.iter().any(|b| matches!(b.kind, BlockKind::Mailto { .. })));
        assert!(blocks.iter().any(|b| matches!(b.kind, BlockKind::Labeled { .. })));
        assert!(!texts(&blocks).iter().any(|t| t.contains("trackingId")));
    }
}
