use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::extract::{FieldKind, Locator};
use super::normalize::CanonicalField;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: String,
}

impl ContactRecord {
    pub fn new(source: &str) -> Self {
        ContactRecord {
            source: source.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        [&self.name, &self.email, &self.phone]
            .iter()
            .all(|f| f.as_deref().map_or(true, str::is_empty))
    }

    pub fn get(&self, kind: FieldKind) -> Option<&str> {
        match kind {
            FieldKind::Name => self.name.as_deref(),
            FieldKind::Email => self.email.as_deref(),
            FieldKind::Phone => self.phone.as_deref(),
        }
        .filter(|v| !v.is_empty())
    }

    fn slot_mut(&mut self, kind: FieldKind) -> &mut Option<String> {
        match kind {
            FieldKind::Name => &mut self.name,
            FieldKind::Email => &mut self.email,
            FieldKind::Phone => &mut self.phone,
        }
    }

    /// Fill empty fields from `other`; present values are never overwritten.
    pub fn fill_from(&mut self, other: ContactRecord) {
        let ContactRecord { name, email, phone, .. } = other;
        for (kind, value) in [(FieldKind::Name, name), (FieldKind::Email, email), (FieldKind::Phone, phone)] {
            if self.get(kind).is_none() {
                if let Some(v) = value.filter(|v| !v.is_empty()) {
                    *self.slot_mut(kind) = Some(v);
                }
            }
        }
    }
}

/// Group one page's canonical fields into records.
///
/// Fields of the same container group fill one record in document order; a
/// field whose slot already holds a different value starts the next record.
pub fn build_records(
    source: &str,
    fields: impl IntoIterator<Item = (Locator, CanonicalField)>,
) -> Vec<ContactRecord> {
    let mut builder = Builder {
        source,
        records: Vec::new(),
        seen: HashSet::new(),
        current: ContactRecord::new(source),
    };
    let mut group = None;

    for (locator, field) in fields {
        if group != Some(locator.group) {
            builder.close();
            group = Some(locator.group);
        }

        let kind = field.kind();
        let value = field.into_value();
        match builder.current.get(kind).map(|existing| existing == value) {
            Some(true) => continue,
            Some(false) => builder.close(),
            None => {}
        }
        *builder.current.slot_mut(kind) = Some(value);
    }

    builder.close();
    builder.records
}

struct Builder<'a> {
    source: &'a str,
    records: Vec<ContactRecord>,
    seen: HashSet<(Option<String>, Option<String>, Option<String>)>,
    current: ContactRecord,
}

impl Builder<'_> {
    fn close(&mut self) {
        let record = std::mem::replace(&mut self.current, ContactRecord::new(self.source));
        if record.is_empty() {
            return;
        }
        let key = (record.name.clone(), record.email.clone(), record.phone.clone());
        if self.seen.insert(key) {
            self.records.push(record);
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn at(group: usize, block: usize) -> Locator {
        Locator {
            group,
            block,
            offset: 0,
        }
    }

    fn email(v: &str) -> CanonicalField {
        CanonicalField::Email(v.into())
    }

    fn phone(v: &str) -> CanonicalField {
        CanonicalField::Phone(v.into())
    }

    fn name(v: &str) -> CanonicalField {
        CanonicalField::Name(v.into())
    }

    #[test]
    fn no_fields_no_records() {
        assert!(build_records("p", Vec::new()).is_empty());
    }

    #[test]
    fn one_group_one_record() {
        let records = build_records(
            "https://a.test/",
            vec![
                (at(1, 0), name("Jane Smith")),
                (at(1, 0), email("jane@site.com")),
                (at(1, 1), phone("555 000 1111")),
            ],
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("Jane Smith"));
        assert_eq!(records[0].email.as_deref(), Some("jane@site.com"));
        assert_eq!(records[0].phone.as_deref(), Some("555 000 1111"));
        assert_eq!(records[0].source, "https://a.test/");
    }

    #[test]
    fn groups_split_records() {
        let records = build_records(
            "p",
            vec![(at(1, 0), email("a@x.com")), (at(2, 1), phone("555 000 1111"))],
        );
        assert_eq!(records.len(), 2);
        assert!(records[0].phone.is_none());
        assert!(records[1].email.is_none());
    }

    #[test]
    fn repeated_kind_starts_new_record() {
        let records = build_records(
            "p",
            vec![
                (at(1, 0), name("Ann Lee")),
                (at(1, 0), email("ann@x.com")),
                (at(1, 1), name("Bob Stone")),
                (at(1, 1), email("bob@x.com")),
            ],
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name.as_deref(), Some("Bob Stone"));
        assert_eq!(records[1].email.as_deref(), Some("bob@x.com"));
    }

    #[test]
    fn same_value_repeated_is_ignored() {
        let records = build_records(
            "p",
            vec![
                (at(1, 0), email("a@x.com")),
                (at(1, 1), email("a@x.com")),
                (at(1, 2), phone("555 000 1111")),
            ],
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phone.as_deref(), Some("555 000 1111"));
    }

    #[test]
    fn exact_duplicates_on_page_collapse() {
        let records = build_records(
            "p",
            vec![(at(1, 0), email("a@x.com")), (at(2, 1), email("a@x.com"))],
        );
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn fill_from_keeps_existing() {
        let mut a = ContactRecord {
            email: Some("a@x.com".into()),
            phone: Some(String::new()),
            ..ContactRecord::new("p1")
        };
        a.fill_from(ContactRecord {
            email: Some("other@x.com".into()),
            phone: Some("555 123 4567".into()),
            ..ContactRecord::new("p2")
        });
        assert_eq!(a.email.as_deref(), Some("a@x.com"));
        assert_eq!(a.phone.as_deref(), Some("555 123 4567"));
        assert_eq!(a.source, "p1");
    }
}
