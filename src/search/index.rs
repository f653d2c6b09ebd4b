//! tantivy index with the `case_insensitive` n-gram analyzer.

use super::SearchSettings;
use crate::entity::Profile;
use crate::error::AppError;
use std::cmp::Ordering;
use std::sync::Mutex;
use tantivy::collector::DocSetCollector;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, INDEXED, STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use uuid::Uuid;

pub const ANALYZER: &str = "case_insensitive";

/// Per-thread writer memory; tantivy requires at least 15 MB per indexing thread.
const WRITER_BUDGET_PER_THREAD: usize = 16_000_000;

#[derive(Clone, Debug)]
pub enum IndexOp {
    Upsert(Profile),
    Remove(Uuid),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermField {
    Name,
    Email,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexSort {
    Id,
    Name,
    Experience,
}

/// A query the index can answer on its own. Every term is a single gram within the
/// analyzer's bounds; all clauses must match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexQuery {
    pub terms: Vec<(TermField, String)>,
    pub experience: Option<i64>,
    pub sort: Vec<(IndexSort, bool)>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexHits {
    /// Matching ids in sort order, paged.
    pub ids: Vec<String>,
    /// Matches before paging.
    pub total: usize,
}

#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    name: Field,
    email: Field,
    sort_name: Field,
    sort_experience: Field,
}

pub struct ProfileIndex {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: Fields,
}

struct Hit {
    id: String,
    name: String,
    experience: i64,
}

impl ProfileIndex {
    /// In-RAM index; the persistence store is the source of truth and the index is rebuilt on startup.
    pub fn open(settings: &SearchSettings) -> Result<Self, AppError> {
        let mut builder = Schema::builder();
        let analyzed = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(ANALYZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();
        let fields = Fields {
            id: builder.add_text_field("id", STRING | STORED),
            name: builder.add_text_field("name", analyzed.clone()),
            email: builder.add_text_field("email", analyzed),
            sort_name: builder.add_text_field("sortName", STRING | STORED),
            sort_experience: builder.add_i64_field("sortExperience", INDEXED | STORED),
        };
        let index = Index::create_in_ram(builder.build());

        let tokenizer = NgramTokenizer::new(settings.min_gram, settings.max_gram, false)?;
        let analyzer = TextAnalyzer::builder(tokenizer).filter(LowerCaser).build();
        index.tokenizers().register(ANALYZER, analyzer);

        let workers = settings.workers.max(1);
        let writer: IndexWriter = index.writer_with_num_threads(workers, workers * WRITER_BUDGET_PER_THREAD)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(ProfileIndex {
            reader,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Apply a batch, commit, and make it visible to searchers. Blocking.
    pub fn apply(&self, ops: Vec<IndexOp>) -> Result<(), AppError> {
        let f = self.fields;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AppError::Search("index writer poisoned".into()))?;
        for op in ops {
            match op {
                IndexOp::Upsert(p) => {
                    let id = p.id.to_string();
                    writer.delete_term(Term::from_field_text(f.id, &id));
                    writer.add_document(doc!(
                        f.id => id,
                        f.name => p.name.clone(),
                        f.email => p.email,
                        f.sort_name => p.name,
                        f.sort_experience => i64::from(p.experience)
                    ))?;
                }
                IndexOp::Remove(id) => {
                    writer.delete_term(Term::from_field_text(f.id, &id.to_string()));
                }
            }
        }
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn search(&self, q: &IndexQuery) -> Result<IndexHits, AppError> {
        let f = self.fields;
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, gram) in &q.terms {
            let field = match field {
                TermField::Name => f.name,
                TermField::Email => f.email,
            };
            let term = Term::from_field_text(field, &gram.to_lowercase());
            clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
        }
        if let Some(exp) = q.experience {
            let term = Term::from_field_i64(f.sort_experience, exp);
            clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
        }
        let query: Box<dyn Query> = if clauses.is_empty() {
            Box::new(AllQuery)
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        let searcher = self.reader.searcher();
        let addresses = searcher.search(query.as_ref(), &DocSetCollector)?;
        let mut hits = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let d: TantivyDocument = searcher.doc(addr)?;
            let text = |field: Field| {
                d.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            hits.push(Hit {
                id: text(f.id),
                name: text(f.sort_name),
                experience: d.get_first(f.sort_experience).and_then(|v| v.as_i64()).unwrap_or_default(),
            });
        }

        hits.sort_by(|a, b| {
            for (key, descending) in &q.sort {
                let ord = match key {
                    IndexSort::Id => a.id.cmp(&b.id),
                    IndexSort::Name => a.name.cmp(&b.name),
                    IndexSort::Experience => a.experience.cmp(&b.experience),
                };
                let ord = if *descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });

        let total = hits.len();
        let ids = hits
            .into_iter()
            .skip(q.offset)
            .take(q.limit)
            .map(|h| h.id)
            .collect();
        Ok(IndexHits { ids, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, email: &str, experience: i32) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            experience,
            github: None,
            linked_in: None,
            stack_overflow: None,
        }
    }

    fn query(terms: Vec<(TermField, &str)>) -> IndexQuery {
        IndexQuery {
            terms: terms.into_iter().map(|(f, s)| (f, s.to_string())).collect(),
            limit: 100,
            ..Default::default()
        }
    }

    #[test]
    fn substring_search_is_case_insensitive() {
        let index = ProfileIndex::open(&SearchSettings::default()).unwrap();
        let ada = profile("Ada Lovelace", "ada@example.com", 10);
        let grace = profile("Grace Hopper", "grace@navy.mil", 30);
        index
            .apply(vec![IndexOp::Upsert(ada.clone()), IndexOp::Upsert(grace.clone())])
            .unwrap();

        let hits = index.search(&query(vec![(TermField::Name, "LOVE")])).unwrap();
        assert_eq!(hits.ids, vec![ada.id.to_string()]);

        let hits = index.search(&query(vec![(TermField::Email, "navy")])).unwrap();
        assert_eq!(hits.ids, vec![grace.id.to_string()]);
        assert_eq!(index.num_docs(), 2);
    }

    #[test]
    fn upsert_replaces_and_remove_deletes() {
        let index = ProfileIndex::open(&SearchSettings::default()).unwrap();
        let mut p = profile("Linus", "linus@kernel.org", 5);
        index.apply(vec![IndexOp::Upsert(p.clone())]).unwrap();
        p.name = "Torvalds".into();
        index.apply(vec![IndexOp::Upsert(p.clone())]).unwrap();

        assert!(index.search(&query(vec![(TermField::Name, "lin")])).unwrap().ids.is_empty());
        assert_eq!(index.search(&query(vec![(TermField::Name, "valds")])).unwrap().total, 1);

        index.apply(vec![IndexOp::Remove(p.id)]).unwrap();
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn sorts_by_experience_then_pages() {
        let index = ProfileIndex::open(&SearchSettings::default()).unwrap();
        let ops = [("Anna", 3), ("Annabel", 9), ("Joanna", 6)]
            .into_iter()
            .map(|(n, e)| IndexOp::Upsert(profile(n, "x@y.z", e)))
            .collect();
        index.apply(ops).unwrap();

        let mut q = query(vec![(TermField::Name, "ann")]);
        q.sort = vec![(IndexSort::Experience, true)];
        q.limit = 2;
        let hits = index.search(&q).unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(hits.ids.len(), 2);

        q.offset = 2;
        let tail = index.search(&q).unwrap();
        assert_eq!(tail.ids.len(), 1);
        assert!(!hits.ids.contains(&tail.ids[0]));
    }

    #[test]
    fn filters_on_exact_experience() {
        let index = ProfileIndex::open(&SearchSettings::default()).unwrap();
        let senior = profile("Senior", "s@x.io", 20);
        index
            .apply(vec![IndexOp::Upsert(senior.clone()), IndexOp::Upsert(profile("Junior", "j@x.io", 1))])
            .unwrap();
        let q = IndexQuery { experience: Some(20), limit: 10, ..Default::default() };
        assert_eq!(index.search(&q).unwrap().ids, vec![senior.id.to_string()]);
    }
}
