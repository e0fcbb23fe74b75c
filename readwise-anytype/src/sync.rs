use std::collections::hash_map::Entry;
use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, Local, Utc};
use itertools::Itertools;
use readwise_common::{Book, BookSource};
use tracing::{debug, info, warn};

use crate::anytype::{
    Anytype, AnytypeObject, CreateObjectRequest, ObjectIcon, PropertyValue, UpdateObjectRequest,
    SOURCE_ID_PROPERTY,
};
use crate::templates::{TemplateData, TemplateRenderer};

const BOOK_ICON: &str = "📚";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub object_type: String,
    pub space_id: Option<String>,
    pub book_ids: Vec<i64>,
    pub updated_after: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

#[derive(Debug)]
pub struct SyncedBook {
    pub book_id: i64,
    pub outcome: WriteOutcome,
    pub object: AnytypeObject,
}

#[derive(Debug)]
pub struct SyncReport {
    pub space_id: String,
    pub books: Vec<SyncedBook>,
}

impl SyncReport {
    pub fn count(&self, outcome: WriteOutcome) -> usize {
        self.books.iter().filter(|b| b.outcome == outcome).count()
    }
}

pub struct Syncer<S> {
    source: S,
    anytype: Anytype,
    renderer: TemplateRenderer,
    settings: SyncSettings,
}

impl<S: BookSource> Syncer<S> {
    pub fn new(
        source: S,
        anytype: Anytype,
        renderer: TemplateRenderer,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            anytype,
            renderer,
            settings,
        }
    }

    /// Syncs every selected book into the space, one at a time, stopping at the
    /// first book that cannot be rendered or written.
    pub async fn run(&self) -> anyhow::Result<SyncReport> {
        info!("Starting Readwise sync to Anytype");

        let space_id = self
            .anytype
            .resolve_space_id(self.settings.space_id.as_deref())
            .await
            .context("failed to resolve Anytype space")?;
        info!("Space ID: {}", space_id);

        let books = self
            .source
            .books(self.settings.updated_after)
            .await
            .context("failed to fetch books")?;
        let books = self.select(books);
        info!("Found {} books", books.len());

        let existing = self
            .anytype
            .list_objects(&space_id, &self.settings.object_type)
            .await
            .with_context(|| {
                format!(
                    "failed to list {} objects in space {}",
                    self.settings.object_type, space_id
                )
            })?;
        let mut index = index_by_source_id(&existing);

        let sync_date = Local::now().format("%B %-d, %Y").to_string();
        let mut report = SyncReport {
            space_id: space_id.clone(),
            books: Vec::with_capacity(books.len()),
        };

        for (i, book) in books.iter().enumerate() {
            info!(
                "Processing book {}/{}: {} by {}",
                i + 1,
                books.len(),
                book.title,
                book.author_or_empty()
            );

            let synced = self
                .sync_book(&space_id, book, &sync_date, &mut index)
                .await
                .with_context(|| format!("failed to sync book {:?} ({})", book.title, book.id))?;

            info!(
                "{:?} object: {} (ID: {})",
                synced.outcome, synced.object.name, synced.object.id
            );
            report.books.push(synced);
        }

        Ok(report)
    }

    async fn sync_book(
        &self,
        space_id: &str,
        book: &Book,
        sync_date: &str,
        index: &mut HashMap<String, String>,
    ) -> anyhow::Result<SyncedBook> {
        let highlights = match self.source.highlights(book.id).await {
            Ok(highlights) => highlights,
            Err(e) => {
                warn!("Failed to fetch highlights for book {}: {}", book.title, e);
                vec![]
            }
        };
        info!("Found {} highlights", highlights.len());

        let body = self
            .renderer
            .render(&TemplateData {
                book,
                highlights: &highlights,
                sync_date,
            })
            .context("failed to render template")?;

        let name = object_name(book);
        let source_id = book.id.to_string();

        let (outcome, object) = match index.get(&source_id).cloned() {
            Some(object_id) => {
                debug!("Found a matching object for {}: {}", book.title, object_id);
                let request = UpdateObjectRequest { name, body };
                let object = self
                    .anytype
                    .update_object(space_id, &object_id, &request)
                    .await
                    .with_context(|| format!("failed to update object {}", object_id))?;
                (WriteOutcome::Updated, object)
            }
            None => {
                let request = CreateObjectRequest {
                    name,
                    type_key: self.settings.object_type.to_lowercase(),
                    body,
                    icon: Some(ObjectIcon::emoji(BOOK_ICON)),
                    properties: vec![PropertyValue {
                        key: SOURCE_ID_PROPERTY.to_string(),
                        text: source_id.clone(),
                    }],
                };
                let object = self
                    .anytype
                    .create_object(space_id, &request)
                    .await
                    .context("failed to create object")?;
                index.insert(source_id, object.id.clone());
                (WriteOutcome::Created, object)
            }
        };

        Ok(SyncedBook {
            book_id: book.id,
            outcome,
            object,
        })
    }

    fn select(&self, books: Vec<Book>) -> Vec<Book> {
        let wanted = &self.settings.book_ids;
        if wanted.is_empty() {
            return books;
        }

        let selected = books
            .into_iter()
            .filter(|b| wanted.contains(&b.id))
            .collect_vec();

        for id in wanted {
            if !selected.iter().any(|b| b.id == *id) {
                warn!("Book {} was not returned by Readwise", id);
            }
        }

        selected
    }
}

/// Name given to the object synced from `book`.
pub fn object_name(book: &Book) -> String {
    format!("{} - {} [SYNC]", book.title, book.author_or_empty())
}

/// Maps Readwise book ids to the object already holding them. When several objects
/// claim the same book, the first one listed wins.
fn index_by_source_id(objects: &[AnytypeObject]) -> HashMap<String, String> {
    let mut index = HashMap::new();

    for object in objects {
        let Some(source_id) = object.source_id() else {
            continue;
        };

        match index.entry(source_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(object.id.clone());
            }
            Entry::Occupied(entry) => {
                warn!(
                    "Objects {} and {} both hold book {}; updating {}",
                    entry.get(),
                    object.id,
                    source_id,
                    entry.get()
                );
            }
        }
    }

    index
}
