//! Publish stage: records the bundle in the knowledge base and links it from
//! the hub page.

use tracing::{debug, info, instrument, warn};

use weeklypack_artifacts::{ArtifactKind, ArtifactStore};
use weeklypack_knowledge::{
    Block, FieldKind, KnowledgeBase, KnowledgeBaseSchema, Properties, PropertyValue,
    find_title_field, paragraphs,
};
use weeklypack_shared::{MetadataRecord, PeriodKey, PublishLinksRecord, Result, WeeklyPackError};

use crate::pipeline::StageReporter;

/// Value written to the optional status field.
pub const PUBLISHED_STATUS: &str = "Published";

/// Where to publish.
#[derive(Debug, Clone)]
pub struct PublishTarget<'a> {
    pub database_id: &'a str,
    pub hub_page_id: &'a str,
    /// `owner/repo` for raw-file links when no storage links exist.
    pub repository: Option<&'a str>,
    pub branch: &'a str,
}

/// Links to the two documents, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentLinks {
    pub primary_url: String,
    pub rendered_url: String,
}

/// Raw-file URL for a file committed under `packs/<token>/`.
pub fn repository_file_url(repository: &str, branch: &str, key: &PeriodKey, file: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{repository}/{branch}/packs/{}/{file}",
        key.token()
    )
}

/// Storage links if the upload stage ran, else repository links, else empty.
pub fn resolve_document_links(
    store: &ArtifactStore,
    key: &PeriodKey,
    meta: &MetadataRecord,
    target: &PublishTarget<'_>,
) -> Result<DocumentLinks> {
    if let Some(links) = store.read_storage_links(key)? {
        return Ok(DocumentLinks {
            primary_url: links.primary_url,
            rendered_url: links.rendered_url,
        });
    }

    Ok(match target.repository {
        Some(repo) => DocumentLinks {
            primary_url: repository_file_url(repo, target.branch, key, &meta.primary_filename),
            rendered_url: repository_file_url(repo, target.branch, key, &meta.rendered_filename),
        },
        None => DocumentLinks::default(),
    })
}

/// Optional properties the schema declares with exactly the expected kind.
pub fn optional_properties(schema: &KnowledgeBaseSchema, key: &PeriodKey) -> Properties {
    let wanted = [
        (
            "Status",
            FieldKind::Select,
            PropertyValue::Select(PUBLISHED_STATUS.into()),
        ),
        ("Week", FieldKind::Number, PropertyValue::Number(i64::from(key.period))),
        ("Year", FieldKind::Number, PropertyValue::Number(i64::from(key.year))),
    ];

    wanted
        .into_iter()
        .filter_map(|(name, kind, value)| {
            if schema.declares(name, &kind) {
                Some((name.to_string(), value))
            } else {
                debug!(field = name, declared = ?schema.kind_of(name), "skipping optional field");
                None
            }
        })
        .collect()
}

/// The title shaped for the discovered field's declared kind.
fn title_value(schema: &KnowledgeBaseSchema, field: &str, title: &str) -> Result<PropertyValue> {
    let kind = schema.kind_of(field).cloned().unwrap_or(FieldKind::Title);
    PropertyValue::text_for(&kind, title).ok_or_else(|| {
        WeeklyPackError::KnowledgeBase(format!(
            "field '{field}' is {kind:?} and cannot hold the record title"
        ))
    })
}

/// Hub-page blocks announcing a period.
pub fn hub_blocks(key: &PeriodKey, links: &DocumentLinks) -> Vec<Block> {
    vec![
        Block::Heading2(format!("Week {:02} ({})", key.period, key.year)),
        Block::BulletedLink {
            text: "PDF pack".into(),
            url: links.rendered_url.clone(),
        },
        Block::BulletedLink {
            text: "Markdown pack".into(),
            url: links.primary_url.clone(),
        },
    ]
}

/// Create the period's record and append its links to the hub page.
#[instrument(skip_all, fields(period = %key))]
pub async fn publish_to_knowledge_base(
    store: &ArtifactStore,
    key: &PeriodKey,
    target: &PublishTarget<'_>,
    kb: &dyn KnowledgeBase,
    progress: &dyn StageReporter,
) -> Result<PublishLinksRecord> {
    let meta = store.read_metadata(key)?;
    let article = store.require_text(key, ArtifactKind::Article)?;
    let links = resolve_document_links(store, key, &meta, target)?;

    progress.phase("Reading database schema");
    let schema = kb.get_schema(target.database_id).await?;
    let title_field = find_title_field(&schema)?;
    debug!(field = %title_field.name, resolution = ?title_field.resolution, "title field");
    let title = title_value(&schema, &title_field.name, &meta.title)?;

    progress.phase("Creating record");
    let record = kb
        .create_record(
            target.database_id,
            &[(title_field.name.clone(), title)],
            &paragraphs(&article),
        )
        .await?;

    let extra = optional_properties(&schema, key);
    if !extra.is_empty() {
        if let Err(e) = kb.update_record(&record.id, &extra).await {
            warn!(error = %e, record = %record.id, "optional properties not set");
        }
    }

    progress.phase("Updating hub page");
    kb.append_blocks(target.hub_page_id, &hub_blocks(key, &links))
        .await?;

    let published = PublishLinksRecord {
        article_url: record.url,
    };
    store.put_json(key, ArtifactKind::PublishLinks, &published)?;

    info!(url = %published.article_url, "published");
    Ok(published)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use weeklypack_knowledge::RecordRef;
    use weeklypack_shared::StorageLinksRecord;

    use super::*;
    use crate::pipeline::SilentProgress;

    #[derive(Default)]
    struct FakeKb {
        schema: Vec<(String, FieldKind)>,
        fail_update: bool,
        created: Mutex<Vec<(Properties, usize)>>,
        updated: Mutex<Vec<Properties>>,
        appended: Mutex<Vec<(String, Vec<Block>)>>,
    }

    impl FakeKb {
        fn with_schema(fields: &[(&str, FieldKind)]) -> Self {
            Self {
                schema: fields.iter().map(|(n, k)| (n.to_string(), k.clone())).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl KnowledgeBase for FakeKb {
        async fn get_schema(&self, _database_id: &str) -> Result<KnowledgeBaseSchema> {
            Ok(KnowledgeBaseSchema::new(self.schema.clone()))
        }

        async fn create_record(
            &self,
            _database_id: &str,
            properties: &[(String, PropertyValue)],
            children: &[Block],
        ) -> Result<RecordRef> {
            self.created
                .lock()
                .unwrap()
                .push((properties.to_vec(), children.len()));
            Ok(RecordRef {
                id: "page-1".into(),
                url: "https://www.notion.so/page-1".into(),
            })
        }

        async fn update_record(
            &self,
            _record_id: &str,
            properties: &[(String, PropertyValue)],
        ) -> Result<()> {
            if self.fail_update {
                return Err(WeeklyPackError::KnowledgeBase("HTTP 400".into()));
            }
            self.updated.lock().unwrap().push(properties.to_vec());
            Ok(())
        }

        async fn append_blocks(&self, page_id: &str, blocks: &[Block]) -> Result<()> {
            self.appended
                .lock()
                .unwrap()
                .push((page_id.into(), blocks.to_vec()));
            Ok(())
        }
    }

    fn key() -> PeriodKey {
        PeriodKey::new(2025, 7).unwrap()
    }

    fn target(repository: Option<&str>) -> PublishTarget<'_> {
        PublishTarget {
            database_id: "db-1",
            hub_page_id: "hub-1",
            repository,
            branch: "main",
        }
    }

    fn seeded_store(dir: &std::path::Path) -> ArtifactStore {
        let store = ArtifactStore::new(dir);
        let k = key();
        store.put(&k, ArtifactKind::Article, b"# Example Query\n\nBody").unwrap();
        store
            .put_json(
                &k,
                ArtifactKind::Metadata,
                &MetadataRecord {
                    title: "Example Niche — Week 7 (2025)".into(),
                    generated_at: NaiveDate::from_ymd_opt(2025, 2, 12).unwrap(),
                    primary_filename: "Week-07-2025-pack.md".into(),
                    rendered_filename: "Week-07-2025-pack.pdf".into(),
                },
            )
            .unwrap();
        store
    }

    fn full_schema() -> FakeKb {
        FakeKb::with_schema(&[
            ("Name", FieldKind::Title),
            ("Status", FieldKind::Select),
            ("Week", FieldKind::Number),
            ("Year", FieldKind::Number),
        ])
    }

    #[tokio::test]
    async fn publishes_without_storage_links() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let kb = full_schema();

        let out = publish_to_knowledge_base(&store, &key(), &target(None), &kb, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(out.article_url, "https://www.notion.so/page-1");

        // Created with the title property only.
        let created = kb.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert_eq!(
            created[0].0,
            vec![(
                "Name".to_string(),
                PropertyValue::Title("Example Niche — Week 7 (2025)".into())
            )]
        );
        assert_eq!(created[0].1, 1);

        let updated = kb.updated.lock().unwrap().clone();
        assert_eq!(updated[0].len(), 3);

        let appended = kb.appended.lock().unwrap().clone();
        assert_eq!(appended[0].0, "hub-1");
        assert_eq!(appended[0].1[0], Block::Heading2("Week 07 (2025)".into()));
        assert_eq!(
            appended[0].1[1],
            Block::BulletedLink {
                text: "PDF pack".into(),
                url: String::new()
            }
        );

        assert!(store.exists(&key(), ArtifactKind::PublishLinks));
    }

    #[tokio::test]
    async fn storage_links_take_precedence_over_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        store
            .put_json(
                &key(),
                ArtifactKind::StorageLinks,
                &StorageLinksRecord {
                    primary_url: "https://drive.example/md".into(),
                    rendered_url: "https://drive.example/pdf".into(),
                    folder_url: None,
                },
            )
            .unwrap();
        let kb = full_schema();

        publish_to_knowledge_base(&store, &key(), &target(Some("me/packs")), &kb, &SilentProgress)
            .await
            .unwrap();

        let appended = kb.appended.lock().unwrap().clone();
        assert_eq!(
            appended[0].1[2],
            Block::BulletedLink {
                text: "Markdown pack".into(),
                url: "https://drive.example/md".into()
            }
        );
    }

    #[test]
    fn repository_links_when_nothing_uploaded() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let meta = store.read_metadata(&key()).unwrap();

        let links = resolve_document_links(&store, &key(), &meta, &target(Some("me/packs"))).unwrap();
        assert_eq!(
            links.rendered_url,
            "https://raw.githubusercontent.com/me/packs/main/packs/2025-P07/Week-07-2025-pack.pdf"
        );
    }

    #[test]
    fn mismatched_optional_fields_are_skipped() {
        let schema = KnowledgeBaseSchema::new(vec![
            ("Name".into(), FieldKind::Title),
            ("Status".into(), FieldKind::Status),
            ("Week".into(), FieldKind::RichText),
            ("Year".into(), FieldKind::Number),
        ]);
        let props = optional_properties(&schema, &key());
        assert_eq!(props, vec![("Year".to_string(), PropertyValue::Number(2025))]);
    }

    #[tokio::test]
    async fn title_only_schema_skips_update() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let kb = FakeKb::with_schema(&[("Headline", FieldKind::Title)]);

        publish_to_knowledge_base(&store, &key(), &target(None), &kb, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(kb.created.lock().unwrap()[0].0[0].0, "Headline");
        assert!(kb.updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fallback_title_field_gets_its_own_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let kb = FakeKb::with_schema(&[("Week", FieldKind::Number), ("Name", FieldKind::RichText)]);

        publish_to_knowledge_base(&store, &key(), &target(None), &kb, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(
            kb.created.lock().unwrap()[0].0,
            vec![(
                "Name".to_string(),
                PropertyValue::RichText("Example Niche — Week 7 (2025)".into())
            )]
        );
    }

    #[tokio::test]
    async fn title_field_that_cannot_hold_text_fails_before_create() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let kb = FakeKb::with_schema(&[("Week", FieldKind::Number)]);

        let err = publish_to_knowledge_base(&store, &key(), &target(None), &kb, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, WeeklyPackError::KnowledgeBase(_)));
        assert!(kb.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_failure_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let mut kb = full_schema();
        kb.fail_update = true;

        let out = publish_to_knowledge_base(&store, &key(), &target(None), &kb, &SilentProgress).await;
        assert!(out.is_ok());
        assert_eq!(kb.appended.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_schema_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let kb = FakeKb::default();

        let err = publish_to_knowledge_base(&store, &key(), &target(None), &kb, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, WeeklyPackError::KnowledgeBase(_)));
        assert!(kb.created.lock().unwrap().is_empty());
        assert!(!store.exists(&key(), ArtifactKind::PublishLinks));
    }
}
