use super::*;
use std::collections::HashSet;
use tempfile::TempDir;

async fn create_test_database() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

fn new_kb(name: &str) -> NewKnowledgeBase {
    NewKnowledgeBase {
        name: name.to_string(),
        description: None,
    }
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let (temp_dir, database) = create_test_database().await?;

    assert!(temp_dir.path().join("metadata.db").exists());

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' \
         AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'",
    )
    .fetch_all(database.pool())
    .await?;

    let expected_tables: HashSet<&'static str> =
        ["knowledge_bases", "documents"].into_iter().collect();
    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    // Migrations are idempotent
    database.run_migrations().await?;

    Ok(())
}

#[tokio::test]
async fn integration_cascade_delete() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let kb = database.create_knowledge_base(new_kb("kb")).await?;
    let document = database
        .create_document(NewDocument {
            knowledge_base_id: kb.id,
            name: "a.txt".to_string(),
            extension: "txt".to_string(),
            size: 1,
            content_hash: "h".to_string(),
            storage: "local:a.txt".to_string(),
        })
        .await?;

    sqlx::query("DELETE FROM knowledge_bases WHERE id = ?")
        .bind(kb.id)
        .execute(database.pool())
        .await?;

    assert!(database.get_document(document.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn knowledge_base_names_are_validated() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let too_long = "x".repeat(MAX_NAME_LEN + 1);
    for name in ["", "   ", too_long.as_str()] {
        let result = database.create_knowledge_base(new_kb(name)).await;
        assert!(
            matches!(result, Err(RagError::InvalidInput(_))),
            "{name:?} should be rejected"
        );
    }

    let long_description = NewKnowledgeBase {
        name: "ok".to_string(),
        description: Some("d".repeat(MAX_NAME_LEN + 1)),
    };
    assert!(matches!(
        database.create_knowledge_base(long_description).await,
        Err(RagError::InvalidInput(_))
    ));

    let kb = database
        .create_knowledge_base(new_kb(&"x".repeat(MAX_NAME_LEN)))
        .await?;
    assert_eq!(kb.name.len(), MAX_NAME_LEN);
    assert_eq!(database.list_knowledge_bases().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn metadata_store_document_lifecycle() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let kb = database.create_knowledge_base(new_kb("kb")).await?;

    let document = database
        .create_document(NewDocument {
            knowledge_base_id: kb.id,
            name: "notes.md".to_string(),
            extension: "md".to_string(),
            size: 5,
            content_hash: "abc".to_string(),
            storage: "local:notes.md".to_string(),
        })
        .await?;
    assert!(document.needs_repair());

    let ready = database
        .update_document_status(document.id, DocumentUpdate::ready(2))
        .await?
        .expect("document should exist");
    assert!(!ready.needs_repair());

    assert_eq!(
        database
            .find_active_by_hash(kb.id, "abc")
            .await?
            .map(|d| d.id),
        Some(document.id)
    );
    assert_eq!(database.list_documents(kb.id).await?.len(), 1);

    assert!(database.soft_delete_document(document.id).await?);
    assert!(database.list_documents(kb.id).await?.is_empty());
    assert_eq!(
        database
            .list_documents_by_status(DocumentStatus::Deleted, Some(kb.id))
            .await?
            .len(),
        1
    );
    assert_eq!(
        database.document_counts().await?,
        vec![(DocumentStatus::Deleted, 1)]
    );

    let found = database.get_knowledge_base_by_name("kb").await?;
    assert_eq!(found.map(|k| k.id), Some(kb.id));
    assert!(database.get_knowledge_base_by_name("KB").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn knowledge_base_names_are_unique() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    let first = database.create_knowledge_base(new_kb("handbook")).await?;

    assert!(matches!(
        database.create_knowledge_base(new_kb("handbook")).await,
        Err(RagError::NameConflict(name)) if name == "handbook"
    ));
    assert_eq!(database.list_knowledge_bases().await?.len(), 1);
    assert_eq!(
        database
            .get_knowledge_base_by_name("handbook")
            .await?
            .map(|k| k.id),
        Some(first.id)
    );
    Ok(())
}

#[tokio::test]
async fn optimize_runs() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;
    database.optimize().await?;
    Ok(())
}
