//! Relation database repository.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::clock;
use crate::ids;

use super::models::{Relation, RelationDefinition};

#[derive(Debug, sqlx::FromRow)]
struct RelationRow {
    id: String,
    pair_id: String,
    definition: String,
    document_id: String,
    peer_document_id: String,
    note: Option<String>,
    created_at: String,
}

impl TryFrom<RelationRow> for Relation {
    type Error = anyhow::Error;

    fn try_from(row: RelationRow) -> Result<Self> {
        Ok(Relation {
            id: row.id,
            pair_id: row.pair_id,
            definition: row.definition.parse().map_err(anyhow::Error::msg)?,
            document_id: row.document_id,
            peer_document_id: row.peer_document_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

const RELATION_COLUMNS: &str =
    "id, pair_id, definition, document_id, peer_document_id, note, created_at";

/// Repository for relation persistence.
#[derive(Debug, Clone)]
pub struct RelationRepository {
    pool: SqlitePool,
}

impl RelationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Does a relation of this definition already link the two documents
    /// (in either direction)?
    pub async fn pair_exists(
        &self,
        definition: RelationDefinition,
        from_document_id: &str,
        to_document_id: &str,
    ) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM session_relations
            WHERE definition = ? AND document_id = ? AND peer_document_id = ?
            LIMIT 1
            "#,
        )
        .bind(definition.to_string())
        .bind(from_document_id)
        .bind(to_document_id)
        .fetch_optional(&self.pool)
        .await
        .context("checking relation existence")?;

        Ok(row.is_some())
    }

    /// Create both rows of a logical relation in one transaction.
    pub async fn create_pair(
        &self,
        definition: RelationDefinition,
        from_document_id: &str,
        to_document_id: &str,
        from_to_note: Option<&str>,
        to_from_note: Option<&str>,
    ) -> Result<(Relation, Relation)> {
        let pair_id = ids::new_relation_id();
        let created_at = clock::now_ts();

        let forward = Relation {
            id: ids::new_relation_id(),
            pair_id: pair_id.clone(),
            definition,
            document_id: from_document_id.to_string(),
            peer_document_id: to_document_id.to_string(),
            note: from_to_note.map(str::to_string),
            created_at: created_at.clone(),
        };
        let backward = Relation {
            id: ids::new_relation_id(),
            pair_id,
            definition,
            document_id: to_document_id.to_string(),
            peer_document_id: from_document_id.to_string(),
            note: to_from_note.map(str::to_string),
            created_at,
        };

        let mut tx = self.pool.begin().await.context("starting relation insert")?;
        for relation in [&forward, &backward] {
            sqlx::query(
                r#"
                INSERT INTO session_relations
                    (id, pair_id, definition, document_id, peer_document_id, note, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&relation.id)
            .bind(&relation.pair_id)
            .bind(relation.definition.to_string())
            .bind(&relation.document_id)
            .bind(&relation.peer_document_id)
            .bind(&relation.note)
            .bind(&relation.created_at)
            .execute(&mut *tx)
            .await
            .context("inserting relation row")?;
        }
        tx.commit().await.context("committing relation insert")?;

        Ok((forward, backward))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Relation>> {
        let row = sqlx::query_as::<_, RelationRow>(&format!(
            "SELECT {RELATION_COLUMNS} FROM session_relations WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching relation")?;

        row.map(Relation::try_from).transpose()
    }

    /// Update the note on one row of a pair.
    pub async fn update_note(&self, id: &str, note: Option<&str>) -> Result<bool> {
        let updated = sqlx::query("UPDATE session_relations SET note = ? WHERE id = ?")
            .bind(note)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("updating relation note")?;

        Ok(updated.rows_affected() == 1)
    }

    /// Delete both rows of the pair the given row belongs to. Returns false
    /// when the row does not exist.
    pub async fn delete_pair(&self, id: &str) -> Result<bool> {
        let Some(relation) = self.get(id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM session_relations WHERE pair_id = ?")
            .bind(&relation.pair_id)
            .execute(&self.pool)
            .await
            .context("deleting relation pair")?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn repo() -> RelationRepository {
        let db = Database::in_memory().await.unwrap();
        RelationRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn create_pair_stores_two_mirrored_rows() {
        let repo = repo().await;
        let (forward, backward) = repo
            .create_pair(
                RelationDefinition::Related,
                "ses_a",
                "ses_b",
                Some("spawned for research"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(forward.pair_id, backward.pair_id);
        assert_eq!(forward.document_id, "ses_a");
        assert_eq!(forward.peer_document_id, "ses_b");
        assert_eq!(backward.document_id, "ses_b");
        assert_eq!(backward.peer_document_id, "ses_a");
        assert_eq!(forward.note.as_deref(), Some("spawned for research"));
        assert!(backward.note.is_none());
    }

    #[tokio::test]
    async fn delete_pair_removes_both_rows() {
        let repo = repo().await;
        let (forward, backward) = repo
            .create_pair(RelationDefinition::Related, "ses_a", "ses_b", None, None)
            .await
            .unwrap();

        assert!(repo.delete_pair(&forward.id).await.unwrap());
        assert!(repo.get(&forward.id).await.unwrap().is_none());
        assert!(repo.get(&backward.id).await.unwrap().is_none());

        assert!(!repo.delete_pair(&forward.id).await.unwrap());
    }

    #[tokio::test]
    async fn pair_exists_sees_both_directions() {
        let repo = repo().await;
        repo.create_pair(RelationDefinition::Related, "ses_a", "ses_b", None, None)
            .await
            .unwrap();

        assert!(
            repo.pair_exists(RelationDefinition::Related, "ses_a", "ses_b")
                .await
                .unwrap()
        );
        assert!(
            repo.pair_exists(RelationDefinition::Related, "ses_b", "ses_a")
                .await
                .unwrap()
        );
        assert!(
            !repo
                .pair_exists(RelationDefinition::ParentChild, "ses_a", "ses_b")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn note_updates_touch_one_row_only() {
        let repo = repo().await;
        let (forward, backward) = repo
            .create_pair(RelationDefinition::PredecessorSuccessor, "ses_a", "ses_b", None, None)
            .await
            .unwrap();

        assert!(repo.update_note(&forward.id, Some("first")).await.unwrap());

        let forward = repo.get(&forward.id).await.unwrap().unwrap();
        let backward = repo.get(&backward.id).await.unwrap().unwrap();
        assert_eq!(forward.note.as_deref(), Some("first"));
        assert!(backward.note.is_none());
    }
}
