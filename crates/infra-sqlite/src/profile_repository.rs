// SQLite ProfileRepository Implementation

use crate::error::map_sqlx_error;
use crate::SqliteProfileTransaction;
use async_trait::async_trait;
use smartsearch_core::domain::{
    FoundUrl, ProfileAnswers, RequestId, RequestRecord, StoredProfile, UserId, UserSummary,
};
use smartsearch_core::error::Result;
use smartsearch_core::port::{
    ProfileRepository, ProfileTransaction, TimeProvider, TransactionalProfileRepository,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

pub struct SqliteProfileRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteProfileRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn find_answers(&self, test_id: i64) -> Result<Option<ProfileAnswers>> {
        let row: Option<TestRow> = sqlx::query_as(
            r#"
            SELECT motivo_compra, fuente_informacion, temas_de_interes,
                   compras_no_necesarias, importancia_marca, probar_nuevos_productos,
                   aspiraciones, nivel_social, tiempo_libre, identidad, tendencias
            FROM profile_tests WHERE id = ?
            "#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TestRow::into_answers))
    }
}

#[async_trait]
impl ProfileRepository for SqliteProfileRepository {
    async fn find_latest_request(&self, user_id: UserId) -> Result<Option<RequestRecord>> {
        let row: Option<RequestRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, test_id, comentario, created_at
            FROM requests
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(RequestRow::into_record))
    }

    async fn replace_found_urls(&self, request_id: RequestId, urls: &[String]) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let removed = sqlx::query("DELETE FROM found_urls WHERE request_id = ?")
            .bind(request_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        let mut stored = 0;
        for url in urls {
            // UNIQUE(request_id, url) drops duplicates inside one batch
            stored += sqlx::query(
                "INSERT OR IGNORE INTO found_urls (request_id, url, found_at) VALUES (?, ?, ?)",
            )
            .bind(request_id)
            .bind(url)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(request_id, removed, stored, "Found URLs replaced");
        Ok(stored)
    }

    async fn find_found_urls(&self, request_id: RequestId) -> Result<Vec<FoundUrl>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT url, found_at FROM found_urls WHERE request_id = ? ORDER BY found_at DESC, id ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(url, found_at)| FoundUrl { url, found_at })
            .collect())
    }

    async fn find_profile(&self, user_id: UserId) -> Result<Option<StoredProfile>> {
        let user: Option<UserRow> =
            sqlx::query_as("SELECT id, nombre, edad, correo FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        let Some(user) = user else {
            return Ok(None);
        };

        let request = self.find_latest_request(user_id).await?;
        let (answers, urls) = match &request {
            Some(r) => (
                self.find_answers(r.test_id).await?.unwrap_or_default(),
                self.find_found_urls(r.id).await?,
            ),
            None => (ProfileAnswers::default(), Vec::new()),
        };

        Ok(Some(StoredProfile {
            user: user.into_summary(),
            answers,
            request,
            urls,
        }))
    }
}

#[async_trait]
impl TransactionalProfileRepository for SqliteProfileRepository {
    async fn begin_transaction(&self) -> Result<Box<dyn ProfileTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteProfileTransaction::new(
            tx,
            Arc::clone(&self.time_provider),
        )))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    nombre: String,
    edad: i32,
    correo: Option<String>,
}

impl UserRow {
    fn into_summary(self) -> UserSummary {
        UserSummary {
            id: Some(self.id),
            nombre: self.nombre,
            edad: self.edad,
            correo: self.correo,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RequestRow {
    id: i64,
    user_id: i64,
    test_id: i64,
    comentario: String,
    created_at: i64,
}

impl RequestRow {
    fn into_record(self) -> RequestRecord {
        RequestRecord {
            id: self.id,
            user_id: self.user_id,
            test_id: self.test_id,
            comentario: self.comentario,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TestRow {
    motivo_compra: String,
    fuente_informacion: String,
    temas_de_interes: String,
    compras_no_necesarias: String,
    importancia_marca: String,
    probar_nuevos_productos: String,
    aspiraciones: String,
    nivel_social: String,
    tiempo_libre: String,
    identidad: String,
    tendencias: String,
}

impl TestRow {
    fn into_answers(self) -> ProfileAnswers {
        ProfileAnswers {
            motivo_compra: self.motivo_compra,
            fuente_informacion: self.fuente_informacion,
            temas_de_interes: self.temas_de_interes,
            compras_no_necesarias: self.compras_no_necesarias,
            importancia_marca: self.importancia_marca,
            probar_nuevos_productos: self.probar_nuevos_productos,
            aspiraciones: self.aspiraciones,
            nivel_social: self.nivel_social,
            tiempo_libre: self.tiempo_libre,
            identidad: self.identidad,
            tendencias: self.tendencias,
        }
    }
}
