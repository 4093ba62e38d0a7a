// SQLite Transaction Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use smartsearch_core::domain::{NewUser, ProfileAnswers, RequestId, UserId};
use smartsearch_core::error::Result;
use smartsearch_core::port::{ProfileTransaction, TimeProvider, Transaction};
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use std::sync::Arc;

pub struct SqliteProfileTransaction<'a> {
    tx: SqlxTransaction<'a, Sqlite>,
    time_provider: Arc<dyn TimeProvider>,
}

impl<'a> SqliteProfileTransaction<'a> {
    pub fn new(tx: SqlxTransaction<'a, Sqlite>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { tx, time_provider }
    }
}

#[async_trait]
impl Transaction for SqliteProfileTransaction<'_> {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileTransaction for SqliteProfileTransaction<'_> {
    async fn insert_user(&mut self, user: &NewUser) -> Result<UserId> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            "INSERT INTO users (nombre, edad, correo, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.nombre)
        .bind(user.edad)
        .bind(&user.correo)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_test(&mut self, answers: &ProfileAnswers) -> Result<i64> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO profile_tests (
                motivo_compra, fuente_informacion, temas_de_interes,
                compras_no_necesarias, importancia_marca, probar_nuevos_productos,
                aspiraciones, nivel_social, tiempo_libre, identidad, tendencias,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&answers.motivo_compra)
        .bind(&answers.fuente_informacion)
        .bind(&answers.temas_de_interes)
        .bind(&answers.compras_no_necesarias)
        .bind(&answers.importancia_marca)
        .bind(&answers.probar_nuevos_productos)
        .bind(&answers.aspiraciones)
        .bind(&answers.nivel_social)
        .bind(&answers.tiempo_libre)
        .bind(&answers.identidad)
        .bind(&answers.tendencias)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_request(
        &mut self,
        user_id: UserId,
        test_id: i64,
        comentario: &str,
    ) -> Result<RequestId> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            "INSERT INTO requests (user_id, test_id, comentario, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(test_id)
        .bind(comentario)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }
}
