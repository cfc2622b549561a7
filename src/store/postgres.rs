//! PostgreSQL backend
//!
//! Every batch is written in its own transaction. The step row is locked with
//! `SELECT ... FOR UPDATE`, so concurrent writers from any process serialize on it and the
//! existence re-check under that lock decides who writes.

use crate::error::StorageError;
use crate::store::batch::plan_rows;
use crate::store::{AtomicPersister, QuizRepository};
use crate::types::{
    day_window, FinishedBatch, GroupId, Note, PersistOutcome, Quiz, QuizOption, QuizWithOptions,
    StepNumber, StudyGroup, StudyStep,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

pub struct PgQuizStore {
    pool: PgPool,
}

impl PgQuizStore {
    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn step_from_row(row: &PgRow) -> Result<StudyStep, sqlx::Error> {
    Ok(StudyStep {
        group_id: row.try_get("group_id")?,
        step: row.try_get("step")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
    })
}

fn option_number_from_row(row: &PgRow) -> Result<u8, StorageError> {
    let number: i16 = row.try_get("option_number")?;
    u8::try_from(number)
        .map_err(|_| StorageError::Codec(format!("option_number {} out of range", number)))
}

#[async_trait]
impl QuizRepository for PgQuizStore {
    async fn find_group(&self, group_id: GroupId) -> Result<Option<StudyGroup>, StorageError> {
        let row = sqlx::query("SELECT id, name FROM study_groups WHERE id = $1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| -> Result<StudyGroup, sqlx::Error> {
                Ok(StudyGroup {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                })
            })
            .transpose()?)
    }

    async fn find_step(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Option<StudyStep>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT group_id, step, start_date, end_date
            FROM study_steps
            WHERE group_id = $1 AND step = $2
            "#,
        )
        .bind(group_id)
        .bind(step)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(step_from_row).transpose()?)
    }

    async fn notes_for(&self, group_id: GroupId, step: StepNumber) -> Result<Vec<Note>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, step, title, content, created_at
            FROM notes
            WHERE group_id = $1 AND step = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(group_id)
        .bind(step)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<Note, StorageError> {
                Ok(Note {
                    id: r.try_get("id")?,
                    group_id: r.try_get("group_id")?,
                    step: r.try_get("step")?,
                    title: r.try_get("title")?,
                    content: r.try_get("content")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn batch_exists(
        &self,
        group_id: GroupId,
        step: StepNumber,
        day: NaiveDate,
    ) -> Result<bool, StorageError> {
        let (start, end) = day_window(day);
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM quizzes
                WHERE group_id = $1 AND step = $2 AND created_at >= $3 AND created_at < $4
            )
            "#,
        )
        .bind(group_id)
        .bind(step)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn due_steps(&self, today: NaiveDate) -> Result<Vec<StudyStep>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT s.group_id, s.step, s.start_date, s.end_date
            FROM study_steps s
            WHERE s.end_date < $1
              AND NOT EXISTS (
                  SELECT 1 FROM quizzes q WHERE q.group_id = s.group_id AND q.step = s.step
              )
            ORDER BY s.group_id, s.step
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(step_from_row).collect::<Result<_, _>>()?)
    }

    async fn list_quizzes(
        &self,
        group_id: GroupId,
        step: StepNumber,
    ) -> Result<Vec<QuizWithOptions>, StorageError> {
        let quiz_rows = sqlx::query(
            r#"
            SELECT id, group_id, step, stem, created_at
            FROM quizzes
            WHERE group_id = $1 AND step = $2
            ORDER BY id
            "#,
        )
        .bind(group_id)
        .bind(step)
        .fetch_all(&self.pool)
        .await?;

        let option_rows = sqlx::query(
            r#"
            SELECT o.quiz_id, o.option_number, o.content, o.is_answer
            FROM quiz_options o
            JOIN quizzes q ON q.id = o.quiz_id
            WHERE q.group_id = $1 AND q.step = $2
            ORDER BY o.quiz_id, o.option_number
            "#,
        )
        .bind(group_id)
        .bind(step)
        .fetch_all(&self.pool)
        .await?;

        let mut quizzes = Vec::with_capacity(quiz_rows.len());
        for r in &quiz_rows {
            quizzes.push(QuizWithOptions {
                quiz: Quiz {
                    id: r.try_get("id")?,
                    group_id: r.try_get("group_id")?,
                    step: r.try_get("step")?,
                    stem: r.try_get("stem")?,
                    created_at: r.try_get("created_at")?,
                },
                options: Vec::new(),
            });
        }
        for r in &option_rows {
            let option = QuizOption {
                quiz_id: r.try_get("quiz_id")?,
                option_number: option_number_from_row(r)?,
                content: r.try_get("content")?,
                is_answer: r.try_get("is_answer")?,
            };
            if let Some(entry) = quizzes.iter_mut().find(|q| q.quiz.id == option.quiz_id) {
                entry.options.push(option);
            }
        }
        Ok(quizzes)
    }
}

#[async_trait]
impl AtomicPersister for PgQuizStore {
    async fn persist_atomic(&self, batch: &FinishedBatch) -> Result<PersistOutcome, StorageError> {
        let key = batch.key;
        let rows = plan_rows(batch)?;
        let mut tx = self.pool.begin().await?;

        let group_found = sqlx::query("SELECT id FROM study_groups WHERE id = $1")
            .bind(key.group_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !group_found {
            return Err(StorageError::RecordNotFound(format!(
                "study group {}",
                key.group_id
            )));
        }

        let step_locked = sqlx::query(
            "SELECT step FROM study_steps WHERE group_id = $1 AND step = $2 FOR UPDATE",
        )
        .bind(key.group_id)
        .bind(key.step)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
        if !step_locked {
            return Err(StorageError::RecordNotFound(format!(
                "study step {} of group {}",
                key.step, key.group_id
            )));
        }

        let (start, end) = key.day_window();
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM quizzes
                WHERE group_id = $1 AND step = $2 AND created_at >= $3 AND created_at < $4
            )
            "#,
        )
        .bind(key.group_id)
        .bind(key.step)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await?;
        if exists {
            tx.rollback().await?;
            return Ok(PersistOutcome::Skipped);
        }

        for row in &rows {
            let quiz_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO quizzes (group_id, step, stem, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(key.group_id)
            .bind(key.step)
            .bind(&row.stem)
            .bind(batch.created_at)
            .fetch_one(&mut *tx)
            .await?;

            for option in &row.options {
                sqlx::query(
                    r#"
                    INSERT INTO quiz_options (quiz_id, option_number, content, is_answer)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(quiz_id)
                .bind(option.option_number as i16)
                .bind(&option.content)
                .bind(option.is_answer)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        debug!(
            group_id = key.group_id,
            step = key.step,
            day = %key.day,
            quizzes = rows.len(),
            "Batch committed to PostgreSQL"
        );
        Ok(PersistOutcome::Written(rows.len()))
    }
}
