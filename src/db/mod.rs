use crate::error::AppError;
use crate::models::{ConsensusPolicy, Poll, PollOption, PollStatus, PollSummary, Vote};
use chrono::{DateTime, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row, Sqlite,
};
use std::env;
use uuid::Uuid;

pub struct Database {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("failed to parse {}: {}", field, e)))
}

impl Database {
    pub async fn new() -> Result<Self, AppError> {
        // Get database URL from environment or use a default
        let db_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:hangout_polls.db".to_string());

        // Create database if it doesn't exist
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, AppError> {
        // A single connection so every test statement sees the same
        // in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    // Initialize the database schema
    async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                hangout_id TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                question TEXT NOT NULL,
                policy TEXT NOT NULL,
                threshold REAL NOT NULL,
                min_participants INTEGER NOT NULL DEFAULT 0,
                multi_select BOOLEAN NOT NULL DEFAULT FALSE,
                anonymous BOOLEAN NOT NULL DEFAULT FALSE,
                status TEXT NOT NULL DEFAULT 'open',
                created_at TEXT NOT NULL,
                expires_at TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                id TEXT PRIMARY KEY,
                poll_id TEXT NOT NULL,
                text TEXT NOT NULL,
                position INTEGER NOT NULL,
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // One vote row per (user, poll, option); the primary key is the
        // duplicate-vote invariant.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                user_id TEXT NOT NULL,
                poll_id TEXT NOT NULL,
                option_id TEXT NOT NULL,
                preferred BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, poll_id, option_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE,
                FOREIGN KEY (option_id) REFERENCES poll_options(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // Create a new poll and its options in one transaction
    pub async fn create_poll(&self, poll: &Poll) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO polls (id, hangout_id, creator_id, question, policy, threshold,
                               min_participants, multi_select, anonymous, status,
                               created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.hangout_id)
        .bind(&poll.creator_id)
        .bind(&poll.question)
        .bind(poll.policy.as_str())
        .bind(poll.threshold)
        .bind(poll.min_participants as i64)
        .bind(poll.multi_select)
        .bind(poll.anonymous)
        .bind(poll.status.as_str())
        .bind(poll.created_at.to_rfc3339())
        .bind(poll.expires_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for (i, option) in poll.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO poll_options (id, poll_id, text, position)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&option.id)
            .bind(&poll.id)
            .bind(&option.text)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // Get a poll by ID, options in declared order
    pub async fn get_poll(&self, poll_id: &str) -> Result<Poll, AppError> {
        let poll_row = sqlx::query(
            r#"
            SELECT id, hangout_id, creator_id, question, policy, threshold,
                   min_participants, multi_select, anonymous, status,
                   created_at, expires_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;

        let policy_str = poll_row.get::<String, _>("policy");
        let policy = ConsensusPolicy::parse(&policy_str)
            .ok_or_else(|| AppError::Internal(format!("unknown consensus policy: {}", policy_str)))?;

        let status_str = poll_row.get::<String, _>("status");
        let status = PollStatus::parse(&status_str)
            .ok_or_else(|| AppError::Internal(format!("unknown poll status: {}", status_str)))?;

        let created_at = parse_timestamp(&poll_row.get::<String, _>("created_at"), "created_at")?;
        let expires_at = match poll_row.get::<Option<String>, _>("expires_at") {
            Some(raw) => Some(parse_timestamp(&raw, "expires_at")?),
            None => None,
        };

        let options = sqlx::query(
            r#"
            SELECT id, text
            FROM poll_options
            WHERE poll_id = ?
            ORDER BY position
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| PollOption {
            id: row.get::<String, _>("id"),
            text: row.get::<String, _>("text"),
        })
        .collect();

        Ok(Poll {
            id: poll_row.get::<String, _>("id"),
            hangout_id: poll_row.get::<String, _>("hangout_id"),
            creator_id: poll_row.get::<String, _>("creator_id"),
            question: poll_row.get::<String, _>("question"),
            options,
            policy,
            threshold: poll_row.get::<f64, _>("threshold"),
            min_participants: poll_row.get::<i64, _>("min_participants") as u32,
            multi_select: poll_row.get::<bool, _>("multi_select"),
            anonymous: poll_row.get::<bool, _>("anonymous"),
            status,
            created_at,
            expires_at,
        })
    }

    // Append an option to an existing poll, after its current options
    pub async fn add_option(&self, poll_id: &str, text: &str) -> Result<PollOption, AppError> {
        let option = PollOption {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO poll_options (id, poll_id, text, position)
            VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1
                              FROM poll_options WHERE poll_id = ?))
            "#,
        )
        .bind(&option.id)
        .bind(poll_id)
        .bind(&option.text)
        .bind(poll_id)
        .execute(&self.pool)
        .await?;

        Ok(option)
    }

    // Record a batch of vote rows atomically (one per selected option).
    // A unique-violation means the user already voted for that option.
    pub async fn record_votes(&self, votes: &[Vote]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for vote in votes {
            let result = sqlx::query(
                r#"
                INSERT INTO votes (user_id, poll_id, option_id, preferred, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&vote.user_id)
            .bind(&vote.poll_id)
            .bind(&vote.option_id)
            .bind(vote.preferred)
            .bind(vote.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                if e.as_database_error()
                    .is_some_and(|db_err| db_err.is_unique_violation())
                {
                    return Err(AppError::DuplicateVote(vote.option_id.clone()));
                }
                return Err(e.into());
            }
        }

        tx.commit().await?;
        Ok(())
    }

    // Get all votes for a poll
    pub async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<Vote>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, poll_id, option_id, preferred, created_at
            FROM votes
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        let mut votes = Vec::with_capacity(rows.len());
        for row in rows {
            votes.push(Vote {
                user_id: row.get::<String, _>("user_id"),
                poll_id: row.get::<String, _>("poll_id"),
                option_id: row.get::<String, _>("option_id"),
                preferred: row.get::<bool, _>("preferred"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
            });
        }
        Ok(votes)
    }

    // Get one user's votes within a poll
    pub async fn get_user_poll_votes(
        &self,
        poll_id: &str,
        user_id: &str,
    ) -> Result<Vec<Vote>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, poll_id, option_id, preferred, created_at
            FROM votes
            WHERE poll_id = ? AND user_id = ?
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut votes = Vec::with_capacity(rows.len());
        for row in rows {
            votes.push(Vote {
                user_id: row.get::<String, _>("user_id"),
                poll_id: row.get::<String, _>("poll_id"),
                option_id: row.get::<String, _>("option_id"),
                preferred: row.get::<bool, _>("preferred"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
            });
        }
        Ok(votes)
    }

    // OPEN -> CONSENSUS_REACHED, only if currently open. Returns whether
    // this call performed the transition; a lost race is a no-op.
    pub async fn close_poll(&self, poll_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE polls
            SET status = 'consensus_reached'
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(poll_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // OPEN -> EXPIRED, only if currently open
    pub async fn expire_poll(&self, poll_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE polls
            SET status = 'expired'
            WHERE id = ? AND status = 'open'
            "#,
        )
        .bind(poll_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Polls that have passed their expiration timestamp but are still open
    pub async fn get_expired_poll_ids(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query(
            r#"
            SELECT id
            FROM polls
            WHERE expires_at IS NOT NULL AND expires_at < ? AND status = 'open'
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();
        Ok(ids)
    }

    // Open polls for a hangout, newest first
    pub async fn open_polls_by_hangout(
        &self,
        hangout_id: &str,
    ) -> Result<Vec<PollSummary>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, question, status, expires_at
            FROM polls
            WHERE hangout_id = ? AND status = 'open'
            ORDER BY created_at DESC
            "#,
        )
        .bind(hangout_id)
        .fetch_all(&self.pool)
        .await?;

        Self::summaries_from_rows(rows)
    }

    // Recently settled polls (consensus reached or expired) for a hangout
    pub async fn closed_polls_by_hangout(
        &self,
        hangout_id: &str,
        limit: u32,
    ) -> Result<Vec<PollSummary>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, question, status, expires_at
            FROM polls
            WHERE hangout_id = ? AND status != 'open'
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(hangout_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Self::summaries_from_rows(rows)
    }

    fn summaries_from_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<PollSummary>, AppError> {
        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str = row.get::<String, _>("status");
            let status = PollStatus::parse(&status_str)
                .ok_or_else(|| AppError::Internal(format!("unknown poll status: {}", status_str)))?;
            let expires_at = match row.get::<Option<String>, _>("expires_at") {
                Some(raw) => Some(parse_timestamp(&raw, "expires_at")?),
                None => None,
            };
            summaries.push(PollSummary {
                id: row.get::<String, _>("id"),
                question: row.get::<String, _>("question"),
                status,
                expires_at,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPoll;

    fn sample_poll(expired: bool) -> Poll {
        let mut poll = Poll::new(NewPoll {
            hangout_id: "hangout-1".into(),
            creator_id: "host".into(),
            question: "Which day works?".into(),
            option_texts: vec!["Friday".into(), "Saturday".into()],
            policy: ConsensusPolicy::Percentage,
            threshold: 70.0,
            min_participants: 2,
            multi_select: false,
            anonymous: false,
            duration_minutes: Some(30),
        });
        if expired {
            poll.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
        }
        poll
    }

    fn vote_for(poll: &Poll, user: &str, option_idx: usize) -> Vote {
        Vote {
            user_id: user.into(),
            poll_id: poll.id.clone(),
            option_id: poll.options[option_idx].id.clone(),
            preferred: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(false);
        db.create_poll(&poll).await.unwrap();

        let loaded = db.get_poll(&poll.id).await.unwrap();

        assert_eq!(loaded.id, poll.id);
        assert_eq!(loaded.policy, ConsensusPolicy::Percentage);
        assert_eq!(loaded.threshold, 70.0);
        assert_eq!(loaded.min_participants, 2);
        assert_eq!(loaded.status, PollStatus::Open);
        // Declared option order survives the round trip.
        let texts: Vec<&str> = loaded.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Friday", "Saturday"]);
    }

    #[tokio::test]
    async fn missing_poll_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let err = db.get_poll("nope").await.unwrap_err();
        assert!(matches!(err, AppError::PollNotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_vote_is_a_conflict() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(false);
        db.create_poll(&poll).await.unwrap();

        db.record_votes(&[vote_for(&poll, "u1", 0)]).await.unwrap();
        let err = db
            .record_votes(&[vote_for(&poll, "u1", 0)])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DuplicateVote(_)));
        // The rejected insert must not have left a second row behind.
        assert_eq!(db.get_poll_votes(&poll.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_poll_is_conditional_and_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(false);
        db.create_poll(&poll).await.unwrap();

        assert!(db.close_poll(&poll.id).await.unwrap());
        // Second attempt is a harmless no-op.
        assert!(!db.close_poll(&poll.id).await.unwrap());
        // And an expire after close must not overwrite the terminal state.
        assert!(!db.expire_poll(&poll.id).await.unwrap());

        let loaded = db.get_poll(&poll.id).await.unwrap();
        assert_eq!(loaded.status, PollStatus::ConsensusReached);
    }

    #[tokio::test]
    async fn expired_scan_only_returns_open_overdue_polls() {
        let db = Database::in_memory().await.unwrap();
        let fresh = sample_poll(false);
        let overdue = sample_poll(true);
        let settled = sample_poll(true);
        db.create_poll(&fresh).await.unwrap();
        db.create_poll(&overdue).await.unwrap();
        db.create_poll(&settled).await.unwrap();
        db.close_poll(&settled.id).await.unwrap();

        let ids = db.get_expired_poll_ids(Utc::now()).await.unwrap();

        assert_eq!(ids, vec![overdue.id.clone()]);
        assert!(db.expire_poll(&overdue.id).await.unwrap());
        assert_eq!(
            db.get_poll(&overdue.id).await.unwrap().status,
            PollStatus::Expired
        );
    }

    #[tokio::test]
    async fn added_option_lands_after_existing_ones() {
        let db = Database::in_memory().await.unwrap();
        let poll = sample_poll(false);
        db.create_poll(&poll).await.unwrap();

        db.add_option(&poll.id, "Sunday").await.unwrap();

        let loaded = db.get_poll(&poll.id).await.unwrap();
        let texts: Vec<&str> = loaded.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Friday", "Saturday", "Sunday"]);
    }

    #[tokio::test]
    async fn hangout_listings_split_open_and_settled() {
        let db = Database::in_memory().await.unwrap();
        let open = sample_poll(false);
        let settled = sample_poll(false);
        db.create_poll(&open).await.unwrap();
        db.create_poll(&settled).await.unwrap();
        db.close_poll(&settled.id).await.unwrap();

        let open_list = db.open_polls_by_hangout("hangout-1").await.unwrap();
        let closed_list = db.closed_polls_by_hangout("hangout-1", 10).await.unwrap();

        assert_eq!(open_list.len(), 1);
        assert_eq!(open_list[0].id, open.id);
        assert_eq!(closed_list.len(), 1);
        assert_eq!(closed_list[0].id, settled.id);
        assert_eq!(closed_list[0].status, PollStatus::ConsensusReached);
    }
}
