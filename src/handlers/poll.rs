use crate::auth::RequestIdentity;
use crate::cache::TallyCache;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{ConsensusPolicy, NewPoll, OptionInput, Poll};
use crate::voting::PollTally;
use actix_web::{
    web::{Data, Json, Path, Query},
    HttpResponse,
};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub hangout_id: String,
    pub question: String,
    pub options: Vec<OptionInput>,
    pub policy: ConsensusPolicy,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub min_participants: u32,
    #[serde(default)]
    pub multi_select: bool,
    #[serde(default)]
    pub anonymous: bool,
    pub duration_minutes: Option<i64>,
}

#[derive(Serialize)]
pub struct PollResponse {
    pub poll: Poll,
    pub tally: PollTally,
}

#[derive(Deserialize)]
pub struct AddOptionRequest {
    pub option: OptionInput,
}

#[derive(Deserialize)]
pub struct ListPollsQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[actix_web::post("")]
pub async fn create_poll(
    db: Data<Database>,
    identity: RequestIdentity,
    Json(req): Json<CreatePollRequest>,
) -> Result<HttpResponse, AppError> {
    let option_texts: Vec<String> = req
        .options
        .into_iter()
        .map(|option| option.into_text().trim().to_string())
        .collect();

    if option_texts.len() < 2 {
        return Err(AppError::Validation(
            "at least two options are required".into(),
        ));
    }
    if option_texts.iter().any(|text| text.is_empty()) {
        return Err(AppError::Validation("option text must not be empty".into()));
    }
    if req.question.trim().is_empty() {
        return Err(AppError::Validation("question must not be empty".into()));
    }
    match req.policy {
        ConsensusPolicy::Percentage => {
            if !(req.threshold > 0.0 && req.threshold <= 100.0) {
                return Err(AppError::Validation(
                    "percentage threshold must be in (0, 100]".into(),
                ));
            }
        }
        ConsensusPolicy::Absolute => {
            if req.threshold < 1.0 {
                return Err(AppError::Validation(
                    "absolute threshold must be at least 1".into(),
                ));
            }
        }
        // Majority needs no threshold.
        ConsensusPolicy::Majority => {}
    }
    if req.duration_minutes.is_some_and(|mins| mins <= 0) {
        return Err(AppError::Validation(
            "duration_minutes must be positive".into(),
        ));
    }

    let poll = Poll::new(NewPoll {
        hangout_id: req.hangout_id,
        creator_id: identity.user_id,
        question: req.question,
        option_texts,
        policy: req.policy,
        threshold: req.threshold,
        min_participants: req.min_participants,
        multi_select: req.multi_select,
        anonymous: req.anonymous,
        duration_minutes: req.duration_minutes,
    });
    db.create_poll(&poll).await?;
    info!(
        "created poll {} in hangout {} ({} options, {} policy)",
        poll.id,
        poll.hangout_id,
        poll.options.len(),
        poll.policy.as_str()
    );

    Ok(HttpResponse::Created().json(poll))
}

#[actix_web::get("/{id}")]
pub async fn get_poll(
    db: Data<Database>,
    cache: Data<dyn TallyCache>,
    id: Path<String>,
) -> Result<HttpResponse, AppError> {
    let poll = db.get_poll(&id).await?;
    let tally = super::cached_tally(&db, &cache, &poll).await?;
    Ok(HttpResponse::Ok().json(PollResponse { poll, tally }))
}

#[actix_web::post("/{id}/options")]
pub async fn add_option(
    db: Data<Database>,
    cache: Data<dyn TallyCache>,
    identity: RequestIdentity,
    id: Path<String>,
    Json(req): Json<AddOptionRequest>,
) -> Result<HttpResponse, AppError> {
    let poll = db.get_poll(&id).await?;
    if poll.creator_id != identity.user_id {
        return Err(AppError::Forbidden(
            "only the poll creator may add options".into(),
        ));
    }
    if !poll.is_open() {
        return Err(AppError::PollClosed(poll.id));
    }
    if poll.is_expired_at(chrono::Utc::now()) {
        return Err(AppError::PollExpired(poll.id));
    }

    let text = req.option.into_text().trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation("option text must not be empty".into()));
    }

    let option = db.add_option(&poll.id, &text).await?;
    // The option set changed shape, so any memoized tally is stale.
    cache.invalidate(&poll.id).await;

    Ok(HttpResponse::Created().json(option))
}

#[actix_web::get("/{hangout_id}/polls")]
pub async fn list_hangout_polls(
    db: Data<Database>,
    hangout_id: Path<String>,
    Query(params): Query<ListPollsQuery>,
) -> Result<HttpResponse, AppError> {
    let polls = match params.status.as_deref().unwrap_or("open") {
        "open" => db.open_polls_by_hangout(&hangout_id).await?,
        "closed" => {
            db.closed_polls_by_hangout(&hangout_id, params.limit.unwrap_or(10))
                .await?
        }
        other => {
            return Err(AppError::Validation(format!(
                "unknown status filter: {}",
                other
            )))
        }
    };
    Ok(HttpResponse::Ok().json(polls))
}
