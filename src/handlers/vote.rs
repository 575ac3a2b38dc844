use crate::auth::RequestIdentity;
use crate::cache::TallyCache;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{Poll, PollStatus, Vote};
use crate::voting::{consensus, PollTally};
use actix_web::{
    web::{Data, Json, Path},
    HttpResponse,
};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Deserialize)]
pub struct CastVoteRequest {
    /// Selected option ids; more than one only for multi-select polls.
    pub options: Vec<String>,
    /// Optional marker for the voter's favorite among their selections.
    pub preferred: Option<String>,
}

#[derive(Serialize)]
pub struct ResultsResponse {
    pub poll_id: String,
    pub status: PollStatus,
    pub tally: PollTally,
    pub consensus_reached: bool,
}

#[actix_web::post("/{id}/votes")]
pub async fn cast_vote(
    db: Data<Database>,
    cache: Data<dyn TallyCache>,
    identity: RequestIdentity,
    id: Path<String>,
    Json(req): Json<CastVoteRequest>,
) -> Result<HttpResponse, AppError> {
    let poll = db.get_poll(&id).await?;
    if !poll.is_open() {
        return Err(AppError::PollClosed(poll.id));
    }
    if poll.is_expired_at(Utc::now()) {
        return Err(AppError::PollExpired(poll.id));
    }

    validate_selection(&poll, &req)?;

    // Friendly conflict for re-votes; the votes primary key backstops the
    // race between two near-simultaneous requests.
    let existing = db.get_user_poll_votes(&poll.id, &identity.user_id).await?;
    if let Some(vote) = existing
        .iter()
        .find(|vote| req.options.contains(&vote.option_id))
    {
        return Err(AppError::DuplicateVote(vote.option_id.clone()));
    }
    if !poll.multi_select && !existing.is_empty() {
        return Err(AppError::Validation(
            "poll does not allow a second selection".into(),
        ));
    }

    let now = Utc::now();
    let votes: Vec<Vote> = req
        .options
        .iter()
        .map(|option_id| Vote {
            user_id: identity.user_id.clone(),
            poll_id: poll.id.clone(),
            option_id: option_id.clone(),
            preferred: req.preferred.as_deref() == Some(option_id.as_str()),
            created_at: now,
        })
        .collect();
    db.record_votes(&votes).await?;
    cache.invalidate(&poll.id).await;

    let response = run_consensus_check(&db, &cache, &poll).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[actix_web::get("/{id}/results")]
pub async fn get_results(
    db: Data<Database>,
    cache: Data<dyn TallyCache>,
    id: Path<String>,
) -> Result<HttpResponse, AppError> {
    let poll = db.get_poll(&id).await?;
    let response = run_consensus_check(&db, &cache, &poll).await?;
    Ok(HttpResponse::Ok().json(response))
}

fn validate_selection(poll: &Poll, req: &CastVoteRequest) -> Result<(), AppError> {
    if req.options.is_empty() {
        return Err(AppError::Validation(
            "at least one option must be selected".into(),
        ));
    }
    let mut seen = HashSet::new();
    for option_id in &req.options {
        if !seen.insert(option_id.as_str()) {
            return Err(AppError::Validation(format!(
                "option {} selected more than once",
                option_id
            )));
        }
        if poll.option(option_id).is_none() {
            return Err(AppError::OptionNotFound(option_id.clone()));
        }
    }
    if !poll.multi_select && req.options.len() > 1 {
        return Err(AppError::Validation(
            "poll does not allow multiple selections".into(),
        ));
    }
    if let Some(preferred) = &req.preferred {
        if !req.options.contains(preferred) {
            return Err(AppError::Validation(
                "preferred option must be among the selected options".into(),
            ));
        }
    }
    Ok(())
}

// The voting gate: recompute the tally, decide consensus, and apply the
// OPEN -> CONSENSUS_REACHED transition. Safe to call repeatedly; on a
// settled poll it only reports the recorded outcome.
async fn run_consensus_check(
    db: &Database,
    cache: &Data<dyn TallyCache>,
    poll: &Poll,
) -> Result<ResultsResponse, AppError> {
    let tally = super::cached_tally(db, cache, poll).await?;

    let (consensus_reached, status) = match poll.status {
        PollStatus::ConsensusReached => (true, PollStatus::ConsensusReached),
        PollStatus::Expired => (false, PollStatus::Expired),
        PollStatus::Open => {
            if consensus::evaluate(poll, &tally) {
                // Conditional update; losing the race to a concurrent check
                // is a no-op.
                if db.close_poll(&poll.id).await? {
                    cache.invalidate(&poll.id).await;
                    info!(
                        "poll {} reached consensus ({} of {} votes on {:?})",
                        poll.id,
                        tally.leading_count(),
                        tally.total_votes,
                        tally.leading().map(|option| option.option_text.as_str())
                    );
                }
                (true, PollStatus::ConsensusReached)
            } else {
                (false, PollStatus::Open)
            }
        }
    };

    Ok(ResultsResponse {
        poll_id: poll.id.clone(),
        status,
        tally,
        consensus_reached,
    })
}
