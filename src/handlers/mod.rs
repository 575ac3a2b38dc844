pub mod poll;
pub mod vote;

use crate::cache::TallyCache;
use crate::db::Database;
use crate::error::AppError;
use crate::models::Poll;
use crate::voting::{tally, PollTally};
use actix_web::web::{Data, ServiceConfig};

// Routes under /polls
pub fn init(cnf: &mut ServiceConfig) {
    cnf.service(poll::create_poll)
        .service(poll::get_poll)
        .service(poll::add_option)
        .service(vote::cast_vote)
        .service(vote::get_results);
}

// Routes under /hangouts
pub fn init_hangouts(cnf: &mut ServiceConfig) {
    cnf.service(poll::list_hangout_polls);
}

// Tally lookup through the injected cache; recomputed from the vote rows on
// a miss. Writers invalidate, so a hit is always current.
pub(crate) async fn cached_tally(
    db: &Database,
    cache: &Data<dyn TallyCache>,
    poll: &Poll,
) -> Result<PollTally, AppError> {
    if let Some(cached) = cache.get(&poll.id).await {
        return Ok(cached);
    }
    let votes = db.get_poll_votes(&poll.id).await?;
    let computed = tally::calculate(poll, &votes);
    cache.put(&poll.id, computed.clone()).await;
    Ok(computed)
}
