use crate::error::AppError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};

const IDENTITY_HEADER: &str = "x-user-id";

/// The acting user, as established by the upstream auth layer. The service
/// trusts the identity header it is handed and never authenticates itself.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user_id: String,
}

impl FromRequest for RequestIdentity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        ready(match user_id {
            Some(user_id) => Ok(RequestIdentity { user_id }),
            None => Err(AppError::Unauthorized(format!(
                "{} header not set",
                IDENTITY_HEADER
            ))),
        })
    }
}
