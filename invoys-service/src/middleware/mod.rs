pub mod context;
pub mod cron_auth;

pub use context::{RequestContext, USER_ID_HEADER};
pub use cron_auth::{cron_secret_middleware, CRON_SECRET_HEADER};
