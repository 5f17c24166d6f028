//! User service facade.
//!
//! # Responsibilities
//! - Define every user operation as a command (or the collapser) once
//! - Bind primary functions to the remote caller
//! - Supply the default user as the shared fallback
//!
//! # Design Decisions
//! - Commands are fields, built in `new` from the service configuration;
//!   per-name overrides apply to each of them
//! - `get_user_by_ids` executes the collapser's own batch command, so direct
//!   and collapsed batch calls share one breaker and one bulkhead

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::ServiceConfig;
use crate::remote::{RemoteCaller, RemoteError, RemoteRequest};
use crate::resilience::{Collapser, Command, CommandError, CommandExecutor, RequestScope};
use crate::user::model::User;

pub const GET_USER: &str = "getUser";
pub const GET_USER_EXCEPTION: &str = "getUserException";
pub const GET_USER_COMMAND: &str = "getUserCommand";
pub const GET_USER_CACHE: &str = "getUserCache";
pub const REMOVE_CACHE: &str = "removeCache";
pub const GET_USER_FUTURE: &str = "getUserFuture";
pub const GET_USER_BY_IDS: &str = "getUserByIds";

const USER_SERVICE_GROUP: &str = "UserService";
const GET_USER_GROUP: &str = "getUserGroup";

/// Window used by `getUserFuture` unless configuration sets one.
pub const GET_USER_FUTURE_DELAY: Duration = Duration::from_millis(100);

pub struct UserService {
    executor: Arc<CommandExecutor>,
    get_user: Command<i64, User>,
    get_user_exception: Command<i64, User>,
    get_user_command: Command<i64, User>,
    get_user_cache: Command<i64, User>,
    remove_cache: Command<i64, ()>,
    get_user_future: Collapser<i64, User>,
}

impl UserService {
    pub fn new(config: &ServiceConfig, caller: Arc<dyn RemoteCaller>) -> Self {
        let executor = Arc::new(CommandExecutor::new());

        let get_user = Command::builder(GET_USER, fetch_user_with(&caller))
            .group(USER_SERVICE_GROUP)
            .configured(config)
            .fallback(default_user)
            .build();

        let get_user_exception = {
            let caller = Arc::clone(&caller);
            Command::builder(GET_USER_EXCEPTION, move |id: i64| {
                let caller = Arc::clone(&caller);
                async move {
                    match id {
                        1 => Err(RemoteError::InvalidArgument(format!("id {id} is not accepted"))),
                        2 => Err(RemoteError::OutOfRange(format!("id {id} is out of range"))),
                        3 => Err(RemoteError::MissingValue(format!("no user value for id {id}"))),
                        _ => fetch_user(caller, id).await,
                    }
                }
            })
            .group(USER_SERVICE_GROUP)
            .configured(config)
            .ignore(|error| matches!(error, RemoteError::MissingValue(_)))
            .fallback_with_cause(|id: i64, cause: CommandError| async move {
                tracing::warn!(id, cause = %cause, "getUserException falling back to default user");
                Ok(User::default_user())
            })
            .build()
        };

        let get_user_command = {
            let caller = Arc::clone(&caller);
            Command::builder(GET_USER_COMMAND, move |id: i64| {
                tracing::info!(id, "getUserCommand invoked");
                fetch_user(Arc::clone(&caller), id)
            })
            .group(GET_USER_GROUP)
            .configured(config)
            .fallback(default_user)
            .build()
        };

        let get_user_cache = Command::builder(GET_USER_CACHE, fetch_user_with(&caller))
            .group(USER_SERVICE_GROUP)
            .configured(config)
            .cache_key(|id: &i64| id.to_string())
            .fallback(default_user)
            .build();

        let remove_cache = {
            let caller = Arc::clone(&caller);
            Command::builder(REMOVE_CACHE, move |id: i64| {
                let caller = Arc::clone(&caller);
                async move {
                    caller.call(RemoteRequest::post(format!("/user/delete/{id}"))).await?;
                    Ok(())
                }
            })
            .group(USER_SERVICE_GROUP)
            .configured(config)
            .build()
        };

        let get_user_by_ids = {
            let caller = Arc::clone(&caller);
            Command::builder(GET_USER_BY_IDS, move |ids: Vec<i64>| {
                let caller = Arc::clone(&caller);
                async move {
                    let users = fetch_users(caller, &ids).await?;
                    Ok(users.into_iter().map(|user| (user.id, user)).collect::<HashMap<_, _>>())
                }
            })
            .group(USER_SERVICE_GROUP)
            .configured(config)
            .build()
        };

        let mut collapser = Collapser::builder(GET_USER_FUTURE, get_user_by_ids).configured(config);
        let delay_configured = config
            .commands
            .get(GET_USER_FUTURE)
            .is_some_and(|o| o.timer_delay_ms.is_some());
        if !delay_configured {
            collapser = collapser.timer_delay(GET_USER_FUTURE_DELAY);
        }
        let get_user_future = collapser.fallback(default_user).build(Arc::clone(&executor));

        tracing::info!(
            collapser = %get_user_future.name(),
            timer_delay_ms = get_user_future.timer_delay().as_millis() as u64,
            "User service commands registered"
        );

        Self {
            executor,
            get_user,
            get_user_exception,
            get_user_command,
            get_user_cache,
            remove_cache,
            get_user_future,
        }
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub async fn get_user(&self, id: i64) -> Result<User, CommandError> {
        self.executor.execute(&self.get_user, id).await
    }

    /// Ids 1 and 2 fail with errors the fallback recovers, logging the
    /// cause; id 3 fails with an ignored error that reaches the caller.
    pub async fn get_user_exception(&self, id: i64) -> Result<User, CommandError> {
        self.executor.execute(&self.get_user_exception, id).await
    }

    pub async fn get_user_command(&self, id: i64) -> Result<User, CommandError> {
        self.executor.execute(&self.get_user_command, id).await
    }

    /// Cached per request scope by id.
    pub async fn get_user_cache(&self, scope: &RequestScope, id: i64) -> Result<User, CommandError> {
        self.executor.execute_in(scope, &self.get_user_cache, id).await
    }

    /// Delete downstream, then drop the scope's cached `getUserCache`
    /// result. A failed delete leaves the entry in place.
    pub async fn remove_cache(&self, scope: &RequestScope, id: i64) -> Result<(), CommandError> {
        if !scope.is_active() {
            return Err(CommandError::ScopeNotActive);
        }
        self.executor.execute(&self.remove_cache, id).await?;
        self.executor.invalidate(scope, &self.get_user_cache, &id)
    }

    /// Collapsed into `getUserByIds` with concurrent calls.
    pub async fn get_user_future(&self, id: i64) -> Result<User, CommandError> {
        self.get_user_future.execute(id).await
    }

    /// Users for `ids` in request order; ids the service does not know are
    /// left out.
    pub async fn get_user_by_ids(&self, ids: Vec<i64>) -> Result<Vec<User>, CommandError> {
        let found = self
            .executor
            .execute(self.get_user_future.batch_command(), ids.clone())
            .await?;
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }
}

async fn default_user(_id: i64) -> Result<User, RemoteError> {
    Ok(User::default_user())
}

fn fetch_user_with(
    caller: &Arc<dyn RemoteCaller>,
) -> impl Fn(i64) -> BoxFuture<'static, Result<User, RemoteError>> + Send + Sync + 'static {
    let caller = Arc::clone(caller);
    move |id| Box::pin(fetch_user(Arc::clone(&caller), id))
}

async fn fetch_user(caller: Arc<dyn RemoteCaller>, id: i64) -> Result<User, RemoteError> {
    caller.call(RemoteRequest::get(format!("/user/{id}"))).await?.data_as()
}

async fn fetch_users(caller: Arc<dyn RemoteCaller>, ids: &[i64]) -> Result<Vec<User>, RemoteError> {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    caller
        .call(RemoteRequest::get("/user/getUserByIds").param("ids", joined))
        .await?
        .data_as()
}
