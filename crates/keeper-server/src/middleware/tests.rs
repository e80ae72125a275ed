use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use keeper_core::{ManualClock, Repositories, User};

use super::*;
use crate::rpc::NameRequest;

struct Record {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Middleware for Record {
    async fn handle(
        &self,
        ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError> {
        self.log.lock().unwrap().push(format!("{}:in", self.name));
        let result = next.run(ctx, call).await;
        self.log.lock().unwrap().push(format!("{}:out", self.name));
        result
    }
}

struct PanicInStage;

#[async_trait::async_trait]
impl Middleware for PanicInStage {
    async fn handle(
        &self,
        _ctx: RequestContext,
        _call: Call,
        _next: Next,
    ) -> Result<Reply, CallError> {
        panic!("stage blew up");
    }
}

/// Echoes the authenticated user id, or misbehaves as the item name asks.
struct Probe;

#[async_trait::async_trait]
impl Endpoint for Probe {
    async fn call(&self, ctx: RequestContext, call: Call) -> Result<Reply, KeeperError> {
        match call {
            Call::GetItem(req) if req.name == "panic" => panic!("endpoint blew up"),
            Call::GetItem(req) if req.name == "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Reply::Ack)
            }
            Call::GetItem(req) if req.name == "clock" => Ok(Reply::Token(
                ctx.trace().map(|t| t.now.to_rfc3339()).unwrap_or_default(),
            )),
            Call::GetItem(req) if req.name == "broken" => Err(KeeperError::Internal {
                reason: "disk on fire".into(),
            }),
            Call::GetItem(req) => Err(KeeperError::ItemNotFound { name: req.name }),
            _ => Ok(Reply::Token(ctx.user_id().unwrap_or_default().to_owned())),
        }
    }
}

struct Harness {
    pipeline: Pipeline,
    repos: Repositories,
    clock: Arc<ManualClock>,
    tokens: Arc<TokenService>,
}

impl Harness {
    fn new() -> Self {
        let repos = Repositories::in_memory();
        let clock = Arc::new(ManualClock::default());
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&repos.users),
            Arc::clone(&repos.tokens),
            clock.clone(),
            chrono::Duration::hours(1),
        ));
        let pipeline = Pipeline::standard(
            clock.clone(),
            Arc::clone(&tokens),
            Method::public().collect(),
            Probe,
        );
        Self {
            pipeline,
            repos,
            clock,
            tokens,
        }
    }

    async fn token_for_alice(&self) -> String {
        let user = User {
            id: "user-1".into(),
            login: "alice".into(),
            password_hash: String::new(),
            created_at: Utc::now(),
        };
        self.repos.users.create(user.clone()).await.unwrap();
        self.tokens.issue(&user).await.unwrap()
    }
}

fn get(name: &str) -> Call {
    Call::GetItem(NameRequest { name: name.into() })
}

fn authed(method: Method, token: &str) -> RequestContext {
    RequestContext::new(method).with_metadata(TOKEN_FIELD, token)
}

#[tokio::test]
async fn stages_run_outermost_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let pipeline = Pipeline::builder()
        .stage(Record {
            name: "outer",
            log: Arc::clone(&log),
        })
        .stage(Record {
            name: "inner",
            log: Arc::clone(&log),
        })
        .build(Probe);

    pipeline
        .dispatch(RequestContext::new(Method::ListItems), Call::ListItems)
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["outer:in", "inner:in", "inner:out", "outer:out"]
    );
}

#[tokio::test]
async fn authenticated_call_sees_user_id() {
    let h = Harness::new();
    let token = h.token_for_alice().await;

    let reply = h
        .pipeline
        .dispatch(authed(Method::ListItems, &token), Call::ListItems)
        .await
        .unwrap();

    assert_eq!(reply, Reply::Token("user-1".into()));
}

#[tokio::test]
async fn public_methods_skip_auth() {
    let h = Harness::new();
    let call = Call::Login(crate::rpc::CredentialsRequest {
        login: "alice".into(),
        password: "whatever".into(),
    });

    let reply = h
        .pipeline
        .dispatch(RequestContext::new(Method::Login), call)
        .await
        .unwrap();

    assert_eq!(reply, Reply::Token(String::new()));
}

#[tokio::test]
async fn missing_empty_and_unknown_tokens_are_rejected() {
    let h = Harness::new();

    for ctx in [
        RequestContext::new(Method::ListItems),
        authed(Method::ListItems, ""),
        authed(Method::ListItems, "   "),
        authed(Method::ListItems, "kpr_0000"),
    ] {
        let status = h.pipeline.dispatch(ctx, Call::ListItems).await.unwrap_err();
        assert_eq!(status.code, Code::Unauthenticated);
        assert_eq!(status.message, "authentication required");
    }
}

#[tokio::test]
async fn expired_token_is_rejected_then_forgotten() {
    let h = Harness::new();
    let token = h.token_for_alice().await;
    h.clock.advance(chrono::Duration::hours(1));

    let first = h
        .pipeline
        .dispatch(authed(Method::ListItems, &token), Call::ListItems)
        .await
        .unwrap_err();
    assert_eq!(first.code, Code::Unauthenticated);

    // The expired record was deleted by the first lookup.
    assert!(matches!(
        h.tokens.get_user(&token).await,
        Err(KeeperError::TokenNotFound)
    ));

    let second = h
        .pipeline
        .dispatch(authed(Method::ListItems, &token), Call::ListItems)
        .await
        .unwrap_err();
    assert_eq!(second.code, Code::Unauthenticated);
}

#[tokio::test]
async fn trace_start_comes_from_the_clock() {
    let h = Harness::new();
    let token = h.token_for_alice().await;
    h.clock.advance(chrono::Duration::minutes(7));

    let reply = h
        .pipeline
        .dispatch(authed(Method::GetItem, &token), get("clock"))
        .await
        .unwrap();

    assert_eq!(reply, Reply::Token(h.clock.now().to_rfc3339()));
}

#[tokio::test]
async fn domain_errors_are_translated() {
    let h = Harness::new();
    let token = h.token_for_alice().await;

    let status = h
        .pipeline
        .dispatch(authed(Method::GetItem, &token), get("missing"))
        .await
        .unwrap_err();

    assert_eq!(status.code, Code::NotFound);
    assert_eq!(status.message, "item 'missing' not found");
}

#[tokio::test]
async fn internal_errors_hide_their_cause() {
    let h = Harness::new();
    let token = h.token_for_alice().await;

    let status = h
        .pipeline
        .dispatch(authed(Method::GetItem, &token), get("broken"))
        .await
        .unwrap_err();

    assert_eq!(status, Status::internal());
}

#[tokio::test]
async fn endpoint_panic_becomes_internal() {
    let h = Harness::new();
    let token = h.token_for_alice().await;

    let status = h
        .pipeline
        .dispatch(authed(Method::GetItem, &token), get("panic"))
        .await
        .unwrap_err();
    assert_eq!(status, Status::internal());

    // The server keeps serving.
    let reply = h
        .pipeline
        .dispatch(authed(Method::ListItems, &token), Call::ListItems)
        .await
        .unwrap();
    assert_eq!(reply, Reply::Token("user-1".into()));
}

#[tokio::test]
async fn panic_inside_contained_stage_is_converted() {
    let pipeline = Pipeline::builder()
        .stage(ErrorStage)
        .stage(PanicStage::new())
        .stage(PanicInStage)
        .build(Probe);

    let status = pipeline
        .dispatch(RequestContext::new(Method::ListItems), Call::ListItems)
        .await
        .unwrap_err();

    assert_eq!(status, Status::internal());
}

#[tokio::test]
async fn panic_carries_message_and_backtrace() {
    let pipeline = Pipeline::builder()
        .stage(PanicStage::new())
        .build(Probe);

    let err = pipeline
        .dispatch(RequestContext::new(Method::GetItem), get("panic"))
        .await;
    // Without an error stage the domain error escapes untranslated.
    assert_eq!(err.unwrap_err(), Status::internal());

    let next = Next {
        chain: Arc::clone(&pipeline.chain),
        position: 0,
    };
    match next.run(RequestContext::new(Method::GetItem), get("panic")).await {
        Err(CallError::Domain(KeeperError::Panic { message, backtrace })) => {
            assert_eq!(message, "endpoint blew up");
            assert!(!backtrace.is_empty());
        }
        other => panic!("expected contained panic, got {other:?}"),
    }
}

#[tokio::test]
async fn deadline_aborts_slow_calls() {
    let h = Harness::new();
    let token = h.token_for_alice().await;
    let ctx = authed(Method::GetItem, &token)
        .with_deadline(Instant::now() + Duration::from_millis(50));

    let started = Instant::now();
    let status = h.pipeline.dispatch(ctx, get("slow")).await.unwrap_err();

    assert_eq!(status.code, Code::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn expired_deadline_fails_before_running() {
    let h = Harness::new();
    let token = h.token_for_alice().await;
    let ctx = authed(Method::ListItems, &token).with_deadline(Instant::now());

    let status = h.pipeline.dispatch(ctx, Call::ListItems).await.unwrap_err();

    assert_eq!(status.code, Code::DeadlineExceeded);
}

#[test]
fn translation_table() {
    let cases = [
        (
            KeeperError::UserAlreadyExists {
                login: "bob".into(),
            },
            Code::AlreadyExists,
        ),
        (
            KeeperError::ItemAlreadyExists { name: "x".into() },
            Code::AlreadyExists,
        ),
        (
            KeeperError::UserNotFound {
                login: "bob".into(),
            },
            Code::NotFound,
        ),
        (KeeperError::TokenNotFound, Code::NotFound),
        (KeeperError::InvalidCredentials, Code::Unauthenticated),
        (KeeperError::TokenExpired, Code::Unauthenticated),
        (KeeperError::DeadlineExceeded, Code::DeadlineExceeded),
        (
            KeeperError::Serialization {
                reason: "bad json".into(),
            },
            Code::Internal,
        ),
    ];
    for (err, code) in cases {
        assert_eq!(translate(&err).code, code, "{err}");
    }

    let mut fields = keeper_core::FieldErrors::new();
    fields.push("login", "length should be greater or equal 3");
    let status = translate(&KeeperError::Validation(fields));
    assert_eq!(status.code, Code::InvalidArgument);
    assert_eq!(status.details.len(), 1);
    assert_eq!(status.details[0].field, "login");

    let status = translate(&KeeperError::InvalidCredentials);
    assert_eq!(status.message, "invalid login or password");
}
