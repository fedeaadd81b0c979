//! # Example: User Profile Screen
//!
//! A profile screen driven by one engine:
//! - `Load` fetches the user with retry (the fake API fails twice first)
//! - `Search` is debounced: only the last keystroke in a burst hits the API
//! - `Save` is throttled: double taps within the cooldown are dropped
//! - `WatchPresence` collects a stream of presence updates into state
//!
//! Run with: `cargo run --example user_profile --features logging`
//! (set `RUST_LOG=statevisor=debug,user_profile=info` for more detail)

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use tracing_subscriber::EnvFilter;

use statevisor::{
    Completion, Engine, EngineConfig, Handler, LogWriter, OperationFailure, RetryPolicy, Scope,
    Subscribe, TaskError,
};

#[derive(Clone, Debug, Default, PartialEq)]
struct ProfileState {
    user: Option<String>,
    loading: bool,
    query: String,
    results: Vec<String>,
    presence: Option<&'static str>,
}

enum ProfileIntent {
    Load(u32),
    Search(String),
    Save,
    WatchPresence,
}

#[derive(Debug)]
enum ProfileEffect {
    Toast(String),
    Navigate(&'static str),
}

/// Fake backend: `fetch_user` fails until it has been called `flaky_calls` times.
struct Api {
    calls: AtomicU32,
    flaky_calls: u32,
}

impl Api {
    async fn fetch_user(&self, id: u32) -> Result<String, OperationFailure> {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.flaky_calls {
            return Err(OperationFailure::new("connection reset").with_code(503));
        }
        Ok(format!("user #{id}"))
    }

    async fn search(&self, query: &str) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        ["ada", "alan", "grace", "linus"]
            .into_iter()
            .filter(|name| name.starts_with(query))
            .map(str::to_owned)
            .collect()
    }
}

struct ProfileScreen {
    api: Arc<Api>,
}

impl Handler for ProfileScreen {
    type State = ProfileState;
    type Intent = ProfileIntent;
    type Effect = ProfileEffect;

    fn initial_state(&self) -> ProfileState {
        ProfileState::default()
    }

    fn handle(
        &self,
        scope: &Scope<ProfileState, ProfileEffect>,
        intent: ProfileIntent,
    ) -> Result<(), OperationFailure> {
        match intent {
            ProfileIntent::Load(id) => self.load(scope, id),
            ProfileIntent::Search(query) => self.search(scope, query),
            ProfileIntent::Save => {
                let fx = scope.clone();
                let ran = scope
                    .throttle("save", scope.config().throttle, move || {
                        let _ = fx.send_effect(ProfileEffect::Toast("profile saved".into()));
                    })
                    .map_err(OperationFailure::from_error)?;
                if !ran {
                    tracing::info!("save ignored, still cooling down");
                }
                Ok(())
            }
            ProfileIntent::WatchPresence => {
                let (st, fx) = (scope.clone(), scope.clone());
                let updates = stream::iter(["online", "away", "online"])
                    .then(|p| async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, OperationFailure>(p)
                    })
                    .chain(stream::once(async {
                        Err::<&'static str, _>(OperationFailure::new("presence feed closed"))
                    }));
                scope
                    .collect(
                        updates,
                        move |p: &'static str| {
                            st.set_state(|s| ProfileState {
                                presence: Some(p),
                                ..s.clone()
                            });
                        },
                        move |f| {
                            let _ = fx.send_effect(ProfileEffect::Toast(f.to_string()));
                        },
                    )
                    .map_err(OperationFailure::from_error)?;
                Ok(())
            }
        }
    }
}

impl ProfileScreen {
    fn load(&self, scope: &Scope<ProfileState, ProfileEffect>, id: u32) -> Result<(), OperationFailure> {
        scope.set_state(|s| ProfileState {
            loading: true,
            ..s.clone()
        });

        let api = Arc::clone(&self.api);
        let (ok, err) = (scope.clone(), scope.clone());
        scope
            .with_retry_keyed(
                "load",
                scope.config().retry,
                move |_ctx| {
                    let api = Arc::clone(&api);
                    async move { api.fetch_user(id).await.map_err(TaskError::from) }
                },
                Completion::<String>::new()
                    .on_success(move |user| {
                        ok.set_state(|s| ProfileState {
                            user: Some(user),
                            loading: false,
                            ..s.clone()
                        });
                    })
                    .on_error(move |f| {
                        err.set_state(|s| ProfileState {
                            loading: false,
                            ..s.clone()
                        });
                        let _ = err.send_effects([
                            ProfileEffect::Toast(f.to_string()),
                            ProfileEffect::Navigate("/offline"),
                        ]);
                    }),
            )
            .map_err(OperationFailure::from_error)?;
        Ok(())
    }

    fn search(&self, scope: &Scope<ProfileState, ProfileEffect>, query: String) -> Result<(), OperationFailure> {
        scope.set_state(|s| ProfileState {
            query: query.clone(),
            ..s.clone()
        });

        let api = Arc::clone(&self.api);
        let bg = scope.clone();
        scope
            .debounce("search", scope.config().debounce, move || {
                let fx = bg.clone();
                let _ = bg.run_keyed("search-request", move |_ctx| async move {
                    let results = api.search(&query).await;
                    fx.set_state(|s| ProfileState {
                        results,
                        ..s.clone()
                    });
                });
            })
            .map_err(OperationFailure::from_error)?;
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let cfg = EngineConfig {
        retry: RetryPolicy::new(3, Duration::from_millis(100)),
        debounce: Duration::from_millis(150),
        throttle: Duration::from_millis(500),
        ..EngineConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let engine = Engine::builder(ProfileScreen {
        api: Arc::new(Api {
            calls: AtomicU32::new(0),
            flaky_calls: 2,
        }),
    })
    .with_config(cfg)
    .with_subscribers(subs)
    .build();

    let effects = engine.effects();
    let consumer = tokio::spawn(async move {
        let mut effects = effects.into_stream();
        while let Some(effect) = effects.next().await {
            match effect {
                ProfileEffect::Toast(text) => println!("[toast] {text}"),
                ProfileEffect::Navigate(route) => println!("[navigate] {route}"),
            }
        }
    });

    let mut states = engine.states();
    let renderer = tokio::spawn(async move {
        while let Some(s) = states.next().await {
            println!(
                "[render] user={:?} loading={} query={:?} results={:?} presence={:?}",
                s.user, s.loading, s.query, s.results, s.presence
            );
        }
    });

    engine.submit(ProfileIntent::Load(42))?;
    for prefix in ["a", "al", "ala", "al"] {
        engine.submit(ProfileIntent::Search(prefix.into()))?;
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    engine.submit_all([ProfileIntent::Save, ProfileIntent::Save, ProfileIntent::WatchPresence])?;

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("final state: {:?}", engine.current_state());

    engine.shutdown();
    engine.stopped().await;
    consumer.await?;
    drop(engine);
    renderer.await?;
    Ok(())
}
