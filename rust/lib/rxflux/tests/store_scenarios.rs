/// End-to-end scenarios across store, middleware, views and registry.
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;

use openerp_rxflux::*;

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    count: i64,
}

fn counter_reducer(action: &Msg, state: &Counter) -> Counter {
    match action.tag() {
        "increment" => Counter {
            count: state.count + 1,
        },
        "add" => Counter {
            count: state.count + action.payload_ref::<i64>().copied().unwrap_or(0),
        },
        _ => state.clone(),
    }
}

fn recorder() -> (Arc<Mutex<Vec<i64>>>, impl Fn(&Arc<Counter>) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_c = seen.clone();
    (seen, move |s: &Arc<Counter>| seen_c.lock().push(s.count))
}

#[test]
fn test_counter_early_and_late_subscribers() {
    let store = create_store(counter_reducer, Counter { count: 0 });

    let (early, listener) = recorder();
    store.subscribe(listener);
    for _ in 0..3 {
        store.dispatch(Msg::tag_only("increment")).unwrap();
    }

    let (late, listener) = recorder();
    store.subscribe(listener);

    assert_eq!(*early.lock(), vec![0, 1, 2, 3]);
    assert_eq!(*late.lock(), vec![3]);
}

#[test]
fn test_counter_through_logger_and_custom_middleware() {
    let seen_tags: Arc<Mutex<Vec<String>>> = Arc::default();
    let tags = seen_tags.clone();
    let audit = from_fn(move |_api: &MiddlewareApi<Counter, Msg>| {
        let tags = tags.clone();
        Ok(layer(move |next: Dispatch<Msg>| {
            Dispatch::new(move |message: Message<Msg>| {
                tags.lock().push(message.tag().to_string());
                next.call(message)
            })
        }))
    });

    let store = StoreBuilder::new(counter_reducer, Counter { count: 0 })
        .config(StoreConfig::named("counter"))
        .middleware(Logger::new())
        .middleware(audit)
        .build()
        .unwrap();

    let (seen, listener) = recorder();
    store.subscribe(listener);
    store.dispatch(Msg::tag_only("increment")).unwrap();
    store.dispatch(Msg::tag_only("noop")).unwrap();
    store.dispatch(Msg::new("add", 5i64)).unwrap();

    assert_eq!(*seen.lock(), vec![0, 1, 6]);
    assert_eq!(*seen_tags.lock(), vec!["increment", "noop", "add"]);
    assert_eq!(store.config().name, "counter");
}

#[test]
fn test_middleware_constructed_dispatch_fails() {
    let eager = from_fn(|api: &MiddlewareApi<Counter, Msg>| {
        api.dispatch(Msg::tag_only("increment"))?;
        Ok(layer(|next| next))
    });
    let err = with_middleware(
        counter_reducer,
        Counter { count: 0 },
        vec![Box::new(eager) as Box<dyn Middleware<Counter, Msg>>],
    )
    .unwrap_err();
    assert_eq!(err.code(), error_code::INVALID_USE);
}

#[tokio::test]
async fn test_superseded_stream_folds_nothing_further() {
    let store = create_store(counter_reducer, Counter { count: 0 });
    let (first_tx, first_rx) = mpsc::unbounded();
    let (second_tx, second_rx) = mpsc::unbounded();
    let mut states = store.states();

    store.dispatch_stream(first_rx).unwrap();
    first_tx.unbounded_send(Msg::new("add", 1i64)).unwrap();

    // 0 (replay), then 1 from the first stream.
    let got: Vec<i64> = tokio::time::timeout(
        Duration::from_secs(1),
        states.by_ref().take(2).map(|s| s.count).collect::<Vec<_>>(),
    )
    .await
    .unwrap();
    assert_eq!(got, vec![0, 1]);

    store.dispatch_stream(second_rx).unwrap();
    let _ = first_tx.unbounded_send(Msg::new("add", 100i64));
    second_tx.unbounded_send(Msg::new("add", 10i64)).unwrap();

    let next = tokio::time::timeout(Duration::from_secs(1), states.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.count, 11);

    tokio::task::yield_now().await;
    assert_eq!(store.get_state().count, 11);
}

#[test]
fn test_registry_view_lifecycle() {
    let registry = StoreRegistry::new();
    let scope = registry.open_scope();

    let err = registry.use_store::<Node, Msg>(scope).unwrap_err();
    assert_eq!(err.code(), error_code::MISSING_PROVIDER);

    let store = create_store(
        |action: &Msg, state: &Node| match action.tag() {
            "rename" => {
                let todo = state.child("todo").cloned().unwrap_or_default();
                state.with_child("todo", todo.with_child("title", Node::leaf("done".to_string())))
            }
            _ => state.clone(),
        },
        Node::composite([(
            "todo",
            Node::composite([("title", Node::leaf("draft".to_string()))]),
        )]),
    );
    registry.provide(scope, store).unwrap();

    let title = registry.derive_view::<Msg, _>(scope, &["todo", "title"]).unwrap();
    assert_eq!(title.name(), "title");
    assert_eq!(title.get().value::<String>().map(String::as_str), Some("draft"));

    let missing = registry.derive_view::<Msg, _>(scope, &["todo", "owner"]).unwrap_err();
    match missing {
        StoreError::PathNotFound { segment, .. } => assert_eq!(segment, "owner"),
        other => panic!("unexpected error: {other:?}"),
    }

    title.send(Msg::tag_only("rename")).unwrap();
    assert_eq!(title.get().value::<String>().map(String::as_str), Some("done"));

    assert!(registry.close_scope(scope));
    let err = registry.use_store::<Node, Msg>(scope).unwrap_err();
    assert_eq!(err.code(), error_code::UNKNOWN_SCOPE);
}
