//! End-to-end client↔server runs over in-process duplex streams.

use serde_json::json;
use taco_core::{
    Args, CallArgs, Module, ModuleRegistry, NativeClass, ServerObject, ServerValue, Taco,
    TacoError, TacoServer, TacoValue,
};
use tokio::io::BufReader;

struct Counter {
    total: i64,
}

impl Counter {
    fn from_args(args: &CallArgs) -> taco_core::Result<i64> {
        match args.get(0) {
            Some(v) => v.as_i64().ok_or_else(|| {
                TacoError::InvalidArguments("total must be an integer".to_string())
            }),
            None => Ok(0),
        }
    }
}

impl ServerObject for Counter {
    fn class_name(&self) -> &str {
        "Counter"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn call_method(&mut self, name: &str, args: CallArgs) -> taco_core::Result<ServerValue> {
        match name {
            "add" => {
                self.total += args.int(0)?;
                Ok(self.total.into())
            }
            "snapshot" => Ok(ServerValue::object(Counter { total: self.total })),
            _ => Err(TacoError::NoSuchAttribute {
                target: "Counter".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn get_attribute(&self, name: &str) -> taco_core::Result<ServerValue> {
        match name {
            "total" => Ok(self.total.into()),
            _ => Err(TacoError::NoSuchAttribute {
                target: "Counter".to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn set_attribute(&mut self, name: &str, value: ServerValue) -> taco_core::Result<()> {
        match name {
            "total" => {
                self.total = value.as_i64().ok_or_else(|| {
                    TacoError::InvalidArguments("total must be an integer".to_string())
                })?;
                Ok(())
            }
            _ => Err(TacoError::NoSuchAttribute {
                target: "Counter".to_string(),
                name: name.to_string(),
            }),
        }
    }
}

fn counter_total(value: &ServerValue) -> taco_core::Result<i64> {
    let object = value.as_object().ok_or_else(|| {
        TacoError::InvalidArguments("expected a Counter object".to_string())
    })?;
    let guard = object.lock().expect("object lock poisoned");
    let counter = guard
        .as_any()
        .downcast_ref::<Counter>()
        .ok_or_else(|| TacoError::InvalidArguments("expected a Counter object".to_string()))?;
    Ok(counter.total)
}

fn test_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(
        Module::new("tally")
            .class(
                NativeClass::new("Counter", |args: CallArgs| {
                    Ok(Box::new(Counter {
                        total: Counter::from_args(&args)?,
                    }))
                })
                .class_method("merged", |args: CallArgs| {
                    // Takes two Counter instances, by handle.
                    let total = counter_total(args.require(0)?)? + counter_total(args.require(1)?)?;
                    Ok(ServerValue::object(Counter { total }))
                }),
            )
            .function("boom", |_| Err(TacoError::Other("boom failed".to_string())))
            .value("flavor", "integers"),
    );
    registry
}

/// Start an in-process server and return a client connected to it.
fn connect(registry: ModuleRegistry) -> Taco {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let (server_rx, server_tx) = tokio::io::split(server_end);
    let mut server = TacoServer::new(BufReader::new(server_rx), server_tx, registry);
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let (client_rx, client_tx) = tokio::io::split(client_end);
    Taco::from_streams(client_rx, client_tx)
}

#[tokio::test]
async fn call_function_returns_plain_data() {
    let taco = connect(test_registry());
    let result = taco
        .call_function("divmod", Args::positional([67i64, 8]))
        .await
        .unwrap();
    assert_eq!(result.to_json().unwrap(), json!([8, 3]));
}

#[tokio::test]
async fn remote_errors_do_not_poison_the_transport() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::none()).await.unwrap();

    let err = taco
        .call_function("tally.boom", Args::none())
        .await
        .unwrap_err();
    match &err {
        TacoError::Received(message) => {
            assert!(message.contains("boom failed"), "got {message}")
        }
        other => panic!("expected Received, got {other:?}"),
    }

    // The same connection keeps working.
    let result = taco
        .call_function("divmod", Args::positional([67i64, 8]))
        .await
        .unwrap();
    assert_eq!(result.to_json().unwrap(), json!([8, 3]));
}

#[tokio::test]
async fn object_lifecycle_over_the_wire() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::none()).await.unwrap();

    let counter = taco
        .construct_object("tally.Counter", Args::positional([40i64]))
        .await
        .unwrap();
    assert_eq!(counter.number(), 1);

    let total = counter
        .call_method("add", Args::positional([2i64]))
        .await
        .unwrap();
    assert_eq!(total.as_i64(), Some(42));

    assert_eq!(
        counter.get_attribute("total").await.unwrap().as_i64(),
        Some(42)
    );

    counter.set_attribute("total", 55i64).await.unwrap();
    assert_eq!(
        counter.get_attribute("total").await.unwrap().as_i64(),
        Some(55)
    );

    // A method returning a live object yields a fresh proxy with a fresh
    // handle.
    let snapshot = taco_value_object(counter.call_method("snapshot", Args::none()).await.unwrap());
    assert_eq!(snapshot.number(), 2);
}

fn taco_value_object(value: TacoValue) -> taco_core::TacoObject {
    value.into_object().expect("expected an object result")
}

#[tokio::test]
async fn released_handles_fail_resolution() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::none()).await.unwrap();

    let counter = taco
        .construct_object("tally.Counter", Args::none())
        .await
        .unwrap();
    counter.release().await.unwrap();

    // Releasing again is a no-op.
    counter.release().await.unwrap();

    let err = counter.get_attribute("total").await.unwrap_err();
    match &err {
        TacoError::Received(message) => {
            assert!(message.contains("object 1 not found"), "got {message}")
        }
        other => panic!("expected Received, got {other:?}"),
    }
}

#[tokio::test]
async fn dropped_proxies_release_before_the_next_interaction() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::none()).await.unwrap();

    let counter = taco
        .construct_object("tally.Counter", Args::none())
        .await
        .unwrap();
    drop(counter);

    // The queued destroy_object and its response stay paired with their own
    // frames; if they did not, this result would be misaligned.
    let result = taco
        .call_function("divmod", Args::positional([67i64, 8]))
        .await
        .unwrap();
    assert_eq!(result.to_json().unwrap(), json!([8, 3]));

    // Handle numbers keep growing; nothing is reused.
    let next = taco
        .construct_object("tally.Counter", Args::none())
        .await
        .unwrap();
    assert_eq!(next.number(), 2);
}

#[tokio::test]
async fn proxies_can_be_passed_back_as_arguments() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::none()).await.unwrap();

    let a = taco
        .construct_object("tally.Counter", Args::positional([30i64]))
        .await
        .unwrap();
    let b = taco
        .construct_object("tally.Counter", Args::positional([12i64]))
        .await
        .unwrap();

    let merged = taco
        .call_class_method("tally.Counter", "merged", Args::none().arg(&a).arg(&b))
        .await
        .unwrap();
    let merged = taco_value_object(merged);
    assert_eq!(
        merged.get_attribute("total").await.unwrap().as_i64(),
        Some(42)
    );
}

#[tokio::test]
async fn dotted_values_read_and_assign() {
    let taco = connect(test_registry());

    taco.set_value("foo", TacoValue::from(json!({"bar": 1})))
        .await
        .unwrap();
    assert_eq!(taco.get_value("foo.bar").await.unwrap().as_i64(), Some(1));

    taco.set_value("foo.bar", 2i64).await.unwrap();
    assert_eq!(taco.get_value("foo.bar").await.unwrap().as_i64(), Some(2));
}

#[tokio::test]
async fn import_module_with_names_binds_members() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::positional(["Counter", "flavor"]))
        .await
        .unwrap();

    let counter = taco
        .construct_object("Counter", Args::none())
        .await
        .unwrap();
    assert_eq!(counter.number(), 1);

    assert_eq!(
        taco.get_value("flavor").await.unwrap().as_str(),
        Some("integers")
    );
}

#[tokio::test]
async fn currying_helpers_build_the_same_requests() {
    let taco = connect(test_registry());
    taco.import_module("tally", Args::none()).await.unwrap();

    let divmod = taco.function("divmod");
    assert_eq!(
        divmod
            .call(Args::positional([67i64, 8]))
            .await
            .unwrap()
            .to_json()
            .unwrap(),
        json!([8, 3])
    );

    let make_counter = taco.constructor("tally.Counter");
    let counter = make_counter
        .new_instance(Args::positional([5i64]))
        .await
        .unwrap();

    let add = counter.method("add");
    assert_eq!(add.call(Args::positional([3i64])).await.unwrap().as_i64(), Some(8));
}

#[tokio::test]
async fn interleaved_calls_stay_strictly_ordered() {
    let taco = connect(test_registry());

    let (a, b) = tokio::join!(
        taco.call_function("divmod", Args::positional([67i64, 8])),
        taco.call_function("divmod", Args::positional([9i64, 2])),
    );
    assert_eq!(a.unwrap().to_json().unwrap(), json!([8, 3]));
    assert_eq!(b.unwrap().to_json().unwrap(), json!([4, 1]));
}

#[tokio::test]
async fn unexpected_response_action_is_a_protocol_error() {
    // A peer that speaks framed JSON but not the response vocabulary.
    let (client_end, server_end) = tokio::io::duplex(4096);
    let (server_rx, server_tx) = tokio::io::split(server_end);
    tokio::spawn(async move {
        let mut transport =
            taco_core::Transport::new(BufReader::new(server_rx), server_tx);
        if transport.read().await.unwrap().is_some() {
            transport
                .write(&json!({"action": "surprise"}))
                .await
                .unwrap();
        }
    });

    let (client_rx, client_tx) = tokio::io::split(client_end);
    let taco = Taco::from_streams(client_rx, client_tx);
    let err = taco.call_function("divmod", Args::none()).await.unwrap_err();
    match &err {
        TacoError::UnknownAction(action) => assert_eq!(action, "surprise"),
        other => panic!("expected UnknownAction, got {other:?}"),
    }
}
